use crate::api;
use crate::commands::{authorizer, Out};
use crate::model::Transaction;
use crate::{Config, Mode, Result};
use chrono::Utc;

/// Handles `ledger-exporter fetch`: reads the ledger once and returns the transactions that a
/// `serve` cycle would publish right now.
pub async fn fetch(config: &Config, mode: Mode) -> Result<Out<Vec<Transaction>>> {
    let sheet = api::sheet(config, mode, authorizer(config).as_ref()).await?;
    let mut ledger = api::ledger(config, sheet);
    let transactions = ledger.transactions(Utc::now()).await?;
    Ok(Out::new(
        format!(
            "Found {} acknowledged transactions from the last {} days",
            transactions.len(),
            config.window_days()
        ),
        transactions,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestEnv;

    #[tokio::test]
    async fn test_fetch_in_test_mode() {
        let env = TestEnv::new().await;
        let out = fetch(env.config(), Mode::Test).await.unwrap();
        let transactions = out.structure().unwrap();
        assert_eq!(transactions.len(), 7);
        assert_eq!(transactions[0].account(), "Checking");
        assert_eq!(transactions[0].name(), "Paycheck");
        assert!(transactions.iter().all(|t| t.account() != "Template"));
        assert!(out.message().starts_with("Found 7 "));
    }
}
