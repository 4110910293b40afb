use crate::api::{Ledger, Sheet};
use crate::model::{deserialize_sheets, Transaction};
use crate::{Config, Result};
use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Reads transactions from every account sheet of the ledger. Every sheet that is not ignored is
/// treated as one account.
pub(super) struct LedgerImpl {
    sheet: Box<dyn Sheet + Send>,
    config: Config,
}

impl LedgerImpl {
    pub(super) fn new(config: &Config, sheet: Box<dyn Sheet + Send>) -> Self {
        Self {
            sheet,
            config: config.clone(),
        }
    }

    async fn accounts(&mut self) -> Result<Vec<String>> {
        let titles = self
            .sheet
            .sheet_titles()
            .await
            .context("Unable to list the sheets of the ledger")?;
        Ok(titles
            .into_iter()
            .filter(|title| !self.config.is_ignored(title))
            .collect())
    }
}

#[async_trait::async_trait]
impl Ledger for LedgerImpl {
    async fn transactions(&mut self, now: DateTime<Utc>) -> Result<Vec<Transaction>> {
        let accounts = self.accounts().await?;
        debug!("Reading accounts {accounts:?}");
        if accounts.is_empty() {
            return Ok(Vec::new());
        }
        let value_ranges = self
            .sheet
            .batch_get(&accounts)
            .await
            .context("Unable to read the account sheets")?;
        let window_days = self.config.window_days();
        let transactions = deserialize_sheets(&accounts, &value_ranges, window_days, now)?;
        debug!(
            "Read {} transactions from {} accounts",
            transactions.len(),
            accounts.len()
        );
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TestSheet;
    use crate::args::Common;
    use chrono::TimeZone;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|row| row.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    fn header() -> &'static [&'static str] {
        &[
            "Date",
            "Name",
            "Effective Amount",
            "Effective Category",
            "Ack",
        ]
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_ledger_skips_ignored_sheets() {
        let sheet = TestSheet::new(vec![
            (
                "Checking".to_string(),
                rows(&[header(), &["2024-01-10", "Coffee", "3.50", "Food", "Yes"]]),
            ),
            (
                "Template".to_string(),
                rows(&[header(), &["2024-01-10", "Example", "1.00", "Misc", "Yes"]]),
            ),
            // A sheet with no header row would fail if it were read.
            ("Categories".to_string(), rows(&[&["Category", "Group"]])),
        ]);
        let config = Config::new(&Common::new("abc")).unwrap();
        let mut ledger = LedgerImpl::new(&config, Box::new(sheet));
        let transactions = ledger.transactions(now()).await.unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].account(), "Checking");
        assert_eq!(transactions[0].name(), "Coffee");
    }

    #[tokio::test]
    async fn test_ledger_keeps_accounts_aligned() {
        let sheet = TestSheet::new(vec![
            (
                "Checking".to_string(),
                rows(&[header(), &["2024-01-10", "Coffee", "3.50", "Food", "Yes"]]),
            ),
            (
                "Credit Card".to_string(),
                rows(&[
                    &["Ack", "Effective Category", "Effective Amount", "Name", "Date"],
                    &["Yes", "Travel", "-120.00", "Train", "2024-01-12"],
                ]),
            ),
        ]);
        let config = Config::new(&Common::new("abc")).unwrap();
        let mut ledger = LedgerImpl::new(&config, Box::new(sheet));
        let transactions = ledger.transactions(now()).await.unwrap();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].account(), "Checking");
        assert_eq!(transactions[1].account(), "Credit Card");
        assert_eq!(transactions[1].name(), "Train");
        assert_eq!(transactions[1].amount().to_cents().unwrap(), -12000);
    }

    #[tokio::test]
    async fn test_ledger_only_ignored_sheets() {
        let sheet = TestSheet::new(vec![("Template".to_string(), rows(&[header()]))]);
        let config = Config::new(&Common::new("abc")).unwrap();
        let mut ledger = LedgerImpl::new(&config, Box::new(sheet));
        assert!(ledger.transactions(now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ledger_malformed_account_fails() {
        let sheet = TestSheet::new(vec![(
            "Checking".to_string(),
            rows(&[header(), &["01/10/2024", "Coffee", "3.50", "Food", "Yes"]]),
        )]);
        let config = Config::new(&Common::new("abc")).unwrap();
        let mut ledger = LedgerImpl::new(&config, Box::new(sheet));
        let err = ledger.transactions(now()).await.unwrap_err();
        assert!(format!("{err:#}").contains("01/10/2024"));
    }
}
