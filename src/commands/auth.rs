//! Authentication command handlers for the OAuth flow.
//!
//! - `ledger-exporter auth` runs the consent flow
//! - `ledger-exporter auth --verify` checks the stored token without prompting

use crate::api::{ConsentFlow, TokenProvider};
use crate::commands::Out;
use crate::{Config, Result};
use anyhow::Context;

/// Handles `ledger-exporter auth`. This is the command to use for the first authorization, or when
/// the stored token has been revoked, since it runs the consent flow even if a token is stored.
///
/// The URL to open is logged. Once the browser is redirected back to the callback listener, the
/// token is saved to the token path (unless the filesystem is read-only).
///
/// # Errors
/// Returns an error if the client credentials file is missing or invalid, if consent is denied or
/// times out, or if the token cannot be saved.
pub async fn auth(config: &Config) -> Result<Out<()>> {
    let _ = TokenProvider::authorize(config, &ConsentFlow::new(config)).await?;
    let message = if config.persist_token() {
        format!(
            "Authorization complete, the token was saved to {}",
            config.token_path().display()
        )
    } else {
        "Authorization complete. RO_FILESYSTEM is set so the token was not saved".to_string()
    };
    Ok(Out::new_message(message))
}

/// Handles `ledger-exporter auth --verify`. It never prompts: the stored token is refreshed and
/// used to list the sheets of the ledger.
///
/// # Errors
/// Returns an error if there is no stored token, if it cannot be refreshed, or if the ledger
/// cannot be read with it.
pub async fn auth_verify(config: &Config) -> Result<Out<Vec<String>>> {
    let mut token_provider = TokenProvider::load(config).await.context(
        "Unable to use the stored token. \n\n\
        You should run 'ledger-exporter auth' (without the --verify flag).",
    )?;
    token_provider
        .refresh()
        .await
        .context("Unable to refresh the token")?;
    let mut sheet = crate::api::google_sheet(config, token_provider).await?;
    let titles = sheet
        .sheet_titles()
        .await
        .context("The token was refreshed but the ledger could not be read with it")?;
    Ok(Out::new(
        format!(
            "Your OAuth token is valid! The ledger has {} sheets",
            titles.len()
        ),
        titles,
    ))
}
