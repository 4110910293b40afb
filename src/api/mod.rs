//! Access to the ledger spreadsheet.
//!
//! The `Sheet` trait is the raw access to a spreadsheet: list its sheet titles and batch-get the
//! values of several sheets. The `Ledger` trait builds on it to produce the transactions that
//! should be exported. `Mode` decides whether the sheet is the real Google sheet or an in-memory
//! stand-in.

mod files;
mod ledger;
mod oauth;
mod sheet;
mod sheet_test_client;

use crate::model::Transaction;
use crate::{Config, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub(crate) use oauth::{Authorizer, ConsentFlow, Headless, TokenProvider};
pub(crate) use sheet_test_client::TestSheet;

/// The scope we ask for. Only reading is needed.
pub(crate) const OAUTH_SCOPES: &[&str] = &["https://www.googleapis.com/auth/spreadsheets.readonly"];

/// Stored tokens that carry any of these scopes can read the ledger.
const ACCEPTED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets.readonly",
    "https://www.googleapis.com/auth/spreadsheets",
];

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// The environment variable that switches the program to `Mode::Test`.
const TEST_MODE_ENV: &str = "LEDGER_EXPORTER_IN_TEST_MODE";

/// Raw access to the ledger spreadsheet.
#[async_trait::async_trait]
pub(crate) trait Sheet {
    /// The titles of all sheets in the spreadsheet, in spreadsheet order.
    async fn sheet_titles(&mut self) -> Result<Vec<String>>;

    /// The cell values of each sheet in `titles`, in one request. Element `i` of the result holds
    /// the rows of `titles[i]`.
    async fn batch_get(&mut self, titles: &[String]) -> Result<Vec<Vec<Vec<String>>>>;
}

/// Produces the transactions that should currently be exported.
#[async_trait::async_trait]
pub(crate) trait Ledger {
    /// Fetches every account sheet and returns the acknowledged transactions that are dated after
    /// `now` minus the recency window.
    async fn transactions(&mut self, now: DateTime<Utc>) -> Result<Vec<Transaction>>;
}

/// Whether we talk to Google or to an in-memory sheet.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Google,
    Test,
}

serde_plain::derive_display_from_serialize!(Mode);
serde_plain::derive_fromstr_from_deserialize!(Mode);

impl Mode {
    /// `Mode::Test` when `LEDGER_EXPORTER_IN_TEST_MODE` is set to a non-empty value.
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(value) if !value.is_empty() => Mode::Test,
            _ => Mode::Google,
        }
    }
}

/// Creates the `Sheet` for `mode`. For `Mode::Google` this first obtains a token, which runs
/// `authorizer` when there is no usable stored token. `Mode::Test` needs no credentials.
pub(crate) async fn sheet(
    config: &Config,
    mode: Mode,
    authorizer: &dyn Authorizer,
) -> Result<Box<dyn Sheet + Send>> {
    match mode {
        Mode::Google => {
            let token_provider = TokenProvider::obtain(config, authorizer).await?;
            google_sheet(config, token_provider).await
        }
        Mode::Test => Ok(Box::new(TestSheet::seeded()?)),
    }
}

/// Creates a `Sheet` for the Google spreadsheet using an already obtained token.
pub(crate) async fn google_sheet(
    config: &Config,
    token_provider: TokenProvider,
) -> Result<Box<dyn Sheet + Send>> {
    Ok(Box::new(
        sheet::GoogleSheet::new(config, token_provider).await?,
    ))
}

/// Creates the `Ledger` that reads from `sheet`.
pub(crate) fn ledger(config: &Config, sheet: Box<dyn Sheet + Send>) -> Box<dyn Ledger + Send> {
    Box::new(ledger::LedgerImpl::new(config, sheet))
}
