//! Configuration for the exporter.
//!
//! The `Config` is resolved once, in `main`, from the command line and environment, and then
//! passed by reference to everything that needs it.

use crate::args::Common;
use crate::Result;
use anyhow::{ensure, Context};
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The longest recency window accepted, about a century.
const MAX_WINDOW_DAYS: u32 = 36_500;

/// The `Config` object represents the configuration of the app.
#[derive(Debug, Clone)]
pub struct Config {
    spreadsheet_id: String,
    token_path: PathBuf,
    client_secret_path: PathBuf,
    persist_token: bool,
    port: u16,
    callback_port: u16,
    ignored_sheets: BTreeSet<String>,
    window_days: u32,
    interval: Duration,
    keep_going: bool,
}

impl Config {
    /// Validates the command line settings and resolves them into a `Config`.
    ///
    /// # Errors
    /// - The spreadsheet ID is empty or is a URL that does not contain an ID.
    /// - The export interval is zero.
    pub fn new(common: &Common) -> Result<Self> {
        let spreadsheet_id = extract_spreadsheet_id(common.spreadsheet_id().trim())
            .context("Failed to determine the spreadsheet ID")?
            .to_string();
        ensure!(
            !spreadsheet_id.is_empty(),
            "The spreadsheet ID is empty, set FINANCE_SPREADSHEET_ID or --spreadsheet-id"
        );
        ensure!(common.interval_secs() > 0, "The export interval must not be zero");
        ensure!(
            common.window_days() <= MAX_WINDOW_DAYS,
            "The window of {} days is longer than the maximum of {MAX_WINDOW_DAYS}",
            common.window_days()
        );

        // An empty RO_FILESYSTEM counts as unset.
        let read_only = common.ro_filesystem().is_some_and(|s| !s.is_empty());

        Ok(Self {
            spreadsheet_id,
            token_path: common.cred_path().to_path_buf(),
            client_secret_path: common.client_secret().to_path_buf(),
            persist_token: !read_only,
            port: common.port(),
            callback_port: common.callback_port(),
            ignored_sheets: common
                .ignored_sheets()
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            window_days: common.window_days(),
            interval: Duration::from_secs(common.interval_secs()),
            keep_going: common.keep_going(),
        })
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    pub fn client_secret_path(&self) -> &Path {
        &self.client_secret_path
    }

    /// False when the token file is on a read-only filesystem.
    pub fn persist_token(&self) -> bool {
        self.persist_token
    }

    /// The address that the metrics endpoint binds to.
    pub fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    pub fn callback_port(&self) -> u16 {
        self.callback_port
    }

    pub fn is_ignored(&self, sheet: &str) -> bool {
        self.ignored_sheets.contains(sheet)
    }

    pub fn window_days(&self) -> u32 {
        self.window_days
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn keep_going(&self) -> bool {
        self.keep_going
    }
}

/// Returns the spreadsheet ID found in a Google Sheets URL, or `value` unchanged when it does not
/// look like a URL.
///
/// # Arguments
/// * `value` - A spreadsheet ID or a URL such as
///   `https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/edit`
fn extract_spreadsheet_id(value: &str) -> Result<&str> {
    if !value.contains('/') {
        return Ok(value);
    }

    // URL format: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/...
    // or: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID?foo=bar
    let parts: Vec<&str> = value.split('/').collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == "d" && i + 1 < parts.len() {
            let id_part = parts[i + 1];
            let id = id_part
                .split('?')
                .next()
                .unwrap_or(id_part)
                .split('#')
                .next()
                .unwrap_or(id_part);
            return Ok(id);
        }
    }
    Err(anyhow::anyhow!(
        "Invalid Google Sheets URL format. Expected: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::new(&Common::new("MySheetIDX")).unwrap();
        assert_eq!(config.spreadsheet_id(), "MySheetIDX");
        assert!(config.persist_token());
        assert_eq!(config.metrics_addr().port(), 8080);
        assert_eq!(config.interval(), Duration::from_secs(60 * 60 * 24));
        assert_eq!(config.window_days(), 30);
        assert!(config.is_ignored("Template"));
        assert!(config.is_ignored("Categories"));
        assert!(config.is_ignored("IRA/401k/HSA log"));
        assert!(!config.is_ignored("Checking"));
        assert_eq!(config.token_path(), Path::new("/opt/app/.creds/token.json"));
    }

    #[test]
    fn test_config_read_only_filesystem() {
        let common = Common::new("abc").with_ro_filesystem(Some("1".to_string()));
        assert!(!Config::new(&common).unwrap().persist_token());

        let common = Common::new("abc").with_ro_filesystem(Some(String::new()));
        assert!(Config::new(&common).unwrap().persist_token());
    }

    #[test]
    fn test_config_accepts_sheet_url() {
        let common = Common::new(
            "https://docs.google.com/spreadsheets/d/7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL/edit",
        );
        let config = Config::new(&common).unwrap();
        assert_eq!(
            config.spreadsheet_id(),
            "7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL"
        );
    }

    #[test]
    fn test_config_window_too_large() {
        let common = Common::new("abc").with_window_days(MAX_WINDOW_DAYS + 1);
        assert!(Config::new(&common).is_err());
        let common = Common::new("abc").with_window_days(MAX_WINDOW_DAYS);
        assert_eq!(Config::new(&common).unwrap().window_days(), MAX_WINDOW_DAYS);
    }

    #[test]
    fn test_config_empty_id() {
        assert!(Config::new(&Common::new("  ")).is_err());
    }

    #[test]
    fn test_extract_spreadsheet_id() {
        let url = "https://docs.google.com/spreadsheets/d/7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL?foo=bar";
        let id = extract_spreadsheet_id(url).unwrap();
        assert_eq!(id, "7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL");

        let url2 = "https://docs.google.com/spreadsheets/d/ABC123#gid=0";
        assert_eq!(extract_spreadsheet_id(url2).unwrap(), "ABC123");

        assert_eq!(extract_spreadsheet_id("ABC123").unwrap(), "ABC123");

        let invalid = "https://example.com/invalid";
        assert!(extract_spreadsheet_id(invalid).is_err());
    }
}
