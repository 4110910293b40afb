//! These structs provide the CLI interface for the ledger-exporter binary.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;

/// ledger-exporter: Publishes the transactions of a finance ledger as Prometheus metrics.
///
/// The ledger is a Google Sheet with one sheet per account. Each row that has been marked "Yes" in
/// its Ack column, and that is dated within the recency window, is exported as two gauges:
/// `transaction_timestamp_epoch_seconds` and `transaction_amount_cents`.
///
/// Every option can also be provided through the environment variable listed with it, which is
/// how the exporter is normally configured when it runs in a container.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Args {
    pub fn common(&self) -> &Common {
        &self.common
    }

    /// The subcommand to run. `serve` when none was given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve metrics and refresh them from the ledger on a fixed interval. This is the default.
    Serve,
    /// Authorize access to the ledger through Google's OAuth consent page and save the token.
    ///
    /// You need the OAuth client credentials file for a Google Cloud "Desktop app" client, with
    /// `http://localhost` as one of its redirect URIs. Pass it with --client-secret.
    Auth(AuthArgs),
    /// Fetch the ledger once and print the transactions that would be exported.
    Fetch,
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG. See the tracing-subscriber crate for instructions.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The ID of the ledger spreadsheet. A full Google Sheets URL is also accepted.
    #[arg(long, env = "FINANCE_SPREADSHEET_ID")]
    spreadsheet_id: String,

    /// When set to any non-empty value, OAuth tokens are never written back to disk. Use this when
    /// the token file lives on a read-only filesystem; the token is refreshed on every start.
    #[arg(long, env = "RO_FILESYSTEM")]
    ro_filesystem: Option<String>,

    /// The port that the metrics endpoint listens on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// The path to the OAuth token file.
    #[arg(long, env = "CRED_PATH", default_value = "/opt/app/.creds/token.json")]
    cred_path: PathBuf,

    /// The path to the OAuth client credentials file. Only needed to authorize for the first time.
    #[arg(long, env = "CLIENT_SECRET_PATH", default_value = "credentials.json")]
    client_secret: PathBuf,

    /// Sheets that do not hold transactions and are skipped, separated by commas.
    #[arg(
        long,
        env = "IGNORED_SHEETS",
        value_delimiter = ',',
        default_value = "Template,Categories,IRA/401k/HSA log"
    )]
    ignored_sheets: Vec<String>,

    /// Only transactions dated within this many days are exported.
    #[arg(long, env = "WINDOW_DAYS", default_value_t = 30)]
    window_days: u32,

    /// Seconds to wait between refreshes of the ledger.
    #[arg(long, env = "EXPORT_INTERVAL_SECS", default_value_t = 86400)]
    interval_secs: u64,

    /// The localhost port that receives the OAuth redirect during authorization.
    #[arg(long, env = "OAUTH_CALLBACK_PORT", default_value_t = 3030)]
    callback_port: u16,

    /// Keep serving the last known metrics when a refresh fails instead of exiting.
    #[arg(long, env = "KEEP_GOING")]
    keep_going: bool,
}

impl Common {
    /// Creates `Common` with the defaults of every optional setting.
    pub fn new(spreadsheet_id: impl Into<String>) -> Self {
        Self {
            log_level: LevelFilter::INFO,
            spreadsheet_id: spreadsheet_id.into(),
            ro_filesystem: None,
            port: 8080,
            cred_path: PathBuf::from("/opt/app/.creds/token.json"),
            client_secret: PathBuf::from("credentials.json"),
            ignored_sheets: vec![
                "Template".to_string(),
                "Categories".to_string(),
                "IRA/401k/HSA log".to_string(),
            ],
            window_days: 30,
            interval_secs: 86400,
            callback_port: 3030,
            keep_going: false,
        }
    }

    pub fn with_cred_path(mut self, cred_path: impl Into<PathBuf>) -> Self {
        self.cred_path = cred_path.into();
        self
    }

    pub fn with_client_secret(mut self, client_secret: impl Into<PathBuf>) -> Self {
        self.client_secret = client_secret.into();
        self
    }

    pub fn with_ro_filesystem(mut self, ro_filesystem: Option<String>) -> Self {
        self.ro_filesystem = ro_filesystem;
        self
    }

    pub fn with_window_days(mut self, window_days: u32) -> Self {
        self.window_days = window_days;
        self
    }

    pub fn with_interval_secs(mut self, interval_secs: u64) -> Self {
        self.interval_secs = interval_secs;
        self
    }

    pub fn with_keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn ro_filesystem(&self) -> Option<&str> {
        self.ro_filesystem.as_deref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn cred_path(&self) -> &Path {
        &self.cred_path
    }

    pub fn client_secret(&self) -> &Path {
        &self.client_secret
    }

    pub fn ignored_sheets(&self) -> &[String] {
        &self.ignored_sheets
    }

    pub fn window_days(&self) -> u32 {
        self.window_days
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    pub fn callback_port(&self) -> u16 {
        self.callback_port
    }

    pub fn keep_going(&self) -> bool {
        self.keep_going
    }
}

/// (Not shown): Args for the `ledger-exporter auth` command.
#[derive(Debug, Parser, Clone)]
pub struct AuthArgs {
    /// Verify and refresh the saved token without opening the consent page.
    #[arg(long)]
    verify: bool,
}

impl AuthArgs {
    pub fn verify(&self) -> bool {
        self.verify
    }
}
