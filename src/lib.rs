//! ledger-exporter reads a personal finance ledger kept in Google Sheets and publishes its
//! acknowledged transactions as Prometheus gauges.

mod api;
pub mod args;
pub mod commands;
mod config;
mod error;
pub mod metrics;
pub mod model;
mod utils;


pub use api::Mode;
pub use config::Config;
pub use error::Error;
pub use error::Result;
