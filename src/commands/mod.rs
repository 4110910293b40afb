//! Command handlers for the ledger-exporter CLI.
//!
//! This module contains implementations for all CLI subcommands.

mod auth;
mod fetch;
mod serve;

use crate::api::{Authorizer, ConsentFlow, Headless};
use crate::Config;
use serde::Serialize;
use std::fmt::Debug;
use std::io::IsTerminal;
use tracing::{debug, info};

pub use auth::{auth, auth_verify};
pub use fetch::fetch;
pub use serve::serve;

/// The output type for a command. This allows the command to return a consistent message and,
/// optionally, structured data.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// A message that can be printed to the user regarding the outcome of the command execution.
    message: String,

    /// Any structured data that needs to be output from the call.
    structure: Option<T>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// Create a new `Out` object that has `Some(structure)`.
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
        }
    }

    /// Create a new `Out` object that has `None` for `structure`.
    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    /// Print the message to `info!` and the structured data (if it exists) as JSON to `debug!`.
    pub fn print(&self) {
        info!("{}", self.message);
        if let Some(structure) = self.structure() {
            if let Ok(json) = serde_json::to_string_pretty(structure) {
                debug!("Command output:\n\n{json}\n\n");
            }
        }
    }
}

/// The consent flow when someone is at a terminal to follow the link, otherwise an authorizer that
/// fails with instructions.
fn authorizer(config: &Config) -> Box<dyn Authorizer> {
    if std::io::stdin().is_terminal() {
        Box::new(ConsentFlow::new(config))
    } else {
        debug!("No terminal attached, interactive authorization is unavailable");
        Box::new(Headless)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_from_message() {
        let out: Out<Vec<String>> = "done".into();
        assert_eq!(out.message(), "done");
        assert!(out.structure().is_none());

        let out = Out::new("two", vec![1, 2]);
        assert_eq!(out.structure(), Some(&vec![1, 2]));
    }
}
