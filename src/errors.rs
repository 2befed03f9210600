//! Error taxonomy of the driver core.
//!
//! - Fetch / Parse are fatal for the ingestion loop that hit them.
//! - Registration is fatal at startup.
//! - Publish is per-record and never stops a cycle.
//!
//! Application plumbing (config, server bootstrap, CLI) keeps using anyhow;
//! DriverError converts into anyhow::Error at those boundaries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    /// History provider could not be run or exited unsuccessfully.
    #[error("history fetch failed: {0}")]
    Fetch(String),

    /// History provider answered with a document we cannot decode.
    #[error("malformed history document: {0}")]
    Parse(#[from] serde_json::Error),

    /// Downstream store rejected the datasource registration.
    #[error("datasource registration failed: {0}")]
    Registration(String),

    /// A single record could not be written to the downstream store.
    #[error("publish failed: {0}")]
    Publish(String),
}

impl DriverError {
    /// Fatal errors end the ingestion loop (or startup); Publish does not.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DriverError::Publish(_))
    }

    /// Short stable tag for logs and status output.
    pub fn kind(&self) -> &'static str {
        match self {
            DriverError::Fetch(_) => "fetch",
            DriverError::Parse(_) => "parse",
            DriverError::Registration(_) => "registration",
            DriverError::Publish(_) => "publish",
        }
    }
}
