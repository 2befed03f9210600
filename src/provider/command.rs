//! External-command history provider (youtube-dl compatible CLI).
//!
//! Invocation:
//!   <program> -u <user> -p <password> --skip-download --dump-single-json
//!             --playlist-items 1-<max_items> <url>
//!
//! - spawn failure / non-zero exit -> DriverError::Fetch (stderr tail included)
//! - stdout that is not a playlist document -> DriverError::Parse
//! - no timeout: a hung command blocks only the calling loop

use std::process::Command;

use log::debug;

use super::{Credentials, HistoryProvider};
use crate::errors::DriverError;
use crate::record::Snapshot;

/// Keep at most this many bytes of stderr in error messages.
const STDERR_TAIL: usize = 512;

#[derive(Clone, Debug)]
pub struct CommandProvider {
    program: String,
    url: String,
    max_items: usize,
}

impl CommandProvider {
    pub fn new<P: Into<String>, U: Into<String>>(program: P, url: U, max_items: usize) -> Self {
        Self {
            program: program.into(),
            url: url.into(),
            max_items: max_items.max(1),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments after the program name (the password included, so never log them).
    pub fn args(&self, credentials: &Credentials) -> Vec<String> {
        vec![
            "-u".to_string(),
            credentials.username().to_string(),
            "-p".to_string(),
            credentials.password().to_string(),
            "--skip-download".to_string(),
            "--dump-single-json".to_string(),
            "--playlist-items".to_string(),
            format!("1-{}", self.max_items),
            self.url.clone(),
        ]
    }
}

impl HistoryProvider for CommandProvider {
    fn name(&self) -> &str {
        &self.program
    }

    fn fetch(&self, credentials: &Credentials) -> Result<Snapshot, DriverError> {
        debug!(
            "running {} for {} (items 1-{})",
            self.program,
            credentials.username(),
            self.max_items
        );
        let out = Command::new(&self.program)
            .args(self.args(credentials))
            .output()
            .map_err(|e| DriverError::Fetch(format!("spawn {}: {}", self.program, e)))?;

        if !out.status.success() {
            return Err(DriverError::Fetch(format!(
                "{} exited with {}: {}",
                self.program,
                out.status,
                stderr_tail(&out.stderr)
            )));
        }

        Snapshot::from_json(&out.stdout)
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let s = String::from_utf8_lossy(stderr);
    let s = s.trim();
    if s.len() <= STDERR_TAIL {
        return s.to_string();
    }
    let mut start = s.len() - STDERR_TAIL;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &s[start..])
}
