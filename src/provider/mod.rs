//! History providers: where snapshots come from.
//!
//! The ingestion loop only sees the [`HistoryProvider`] trait. The production
//! implementation ([`CommandProvider`]) runs an external downloader and parses
//! its JSON dump; tests plug in scripted providers.

mod command;

pub use command::CommandProvider;

use std::fmt;

use zeroize::Zeroize;

use crate::errors::DriverError;
use crate::record::Snapshot;

/// Credentials submitted through the control surface.
///
/// The password is wiped from memory on drop and never printed by Debug.
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Key used to serialize loops per credential session.
    pub fn session_key(&self) -> String {
        self.username.trim().to_ascii_lowercase()
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of ordered history snapshots.
///
/// `fetch` is called once per cycle from the loop's own thread; it may block.
pub trait HistoryProvider: Send {
    /// Short label for logs.
    fn name(&self) -> &str;

    /// Fetch the current snapshot. Errors are Fetch or Parse.
    fn fetch(&self, credentials: &Credentials) -> Result<Snapshot, DriverError>;
}

impl<P: HistoryProvider + ?Sized> HistoryProvider for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, credentials: &Credentials) -> Result<Snapshot, DriverError> {
        (**self).fetch(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_password_and_session_key_normalizes() {
        let c = Credentials::new("  Someone@Example.org ", "hunter2");
        let dbg = format!("{:?}", c);
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
        assert_eq!(c.session_key(), "someone@example.org");
        assert_eq!(c.password(), "hunter2");
    }
}
