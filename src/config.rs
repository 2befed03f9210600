//! Centralized configuration for the driver.
//!
//! Layers, lowest to highest precedence:
//! - built-in defaults (`DriverConfig::default()`)
//! - environment (`DriverConfig::from_env()`, `HD_*` variables)
//! - optional TOML file (`DriverConfig::apply_file`)
//! - CLI flags (applied by the binary through the `with_*` setters)
//!
//! Mode:
//! - `HD_PLATFORM_VERSION` unset/empty -> standalone: the store endpoint falls
//!   back to the local test endpoint.
//! - set -> production: a store endpoint must be configured explicitly.
//!
//! TLS is on unless `plaintext` is set explicitly (HD_HTTP_PLAINTEXT / --plaintext).

use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::ingest::{DeliveryPolicy, IngestLoop, LoopOptions};
use crate::provider::{CommandProvider, Credentials};
use crate::registry::LoopBuilder;
use crate::sink::{DatasourceMetadata, Sink, SinkPublisher};

/// Store endpoint used when running outside the platform.
pub const STANDALONE_STORE_ENDPOINT: &str = "tcp://127.0.0.1:5555";
pub const DEFAULT_HISTORY_URL: &str = "https://www.youtube.com/feed/history";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Standalone,
    Production,
}

#[derive(Clone, Debug)]
pub struct DriverConfig {
    // ---------- control surface ----------
    /// Env: HD_LISTEN (default 0.0.0.0:8080)
    pub listen: String,
    /// Serve plain HTTP instead of TLS. Env: HD_HTTP_PLAINTEXT (default false)
    pub plaintext: bool,
    /// PEM certificate chain. Env: HD_TLS_CERT or HD_HTTPS_CREDENTIALS
    pub tls_cert: Option<PathBuf>,
    /// PEM private key (may be the same file as the chain). Env: HD_TLS_KEY or HD_HTTPS_CREDENTIALS
    pub tls_key: Option<PathBuf>,
    /// Directory served under /ui. Env: HD_STATIC_DIR (default ./static)
    pub static_dir: PathBuf,
    /// Socket read/write timeout. Env: HD_IO_TIMEOUT_SECS (default 30)
    pub io_timeout_secs: u64,

    // ---------- platform / store ----------
    /// Env: HD_PLATFORM_VERSION (unset => standalone mode)
    pub platform_version: Option<String>,
    /// Sink URL (tcp://, file://, -). Env: HD_STORE_ENDPOINT
    pub store_endpoint: Option<String>,
    /// Env: HD_DATASOURCE_ID (default YoutubeHistory)
    pub datasource_id: String,
    /// Env: HD_VENDOR (default histdriver)
    pub vendor: String,

    // ---------- ingestion ----------
    /// Env: HD_POLL_INTERVAL_SECS (default 30)
    pub poll_interval_secs: u64,
    /// Env: HD_MAX_ITEMS (default 10)
    pub max_items: usize,
    /// Env: HD_FETCH_PROGRAM (default youtube-dl)
    pub fetch_program: String,
    /// Env: HD_HISTORY_URL
    pub history_url: String,
    /// Env: HD_DELIVERY = retry|best-effort (default retry)
    pub delivery: DeliveryPolicy,
    /// Env: HD_MAX_PENDING (default 1000)
    pub max_pending: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            plaintext: false,
            tls_cert: None,
            tls_key: None,
            static_dir: PathBuf::from("./static"),
            io_timeout_secs: 30,

            platform_version: None,
            store_endpoint: None,
            datasource_id: "YoutubeHistory".to_string(),
            vendor: "histdriver".to_string(),

            poll_interval_secs: 30,
            max_items: 10,
            fetch_program: "youtube-dl".to_string(),
            history_url: DEFAULT_HISTORY_URL.to_string(),
            delivery: DeliveryPolicy::Retry,
            max_pending: 1000,
        }
    }
}

/// TOML file shape; every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub listen: Option<String>,
    pub plaintext: Option<bool>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
    pub io_timeout_secs: Option<u64>,
    pub platform_version: Option<String>,
    pub store_endpoint: Option<String>,
    pub datasource_id: Option<String>,
    pub vendor: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub max_items: Option<usize>,
    pub fetch_program: Option<String>,
    pub history_url: Option<String>,
    pub delivery: Option<String>,
    pub max_pending: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&s).with_context(|| format!("parse TOML config {}", path.display()))
    }
}

fn parse_bool(v: &str) -> bool {
    let s = v.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "yes" || s == "on"
}

fn parsed<T>(key: &str, raw: Option<String>) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = raw?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("ignoring {}={:?}: {}", key, raw, e);
            None
        }
    }
}

fn non_empty(v: String) -> Option<String> {
    let s = v.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

impl DriverConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Defaults overlaid with variables from `lookup`. Unparseable values are
    /// logged and leave the default in place.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |k: &str| lookup(k).and_then(non_empty);

        // ----- control surface -----
        if let Some(v) = get("HD_LISTEN") {
            cfg.listen = v;
        }
        if let Some(v) = get("HD_HTTP_PLAINTEXT") {
            cfg.plaintext = parse_bool(&v);
        }
        if let Some(v) = get("HD_HTTPS_CREDENTIALS") {
            cfg.tls_cert = Some(PathBuf::from(&v));
            cfg.tls_key = Some(PathBuf::from(v));
        }
        if let Some(v) = get("HD_TLS_CERT") {
            cfg.tls_cert = Some(PathBuf::from(v));
        }
        if let Some(v) = get("HD_TLS_KEY") {
            cfg.tls_key = Some(PathBuf::from(v));
        }
        if let Some(v) = get("HD_STATIC_DIR") {
            cfg.static_dir = PathBuf::from(v);
        }
        if let Some(n) = parsed::<u64>("HD_IO_TIMEOUT_SECS", get("HD_IO_TIMEOUT_SECS")) {
            cfg.io_timeout_secs = n;
        }

        // ----- platform / store -----
        cfg.platform_version = get("HD_PLATFORM_VERSION");
        if let Some(v) = get("HD_STORE_ENDPOINT") {
            cfg.store_endpoint = Some(v);
        }
        if let Some(v) = get("HD_DATASOURCE_ID") {
            cfg.datasource_id = v;
        }
        if let Some(v) = get("HD_VENDOR") {
            cfg.vendor = v;
        }

        // ----- ingestion -----
        if let Some(n) = parsed::<u64>("HD_POLL_INTERVAL_SECS", get("HD_POLL_INTERVAL_SECS")) {
            cfg.poll_interval_secs = n;
        }
        if let Some(n) = parsed::<usize>("HD_MAX_ITEMS", get("HD_MAX_ITEMS")) {
            cfg.max_items = n;
        }
        if let Some(v) = get("HD_FETCH_PROGRAM") {
            cfg.fetch_program = v;
        }
        if let Some(v) = get("HD_HISTORY_URL") {
            cfg.history_url = v;
        }
        if let Some(p) = parsed::<DeliveryPolicy>("HD_DELIVERY", get("HD_DELIVERY")) {
            cfg.delivery = p;
        }
        if let Some(n) = parsed::<usize>("HD_MAX_PENDING", get("HD_MAX_PENDING")) {
            cfg.max_pending = n;
        }

        cfg
    }

    /// Overlay values present in a TOML file. Invalid enum strings are errors.
    pub fn apply_file(mut self, f: FileConfig) -> Result<Self> {
        fn set<T>(dst: &mut T, v: Option<T>) {
            if let Some(v) = v {
                *dst = v;
            }
        }
        set(&mut self.listen, f.listen);
        set(&mut self.plaintext, f.plaintext);
        if f.tls_cert.is_some() {
            self.tls_cert = f.tls_cert;
        }
        if f.tls_key.is_some() {
            self.tls_key = f.tls_key;
        }
        set(&mut self.static_dir, f.static_dir);
        set(&mut self.io_timeout_secs, f.io_timeout_secs);
        if f.platform_version.is_some() {
            self.platform_version = f.platform_version;
        }
        if f.store_endpoint.is_some() {
            self.store_endpoint = f.store_endpoint;
        }
        set(&mut self.datasource_id, f.datasource_id);
        set(&mut self.vendor, f.vendor);
        set(&mut self.poll_interval_secs, f.poll_interval_secs);
        set(&mut self.max_items, f.max_items);
        set(&mut self.fetch_program, f.fetch_program);
        set(&mut self.history_url, f.history_url);
        if let Some(d) = f.delivery {
            self.delivery = d.parse()?;
        }
        set(&mut self.max_pending, f.max_pending);
        Ok(self)
    }

    pub fn mode(&self) -> RunMode {
        match self.platform_version.as_deref() {
            Some(v) if !v.trim().is_empty() => RunMode::Production,
            _ => RunMode::Standalone,
        }
    }

    /// Store endpoint to open: explicit value, else the standalone default.
    /// Production mode without an explicit endpoint is an error.
    pub fn effective_store_endpoint(&self) -> Result<String> {
        if let Some(e) = &self.store_endpoint {
            return Ok(e.clone());
        }
        match self.mode() {
            RunMode::Standalone => Ok(STANDALONE_STORE_ENDPOINT.to_string()),
            RunMode::Production => Err(anyhow!(
                "production mode (HD_PLATFORM_VERSION set) requires HD_STORE_ENDPOINT"
            )),
        }
    }

    /// Certificate/key pair for TLS mode.
    pub fn tls_paths(&self) -> Result<(PathBuf, PathBuf)> {
        match (&self.tls_cert, &self.tls_key) {
            (Some(c), Some(k)) => Ok((c.clone(), k.clone())),
            _ => Err(anyhow!(
                "TLS requires a certificate and key (HD_TLS_CERT/HD_TLS_KEY or HD_HTTPS_CREDENTIALS); \
                 use plaintext mode only for local testing"
            )),
        }
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs.max(1))
    }

    pub fn loop_options(&self) -> LoopOptions {
        LoopOptions {
            interval: Duration::from_secs(self.poll_interval_secs),
            policy: self.delivery,
            max_pending: self.max_pending,
        }
    }

    pub fn datasource(&self) -> DatasourceMetadata {
        DatasourceMetadata::history(self.datasource_id.clone(), self.vendor.clone())
    }

    pub fn command_provider(&self) -> CommandProvider {
        CommandProvider::new(self.fetch_program.clone(), self.history_url.clone(), self.max_items)
    }

    /// Loop factory for the session registry: command provider + shared sink.
    pub fn loop_builder(&self, sink: Arc<dyn Sink>) -> LoopBuilder {
        let cfg = self.clone();
        Arc::new(move |credentials: Credentials| {
            IngestLoop::new(
                Box::new(cfg.command_provider()),
                SinkPublisher::new(sink.clone(), cfg.datasource_id.clone()),
                credentials,
                cfg.loop_options(),
            )
        })
    }

    // ----- fluent setters (CLI overrides) -----

    pub fn with_listen<S: Into<String>>(mut self, addr: S) -> Self {
        self.listen = addr.into();
        self
    }

    pub fn with_plaintext(mut self, on: bool) -> Self {
        self.plaintext = on;
        self
    }

    pub fn with_tls<P: Into<PathBuf>>(mut self, cert: P, key: P) -> Self {
        self.tls_cert = Some(cert.into());
        self.tls_key = Some(key.into());
        self
    }

    pub fn with_static_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.static_dir = dir.into();
        self
    }

    pub fn with_store_endpoint<S: Into<String>>(mut self, url: S) -> Self {
        self.store_endpoint = Some(url.into());
        self
    }

    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn with_max_items(mut self, n: usize) -> Self {
        self.max_items = n;
        self
    }

    pub fn with_fetch_program<S: Into<String>>(mut self, program: S) -> Self {
        self.fetch_program = program.into();
        self
    }

    pub fn with_delivery(mut self, policy: DeliveryPolicy) -> Self {
        self.delivery = policy;
        self
    }
}

impl fmt::Display for DriverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DriverConfig {{ \
             mode: {:?}, \
             listen: {}, \
             tls: {}, \
             static_dir: {}, \
             store: {}, \
             datasource: {}, \
             interval_secs: {}, \
             max_items: {}, \
             fetch_program: {}, \
             delivery: {}, \
             max_pending: {} \
             }}",
            self.mode(),
            self.listen,
            if self.plaintext { "off(plaintext)" } else { "on" },
            self.static_dir.display(),
            self.store_endpoint
                .as_deref()
                .unwrap_or("default(mode)"),
            self.datasource_id,
            self.poll_interval_secs,
            self.max_items,
            self.fetch_program,
            self.delivery,
            self.max_pending,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        for v in ["1", "true", "ON", " yes "] {
            assert!(parse_bool(v), "{v}");
        }
        for v in ["0", "false", "off", "nah"] {
            assert!(!parse_bool(v), "{v}");
        }
    }

    #[test]
    fn display_never_prints_tls_paths() {
        let cfg = DriverConfig::default().with_tls("/secret/cert.pem", "/secret/key.pem");
        let s = cfg.to_string();
        assert!(s.contains("mode: Standalone"));
        assert!(!s.contains("/secret"));
    }
}
