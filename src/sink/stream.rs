//! JSON-lines sink over stdout / file:// / tcp://.
//!
//! Line formats:
//!   {"op":"register","datasource":{...}}
//!   {"op":"write","datasource_id":"...","ts_ms":<u64>,"data":<payload>}
//!
//! Notes:
//! - Every line is flushed immediately; a record counts as published once the
//!   flush succeeded.
//! - file:// appends (the store is a log, not a snapshot).
//! - tcp:// drops the connection after a write error and reconnects lazily on
//!   the next write.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use super::{DatasourceMetadata, Sink};
use crate::errors::DriverError;

/// Where lines go.
#[derive(Clone, Debug, PartialEq)]
pub enum SinkTarget {
    Stdout,
    File(PathBuf),
    Tcp(String),
}

impl SinkTarget {
    /// Parse `-` / empty (stdout), `file://path`, `tcp://host:port`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s == "-" {
            return Ok(SinkTarget::Stdout);
        }
        if let Some(addr) = s.strip_prefix("tcp://") {
            if addr.is_empty() {
                return Err(anyhow!("tcp sink needs host:port"));
            }
            return Ok(SinkTarget::Tcp(addr.to_string()));
        }
        if let Some(path) = s.strip_prefix("file://") {
            if path.is_empty() {
                return Err(anyhow!("file sink needs a path"));
            }
            return Ok(SinkTarget::File(PathBuf::from(path)));
        }
        Err(anyhow!(
            "unsupported sink '{}': use tcp://host:port, file://path or - for stdout",
            s
        ))
    }

    fn open(&self) -> Result<Box<dyn Write + Send>> {
        match self {
            SinkTarget::Stdout => Ok(Box::new(BufWriter::new(std::io::stdout()))),
            SinkTarget::Tcp(addr) => {
                let stream = TcpStream::connect(addr)
                    .with_context(|| format!("connect tcp sink {}", addr))?;
                stream.set_nodelay(true).ok();
                Ok(Box::new(BufWriter::new(stream)))
            }
            SinkTarget::File(p) => {
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        let _ = std::fs::create_dir_all(parent);
                    }
                }
                let f = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(p)
                    .with_context(|| format!("open file sink {}", p.display()))?;
                Ok(Box::new(BufWriter::new(f)))
            }
        }
    }
}

impl std::fmt::Display for SinkTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkTarget::Stdout => write!(f, "stdout"),
            SinkTarget::File(p) => write!(f, "file://{}", p.display()),
            SinkTarget::Tcp(a) => write!(f, "tcp://{}", a),
        }
    }
}

#[derive(Serialize)]
struct RegisterLine<'a> {
    op: &'static str,
    datasource: &'a DatasourceMetadata,
}

pub struct LineSink {
    target: SinkTarget,
    out: Mutex<Option<Box<dyn Write + Send>>>,
}

impl LineSink {
    pub fn target(&self) -> &SinkTarget {
        &self.target
    }

    /// Write one line; on I/O failure the writer is dropped so the next call reopens it.
    fn write_line(&self, line: &[u8]) -> Result<()> {
        let mut g = self
            .out
            .lock()
            .map_err(|_| anyhow!("sink writer lock poisoned"))?;
        if g.is_none() {
            debug!("reopening sink {}", self.target);
            *g = Some(self.target.open()?);
        }
        let res = match g.as_mut() {
            Some(w) => w
                .write_all(line)
                .and_then(|_| w.write_all(b"\n"))
                .and_then(|_| w.flush()),
            None => return Err(anyhow!("sink {} not open", self.target)),
        };
        if let Err(e) = res {
            warn!("sink {} write failed, dropping connection: {}", self.target, e);
            *g = None;
            return Err(anyhow!("write to {}: {}", self.target, e));
        }
        Ok(())
    }
}

impl Sink for LineSink {
    fn register(&self, meta: &DatasourceMetadata) -> Result<(), DriverError> {
        let line = serde_json::to_vec(&RegisterLine {
            op: "register",
            datasource: meta,
        })
        .map_err(|e| DriverError::Registration(e.to_string()))?;
        self.write_line(&line)
            .map_err(|e| DriverError::Registration(format!("{:#}", e)))
    }

    fn write(&self, datasource_id: &str, payload: &[u8]) -> Result<(), DriverError> {
        // The payload is spliced in verbatim, so it must be one JSON value.
        serde_json::from_slice::<serde::de::IgnoredAny>(payload)
            .map_err(|e| DriverError::Publish(format!("payload is not JSON: {}", e)))?;
        let id = serde_json::to_string(datasource_id)
            .map_err(|e| DriverError::Publish(e.to_string()))?;

        let mut line = Vec::with_capacity(payload.len() + 64);
        line.extend_from_slice(b"{\"op\":\"write\",\"datasource_id\":");
        line.extend_from_slice(id.as_bytes());
        line.extend_from_slice(format!(",\"ts_ms\":{},\"data\":", now_ms()).as_bytes());
        line.extend_from_slice(payload);
        line.push(b'}');

        self.write_line(&line)
            .map_err(|e| DriverError::Publish(format!("{:#}", e)))
    }
}

/// Open a line sink (stdout when `url` is None). The connection/file is opened eagerly.
pub fn open_sink(url: Option<&str>) -> Result<LineSink> {
    let target = match url {
        None => SinkTarget::Stdout,
        Some(s) => SinkTarget::parse(s)?,
    };
    let w = target.open()?;
    Ok(LineSink {
        target,
        out: Mutex::new(Some(w)),
    })
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
