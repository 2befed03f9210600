//! Downstream store: datasource registration + per-record writes.
//!
//! The store itself is an external collaborator. [`Sink`] is the seam; the
//! shipped implementation ([`LineSink`]) emits JSON lines to stdout, a file or
//! a TCP peer. [`SinkPublisher`] binds a sink to one datasource id and turns
//! records into payloads.

mod stream;

pub use stream::{open_sink, LineSink, SinkTarget};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::DriverError;
use crate::record::Record;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const STORE_TYPE_TS_BLOB: &str = "ts/blob";

/// Datasource description sent once at startup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasourceMetadata {
    pub description: String,
    pub content_type: String,
    pub vendor: String,
    pub datasource_type: String,
    pub datasource_id: String,
    pub store_type: String,
    pub is_actuator: bool,
    pub is_func: bool,
}

impl DatasourceMetadata {
    /// Watch-history datasource with the given id and vendor.
    pub fn history<I: Into<String>, V: Into<String>>(datasource_id: I, vendor: V) -> Self {
        Self {
            description: "Youtube History data".to_string(),
            content_type: CONTENT_TYPE_JSON.to_string(),
            vendor: vendor.into(),
            datasource_type: "videoData".to_string(),
            datasource_id: datasource_id.into(),
            store_type: STORE_TYPE_TS_BLOB.to_string(),
            is_actuator: false,
            is_func: false,
        }
    }
}

/// Downstream store seam. Shared by every loop of the process.
pub trait Sink: Send + Sync {
    /// Register a datasource. Failure is a Registration error.
    fn register(&self, meta: &DatasourceMetadata) -> Result<(), DriverError>;

    /// Write one JSON payload under `datasource_id`. Failure is a Publish error.
    fn write(&self, datasource_id: &str, payload: &[u8]) -> Result<(), DriverError>;
}

/// Publishes records to one datasource of a shared sink.
#[derive(Clone)]
pub struct SinkPublisher {
    sink: Arc<dyn Sink>,
    datasource_id: String,
}

impl SinkPublisher {
    pub fn new<S: Into<String>>(sink: Arc<dyn Sink>, datasource_id: S) -> Self {
        Self {
            sink,
            datasource_id: datasource_id.into(),
        }
    }

    pub fn datasource_id(&self) -> &str {
        &self.datasource_id
    }

    pub fn publish(&self, record: &Record) -> Result<(), DriverError> {
        let payload = record.to_payload()?;
        self.sink.write(&self.datasource_id, &payload)
    }
}

/// Register the datasource, mapping any failure to a Registration error.
pub fn register_datasource(sink: &dyn Sink, meta: &DatasourceMetadata) -> Result<(), DriverError> {
    sink.register(meta).map_err(|e| match e {
        DriverError::Registration(_) => e,
        other => DriverError::Registration(other.to_string()),
    })
}
