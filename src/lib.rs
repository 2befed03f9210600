// Core
pub mod errors;
pub mod record;
pub mod diff;

// Collaborators (history source, downstream store)
pub mod provider;
pub mod sink;

// Loops and their supervision
pub mod ingest;
pub mod registry;

// Control surface + ambient
pub mod http;
pub mod config;
pub mod metrics;

// Convenience re-exports
pub use config::{DriverConfig, FileConfig, RunMode};
pub use diff::{compute_new_records, new_record_refs};
pub use errors::DriverError;
pub use ingest::{CycleReport, DeliveryPolicy, IngestLoop, LoopOptions, LoopState, StopSignal};
pub use provider::{CommandProvider, Credentials, HistoryProvider};
pub use record::{Record, Snapshot};
pub use registry::{LoopBuilder, LoopStatus, SessionRegistry, StartError};
pub use sink::{open_sink, register_datasource, DatasourceMetadata, LineSink, Sink, SinkPublisher};
