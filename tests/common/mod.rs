// Shared doubles for integration tests.
#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use histdriver::{
    Credentials, DatasourceMetadata, DriverError, HistoryProvider, IngestLoop, LoopOptions,
    Record, Sink, SinkPublisher, Snapshot,
};

// ------- temp dirs -------

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("hdtest-{prefix}-{pid}-{t}-{id}"))
}

// ------- snapshots -------

pub fn snap(ids: &[&str]) -> Snapshot {
    Snapshot::new(ids.iter().map(|id| Record::with_id(*id)).collect())
}

pub fn ids(records: &[Record]) -> Vec<String> {
    records.iter().map(|r| r.id.clone()).collect()
}

// ------- provider -------

pub enum Step {
    Ok(Snapshot),
    FetchErr(&'static str),
    /// Raw provider output that must fail to decode.
    Garbage(&'static str),
}

/// Plays back scripted fetch results. When the script runs out it keeps
/// returning the last good snapshot (or a fetch error if there was none).
#[derive(Clone)]
pub struct ScriptedProvider {
    steps: Arc<Mutex<VecDeque<Step>>>,
    last: Arc<Mutex<Option<Snapshot>>>,
    pub fetches: Arc<AtomicUsize>,
    pub seen_users: Arc<Mutex<Vec<String>>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into())),
            last: Arc::new(Mutex::new(None)),
            fetches: Arc::new(AtomicUsize::new(0)),
            seen_users: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl HistoryProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch(&self, credentials: &Credentials) -> Result<Snapshot, DriverError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.seen_users
            .lock()
            .unwrap()
            .push(credentials.username().to_string());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Ok(s)) => {
                *self.last.lock().unwrap() = Some(s.clone());
                Ok(s)
            }
            Some(Step::FetchErr(msg)) => Err(DriverError::Fetch(msg.to_string())),
            Some(Step::Garbage(raw)) => Snapshot::from_json(raw.as_bytes()),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| DriverError::Fetch("script exhausted".to_string())),
        }
    }
}

// ------- sink -------

/// In-memory store. Writes for ids in `fail_ids` (or all, when `fail_all`) fail.
#[derive(Default)]
pub struct RecordingSink {
    pub registered: Mutex<Vec<DatasourceMetadata>>,
    pub writes: Mutex<Vec<(String, Record)>>,
    pub fail_ids: Mutex<HashSet<String>>,
    pub fail_all: AtomicBool,
    pub fail_register: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, id: &str) {
        self.fail_ids.lock().unwrap().insert(id.to_string());
    }

    pub fn heal(&self) {
        self.fail_ids.lock().unwrap().clear();
        self.fail_all.store(false, Ordering::SeqCst);
    }

    pub fn written_ids(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.id.clone())
            .collect()
    }
}

impl Sink for RecordingSink {
    fn register(&self, meta: &DatasourceMetadata) -> Result<(), DriverError> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(DriverError::Registration("store unavailable".to_string()));
        }
        self.registered.lock().unwrap().push(meta.clone());
        Ok(())
    }

    fn write(&self, datasource_id: &str, payload: &[u8]) -> Result<(), DriverError> {
        let rec: Record = serde_json::from_slice(payload)
            .map_err(|e| DriverError::Publish(format!("bad payload: {}", e)))?;
        if self.fail_all.load(Ordering::SeqCst) || self.fail_ids.lock().unwrap().contains(&rec.id) {
            return Err(DriverError::Publish(format!("store rejected {}", rec.id)));
        }
        self.writes
            .lock()
            .unwrap()
            .push((datasource_id.to_string(), rec));
        Ok(())
    }
}

// ------- loops -------

pub fn fast_opts() -> LoopOptions {
    LoopOptions {
        interval: Duration::from_millis(10),
        ..LoopOptions::default()
    }
}

pub fn make_loop(provider: ScriptedProvider, sink: Arc<RecordingSink>, opts: LoopOptions) -> IngestLoop {
    IngestLoop::new(
        Box::new(provider),
        SinkPublisher::new(sink, "YoutubeHistory"),
        Credentials::new("someone@example.org", "pw"),
        opts,
    )
}

/// Poll `cond` until true or `timeout` elapses.
pub fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
