//! Session registry: supervised ingestion loops, one per credential session.
//!
//! Scope:
//! - `start` spawns a named thread per loop and returns its id; a second start
//!   for a session whose loop is still active is rejected.
//! - Finished loops (failed / stopped) stay listed with their last status and
//!   may be replaced by a new start for the same session. Only the newest
//!   `retain_finished` of them are kept; older ones are pruned on `start`.
//! - `stop` cancels through the loop's StopSignal; a fetch in flight finishes first.
//!
//! Notes:
//! - The registry never touches a loop's retained snapshot; it only sees
//!   CycleReports and the final state.
//! - Loops are built by a caller-provided builder so the registry does not
//!   depend on config, providers or sinks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, error, info};
use serde::Serialize;

use crate::ingest::{CycleReport, IngestLoop, LoopState, StopSignal};
use crate::metrics;
use crate::provider::Credentials;

/// Builds a fresh loop for submitted credentials.
pub type LoopBuilder = Arc<dyn Fn(Credentials) -> IngestLoop + Send + Sync + 'static>;

/// Public, serializable view of one loop.
#[derive(Clone, Debug, Serialize)]
pub struct LoopStatus {
    pub id: u64,
    /// Masked session key (never the full username).
    pub session: String,
    pub state: &'static str,
    pub cycles: u64,
    pub published: u64,
    pub failed: u64,
    pub pending: usize,
    pub last_error: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum StartError {
    /// A loop for this session is still active; carries its id.
    AlreadyRunning(u64),
    /// The session key is empty.
    EmptySession,
    /// The loop thread could not be spawned.
    Spawn(String),
}

impl std::fmt::Display for StartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartError::AlreadyRunning(id) => write!(f, "collection already running (id {})", id),
            StartError::EmptySession => write!(f, "missing username"),
            StartError::Spawn(e) => write!(f, "spawn ingestion thread: {}", e),
        }
    }
}

impl std::error::Error for StartError {}

struct Entry {
    session: String,
    stop: StopSignal,
    status: Arc<Mutex<LoopStatus>>,
    thread: Option<JoinHandle<()>>,
}

impl Entry {
    fn state(&self) -> &'static str {
        self.status
            .lock()
            .map(|s| s.state)
            .unwrap_or(LoopState::Failed.as_str())
    }

    fn is_active(&self) -> bool {
        let st = self.state();
        st != LoopState::Failed.as_str() && st != LoopState::Stopped.as_str()
    }
}

#[derive(Default)]
struct RegInner {
    next_id: u64,
    entries: HashMap<u64, Entry>,
    by_session: HashMap<String, u64>,
}

/// Finished loops kept for `list`/`status` by default.
pub const DEFAULT_FINISHED_RETAINED: usize = 64;

pub struct SessionRegistry {
    builder: LoopBuilder,
    retain_finished: usize,
    inner: Mutex<RegInner>,
}

impl SessionRegistry {
    pub fn new(builder: LoopBuilder) -> Arc<Self> {
        Self::with_retention(builder, DEFAULT_FINISHED_RETAINED)
    }

    /// Like `new`, keeping at most `retain_finished` failed/stopped entries.
    pub fn with_retention(builder: LoopBuilder, retain_finished: usize) -> Arc<Self> {
        Arc::new(Self {
            builder,
            retain_finished,
            inner: Mutex::new(RegInner {
                next_id: 1,
                ..RegInner::default()
            }),
        })
    }

    /// Start collection for `credentials` unless that session is already active.
    pub fn start(&self, credentials: Credentials) -> Result<u64, StartError> {
        let session = credentials.session_key();
        if session.is_empty() {
            return Err(StartError::EmptySession);
        }

        let mut g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(&id) = g.by_session.get(&session) {
            if g.entries.get(&id).map(Entry::is_active).unwrap_or(false) {
                return Err(StartError::AlreadyRunning(id));
            }
        }

        let id = g.next_id;
        g.next_id += 1;

        let status = Arc::new(Mutex::new(LoopStatus {
            id,
            session: mask_session(&session),
            state: LoopState::Uninitialized.as_str(),
            cycles: 0,
            published: 0,
            failed: 0,
            pending: 0,
            last_error: None,
        }));
        let stop = StopSignal::new();

        let ingest = (self.builder)(credentials);
        let thread_status = status.clone();
        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name(format!("ingest-{}", id))
            .spawn(move || run_supervised(id, ingest, thread_stop, thread_status))
            .map_err(|e| StartError::Spawn(e.to_string()))?;

        metrics::record_loop_started();
        info!("started ingestion loop {} for {}", id, mask_session(&session));

        if let Some(old) = g.by_session.insert(session.clone(), id) {
            g.entries.remove(&old);
        }
        g.entries.insert(
            id,
            Entry {
                session,
                stop,
                status,
                thread: Some(handle),
            },
        );
        prune_finished(&mut g, self.retain_finished);
        Ok(id)
    }

    /// Request cancellation. Returns false for unknown ids.
    pub fn stop(&self, id: u64) -> bool {
        let g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match g.entries.get(&id) {
            Some(e) => {
                e.stop.stop();
                true
            }
            None => false,
        }
    }

    pub fn status(&self, id: u64) -> Option<LoopStatus> {
        let g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        g.entries
            .get(&id)
            .and_then(|e| e.status.lock().ok().map(|s| s.clone()))
    }

    /// Id of the loop registered for a session key, if any.
    pub fn find_session(&self, session_key: &str) -> Option<u64> {
        let g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        g.by_session.get(session_key).copied()
    }

    /// All known loops, ordered by id.
    pub fn list(&self) -> Vec<LoopStatus> {
        let g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let mut v: Vec<LoopStatus> = g
            .entries
            .values()
            .filter_map(|e| e.status.lock().ok().map(|s| s.clone()))
            .collect();
        v.sort_by_key(|s| s.id);
        v
    }

    pub fn active_count(&self) -> usize {
        let g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        g.entries.values().filter(|e| e.is_active()).count()
    }

    /// Stop every loop and wait for their threads.
    pub fn shutdown(&self) {
        let handles: Vec<(u64, String, JoinHandle<()>)> = {
            let mut g = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            g.entries
                .iter_mut()
                .filter_map(|(id, e)| {
                    e.stop.stop();
                    e.thread.take().map(|h| (*id, e.session.clone(), h))
                })
                .collect()
        };
        // Join outside the lock
        for (id, session, h) in handles {
            if h.join().is_err() {
                error!("ingestion loop {} ({}) panicked", id, mask_session(&session));
            }
        }
    }
}

/// Drop the oldest finished entries beyond `keep`.
fn prune_finished(g: &mut RegInner, keep: usize) {
    let mut finished: Vec<u64> = g
        .entries
        .iter()
        .filter(|(_, e)| !e.is_active())
        .map(|(id, _)| *id)
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort_unstable();
    let excess = finished.len() - keep;
    for id in finished.into_iter().take(excess) {
        if let Some(e) = g.entries.remove(&id) {
            if g.by_session.get(&e.session) == Some(&id) {
                g.by_session.remove(&e.session);
            }
            debug!("pruned finished ingestion loop {}", id);
        }
    }
}

fn run_supervised(
    id: u64,
    mut ingest: IngestLoop,
    stop: StopSignal,
    status: Arc<Mutex<LoopStatus>>,
) {
    if let Ok(mut s) = status.lock() {
        s.state = LoopState::Running.as_str();
    }

    let result = ingest.run(&stop, |r: &CycleReport| {
        if let Ok(mut s) = status.lock() {
            s.cycles = r.cycle;
            s.published += r.published as u64;
            s.failed += r.failed as u64;
            s.pending = r.pending;
        }
    });

    let mut s = status.lock().unwrap_or_else(|p| p.into_inner());
    match result {
        Ok(()) => {
            metrics::record_loop_stopped();
            info!("ingestion loop {} stopped", id);
            s.state = LoopState::Stopped.as_str();
        }
        Err(e) => {
            metrics::record_loop_failed();
            error!("ingestion loop {} failed ({}): {}", id, e.kind(), e);
            s.state = LoopState::Failed.as_str();
            s.last_error = Some(e.to_string());
        }
    }
}

/// `someone@example.org` -> `so***@example.org`; short names are fully masked.
pub fn mask_session(session: &str) -> String {
    let (local, domain) = match session.split_once('@') {
        Some((l, d)) => (l, Some(d)),
        None => (session, None),
    };
    let visible: String = local.chars().take(2).collect();
    let masked = if local.chars().count() <= 2 {
        "***".to_string()
    } else {
        format!("{}***", visible)
    };
    match domain {
        Some(d) => format!("{}@{}", masked, d),
        None => masked,
    }
}
