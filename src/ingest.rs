//! Ingestion loop: fetch -> diff -> publish -> retain -> wait, until failure or stop.
//!
//! State lives in the [`IngestLoop`] value owned by the loop's thread:
//! - `retained`: the previous snapshot (None before the first successful cycle),
//!   replaced wholesale at the end of every cycle;
//! - `pending`: records whose publish failed (retry policy only).
//!
//! Fetch/parse errors are fatal: the loop goes to Failed and `retained` is left
//! exactly as it was. Publish errors never abort a cycle.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use log::{debug, info, warn};

use crate::diff::new_record_refs;
use crate::errors::DriverError;
use crate::metrics;
use crate::provider::{Credentials, HistoryProvider};
use crate::record::{Record, Snapshot};
use crate::sink::SinkPublisher;

/// Default pause between cycles.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
/// Default bound of the pending (re-delivery) list.
pub const DEFAULT_MAX_PENDING: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Uninitialized,
    Running,
    Failed,
    Stopped,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Uninitialized => "uninitialized",
            LoopState::Running => "running",
            LoopState::Failed => "failed",
            LoopState::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Failed | LoopState::Stopped)
    }
}

/// What happens to a record whose publish failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Log and forget; the record is already part of the retained snapshot.
    BestEffort,
    /// Keep it in a pending list and re-attempt it first on the next cycle.
    Retry,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        DeliveryPolicy::Retry
    }
}

impl std::str::FromStr for DeliveryPolicy {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retry" | "at-least-once" => Ok(DeliveryPolicy::Retry),
            "best-effort" | "besteffort" | "at-most-once" => Ok(DeliveryPolicy::BestEffort),
            other => Err(anyhow::anyhow!(
                "invalid delivery policy '{}': use retry|best-effort",
                other
            )),
        }
    }
}

impl std::fmt::Display for DeliveryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryPolicy::BestEffort => write!(f, "best-effort"),
            DeliveryPolicy::Retry => write!(f, "retry"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoopOptions {
    pub interval: Duration,
    pub policy: DeliveryPolicy,
    pub max_pending: usize,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            policy: DeliveryPolicy::default(),
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

/// Outcome of one cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// 1-based cycle number.
    pub cycle: u64,
    pub fetched: usize,
    /// Records the diff classified new this cycle.
    pub new: usize,
    /// Successful writes (re-delivered pending records included).
    pub published: usize,
    /// Failed writes this cycle.
    pub failed: usize,
    /// Records given up this cycle (best-effort failures, pending overflow).
    pub dropped: usize,
    /// Pending list length after the cycle.
    pub pending: usize,
}

/// Cancellation token shared between a loop and its supervisor.
///
/// `wait` sleeps up to a timeout and returns early once `stop` was called.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let (lock, cv) = &*self.inner;
        if let Ok(mut stopped) = lock.lock() {
            *stopped = true;
        }
        cv.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        let (lock, _) = &*self.inner;
        lock.lock().map(|g| *g).unwrap_or(true)
    }

    /// Sleep for `timeout` unless stopped. Returns true if stopped.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (lock, cv) = &*self.inner;
        let Ok(guard) = lock.lock() else {
            return true;
        };
        match cv.wait_timeout_while(guard, timeout, |stopped| !*stopped) {
            Ok((g, _)) => *g,
            Err(_) => true,
        }
    }
}

pub struct IngestLoop {
    provider: Box<dyn HistoryProvider>,
    publisher: SinkPublisher,
    credentials: Credentials,
    opts: LoopOptions,
    state: LoopState,
    retained: Option<Snapshot>,
    pending: Vec<Record>,
    cycles: u64,
}

impl IngestLoop {
    pub fn new(
        provider: Box<dyn HistoryProvider>,
        publisher: SinkPublisher,
        credentials: Credentials,
        opts: LoopOptions,
    ) -> Self {
        Self {
            provider,
            publisher,
            credentials,
            opts,
            state: LoopState::Uninitialized,
            retained: None,
            pending: Vec::new(),
            cycles: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn retained(&self) -> Option<&Snapshot> {
        self.retained.as_ref()
    }

    pub fn pending(&self) -> &[Record] {
        &self.pending
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// One fetch/diff/publish/retain pass, without the wait.
    ///
    /// A fatal error moves the loop to Failed; later calls keep failing.
    pub fn run_cycle(&mut self) -> Result<CycleReport, DriverError> {
        if self.state == LoopState::Failed {
            return Err(DriverError::Fetch("ingestion loop already failed".to_string()));
        }
        self.state = LoopState::Running;

        let snapshot = match self.provider.fetch(&self.credentials) {
            Ok(s) => s,
            Err(e) => {
                match &e {
                    DriverError::Parse(_) => metrics::record_parse_error(),
                    _ => metrics::record_fetch_error(),
                }
                self.state = LoopState::Failed;
                return Err(e);
            }
        };

        self.cycles += 1;
        let mut report = CycleReport {
            cycle: self.cycles,
            fetched: snapshot.len(),
            ..CycleReport::default()
        };

        // Pending first: they are older than anything found this cycle.
        let retry = std::mem::take(&mut self.pending);
        for rec in &retry {
            self.deliver(rec, &mut report);
        }

        let fresh = new_record_refs(self.retained.as_ref(), &snapshot);
        report.new = fresh.len();
        if self.retained.is_none() {
            info!(
                "[{}] first cycle: publishing initial snapshot of {} records",
                self.credentials.username(),
                fresh.len()
            );
        }
        for rec in fresh {
            self.deliver(rec, &mut report);
        }

        self.trim_pending(&mut report);
        report.pending = self.pending.len();

        self.retained = Some(snapshot);

        metrics::record_cycle(report.fetched, report.new);
        metrics::record_dropped(report.dropped);
        Ok(report)
    }

    fn deliver(&mut self, rec: &Record, report: &mut CycleReport) {
        match self.publisher.publish(rec) {
            Ok(()) => {
                debug!("stored {} ({})", rec.id, rec.label());
                metrics::record_published();
                report.published += 1;
            }
            Err(e) => {
                metrics::record_publish_error();
                report.failed += 1;
                match self.opts.policy {
                    DeliveryPolicy::BestEffort => {
                        warn!("publish of {} failed, record dropped: {}", rec.id, e);
                        report.dropped += 1;
                    }
                    DeliveryPolicy::Retry => {
                        warn!("publish of {} failed, will retry next cycle: {}", rec.id, e);
                        self.pending.push(rec.clone());
                    }
                }
            }
        }
    }

    fn trim_pending(&mut self, report: &mut CycleReport) {
        let max = self.opts.max_pending;
        if self.pending.len() > max {
            let over = self.pending.len() - max;
            warn!(
                "pending list over {} records, dropping {} oldest",
                max, over
            );
            self.pending.drain(..over);
            report.dropped += over;
        }
    }

    /// Run cycles until a fatal error (Err) or until `stop` fires (Ok).
    ///
    /// `on_cycle` sees every successful report.
    pub fn run<F>(&mut self, stop: &StopSignal, mut on_cycle: F) -> Result<(), DriverError>
    where
        F: FnMut(&CycleReport),
    {
        info!(
            "[{}] ingestion loop starting (provider={}, datasource={}, interval={:?}, delivery={})",
            self.credentials.username(),
            self.provider.name(),
            self.publisher.datasource_id(),
            self.opts.interval,
            self.opts.policy
        );
        loop {
            if stop.is_stopped() {
                self.state = LoopState::Stopped;
                return Ok(());
            }
            let report = self.run_cycle()?;
            info!(
                "[{}] cycle {}: fetched={} new={} published={} failed={} pending={}",
                self.credentials.username(),
                report.cycle,
                report.fetched,
                report.new,
                report.published,
                report.failed,
                report.pending
            );
            on_cycle(&report);

            if stop.wait(self.opts.interval) {
                self.state = LoopState::Stopped;
                return Ok(());
            }
        }
    }
}
