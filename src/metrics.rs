//! Lightweight global metrics for the driver.
//!
//! Thread-safe atomic counters, one group per subsystem:
//! - ingestion loops (lifecycle)
//! - cycles (fetch / diff)
//! - publishing
//! - control surface
//!
//! Counters carry no loop state; they are only summed and exported.

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Loops -----
static LOOPS_STARTED: AtomicU64 = AtomicU64::new(0);
static LOOPS_FAILED: AtomicU64 = AtomicU64::new(0);
static LOOPS_STOPPED: AtomicU64 = AtomicU64::new(0);

// ----- Cycles -----
static CYCLES_TOTAL: AtomicU64 = AtomicU64::new(0);
static FETCH_ERRORS: AtomicU64 = AtomicU64::new(0);
static PARSE_ERRORS: AtomicU64 = AtomicU64::new(0);
static RECORDS_FETCHED: AtomicU64 = AtomicU64::new(0);
static RECORDS_NEW: AtomicU64 = AtomicU64::new(0);

// ----- Publish -----
static RECORDS_PUBLISHED: AtomicU64 = AtomicU64::new(0);
static PUBLISH_ERRORS: AtomicU64 = AtomicU64::new(0);
static RECORDS_DROPPED: AtomicU64 = AtomicU64::new(0);

// ----- HTTP -----
static HTTP_REQUESTS: AtomicU64 = AtomicU64::new(0);
static HTTP_ERRORS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    // Loops
    pub loops_started: u64,
    pub loops_failed: u64,
    pub loops_stopped: u64,

    // Cycles
    pub cycles_total: u64,
    pub fetch_errors: u64,
    pub parse_errors: u64,
    pub records_fetched: u64,
    pub records_new: u64,

    // Publish
    pub records_published: u64,
    pub publish_errors: u64,
    pub records_dropped: u64,

    // HTTP
    pub http_requests: u64,
    pub http_errors: u64,
}

impl MetricsSnapshot {
    /// Loops started and not yet finished (failed or stopped).
    pub fn loops_active(&self) -> u64 {
        self.loops_started
            .saturating_sub(self.loops_failed)
            .saturating_sub(self.loops_stopped)
    }

    pub fn publish_success_ratio(&self) -> f64 {
        let total = self.records_published + self.publish_errors;
        if total == 0 {
            1.0
        } else {
            self.records_published as f64 / total as f64
        }
    }
}

// ----- Recorders (Loops) -----
pub fn record_loop_started() {
    LOOPS_STARTED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_loop_failed() {
    LOOPS_FAILED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_loop_stopped() {
    LOOPS_STOPPED.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Cycles) -----
pub fn record_cycle(fetched: usize, new: usize) {
    CYCLES_TOTAL.fetch_add(1, Ordering::Relaxed);
    RECORDS_FETCHED.fetch_add(fetched as u64, Ordering::Relaxed);
    RECORDS_NEW.fetch_add(new as u64, Ordering::Relaxed);
}
pub fn record_fetch_error() {
    FETCH_ERRORS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_parse_error() {
    PARSE_ERRORS.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Publish) -----
pub fn record_published() {
    RECORDS_PUBLISHED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_publish_error() {
    PUBLISH_ERRORS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_dropped(n: usize) {
    RECORDS_DROPPED.fetch_add(n as u64, Ordering::Relaxed);
}

// ----- Recorders (HTTP) -----
pub fn record_http_request() {
    HTTP_REQUESTS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_http_error() {
    HTTP_ERRORS.fetch_add(1, Ordering::Relaxed);
}

/// Read all counters (each load is relaxed; the set is not a consistent cut).
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        loops_started: LOOPS_STARTED.load(Ordering::Relaxed),
        loops_failed: LOOPS_FAILED.load(Ordering::Relaxed),
        loops_stopped: LOOPS_STOPPED.load(Ordering::Relaxed),

        cycles_total: CYCLES_TOTAL.load(Ordering::Relaxed),
        fetch_errors: FETCH_ERRORS.load(Ordering::Relaxed),
        parse_errors: PARSE_ERRORS.load(Ordering::Relaxed),
        records_fetched: RECORDS_FETCHED.load(Ordering::Relaxed),
        records_new: RECORDS_NEW.load(Ordering::Relaxed),

        records_published: RECORDS_PUBLISHED.load(Ordering::Relaxed),
        publish_errors: PUBLISH_ERRORS.load(Ordering::Relaxed),
        records_dropped: RECORDS_DROPPED.load(Ordering::Relaxed),

        http_requests: HTTP_REQUESTS.load(Ordering::Relaxed),
        http_errors: HTTP_ERRORS.load(Ordering::Relaxed),
    }
}

/// Reset all counters to zero (tests, benches).
pub fn reset() {
    for c in [
        &LOOPS_STARTED,
        &LOOPS_FAILED,
        &LOOPS_STOPPED,
        &CYCLES_TOTAL,
        &FETCH_ERRORS,
        &PARSE_ERRORS,
        &RECORDS_FETCHED,
        &RECORDS_NEW,
        &RECORDS_PUBLISHED,
        &PUBLISH_ERRORS,
        &RECORDS_DROPPED,
        &HTTP_REQUESTS,
        &HTTP_ERRORS,
    ] {
        c.store(0, Ordering::Relaxed);
    }
}

/// Prometheus text exposition (format 0.0.4).
pub fn render_prometheus() -> String {
    let m = snapshot();
    let mut out = String::new();

    let ver = env!("CARGO_PKG_VERSION");
    out.push_str("# HELP histdriver_build_info Build info.\n");
    out.push_str("# TYPE histdriver_build_info gauge\n");
    out.push_str(&format!("histdriver_build_info{{version=\"{}\"}} 1\n", ver));

    let mut counter = |name: &str, help: &str, v: u64| {
        out.push_str(&format!("# HELP histdriver_{} {}\n", name, help));
        out.push_str(&format!("# TYPE histdriver_{} counter\n", name));
        out.push_str(&format!("histdriver_{} {}\n", name, v));
    };

    // --- Loops ---
    counter("loops_started_total", "Ingestion loops started.", m.loops_started);
    counter("loops_failed_total", "Ingestion loops ended by a fatal error.", m.loops_failed);
    counter("loops_stopped_total", "Ingestion loops cancelled.", m.loops_stopped);

    // --- Cycles ---
    counter("cycles_total", "Completed fetch/diff/publish cycles.", m.cycles_total);
    counter("fetch_errors_total", "History provider invocation failures.", m.fetch_errors);
    counter("parse_errors_total", "Malformed history documents.", m.parse_errors);
    counter("records_fetched_total", "Records seen in fetched snapshots.", m.records_fetched);
    counter("records_new_total", "Records classified new by the diff.", m.records_new);

    // --- Publish ---
    counter("records_published_total", "Records written to the store.", m.records_published);
    counter("publish_errors_total", "Failed record writes.", m.publish_errors);
    counter("records_dropped_total", "Records given up after a failed write.", m.records_dropped);

    // --- HTTP ---
    counter("http_requests_total", "Control surface requests.", m.http_requests);
    counter("http_errors_total", "Malformed or failed control surface requests.", m.http_errors);

    out.push_str("# HELP histdriver_loops_active Ingestion loops currently running.\n");
    out.push_str("# TYPE histdriver_loops_active gauge\n");
    out.push_str(&format!("histdriver_loops_active {}\n", m.loops_active()));

    out.push_str("# HELP histdriver_publish_success_ratio Share of record writes that succeeded.\n");
    out.push_str("# TYPE histdriver_publish_success_ratio gauge\n");
    out.push_str(&format!(
        "histdriver_publish_success_ratio {:.4}\n",
        m.publish_success_ratio()
    ));

    out
}
