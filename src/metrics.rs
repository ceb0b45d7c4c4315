// Scan pipeline metrics
//
// Lightweight counters for the scanning pipeline, summarized at shutdown

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Pipeline metrics
///
/// Uses atomic operations for thread-safe tracking without locks. The
/// decoder tick loop, the session controller and the console front-end all
/// share one instance through an `Arc`.
#[derive(Debug)]
pub struct Metrics {
    /// Sessions that reached `Starting` (including retries)
    pub sessions_started: AtomicU64,

    /// Sessions that ended with a camera-decoded code
    pub scans_accepted: AtomicU64,

    /// Sessions that ended with a typed code
    pub manual_entries: AtomicU64,

    pub scans_failed: AtomicU64,

    pub scans_stopped: AtomicU64,

    /// Candidates that passed the confidence filter
    pub candidates_accepted: AtomicU64,

    /// Candidates the confidence filter turned down
    pub candidates_rejected: AtomicU64,

    /// Frames handed to a symbol engine
    pub decode_ticks: AtomicU64,

    /// Ticks skipped because the previous analysis was still running
    pub ticks_skipped: AtomicU64,

    /// Analyses abandoned after exceeding the tick interval
    pub tick_timeouts: AtomicU64,

    /// Sum of start-to-accept latency over camera-accepted sessions
    pub total_time_to_accept_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            sessions_started: AtomicU64::new(0),
            scans_accepted: AtomicU64::new(0),
            manual_entries: AtomicU64::new(0),
            scans_failed: AtomicU64::new(0),
            scans_stopped: AtomicU64::new(0),
            candidates_accepted: AtomicU64::new(0),
            candidates_rejected: AtomicU64::new(0),
            decode_ticks: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            tick_timeouts: AtomicU64::new(0),
            total_time_to_accept_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a camera acceptance and how long the session took to get there
    pub fn record_scan_accepted(&self, time_to_accept: Duration) {
        self.scans_accepted.fetch_add(1, Ordering::Relaxed);
        self.total_time_to_accept_ms
            .fetch_add(time_to_accept.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_manual_entry(&self) {
        self.manual_entries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_failed(&self) {
        self.scans_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_stopped(&self) {
        self.scans_stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_candidate_accepted(&self) {
        self.candidates_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_candidate_rejected(&self) {
        self.candidates_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_tick(&self) {
        self.decode_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick_skipped(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick_timeout(&self) {
        self.tick_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average start-to-accept latency in milliseconds
    pub fn avg_time_to_accept_ms(&self) -> f64 {
        let total = self.total_time_to_accept_ms.load(Ordering::Relaxed);
        let count = self.scans_accepted.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Share of filtered candidates that were rejected, in `[0, 1]`
    pub fn rejection_ratio(&self) -> f64 {
        let accepted = self.candidates_accepted.load(Ordering::Relaxed);
        let rejected = self.candidates_rejected.load(Ordering::Relaxed);
        let total = accepted + rejected;
        if total > 0 {
            rejected as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Scan Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Sessions: {} started, {} scanned, {} typed, {} failed, {} stopped",
            self.sessions_started.load(Ordering::Relaxed),
            self.scans_accepted.load(Ordering::Relaxed),
            self.manual_entries.load(Ordering::Relaxed),
            self.scans_failed.load(Ordering::Relaxed),
            self.scans_stopped.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Candidates: {} accepted, {} rejected ({:.1}% rejected)",
            self.candidates_accepted.load(Ordering::Relaxed),
            self.candidates_rejected.load(Ordering::Relaxed),
            self.rejection_ratio() * 100.0
        );
        tracing::info!(
            "Decoder: {} ticks, {} skipped, {} timed out",
            self.decode_ticks.load(Ordering::Relaxed),
            self.ticks_skipped.load(Ordering::Relaxed),
            self.tick_timeouts.load(Ordering::Relaxed)
        );
        tracing::info!("Average time to accept: {:.0}ms", self.avg_time_to_accept_ms());
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
