use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Application-wide runtime metrics.
///
/// All counters use `Relaxed` ordering. They are independent observations.
///
/// Share via `Arc<Metrics>`.
pub struct Metrics {
    /// `POST /synth` calls handed to the bridge, before any parsing.
    pub requests_received: AtomicU64,

    /// Jobs turned away before touching the broker (quota, malformed).
    pub requests_rejected: AtomicU64,

    /// Jobs that failed after reaching the broker (open, publish, reply).
    pub requests_failed: AtomicU64,

    /// Batch jobs answered with a full payload.
    pub batch_replies: AtomicU64,

    /// Realtime streams that reached their end-of-stream marker.
    pub streams_completed: AtomicU64,

    /// Reply queues currently declared and not yet torn down (gauge).
    pub reply_channels_open: AtomicI64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests_received: AtomicU64::new(0),
            requests_rejected: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            batch_replies: AtomicU64::new(0),
            streams_completed: AtomicU64::new(0),
            reply_channels_open: AtomicI64::new(0),
        }
    }

    // ── Convenience increment methods ─────────────────────────────────────────

    pub fn inc_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_batch_replies(&self) {
        self.batch_replies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_streams_completed(&self) {
        self.streams_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reply_open(&self) {
        self.reply_channels_open.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_reply_open(&self) {
        self.reply_channels_open.fetch_sub(1, Ordering::Relaxed);
    }

    // ── Snapshot ──────────────────────────────────────────────────────────────

    /// Approximate point-in-time view of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received:    self.requests_received.load(Ordering::Relaxed),
            rejected:    self.requests_rejected.load(Ordering::Relaxed),
            failed:      self.requests_failed.load(Ordering::Relaxed),
            batch:       self.batch_replies.load(Ordering::Relaxed),
            streams:     self.streams_completed.load(Ordering::Relaxed),
            reply_open:  self.reply_channels_open.load(Ordering::Relaxed),
        }
    }

    /// Log a summary of all metrics via `tracing`.
    pub fn log_summary(&self) {
        let s = self.snapshot();
        tracing::info!(
            received   = s.received,
            rejected   = s.rejected,
            failed     = s.failed,
            batch      = s.batch,
            streams    = s.streams,
            reply_open = s.reply_open,
            "📊 metrics summary"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of [`Metrics`] counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub received:   u64,
    pub rejected:   u64,
    pub failed:     u64,
    pub batch:      u64,
    pub streams:    u64,
    pub reply_open: i64,
}
