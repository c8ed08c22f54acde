//! Counters shared between the session controller and the inference gateway.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Process-wide session and inference counters.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    sessions_started: AtomicU64,
    sessions_succeeded: AtomicU64,
    sessions_failed: AtomicU64,
    resets: AtomicU64,
    total_duration_ms: AtomicU64,
    inference_calls: AtomicU64,
    quota_signals: AtomicU64,
    provider_failures: AtomicU64,
}

/// Point-in-time copy of [`SessionMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Sessions begun.
    pub sessions_started: u64,
    /// Sessions that ended in success.
    pub sessions_succeeded: u64,
    /// Sessions that ended in failure.
    pub sessions_failed: u64,
    /// Resets charged across all sessions.
    pub resets: u64,
    /// Summed wall time of finished sessions.
    pub total_duration_ms: u64,
    /// Provider calls attempted.
    pub inference_calls: u64,
    /// Quota signals seen from providers.
    pub quota_signals: u64,
    /// Non-quota provider failures.
    pub provider_failures: u64,
}

impl SessionMetrics {
    /// Zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a started session.
    pub fn record_start(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a finished session and add its duration.
    pub fn record_finish(&self, success: bool, duration: Duration) {
        let counter = if success {
            &self.sessions_succeeded
        } else {
            &self.sessions_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.total_duration_ms.fetch_add(ms, Ordering::Relaxed);
    }

    /// Count one reset.
    pub fn record_reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one provider call.
    pub fn record_inference_call(&self) {
        self.inference_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one quota signal.
    pub fn record_quota_signal(&self) {
        self.quota_signals.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one non-quota failure.
    pub fn record_provider_failure(&self) {
        self.provider_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_succeeded: self.sessions_succeeded.load(Ordering::Relaxed),
            sessions_failed: self.sessions_failed.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            total_duration_ms: self.total_duration_ms.load(Ordering::Relaxed),
            inference_calls: self.inference_calls.load(Ordering::Relaxed),
            quota_signals: self.quota_signals.load(Ordering::Relaxed),
            provider_failures: self.provider_failures.load(Ordering::Relaxed),
        }
    }
}
