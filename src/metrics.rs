//! Metrics collection for the authorization service.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for authorization service activity.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationMetrics {
    /// Completed refreshes of a tenant's index.
    pub refreshes: Arc<AtomicU64>,
    /// Refreshes that had to fall back to built-in defaults.
    pub defaults_applied: Arc<AtomicU64>,
    /// Persisted grants dropped because the role or right no longer exists.
    pub stale_grants_dropped: Arc<AtomicU64>,
    /// Authorization checks that granted access.
    pub checks_granted: Arc<AtomicU64>,
    /// Authorization checks that denied access.
    pub checks_denied: Arc<AtomicU64>,
    /// Demands that failed.
    pub demand_failures: Arc<AtomicU64>,
}

/// Point-in-time copy of [`AuthorizationMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSummary {
    pub refreshes: u64,
    pub defaults_applied: u64,
    pub stale_grants_dropped: u64,
    pub checks_granted: u64,
    pub checks_denied: u64,
    pub demand_failures: u64,
}

impl MetricsSummary {
    /// Share of checks that were denied, 0.0 when nothing was checked.
    pub fn denial_ratio(&self) -> f64 {
        let total = self.checks_granted + self.checks_denied;
        if total == 0 {
            0.0
        } else {
            self.checks_denied as f64 / total as f64
        }
    }
}

impl AuthorizationMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_refresh(&self, defaults_applied: bool, stale_dropped: u64) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        if defaults_applied {
            self.defaults_applied.fetch_add(1, Ordering::Relaxed);
        }
        self.stale_grants_dropped
            .fetch_add(stale_dropped, Ordering::Relaxed);
    }

    pub(crate) fn record_check(&self, granted: bool) {
        if granted {
            self.checks_granted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.checks_denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_demand_failure(&self) {
        self.demand_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters.
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            refreshes: self.refreshes.load(Ordering::Relaxed),
            defaults_applied: self.defaults_applied.load(Ordering::Relaxed),
            stale_grants_dropped: self.stale_grants_dropped.load(Ordering::Relaxed),
            checks_granted: self.checks_granted.load(Ordering::Relaxed),
            checks_denied: self.checks_denied.load(Ordering::Relaxed),
            demand_failures: self.demand_failures.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.refreshes,
            &self.defaults_applied,
            &self.stale_grants_dropped,
            &self.checks_granted,
            &self.checks_denied,
            &self.demand_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
