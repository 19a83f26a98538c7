//! Runtime statistics for the detection loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Consecutive failed cycles before the scheduler reports itself unhealthy.
pub const UNHEALTHY_AFTER: u64 = 3;

/// Bot statistics.
#[derive(Debug)]
pub struct BotStats {
    /// Cycles that ran the full pipeline.
    pub cycles_completed: AtomicU64,
    /// Cycles skipped because the bot was inactive.
    pub cycles_skipped: AtomicU64,
    /// Cycles that ended with an error.
    pub cycles_failed: AtomicU64,
    /// Findings persisted.
    pub findings_detected: AtomicU64,
    /// Notifications delivered, including reconciled ones.
    pub notifications_sent: AtomicU64,
    /// Failed cycles since the last successful one.
    pub consecutive_failures: AtomicU64,
    started_at: Instant,
}

impl Default for BotStats {
    fn default() -> Self {
        Self::new()
    }
}

impl BotStats {
    pub fn new() -> Self {
        Self {
            cycles_completed: AtomicU64::new(0),
            cycles_skipped: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            findings_detected: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            consecutive_failures: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_completed(&self, findings: usize, delivered: usize) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.findings_detected
            .fetch_add(findings as u64, Ordering::Relaxed);
        self.notifications_sent
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Returns the new consecutive-failure count.
    pub fn record_failure(&self) -> u64 {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures.load(Ordering::Relaxed) < UNHEALTHY_AFTER
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            findings_detected: self.findings_detected.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            uptime_secs: self.uptime_secs(),
        }
    }
}

/// Summary of statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSummary {
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    pub cycles_failed: u64,
    pub findings_detected: u64,
    pub notifications_sent: u64,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_signal() {
        let stats = BotStats::new();
        assert!(stats.is_healthy());

        assert_eq!(stats.record_failure(), 1);
        assert_eq!(stats.record_failure(), 2);
        assert!(stats.is_healthy());
        assert_eq!(stats.record_failure(), 3);
        assert!(!stats.is_healthy());

        stats.record_completed(2, 1);
        assert!(stats.is_healthy());

        let summary = stats.summary();
        assert_eq!(summary.cycles_failed, 3);
        assert_eq!(summary.cycles_completed, 1);
        assert_eq!(summary.findings_detected, 2);
        assert_eq!(summary.notifications_sent, 1);
    }

    #[test]
    fn test_skipped_cycles_reset_failures() {
        let stats = BotStats::new();
        stats.record_failure();
        stats.record_skipped();
        assert_eq!(stats.consecutive_failures.load(Ordering::Relaxed), 0);
        assert_eq!(stats.summary().cycles_skipped, 1);
    }
}
