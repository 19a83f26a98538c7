//! Periodic detection loop.
//!
//! Every cycle re-reads the interval and activation flag from the settings
//! store, retries pending notifications, runs a full scan and delivers what it
//! found. Errors never escape the loop; they are logged and counted. A failed
//! retry sweep does not stop the scan.

use crate::state::{BotStats, UNHEALTHY_AFTER};
use chrono::Utc;
use divergence_alerts::NotificationDispatcher;
use divergence_core::{settings, FindingStore, SettingsStore, StoreError};
use divergence_engine::{DivergenceAnalyzer, EngineError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum CycleError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Detection failed: {0}")]
    Engine(#[from] EngineError),
}

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// `bot_active` was false; nothing was fetched.
    Skipped,
    Completed {
        findings: usize,
        delivered: usize,
        reconciled: usize,
    },
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval used when the `check_interval` setting is unusable.
    pub default_interval: Duration,
    /// Notified findings older than this are purged.
    pub history_retention: Duration,
    /// Retry unnotified findings at the start of each active cycle.
    pub reconcile_pending: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(3600),
            history_retention: Duration::from_secs(30 * 86_400),
            reconcile_pending: true,
        }
    }
}

/// Drives the detection pipeline.
pub struct Scheduler {
    analyzer: DivergenceAnalyzer,
    dispatcher: NotificationDispatcher,
    settings: Arc<dyn SettingsStore>,
    findings: Arc<dyn FindingStore>,
    config: SchedulerConfig,
    stats: Arc<BotStats>,
}

impl Scheduler {
    pub fn new(
        analyzer: DivergenceAnalyzer,
        dispatcher: NotificationDispatcher,
        settings: Arc<dyn SettingsStore>,
        findings: Arc<dyn FindingStore>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            analyzer,
            dispatcher,
            settings,
            findings,
            config,
            stats: Arc::new(BotStats::new()),
        }
    }

    pub fn stats(&self) -> Arc<BotStats> {
        Arc::clone(&self.stats)
    }

    /// Run until `shutdown` turns true or its sender is dropped.
    ///
    /// A cycle already in progress is finished before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            default_interval_secs = self.config.default_interval.as_secs(),
            "Starting scheduler"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let interval = self.resolve_interval().await;

            match self.run_cycle().await {
                Ok(CycleOutcome::Skipped) => self.stats.record_skipped(),
                Ok(CycleOutcome::Completed {
                    findings,
                    delivered,
                    reconciled,
                }) => {
                    self.stats.record_completed(findings, delivered + reconciled);
                }
                Err(e) => {
                    let failures = self.stats.record_failure();
                    error!(error = %e, consecutive_failures = failures, "Cycle failed");
                    if failures >= UNHEALTHY_AFTER {
                        warn!(consecutive_failures = failures, "Scheduler unhealthy");
                    }
                }
            }

            debug!(secs = interval.as_secs(), "Sleeping until next cycle");
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Current interval: the `check_interval` setting if positive, else the default.
    pub async fn resolve_interval(&self) -> Duration {
        let default_secs = self.config.default_interval.as_secs();
        let fallback = i64::try_from(default_secs).unwrap_or(i64::MAX);

        match self.settings.get_int(settings::CHECK_INTERVAL, fallback).await {
            Ok(secs) if secs > 0 => Duration::from_secs(secs.unsigned_abs()),
            Ok(secs) => {
                warn!(value = secs, "Ignoring non-positive check interval");
                self.config.default_interval
            }
            Err(e) => {
                warn!(error = %e, "Failed to read check interval, using default");
                self.config.default_interval
            }
        }
    }

    /// One detection cycle.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        if !self.settings.get_bool(settings::BOT_ACTIVE, true).await? {
            info!("Bot inactive, skipping check");
            return Ok(CycleOutcome::Skipped);
        }

        let reconciled = if self.config.reconcile_pending {
            match self.dispatcher.process_pending_notifications().await {
                Ok(n) => n,
                Err(e) => {
                    error!(error = %e, "Failed to reconcile pending notifications");
                    0
                }
            }
        } else {
            0
        };

        let found = self.analyzer.check_all_pairs().await?;

        let mut delivered = 0;
        for finding in &found {
            if self.dispatcher.notify_and_mark(finding).await.is_delivered() {
                delivered += 1;
            }
        }

        self.purge_history().await;

        if !found.is_empty() || reconciled > 0 {
            info!(
                findings = found.len(),
                delivered = delivered,
                reconciled = reconciled,
                "Cycle complete"
            );
        }

        Ok(CycleOutcome::Completed {
            findings: found.len(),
            delivered,
            reconciled,
        })
    }

    async fn purge_history(&self) {
        let Ok(retention) = chrono::Duration::from_std(self.config.history_retention) else {
            return;
        };
        let cutoff = Utc::now() - retention;

        match self.findings.purge_notified_before(cutoff).await {
            Ok(0) => {}
            Ok(removed) => info!(removed = removed, "Purged old findings"),
            Err(e) => warn!(error = %e, "Failed to purge old findings"),
        }
    }
}
