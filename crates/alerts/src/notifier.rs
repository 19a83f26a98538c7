//! Divergence notification dispatch.

use crate::channel::NotificationChannel;
use divergence_core::{settings, DivergenceFinding, FindingStore, SettingsStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration for the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct NotifierConfig {
    /// Destination used when the `notification_group_id` setting is unset.
    pub default_destination: Option<String>,
}

/// Sends findings through a notification channel, gated by the runtime settings.
pub struct NotificationDispatcher {
    settings: Arc<dyn SettingsStore>,
    findings: Arc<dyn FindingStore>,
    channel: Arc<dyn NotificationChannel>,
    config: NotifierConfig,
}

impl NotificationDispatcher {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        findings: Arc<dyn FindingStore>,
        channel: Arc<dyn NotificationChannel>,
        config: NotifierConfig,
    ) -> Self {
        Self {
            settings,
            findings,
            channel,
            config,
        }
    }

    /// Whether notifications may be sent. Unreadable settings count as inactive.
    pub async fn is_active(&self) -> bool {
        match self.settings.get_bool(settings::BOT_ACTIVE, true).await {
            Ok(active) => active,
            Err(e) => {
                error!(error = %e, "Failed to read activation flag");
                false
            }
        }
    }

    /// Dynamic destination if set, otherwise the configured default.
    pub async fn resolve_destination(&self) -> Option<String> {
        let dynamic = match self
            .settings
            .get_string(settings::NOTIFICATION_GROUP_ID, "")
            .await
        {
            Ok(value) => value.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "Failed to read notification destination");
                String::new()
            }
        };

        if !dynamic.is_empty() {
            return Some(dynamic);
        }
        self.config
            .default_destination
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
    }

    /// Deliver one finding. True only on confirmed delivery.
    ///
    /// Does not touch the `notified` flag.
    pub async fn send_divergence_notification(&self, finding: &DivergenceFinding) -> bool {
        if !self.is_active().await {
            info!(id = finding.id, "Bot inactive, notification skipped");
            return false;
        }

        let Some(destination) = self.resolve_destination().await else {
            warn!(id = finding.id, "No destination configured");
            return false;
        };

        let message = format_divergence_message(finding);
        match self.channel.deliver(&destination, &message).await {
            Ok(()) => {
                info!(
                    id = finding.id,
                    destination = %destination,
                    pair_a = %finding.pair_a_symbol,
                    pair_b = %finding.pair_b_symbol,
                    "Notification sent"
                );
                true
            }
            Err(e) => {
                error!(
                    id = finding.id,
                    destination = %destination,
                    error = %e,
                    "Failed to send notification"
                );
                false
            }
        }
    }

    /// Deliver and, on success, flip the finding's `notified` flag.
    ///
    /// A failed mark is logged, not returned: the message already went out.
    pub async fn notify_and_mark(&self, finding: &DivergenceFinding) -> DeliveryOutcome {
        if !self.send_divergence_notification(finding).await {
            return DeliveryOutcome::NotSent;
        }
        match self.findings.mark_notified(finding.id).await {
            Ok(true) => DeliveryOutcome::Delivered,
            Ok(false) => {
                debug!(id = finding.id, "Finding was already marked notified");
                DeliveryOutcome::Delivered
            }
            Err(e) => {
                error!(id = finding.id, error = %e, "Delivered but failed to mark notified");
                DeliveryOutcome::DeliveredUnmarked
            }
        }
    }

    /// Retry every unnotified finding, oldest first. Returns the delivered count.
    ///
    /// Only listing the pending findings can fail; per-finding problems are
    /// logged and the sweep moves on.
    pub async fn process_pending_notifications(&self) -> Result<usize, NotifierError> {
        let pending = self.findings.pending_findings().await?;
        if pending.is_empty() {
            return Ok(0);
        }
        debug!(pending = pending.len(), "Processing pending notifications");

        let mut delivered = 0;
        for finding in &pending {
            if self.notify_and_mark(finding).await.is_delivered() {
                delivered += 1;
            }
        }

        info!(
            delivered = delivered,
            pending = pending.len(),
            "Pending notifications processed"
        );
        Ok(delivered)
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Gated, no destination, or the channel failed.
    NotSent,
    Delivered,
    /// Sent, but the `notified` flag could not be written.
    DeliveredUnmarked,
}

impl DeliveryOutcome {
    pub fn is_delivered(self) -> bool {
        !matches!(self, DeliveryOutcome::NotSent)
    }
}

/// Format a finding as a Telegram HTML message.
pub fn format_divergence_message(finding: &DivergenceFinding) -> String {
    let direction = if finding.divergence_percent > 0.0 {
        "📈 Pairs are <b>diverging</b>"
    } else {
        "📉 Pairs are <b>converging</b>"
    };

    format!(
        "🔔 <b>Divergence detected!</b>\n\n\
         <b>Pairs:</b> {} and {}\n\
         <b>Magnitude:</b> {:.2}%\n\
         <b>Time:</b> {} UTC\n\n\
         <b>Prices:</b>\n\
         {}: {:.8}\n\
         {}: {:.8}\n\n\
         {}",
        finding.pair_a_symbol,
        finding.pair_b_symbol,
        finding.magnitude(),
        finding.detected_at.format("%d.%m.%Y %H:%M:%S"),
        finding.pair_a_symbol,
        finding.price_a,
        finding.pair_b_symbol,
        finding.price_b,
        direction,
    )
}
