//! Outbound notification channels.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Telegram API error: {0}")]
    Telegram(#[from] teloxide::RequestError),
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// A place alert text can be delivered to.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Deliver `text` to `destination`. Ok means the transport confirmed it.
    async fn deliver(&self, destination: &str, text: &str) -> Result<(), ChannelError>;
}

/// Channel that only logs what it would have sent.
#[derive(Debug, Default)]
pub struct DryRunChannel;

#[async_trait]
impl NotificationChannel for DryRunChannel {
    async fn deliver(&self, destination: &str, text: &str) -> Result<(), ChannelError> {
        info!(destination = destination, "[dry-run] Alert:\n{}", text);
        Ok(())
    }
}
