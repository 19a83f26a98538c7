//! Telegram delivery.

use crate::channel::{ChannelError, NotificationChannel};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, Recipient};

/// Telegram bot wrapper.
pub struct TelegramChannel {
    bot: Bot,
}

impl TelegramChannel {
    /// Create a new channel with the given bot token.
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    /// Get the underlying bot.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

/// Parse a destination: `@channel` usernames or numeric chat ids.
pub fn parse_recipient(destination: &str) -> Result<Recipient, ChannelError> {
    let destination = destination.trim();
    if destination.len() > 1 && destination.starts_with('@') {
        return Ok(Recipient::ChannelUsername(destination.to_string()));
    }
    destination
        .parse::<i64>()
        .map(|id| Recipient::Id(ChatId(id)))
        .map_err(|_| ChannelError::InvalidDestination(destination.to_string()))
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    async fn deliver(&self, destination: &str, text: &str) -> Result<(), ChannelError> {
        let recipient = parse_recipient(destination)?;
        self.bot
            .send_message(recipient, text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_recipient() {
        assert_eq!(
            parse_recipient("-1001234567890").unwrap(),
            Recipient::Id(ChatId(-1001234567890))
        );
        assert_eq!(
            parse_recipient(" @divergence_alerts ").unwrap(),
            Recipient::ChannelUsername("@divergence_alerts".to_string())
        );
        assert!(matches!(
            parse_recipient("@"),
            Err(ChannelError::InvalidDestination(_))
        ));
        assert!(matches!(
            parse_recipient("alerts"),
            Err(ChannelError::InvalidDestination(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_destination_fails_before_request() {
        let channel = TelegramChannel::new("123:TEST");
        let result = channel.deliver("not-a-chat", "hello").await;
        assert!(matches!(result, Err(ChannelError::InvalidDestination(_))));
    }
}
