//! Persistence and alert delivery for divergence findings.
//!
//! This crate provides:
//! - SQLite storage for watched pairs, findings and runtime settings
//! - Telegram and dry-run notification channels
//! - The notification dispatcher and pending-notification reconciliation

pub mod channel;
pub mod db;
pub mod notifier;
pub mod telegram;

pub use channel::{ChannelError, DryRunChannel, NotificationChannel};
pub use db::{Database, DbError};
pub use notifier::{
    format_divergence_message, DeliveryOutcome, NotificationDispatcher, NotifierConfig,
    NotifierError,
};
pub use telegram::TelegramChannel;
