//! Storage collaborators consumed by the detection pipeline.
//!
//! Every method is one short unit of work; implementations must not hold a
//! transaction or lock open after returning.

use crate::{DivergenceFinding, FindingId, NewFinding, PairKey, SettingValue, WatchedPair};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Finding not found: {0}")]
    FindingNotFound(FindingId),

    #[error("Pair already watched: {0}")]
    DuplicatePair(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Read access to the watched pairs.
#[async_trait]
pub trait PairRegistry: Send + Sync {
    /// Active pairs in registry order.
    async fn list_active(&self) -> StoreResult<Vec<WatchedPair>>;
}

/// Key/value runtime settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_int(&self, key: &str, default: i64) -> StoreResult<i64>;

    async fn get_bool(&self, key: &str, default: bool) -> StoreResult<bool>;

    async fn get_string(&self, key: &str, default: &str) -> StoreResult<String>;

    async fn set(&self, key: &str, value: SettingValue) -> StoreResult<()>;
}

/// Persisted divergence findings.
#[async_trait]
pub trait FindingStore: Send + Sync {
    /// Persist a new finding with `notified = false`.
    async fn record_finding(&self, finding: NewFinding) -> StoreResult<DivergenceFinding>;

    /// Flip `notified` to true.
    ///
    /// Returns false when the finding was already notified. Never resets the flag.
    async fn mark_notified(&self, id: FindingId) -> StoreResult<bool>;

    /// Whether any finding for the combination was detected at or after `since`.
    async fn has_finding_since(&self, key: PairKey, since: DateTime<Utc>) -> StoreResult<bool>;

    /// All findings with `notified = false`, oldest first.
    async fn pending_findings(&self) -> StoreResult<Vec<DivergenceFinding>>;

    /// Delete notified findings detected before `cutoff`. Returns rows removed.
    async fn purge_notified_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}
