//! In-memory store implementing every storage trait.
//!
//! Used by tests across the workspace and by short-lived runs that do not
//! need persistence.

use crate::{
    DivergenceFinding, FindingId, FindingStore, NewFinding, PairId, PairKey, PairRegistry,
    SettingValue, SettingsStore, StoreError, StoreResult, WatchedPair,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    pairs: Vec<WatchedPair>,
    findings: Vec<DivergenceFinding>,
    settings: HashMap<String, SettingValue>,
    next_pair_id: PairId,
    next_finding_id: FindingId,
}

/// Store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an active pair. Symbols are unique.
    pub async fn add_pair(&self, symbol: &str, threshold: f64) -> StoreResult<WatchedPair> {
        let mut inner = self.inner.write().await;
        if inner.pairs.iter().any(|p| p.symbol.as_str() == symbol) {
            return Err(StoreError::DuplicatePair(symbol.to_string()));
        }
        inner.next_pair_id += 1;
        let pair = WatchedPair::new(inner.next_pair_id, symbol, threshold);
        inner.pairs.push(pair.clone());
        Ok(pair)
    }

    /// Toggle a pair's active flag. Returns false for unknown ids.
    pub async fn set_pair_active(&self, id: PairId, active: bool) -> bool {
        let mut inner = self.inner.write().await;
        match inner.pairs.iter_mut().find(|p| p.id == id) {
            Some(pair) => {
                pair.is_active = active;
                true
            }
            None => false,
        }
    }

    /// Snapshot of every stored finding.
    pub async fn findings(&self) -> Vec<DivergenceFinding> {
        self.inner.read().await.findings.clone()
    }
}

#[async_trait]
impl PairRegistry for MemoryStore {
    async fn list_active(&self) -> StoreResult<Vec<WatchedPair>> {
        let inner = self.inner.read().await;
        Ok(inner.pairs.iter().filter(|p| p.is_active).cloned().collect())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_int(&self, key: &str, default: i64) -> StoreResult<i64> {
        let inner = self.inner.read().await;
        Ok(match inner.settings.get(key) {
            Some(SettingValue::Int(n)) => *n,
            Some(SettingValue::Text(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        })
    }

    async fn get_bool(&self, key: &str, default: bool) -> StoreResult<bool> {
        let inner = self.inner.read().await;
        Ok(match inner.settings.get(key) {
            Some(SettingValue::Bool(b)) => *b,
            _ => default,
        })
    }

    async fn get_string(&self, key: &str, default: &str) -> StoreResult<String> {
        let inner = self.inner.read().await;
        Ok(match inner.settings.get(key) {
            Some(SettingValue::Text(s)) if !s.is_empty() => s.clone(),
            Some(SettingValue::Int(n)) => n.to_string(),
            Some(SettingValue::Bool(b)) => b.to_string(),
            _ => default.to_string(),
        })
    }

    async fn set(&self, key: &str, value: SettingValue) -> StoreResult<()> {
        self.inner
            .write()
            .await
            .settings
            .insert(key.to_string(), value);
        Ok(())
    }
}

#[async_trait]
impl FindingStore for MemoryStore {
    async fn record_finding(&self, finding: NewFinding) -> StoreResult<DivergenceFinding> {
        let mut inner = self.inner.write().await;
        inner.next_finding_id += 1;
        let stored = finding.into_finding(inner.next_finding_id);
        inner.findings.push(stored.clone());
        Ok(stored)
    }

    async fn mark_notified(&self, id: FindingId) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let finding = inner
            .findings
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(StoreError::FindingNotFound(id))?;
        if finding.notified {
            return Ok(false);
        }
        finding.notified = true;
        Ok(true)
    }

    async fn has_finding_since(&self, key: PairKey, since: DateTime<Utc>) -> StoreResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .findings
            .iter()
            .any(|f| f.key() == key && f.detected_at >= since))
    }

    async fn pending_findings(&self) -> StoreResult<Vec<DivergenceFinding>> {
        let inner = self.inner.read().await;
        let mut pending: Vec<_> = inner.findings.iter().filter(|f| !f.notified).cloned().collect();
        pending.sort_by_key(|f| (f.detected_at, f.id));
        Ok(pending)
    }

    async fn purge_notified_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.findings.len();
        inner
            .findings
            .retain(|f| !(f.notified && f.detected_at < cutoff));
        Ok((before - inner.findings.len()) as u64)
    }
}
