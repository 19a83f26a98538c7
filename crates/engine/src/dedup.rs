//! Cooldown filter for repeated findings.
//!
//! A combination that already produced a finding inside the window is not
//! reported again. The finding store is the source of truth; the in-memory
//! cache only short-circuits positive answers.

use crate::EngineResult;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use divergence_core::{FindingStore, PairId, PairKey};
use std::sync::Arc;
use tracing::debug;

/// Configuration for the duplicate filter.
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Minimum time between two findings for the same combination.
    pub window: Duration,
    /// Maximum cached combinations. Zero disables the cache.
    pub cache_capacity: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window: Duration::hours(1),
            cache_capacity: 1024,
        }
    }
}

/// Order-independent recent-finding check.
pub struct DedupGuard {
    store: Arc<dyn FindingStore>,
    config: DedupConfig,
    /// Last known detection time per combination.
    cache: DashMap<PairKey, DateTime<Utc>>,
}

impl DedupGuard {
    pub fn new(store: Arc<dyn FindingStore>, config: DedupConfig) -> Self {
        Self {
            store,
            config,
            cache: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.config.window
    }

    /// True if `(pair_a, pair_b)` has a finding detected at or after
    /// `now - window`.
    pub async fn is_recent_duplicate(
        &self,
        pair_a: PairId,
        pair_b: PairId,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let key = PairKey::new(pair_a, pair_b);
        let since = now - self.config.window;

        if let Some(at) = self.cache.get(&key) {
            if *at >= since {
                debug!(pair_a, pair_b, "Duplicate (cached)");
                return Ok(true);
            }
        }

        let found = self.store.has_finding_since(key, since).await?;
        if found {
            debug!(pair_a, pair_b, "Duplicate within window");
        }
        Ok(found)
    }

    /// Record that a finding for the combination was persisted at `at`.
    pub fn remember(&self, pair_a: PairId, pair_b: PairId, at: DateTime<Utc>) {
        if self.config.cache_capacity == 0 {
            return;
        }

        if self.cache.len() >= self.config.cache_capacity {
            let since = at - self.config.window;
            self.cache.retain(|_, detected| *detected >= since);
            if self.cache.len() >= self.config.cache_capacity {
                self.cache.clear();
            }
        }

        let key = PairKey::new(pair_a, pair_b);
        self.cache
            .entry(key)
            .and_modify(|detected| {
                if at > *detected {
                    *detected = at;
                }
            })
            .or_insert(at);
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use divergence_core::{MemoryStore, NewFinding};

    fn finding(a: PairId, b: PairId, at: DateTime<Utc>) -> NewFinding {
        NewFinding {
            pair_a_id: a,
            pair_b_id: b,
            pair_a_symbol: "BTCUSDT".into(),
            pair_b_symbol: "ETHUSDT".into(),
            price_a: 50000.0,
            price_b: 3000.0,
            divergence_percent: 1566.67,
            detected_at: at,
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_window_boundaries() {
        let store = Arc::new(MemoryStore::new());
        let guard = DedupGuard::new(store.clone(), DedupConfig::default());
        let t = Utc::now();
        store.record_finding(finding(1, 2, t)).await.unwrap();

        let at_30 = t + Duration::minutes(30);
        assert!(guard.is_recent_duplicate(1, 2, at_30).await.unwrap());
        assert!(guard.is_recent_duplicate(2, 1, at_30).await.unwrap());

        let at_61 = t + Duration::minutes(61);
        assert!(!guard.is_recent_duplicate(1, 2, at_61).await.unwrap());
        assert!(!guard.is_recent_duplicate(2, 1, at_61).await.unwrap());
    }

    #[tokio::test]
    async fn test_other_combinations_unaffected() {
        let store = Arc::new(MemoryStore::new());
        let guard = DedupGuard::new(store.clone(), DedupConfig::default());
        let t = Utc::now();
        store.record_finding(finding(1, 2, t)).await.unwrap();

        assert!(!guard.is_recent_duplicate(1, 3, t).await.unwrap());
        assert!(!guard.is_recent_duplicate(2, 3, t).await.unwrap());
    }

    #[tokio::test]
    async fn test_cache_short_circuits_positive() {
        // Empty store: only the cache can answer true
        let store = Arc::new(MemoryStore::new());
        let guard = DedupGuard::new(store, DedupConfig::default());
        let t = Utc::now();

        assert!(!guard.is_recent_duplicate(1, 2, t).await.unwrap());
        guard.remember(2, 1, t);
        assert!(guard.is_recent_duplicate(1, 2, t + Duration::minutes(10)).await.unwrap());
        assert!(!guard.is_recent_duplicate(1, 2, t + Duration::minutes(61)).await.unwrap());
    }

    #[tokio::test]
    async fn test_cache_stays_bounded() {
        let store = Arc::new(MemoryStore::new());
        let guard = DedupGuard::new(
            store,
            DedupConfig {
                window: Duration::hours(1),
                cache_capacity: 4,
            },
        );
        let t = Utc::now();
        for id in 0..10 {
            guard.remember(id, id + 100, t);
        }
        assert!(guard.cached_len() <= 4);

        let disabled = DedupGuard::new(
            Arc::new(MemoryStore::new()),
            DedupConfig {
                window: Duration::hours(1),
                cache_capacity: 0,
            },
        );
        disabled.remember(1, 2, t);
        assert_eq!(disabled.cached_len(), 0);
    }
}
