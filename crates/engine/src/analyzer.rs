//! Full-scan divergence analyzer.
//!
//! One pass loads the active pairs, fetches a single price snapshot for them,
//! evaluates every unordered combination and persists the findings that pass
//! the duplicate filter.

use crate::divergence::{combinations, evaluate};
use crate::{DedupGuard, EngineResult};
use chrono::{DateTime, Utc};
use divergence_core::{DivergenceFinding, FindingStore, PairRegistry, PriceSnapshot, WatchedPair};
use divergence_feeds::PriceSource;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turns a price snapshot into persisted divergence findings.
pub struct DivergenceAnalyzer {
    registry: Arc<dyn PairRegistry>,
    prices: Arc<dyn PriceSource>,
    findings: Arc<dyn FindingStore>,
    dedup: DedupGuard,
}

impl DivergenceAnalyzer {
    pub fn new(
        registry: Arc<dyn PairRegistry>,
        prices: Arc<dyn PriceSource>,
        findings: Arc<dyn FindingStore>,
        dedup: DedupGuard,
    ) -> Self {
        Self {
            registry,
            prices,
            findings,
            dedup,
        }
    }

    /// Active pairs with a usable threshold, in registry order.
    pub async fn active_pairs(&self) -> EngineResult<Vec<WatchedPair>> {
        let pairs = self.registry.list_active().await?;
        Ok(pairs
            .into_iter()
            .filter(|p| {
                let valid = p.has_valid_threshold();
                if !valid {
                    warn!(
                        symbol = %p.symbol,
                        threshold = p.divergence_threshold,
                        "Skipping pair with invalid threshold"
                    );
                }
                valid
            })
            .collect())
    }

    /// Fetch prices for the given pairs. Failures yield an empty snapshot.
    pub async fn current_prices(&self, pairs: &[WatchedPair]) -> PriceSnapshot {
        let symbols: Vec<String> = pairs.iter().map(|p| p.symbol.to_string()).collect();
        match self.prices.fetch_prices(&symbols).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    error = %e,
                    transient = e.is_transient(),
                    "Failed to fetch prices"
                );
                PriceSnapshot::new()
            }
        }
    }

    /// Scan every active combination and persist new findings.
    pub async fn check_all_pairs(&self) -> EngineResult<Vec<DivergenceFinding>> {
        self.check_all_pairs_at(Utc::now()).await
    }

    /// Same as [`check_all_pairs`](Self::check_all_pairs) with an explicit
    /// detection time.
    pub async fn check_all_pairs_at(
        &self,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<DivergenceFinding>> {
        let pairs = self.active_pairs().await?;
        if pairs.len() < 2 {
            debug!(active = pairs.len(), "Not enough active pairs to compare");
            return Ok(Vec::new());
        }

        let snapshot = self.current_prices(&pairs).await;
        if snapshot.is_empty() {
            warn!(pairs = pairs.len(), "No prices available, skipping check");
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for (pair_a, pair_b) in combinations(&pairs) {
            let Some(candidate) = evaluate(pair_a, pair_b, &snapshot) else {
                continue;
            };

            if self
                .dedup
                .is_recent_duplicate(pair_a.id, pair_b.id, now)
                .await?
            {
                continue;
            }

            let finding = self
                .findings
                .record_finding(candidate.into_new_finding(now))
                .await?;
            self.dedup
                .remember(finding.pair_a_id, finding.pair_b_id, finding.detected_at);

            info!(
                id = finding.id,
                pair_a = %finding.pair_a_symbol,
                pair_b = %finding.pair_b_symbol,
                divergence_pct = finding.divergence_percent,
                direction = %finding.direction(),
                "Divergence detected"
            );
            found.push(finding);
        }

        debug!(
            pairs = pairs.len(),
            prices = snapshot.len(),
            findings = found.len(),
            "Check complete"
        );
        Ok(found)
    }
}
