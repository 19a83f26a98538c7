//! Pairwise divergence metric.
//!
//! Divergence is the deviation of the price ratio from 1:1 parity:
//! `(price_a / price_b - 1) * 100`. It is not measured against any
//! historical baseline, so pairs quoted in different assets (BTCUSDT vs
//! ETHBTC) will almost always look divergent.

use divergence_core::{Direction, NewFinding, PriceSnapshot, WatchedPair};
use chrono::{DateTime, Utc};

/// Divergence of `price_a` relative to `price_b`, in percent.
///
/// Returns None unless both prices are positive and finite.
#[inline]
pub fn divergence_percent(price_a: f64, price_b: f64) -> Option<f64> {
    if !is_usable_price(price_a) || !is_usable_price(price_b) {
        return None;
    }
    Some((price_a / price_b - 1.0) * 100.0)
}

#[inline]
fn is_usable_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// The stricter of the two pair thresholds.
#[inline]
pub fn effective_threshold(pair_a: &WatchedPair, pair_b: &WatchedPair) -> f64 {
    pair_a.divergence_threshold.max(pair_b.divergence_threshold)
}

/// Every unordered combination, outer pair first, in slice order.
pub fn combinations(pairs: &[WatchedPair]) -> impl Iterator<Item = (&WatchedPair, &WatchedPair)> {
    pairs
        .iter()
        .enumerate()
        .flat_map(move |(i, a)| pairs[i + 1..].iter().map(move |b| (a, b)))
}

/// An over-threshold combination before deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<'a> {
    pub pair_a: &'a WatchedPair,
    pub pair_b: &'a WatchedPair,
    pub price_a: f64,
    pub price_b: f64,
    pub divergence_percent: f64,
    pub threshold: f64,
}

impl Candidate<'_> {
    pub fn direction(&self) -> Direction {
        Direction::from_percent(self.divergence_percent)
    }

    /// Human-readable summary stored with the finding.
    pub fn describe(&self) -> String {
        format!(
            "Divergence of {:.2}% detected between {} and {}. Pairs are {}.\n\
             Current prices: {} = {:.8}, {} = {:.8}",
            self.divergence_percent.abs(),
            self.pair_a.symbol,
            self.pair_b.symbol,
            self.direction(),
            self.pair_a.symbol,
            self.price_a,
            self.pair_b.symbol,
            self.price_b,
        )
    }

    pub fn into_new_finding(self, detected_at: DateTime<Utc>) -> NewFinding {
        NewFinding {
            pair_a_id: self.pair_a.id,
            pair_b_id: self.pair_b.id,
            pair_a_symbol: self.pair_a.symbol.clone(),
            pair_b_symbol: self.pair_b.symbol.clone(),
            price_a: self.price_a,
            price_b: self.price_b,
            divergence_percent: self.divergence_percent,
            detected_at,
            description: self.describe(),
        }
    }
}

/// Evaluate one combination against the snapshot.
///
/// Returns None when a price is missing or unusable, or when the divergence
/// stays below the effective threshold.
pub fn evaluate<'a>(
    pair_a: &'a WatchedPair,
    pair_b: &'a WatchedPair,
    snapshot: &PriceSnapshot,
) -> Option<Candidate<'a>> {
    let price_a = snapshot.price(&pair_a.symbol)?;
    let price_b = snapshot.price(&pair_b.symbol)?;
    let divergence_percent = divergence_percent(price_a, price_b)?;
    let threshold = effective_threshold(pair_a, pair_b);

    if divergence_percent.abs() >= threshold {
        Some(Candidate {
            pair_a,
            pair_b,
            price_a,
            price_b,
            divergence_percent,
            threshold,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs() -> Vec<WatchedPair> {
        vec![
            WatchedPair::new(1, "BTCUSDT", 5.0),
            WatchedPair::new(2, "ETHUSDT", 3.0),
            WatchedPair::new(3, "SOLUSDT", 3.0),
        ]
    }

    #[test]
    fn test_divergence_percent_formula() {
        let d = divergence_percent(50000.0, 3000.0).unwrap();
        assert!((d - 1566.6666666).abs() < 1e-4);

        // 1% above parity
        let d = divergence_percent(101.0, 100.0).unwrap();
        assert!((d - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_divergence_is_asymmetric() {
        let ab = divergence_percent(3.0, 2.0).unwrap();
        let ba = divergence_percent(2.0, 3.0).unwrap();
        assert!((ab - 50.0).abs() < 1e-9);
        assert!((ba + 33.333333).abs() < 1e-4);
        assert_ne!(ab, ba);
    }

    #[test]
    fn test_equal_prices_have_zero_divergence() {
        for p in [1e-8, 0.5, 1.0, 3000.0, 1e12] {
            assert_eq!(divergence_percent(p, p), Some(0.0));
        }
    }

    #[test]
    fn test_unusable_prices() {
        assert_eq!(divergence_percent(1.0, 0.0), None);
        assert_eq!(divergence_percent(0.0, 1.0), None);
        assert_eq!(divergence_percent(-1.0, 1.0), None);
        assert_eq!(divergence_percent(f64::NAN, 1.0), None);
        assert_eq!(divergence_percent(1.0, f64::INFINITY), None);
    }

    #[test]
    fn test_effective_threshold_is_max() {
        let p = pairs();
        assert_eq!(effective_threshold(&p[0], &p[1]), 5.0);
        assert_eq!(effective_threshold(&p[1], &p[0]), 5.0);
        assert_eq!(effective_threshold(&p[1], &p[2]), 3.0);
    }

    #[test]
    fn test_combinations_follow_registry_order() {
        let p = pairs();
        let ids: Vec<(i64, i64)> = combinations(&p).map(|(a, b)| (a.id, b.id)).collect();
        assert_eq!(ids, vec![(1, 2), (1, 3), (2, 3)]);

        assert_eq!(combinations(&p[..1]).count(), 0);
        assert_eq!(combinations(&[]).count(), 0);
    }

    #[test]
    fn test_evaluate_over_threshold() {
        let p = pairs();
        let snapshot: PriceSnapshot = [("BTCUSDT", 50000.0), ("ETHUSDT", 3000.0)]
            .into_iter()
            .collect();

        let candidate = evaluate(&p[0], &p[1], &snapshot).unwrap();
        assert_eq!(candidate.threshold, 5.0);
        assert_eq!(candidate.direction(), Direction::Diverging);
        assert!(candidate.describe().contains("1566.67%"));
        assert!(candidate.describe().contains("BTCUSDT = 50000.00000000"));
    }

    #[test]
    fn test_evaluate_threshold_is_inclusive() {
        let a = WatchedPair::new(1, "AAA", 50.0);
        let b = WatchedPair::new(2, "BBB", 10.0);
        let snapshot: PriceSnapshot = [("AAA", 1.5), ("BBB", 1.0)].into_iter().collect();

        // exactly 50%
        assert!(evaluate(&a, &b, &snapshot).is_some());

        let strict = WatchedPair::new(1, "AAA", 50.5);
        assert!(evaluate(&strict, &b, &snapshot).is_none());
    }

    #[test]
    fn test_evaluate_negative_divergence() {
        let a = WatchedPair::new(1, "AAA", 10.0);
        let b = WatchedPair::new(2, "BBB", 10.0);
        let snapshot: PriceSnapshot = [("AAA", 1.0), ("BBB", 2.0)].into_iter().collect();

        let candidate = evaluate(&a, &b, &snapshot).unwrap();
        assert_eq!(candidate.divergence_percent, -50.0);
        assert_eq!(candidate.direction(), Direction::Converging);
    }

    #[test]
    fn test_evaluate_missing_or_zero_price() {
        let p = pairs();
        let snapshot: PriceSnapshot = [("BTCUSDT", 50000.0), ("SOLUSDT", 0.0)]
            .into_iter()
            .collect();

        assert!(evaluate(&p[0], &p[1], &snapshot).is_none());
        assert!(evaluate(&p[0], &p[2], &snapshot).is_none());
        assert!(evaluate(&p[2], &p[0], &snapshot).is_none());
    }
}
