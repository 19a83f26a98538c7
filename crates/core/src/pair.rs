//! Watched pair definitions.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Database identifier of a watched pair.
pub type PairId = i64;

/// A market symbol the bot compares against every other active symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchedPair {
    /// Registry ID
    pub id: PairId,
    /// Exchange symbol (e.g., "BTCUSDT")
    pub symbol: CompactString,
    /// Whether the pair takes part in detection
    pub is_active: bool,
    /// Divergence threshold in percent
    pub divergence_threshold: f64,
}

impl WatchedPair {
    /// Create an active pair.
    pub fn new(id: PairId, symbol: &str, divergence_threshold: f64) -> Self {
        Self {
            id,
            symbol: CompactString::new(symbol),
            is_active: true,
            divergence_threshold,
        }
    }

    /// Builder: mark the pair inactive.
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Threshold must be a positive finite percentage for the pair to be analyzed.
    #[inline]
    pub fn has_valid_threshold(&self) -> bool {
        self.divergence_threshold.is_finite() && self.divergence_threshold > 0.0
    }
}

/// Unordered combination of two pairs.
///
/// `PairKey::new(a, b) == PairKey::new(b, a)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    low: PairId,
    high: PairId,
}

impl PairKey {
    pub fn new(a: PairId, b: PairId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    #[inline]
    pub fn low(&self) -> PairId {
        self.low
    }

    #[inline]
    pub fn high(&self) -> PairId {
        self.high
    }
}
