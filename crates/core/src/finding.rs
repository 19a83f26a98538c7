//! Divergence findings.

use crate::{PairId, PairKey};
use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Database identifier of a finding.
pub type FindingId = i64;

/// Sign of the divergence relative to 1:1 parity.
///
/// This is a label only; it says nothing about where the market is heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Diverging,
    Converging,
}

impl Direction {
    pub fn from_percent(divergence_percent: f64) -> Self {
        if divergence_percent > 0.0 {
            Direction::Diverging
        } else {
            Direction::Converging
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::Diverging => "diverging",
            Direction::Converging => "converging",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A finding that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFinding {
    pub pair_a_id: PairId,
    pub pair_b_id: PairId,
    pub pair_a_symbol: CompactString,
    pub pair_b_symbol: CompactString,
    pub price_a: f64,
    pub price_b: f64,
    pub divergence_percent: f64,
    pub detected_at: DateTime<Utc>,
    pub description: String,
}

impl NewFinding {
    pub fn key(&self) -> PairKey {
        PairKey::new(self.pair_a_id, self.pair_b_id)
    }

    /// Attach the store-assigned id. The finding starts unnotified.
    pub fn into_finding(self, id: FindingId) -> DivergenceFinding {
        DivergenceFinding {
            id,
            pair_a_id: self.pair_a_id,
            pair_b_id: self.pair_b_id,
            pair_a_symbol: self.pair_a_symbol,
            pair_b_symbol: self.pair_b_symbol,
            price_a: self.price_a,
            price_b: self.price_b,
            divergence_percent: self.divergence_percent,
            detected_at: self.detected_at,
            notified: false,
            description: self.description,
        }
    }
}

/// A persisted over-threshold combination.
///
/// Immutable apart from `notified`, which only ever goes from false to true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceFinding {
    pub id: FindingId,
    pub pair_a_id: PairId,
    pub pair_b_id: PairId,
    pub pair_a_symbol: CompactString,
    pub pair_b_symbol: CompactString,
    pub price_a: f64,
    pub price_b: f64,
    /// Signed: (price_a / price_b - 1) * 100
    pub divergence_percent: f64,
    pub detected_at: DateTime<Utc>,
    pub notified: bool,
    pub description: String,
}

impl DivergenceFinding {
    pub fn key(&self) -> PairKey {
        PairKey::new(self.pair_a_id, self.pair_b_id)
    }

    pub fn direction(&self) -> Direction {
        Direction::from_percent(self.divergence_percent)
    }

    /// Absolute divergence in percent.
    pub fn magnitude(&self) -> f64 {
        self.divergence_percent.abs()
    }
}
