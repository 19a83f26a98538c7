//! Price snapshot for a single detection cycle.

use std::collections::HashMap;

/// Symbol -> last price, valid for one detection cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSnapshot {
    prices: HashMap<String, f64>,
}

impl PriceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a price. Later inserts for the same symbol overwrite earlier ones.
    pub fn insert(&mut self, symbol: impl Into<String>, price: f64) {
        self.prices.insert(symbol.into(), price);
    }

    /// Get a usable price for a symbol.
    ///
    /// Returns None when the symbol is missing or its price is zero, negative
    /// or not finite, so callers never divide by zero.
    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.prices
            .get(symbol)
            .copied()
            .filter(|p| p.is_finite() && *p > 0.0)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.prices.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Iterate over (symbol, price) entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.prices.iter().map(|(s, p)| (s.as_str(), *p))
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for PriceSnapshot {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for (symbol, price) in iter {
            snapshot.insert(symbol, price);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_lookup() {
        let snapshot: PriceSnapshot = [("BTCUSDT", 50000.0), ("ETHUSDT", 3000.0)]
            .into_iter()
            .collect();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.price("BTCUSDT"), Some(50000.0));
        assert_eq!(snapshot.price("SOLUSDT"), None);
    }

    #[test]
    fn test_unusable_prices_are_hidden() {
        let mut snapshot = PriceSnapshot::new();
        snapshot.insert("ZERO", 0.0);
        snapshot.insert("NEG", -1.0);
        snapshot.insert("NAN", f64::NAN);

        assert!(snapshot.contains("ZERO"));
        assert_eq!(snapshot.price("ZERO"), None);
        assert_eq!(snapshot.price("NEG"), None);
        assert_eq!(snapshot.price("NAN"), None);
        assert!(!snapshot.is_empty());
    }
}
