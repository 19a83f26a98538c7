//! Price source abstraction.

use crate::FeedResult;
use async_trait::async_trait;
use divergence_core::PriceSnapshot;

/// Current-price provider for a market.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch last prices for the given symbols.
    ///
    /// Symbols unknown to the market are simply absent from the snapshot.
    async fn fetch_prices(&self, symbols: &[String]) -> FeedResult<PriceSnapshot>;

    /// Check that a symbol is listed. Lookup failures count as "not listed".
    async fn validate_symbol(&self, symbol: &str) -> bool;
}
