//! Binance REST price source.
//!
//! Prices come from the bulk ticker endpoint in a single call and are then
//! filtered to the requested symbols. Symbol validation reads the exchange
//! info listing.

use crate::error::{FeedError, FeedResult};
use crate::source::PriceSource;
use async_trait::async_trait;
use divergence_core::PriceSnapshot;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Binance REST API fetcher.
pub struct BinanceRestFetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl BinanceRestFetcher {
    const BASE_URL: &'static str = "https://api.binance.com";
    const TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a fetcher. The API key is optional; public endpoints work without it.
    pub fn new(api_key: Option<String>) -> FeedResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|e| FeedError::ClientSetup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: Self::BASE_URL.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// Point the fetcher at a different host (testnet, proxy).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get_json(&self, endpoint: &str) -> FeedResult<serde_json::Value> {
        let url = format!("{}{}", self.base_url, endpoint);

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("X-MBX-APIKEY", key);
        }

        let response = request.send().await?;
        let status = response.status();

        // 429 = request weight exceeded, 418 = IP banned after repeated 429s
        if status.as_u16() == 429 || status.as_u16() == 418 {
            return Err(FeedError::RateLimitExceeded);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<serde_json::Value>().await?)
    }

    /// Fetch last prices for the requested symbols.
    pub async fn fetch_ticker_prices(&self, symbols: &[String]) -> FeedResult<PriceSnapshot> {
        if symbols.is_empty() {
            debug!("Binance: No symbols to fetch");
            return Ok(PriceSnapshot::new());
        }
        debug!("Binance: Fetching {} prices via ticker API", symbols.len());

        let json = self.get_json("/api/v3/ticker/price").await?;
        let snapshot = parse_ticker_prices(&json, symbols)?;

        debug!(
            "Binance: Got {}/{} requested prices",
            snapshot.len(),
            symbols.len()
        );
        Ok(snapshot)
    }

    /// Fetch every symbol listed on the exchange.
    pub async fn fetch_exchange_symbols(&self) -> FeedResult<Vec<String>> {
        let json = self.get_json("/api/v3/exchangeInfo").await?;
        parse_exchange_symbols(&json)
    }
}

#[async_trait]
impl PriceSource for BinanceRestFetcher {
    async fn fetch_prices(&self, symbols: &[String]) -> FeedResult<PriceSnapshot> {
        self.fetch_ticker_prices(symbols).await
    }

    async fn validate_symbol(&self, symbol: &str) -> bool {
        match self.fetch_exchange_symbols().await {
            Ok(listed) => listed.iter().any(|s| s.eq_ignore_ascii_case(symbol)),
            Err(e) => {
                warn!(symbol = symbol, error = %e, "Binance: Failed to validate symbol");
                false
            }
        }
    }
}

/// Parse a ticker price response, keeping only requested symbols.
///
/// Response is an array: `[{"symbol":"BTCUSDT","price":"50000.00000000"}, ...]`.
/// Matching ignores case; the snapshot is keyed by the symbol as requested.
pub fn parse_ticker_prices(
    json: &serde_json::Value,
    symbols: &[String],
) -> FeedResult<PriceSnapshot> {
    let tickers = json
        .as_array()
        .ok_or_else(|| FeedError::ParseError("Ticker response is not an array".to_string()))?;

    let wanted: HashMap<String, &String> = symbols
        .iter()
        .map(|s| (s.to_uppercase(), s))
        .collect();

    let mut snapshot = PriceSnapshot::new();
    for ticker in tickers {
        let Some(symbol) = ticker["symbol"].as_str() else {
            continue;
        };
        let Some(requested) = wanted.get(&symbol.to_uppercase()) else {
            continue;
        };

        match ticker["price"].as_str().and_then(|p| p.parse::<f64>().ok()) {
            Some(price) => snapshot.insert(requested.as_str(), price),
            None => debug!("Binance: Unparseable price for {}", symbol),
        }
    }

    Ok(snapshot)
}

/// Parse the symbol list out of an exchange info response.
///
/// Response: `{"symbols":[{"symbol":"BTCUSDT","status":"TRADING",...}, ...]}`.
pub fn parse_exchange_symbols(json: &serde_json::Value) -> FeedResult<Vec<String>> {
    let symbols = json["symbols"]
        .as_array()
        .ok_or_else(|| FeedError::ParseError("No symbols array".to_string()))?;

    Ok(symbols
        .iter()
        .filter_map(|s| s["symbol"].as_str())
        .map(str::to_string)
        .collect())
}
