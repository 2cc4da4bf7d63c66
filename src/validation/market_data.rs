//! Market data fetch.
//!
//! Pulls daily candles for the configured symbol from Finnhub, paced
//! one call per 1.1 s, and persists them. Dates already present are
//! skipped at the store layer.
//!
//! API: `https://finnhub.io/api/v1/stock/candle`

use anyhow::{Context, Result};
use chrono::{Duration, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::storage::Store;
use crate::types::MarketDataPoint;

const FINNHUB_URL: &str = "https://finnhub.io/api/v1/stock/candle";

/// Minimum spacing between API calls.
const CALL_SPACING_MS: u64 = 1100;

#[derive(Debug, Deserialize)]
struct CandleResponse {
    #[serde(default)]
    s: String,
    #[serde(default)]
    c: Vec<f64>,
    #[serde(default)]
    t: Vec<i64>,
    #[serde(default)]
    v: Vec<f64>,
}

pub struct MarketDataClient {
    http: Client,
    api_key: String,
    last_call: Mutex<Option<std::time::Instant>>,
}

impl MarketDataClient {
    pub fn new(api_key: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent(concat!("ARGUS/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build market-data HTTP client")?;
        Ok(Self {
            http,
            api_key,
            last_call: Mutex::new(None),
        })
    }

    /// Enforce the 1.1 s spacing between calls.
    async fn pace(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            let spacing = std::time::Duration::from_millis(CALL_SPACING_MS);
            if elapsed < spacing {
                tokio::time::sleep(spacing - elapsed).await;
            }
        }
        *last = Some(std::time::Instant::now());
    }

    /// Daily candles for the trailing `days` window.
    pub async fn fetch_candles(&self, symbol: &str, days: u32) -> Result<Vec<MarketDataPoint>> {
        self.pace().await;

        let to = Utc::now().timestamp();
        let from = (Utc::now() - Duration::days(days as i64)).timestamp();
        let url = format!(
            "{FINNHUB_URL}?symbol={}&resolution=D&from={from}&to={to}&token={}",
            urlencoding::encode(symbol),
            self.api_key,
        );

        let resp: CandleResponse = self
            .http
            .get(&url)
            .send()
            .await
            .context("Finnhub request failed")?
            .json()
            .await
            .context("Finnhub response malformed")?;

        if resp.s != "ok" {
            debug!(status = %resp.s, symbol, "Finnhub returned no data");
            return Ok(Vec::new());
        }

        let mut points = Vec::with_capacity(resp.c.len());
        let mut prev_close: Option<f64> = None;
        for i in 0..resp.c.len().min(resp.t.len()) {
            let close = resp.c[i];
            let date = match Utc.timestamp_opt(resp.t[i], 0).single() {
                Some(ts) => ts.date_naive(),
                None => continue,
            };
            let change_pct = match prev_close {
                Some(prev) if prev != 0.0 => (close - prev) / prev * 100.0,
                _ => 0.0,
            };
            prev_close = Some(close);
            points.push(MarketDataPoint {
                date,
                symbol: symbol.to_string(),
                close,
                change_pct,
                volume: resp.v.get(i).copied().unwrap_or(0.0),
            });
        }
        Ok(points)
    }
}

/// Fetch and persist; returns the number of new rows.
pub async fn sync_candles(
    client: &MarketDataClient,
    store: &Arc<Store>,
    symbol: &str,
    days: u32,
) -> Result<usize> {
    let candles = client.fetch_candles(symbol, days).await?;
    store.save_market_data(&candles).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
