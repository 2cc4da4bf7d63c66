//! Sentiment ↔ market correlation backtest.
//!
//! Aligns each sentiment day D with the next available trading day
//! after D, computes Pearson/Spearman/direction accuracy over the
//! pairs, and persists the latest result. Requires at least five
//! aligned days to produce anything.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

use super::correlation;
use crate::storage::Store;
use crate::types::{BacktestResult, MarketDataPoint};

/// Minimum aligned days before a result is produced.
pub const MIN_ALIGNED_DAYS: usize = 5;

/// One aligned (sentiment, next-day return) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPair {
    pub sentiment_date: NaiveDate,
    pub market_date: NaiveDate,
    pub sentiment: f64,
    pub market_return: f64,
}

/// Pair sentiment for day D with the return of the first trading day
/// strictly after D. `market` must be date-ascending.
pub fn align(
    sentiment_by_day: &[(NaiveDate, f64)],
    market: &[MarketDataPoint],
) -> Vec<AlignedPair> {
    let mut pairs = Vec::new();
    for (day, sentiment) in sentiment_by_day {
        let next = market.iter().find(|m| m.date > *day);
        if let Some(m) = next {
            pairs.push(AlignedPair {
                sentiment_date: *day,
                market_date: m.date,
                sentiment: *sentiment,
                market_return: m.change_pct,
            });
        }
    }
    pairs
}

/// Run alignment + correlation over the trailing window and persist the
/// result. `None` when fewer than `MIN_ALIGNED_DAYS` pairs exist.
pub async fn run_backtest(store: &Arc<Store>, window_days: u32) -> Result<Option<BacktestResult>> {
    let sentiment = store.get_sentiment_history(window_days as i64).await?;
    let market = store.get_market_data(window_days as i64).await?;

    let pairs = align(&sentiment, &market);
    if pairs.len() < MIN_ALIGNED_DAYS {
        return Ok(None);
    }

    let xs: Vec<f64> = pairs.iter().map(|p| p.sentiment).collect();
    let ys: Vec<f64> = pairs.iter().map(|p| p.market_return).collect();

    let result = BacktestResult {
        run_at: Utc::now(),
        days_window: window_days,
        aligned_days: pairs.len() as u32,
        pearson: correlation::pearson(&xs, &ys),
        spearman: correlation::spearman(&xs, &ys),
        direction_accuracy: correlation::direction_accuracy(&xs, &ys),
    };
    store.save_backtest(&result).await?;
    Ok(Some(result))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
