//! Validation subsystem.
//!
//! Correlates the pipeline's daily sentiment against real market
//! returns: market-data fetch, day alignment, Pearson/Spearman
//! correlation, a persisted backtest, a weekly scorecard, and the
//! impact-weight grid-search optimizer. Entirely optional: without a
//! market-data key it runs against cached candles only.

pub mod backtest;
pub mod correlation;
pub mod market_data;
pub mod optimizer;
pub mod scorecard;

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ValidationConfig;
use crate::storage::Store;

/// Run the full validation pass: sync candles, backtest, weekly
/// scorecard, weight optimization. Each part is isolated; a failure is
/// logged and the rest continue.
pub async fn run_validation(store: &Arc<Store>, cfg: &ValidationConfig) -> Result<()> {
    let api_key = std::env::var(&cfg.finnhub_key_env).ok();
    if api_key.is_none() {
        info!("No market-data key configured, validating against cached candles only");
    }

    if let Some(key) = api_key {
        let client = market_data::MarketDataClient::new(key)?;
        match market_data::sync_candles(&client, store, &cfg.symbol, cfg.window_days).await {
            Ok(added) => info!(added, symbol = %cfg.symbol, "Market data synced"),
            Err(e) => warn!(error = %e, "Market data sync failed"),
        }
    }

    match backtest::run_backtest(store, cfg.window_days).await {
        Ok(Some(result)) => info!(
            pearson = result.pearson,
            direction_accuracy = result.direction_accuracy,
            aligned = result.aligned_days,
            "Backtest complete"
        ),
        Ok(None) => info!("Backtest skipped: fewer than the minimum aligned days"),
        Err(e) => warn!(error = %e, "Backtest failed"),
    }

    match scorecard::run_weekly(store).await {
        Ok(Some(card)) => info!(grade = %card.grade, week = %card.week_start, "Weekly scorecard saved"),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Weekly scorecard failed"),
    }

    match optimizer::run_optimizer(store, cfg.window_days).await {
        Ok(Some(best)) => info!(pearson = best.pearson, "Optimized weights saved"),
        Ok(None) => info!("Optimizer skipped: insufficient aligned data"),
        Err(e) => warn!(error = %e, "Weight optimizer failed"),
    }

    Ok(())
}
