//! Impact-weight grid search.
//!
//! Enumerates the weight grid, keeping only combos that sum to 1.00
//! (within 0.005). For each combo, recomputes a simplified
//! impact-weighted daily sentiment over the trailing window (the stored
//! impact score stands in for the cluster contribution), aligns it to
//! market returns, and scores by |Pearson|. The best combo is
//! persisted for the enricher to consult.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::backtest::{align, MIN_ALIGNED_DAYS};
use super::correlation;
use crate::enrich::impact::{recency_score, source_score};
use crate::storage::Store;
use crate::types::{EnrichedArticle, ImpactWeights, OptimizedWeights};

/// Grid axes.
const W_SENTIMENT: &[f64] = &[0.2, 0.3, 0.4, 0.5];
const W_CLUSTER: &[f64] = &[0.15, 0.2, 0.3, 0.4];
const W_SOURCE: &[f64] = &[0.1, 0.15, 0.2, 0.25];
const W_RECENCY: &[f64] = &[0.05, 0.1, 0.15, 0.2];

/// Tolerance on the weight-sum constraint.
const SUM_TOLERANCE: f64 = 0.005;

/// Every admissible weight combo: `|Σw − 1| < 0.005`.
pub fn grid() -> Vec<ImpactWeights> {
    let mut combos = Vec::new();
    for &sentiment in W_SENTIMENT {
        for &cluster in W_CLUSTER {
            for &source in W_SOURCE {
                for &recency in W_RECENCY {
                    let w = ImpactWeights {
                        sentiment,
                        cluster,
                        source,
                        recency,
                    };
                    if (w.sum() - 1.0).abs() < SUM_TOLERANCE {
                        combos.push(w);
                    }
                }
            }
        }
    }
    combos
}

/// Impact-weighted mean sentiment per day under a candidate combo.
/// The stored impact score stands in for the cluster contribution.
fn daily_weighted_sentiment(
    articles: &[EnrichedArticle],
    weights: &ImpactWeights,
) -> Vec<(NaiveDate, f64)> {
    let now = Utc::now();
    let mut by_day: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();

    for article in articles {
        let candidate_impact = weights.sentiment
            * article.sentiment.normalized_score.unsigned_abs() as f64
            + weights.cluster * (article.impact_score as f64).min(100.0)
            + weights.source * source_score(&article.raw.source)
            + weights.recency * recency_score(article.raw.published_at, now);
        let weight = candidate_impact.max(1.0);

        let entry = by_day
            .entry(article.raw.published_date())
            .or_insert((0.0, 0.0));
        entry.0 += article.sentiment.normalized_score as f64 * weight;
        entry.1 += weight;
    }

    by_day
        .into_iter()
        .map(|(day, (weighted_sum, total))| (day, weighted_sum / total))
        .collect()
}

/// Run the grid search. `None` without enough aligned data.
pub async fn run_optimizer(
    store: &Arc<Store>,
    window_days: u32,
) -> Result<Option<OptimizedWeights>> {
    let articles = store.get_enriched_since(window_days as i64).await?;
    let market = store.get_market_data(window_days as i64).await?;
    if articles.is_empty() || market.is_empty() {
        return Ok(None);
    }

    let mut best: Option<(ImpactWeights, f64)> = None;
    for weights in grid() {
        let daily = daily_weighted_sentiment(&articles, &weights);
        let pairs = align(&daily, &market);
        if pairs.len() < MIN_ALIGNED_DAYS {
            continue;
        }
        let xs: Vec<f64> = pairs.iter().map(|p| p.sentiment).collect();
        let ys: Vec<f64> = pairs.iter().map(|p| p.market_return).collect();
        let r = correlation::pearson(&xs, &ys);

        let better = best
            .as_ref()
            .map(|(_, best_r)| r.abs() > best_r.abs())
            .unwrap_or(true);
        if better {
            best = Some((weights, r));
        }
    }

    match best {
        Some((weights, pearson)) => {
            let optimized = OptimizedWeights {
                created_at: Utc::now(),
                weights,
                pearson,
            };
            store.save_optimized_weights(&optimized).await?;
            Ok(Some(optimized))
        }
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
