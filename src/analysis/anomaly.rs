//! Volume anomaly detection.
//!
//! Persists per-category daily article counts and z-scores today's
//! volume against the prior 7-day history. An alert fires when z > 2.0,
//! the history holds at least 3 days, and the standard deviation is
//! non-zero. Message form: "{multiplier}x normal coverage on {category}".

use anyhow::Result;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::storage::Store;
use crate::types::{AnomalyAlert, Category, EnrichedArticle};

/// Z-score above which a spike alerts.
const Z_THRESHOLD: f64 = 2.0;

/// Minimum history length before alerting.
const MIN_HISTORY_DAYS: usize = 3;

/// Days of history compared against.
const HISTORY_DAYS: i64 = 7;

fn mean_and_sd(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, variance.sqrt())
}

/// Evaluate one category's volume against its history. History excludes
/// today.
pub fn evaluate(
    date: NaiveDate,
    category: Category,
    today_count: u32,
    history: &[u32],
) -> Option<AnomalyAlert> {
    if history.len() < MIN_HISTORY_DAYS {
        return None;
    }
    let values: Vec<f64> = history.iter().map(|v| *v as f64).collect();
    let (mean, sd) = mean_and_sd(&values);
    if sd == 0.0 {
        return None;
    }
    let z = (today_count as f64 - mean) / sd;
    if z <= Z_THRESHOLD {
        return None;
    }

    let multiplier = ((today_count as f64 / mean) * 10.0).round() / 10.0;
    Some(AnomalyAlert {
        date,
        category,
        multiplier,
        z_score: z,
        message: format!("{multiplier}x normal coverage on {category}"),
    })
}

/// Persist today's volumes and return any alerts.
pub async fn run_detector(
    store: &Arc<Store>,
    date: NaiveDate,
    articles: &[EnrichedArticle],
) -> Result<Vec<AnomalyAlert>> {
    let mut counts: HashMap<Category, u32> = HashMap::new();
    for article in articles {
        *counts.entry(article.raw.category).or_insert(0) += 1;
    }

    let mut alerts = Vec::new();
    for category in Category::ALL {
        let today_count = counts.get(category).copied().unwrap_or(0);
        // Persist first so history accumulates even on quiet days.
        store.save_daily_volume(date, *category, today_count).await?;

        let history: Vec<u32> = store
            .get_volume_history(*category, HISTORY_DAYS + 1)
            .await?
            .into_iter()
            .filter(|r| r.date != date)
            .map(|r| r.article_count)
            .collect();

        if let Some(alert) = evaluate(date, *category, today_count, &history) {
            warn!(category = category.key(), z = alert.z_score, "{}", alert.message);
            alerts.push(alert);
        }
    }

    info!(alerts = alerts.len(), "Anomaly pass complete");
    Ok(alerts)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
