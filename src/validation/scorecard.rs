//! Weekly scorecard.
//!
//! Once a week, computes the backtest statistics restricted to the
//! current calendar week and grades A–F from a linear combination of
//! direction accuracy and |Pearson|.

use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use std::sync::Arc;

use super::backtest::align;
use super::correlation;
use crate::storage::Store;
use crate::types::WeeklyScorecard;

/// Minimum aligned days inside the week.
const MIN_WEEK_DAYS: usize = 3;

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Grade from `0.6·direction_accuracy·100 + 0.4·|pearson|·100`.
pub fn grade(direction_accuracy: f64, pearson: f64) -> &'static str {
    let score = 0.6 * direction_accuracy * 100.0 + 0.4 * pearson.abs() * 100.0;
    match score {
        s if s >= 80.0 => "A",
        s if s >= 65.0 => "B",
        s if s >= 50.0 => "C",
        s if s >= 35.0 => "D",
        _ => "F",
    }
}

/// Compute and persist this week's scorecard. `None` when the week is
/// already graded or holds too little data.
pub async fn run_weekly(store: &Arc<Store>) -> Result<Option<WeeklyScorecard>> {
    let today = Utc::now().date_naive();
    let start = week_start(today);

    if store.get_weekly_scorecard(start).await?.is_some() {
        return Ok(None);
    }

    let sentiment: Vec<(NaiveDate, f64)> = store
        .get_sentiment_history(30)
        .await?
        .into_iter()
        .filter(|(d, _)| *d >= start && *d <= today)
        .collect();
    let market = store.get_market_data(30).await?;

    let pairs = align(&sentiment, &market);
    if pairs.len() < MIN_WEEK_DAYS {
        return Ok(None);
    }

    let xs: Vec<f64> = pairs.iter().map(|p| p.sentiment).collect();
    let ys: Vec<f64> = pairs.iter().map(|p| p.market_return).collect();
    let pearson = correlation::pearson(&xs, &ys);
    let direction = correlation::direction_accuracy(&xs, &ys);

    let card = WeeklyScorecard {
        week_start: start,
        aligned_days: pairs.len() as u32,
        pearson,
        direction_accuracy: direction,
        grade: grade(direction, pearson).to_string(),
        created_at: Utc::now(),
    };
    store.save_weekly_scorecard(&card).await?;
    Ok(Some(card))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
