//! Entity sentiment tracker.
//!
//! Accumulates each article's normalized sentiment onto every entity it
//! references, then persists the daily average per `(entity, date)` for
//! entities with at least two mentions that day. Entity strings are
//! title-cased and filtered through a stop list plus a contraction /
//! punctuation check.

use anyhow::Result;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::enrich::entities::title_case;
use crate::storage::Store;
use crate::types::{EnrichedArticle, EntitySentimentPoint, EntityType};

/// Minimum mentions in a day before an entity is persisted.
const MIN_MENTIONS: u32 = 2;

/// Entities never tracked.
const ENTITY_STOP_LIST: &[&str] = &[
    "it", "they", "that", "this", "he", "she", "we", "you", "who",
    "the", "a", "an", "one", "two", "new", "more", "most", "other",
    "report", "update", "statement", "company", "market", "markets",
];

/// Reject contractions and leftover punctuation artifacts.
fn valid_entity(name: &str) -> bool {
    let trimmed = name.trim();
    if trimmed.len() < 2 {
        return false;
    }
    if trimmed.contains('\'') || trimmed.contains('’') {
        return false;
    }
    if !trimmed
        .chars()
        .all(|c| c.is_alphanumeric() || c.is_whitespace() || c == '-' || c == '&' || c == '.')
    {
        return false;
    }
    !ENTITY_STOP_LIST.contains(&trimmed.to_lowercase().as_str())
}

struct Accumulator {
    entity_type: EntityType,
    sum: f64,
    count: u32,
}

/// Aggregate sentiment per entity for one day's articles.
pub fn aggregate(
    date: NaiveDate,
    articles: &[EnrichedArticle],
) -> Vec<EntitySentimentPoint> {
    let mut acc: HashMap<String, Accumulator> = HashMap::new();

    for article in articles {
        let sentiment = article.sentiment.normalized_score as f64;
        for (raw_name, entity_type) in article.entities.all() {
            let name = title_case(raw_name);
            if !valid_entity(&name) {
                continue;
            }
            let entry = acc.entry(name).or_insert(Accumulator {
                entity_type,
                sum: 0.0,
                count: 0,
            });
            entry.sum += sentiment;
            entry.count += 1;
        }
    }

    let mut points: Vec<EntitySentimentPoint> = acc
        .into_iter()
        .filter(|(_, a)| a.count >= MIN_MENTIONS)
        .map(|(entity, a)| EntitySentimentPoint {
            entity,
            entity_type: a.entity_type,
            date,
            avg_sentiment: a.sum / a.count as f64,
            article_count: a.count,
        })
        .collect();
    points.sort_by(|a, b| a.entity.cmp(&b.entity));
    points
}

/// Aggregate and persist for one day.
pub async fn run_tracker(
    store: &Arc<Store>,
    date: NaiveDate,
    articles: &[EnrichedArticle],
) -> Result<usize> {
    let points = aggregate(date, articles);
    store.save_entity_sentiment(&points).await?;
    info!(entities = points.len(), "Entity sentiment tracked");
    Ok(points.len())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
