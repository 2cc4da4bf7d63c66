//! Legacy JSON feed mirror.
//!
//! The database is authoritative; `news_feed.json` is a write-only
//! mirror produced at the end of each run for the legacy daily-feed
//! consumers. Capped at 365 days, sorted descending by date.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::storage::Store;
use crate::types::EnrichedArticle;

/// Maximum days retained in the mirror.
const FEED_CAP_DAYS: usize = 365;

/// Top-level feed document.
#[derive(Debug, Serialize, Deserialize)]
pub struct NewsFeed {
    pub news: Vec<FeedDay>,
    pub visible: bool,
}

/// One day's entry: the briefing plus per-category article arrays.
#[derive(Debug, Serialize, Deserialize)]
pub struct FeedDay {
    pub date: NaiveDate,
    pub content: FeedContent,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedContent {
    pub briefing: String,
    /// Category key → article list.
    #[serde(flatten)]
    pub categories: BTreeMap<String, Vec<FeedArticle>>,
}

/// Reduced article projection carried by the feed.
#[derive(Debug, Serialize, Deserialize)]
pub struct FeedArticle {
    pub title: String,
    pub description: String,
    pub url: String,
    pub source: String,
    pub published_at: String,
    pub sentiment: i64,
    pub impact: i64,
}

impl FeedArticle {
    fn from_enriched(e: &EnrichedArticle) -> Self {
        Self {
            title: e.raw.title.clone(),
            description: e.raw.description.clone(),
            url: e.raw.url.clone(),
            source: e.raw.source.clone(),
            published_at: e.raw.published_at.to_rfc3339(),
            sentiment: e.sentiment.normalized_score,
            impact: e.impact_score,
        }
    }
}

/// Assemble the feed document from the store, newest day first, capped
/// at `max_days`.
pub async fn build_feed(store: &Store, max_days: usize) -> Result<NewsFeed> {
    let briefings = store.get_recent_briefings(max_days as i64).await?;

    let mut days = Vec::with_capacity(briefings.len());
    for briefing in &briefings {
        let articles = store.get_enriched_by_date(briefing.date).await?;
        let mut categories: BTreeMap<String, Vec<FeedArticle>> = BTreeMap::new();
        for a in &articles {
            categories
                .entry(a.raw.category.key().to_string())
                .or_default()
                .push(FeedArticle::from_enriched(a));
        }
        days.push(FeedDay {
            date: briefing.date,
            content: FeedContent {
                briefing: briefing.executive_summary.clone(),
                categories,
            },
        });
    }

    // Briefings come back date-descending already; enforce it anyway so
    // the feed contract does not depend on query ordering.
    days.sort_by(|a, b| b.date.cmp(&a.date));
    days.truncate(max_days);

    Ok(NewsFeed {
        news: days,
        visible: true,
    })
}

/// Rebuild the mirror from the store and write it to `path`.
pub async fn write_feed(store: &Store, path: &Path) -> Result<usize> {
    let feed = build_feed(store, FEED_CAP_DAYS).await?;
    let json = serde_json::to_string_pretty(&feed).context("Failed to serialise news feed")?;
    std::fs::write(path, &json)
        .with_context(|| format!("Failed to write feed to {}", path.display()))?;

    debug!(path = %path.display(), days = feed.news.len(), "Feed mirror written");
    info!(days = feed.news.len(), "Legacy feed mirrored");
    Ok(feed.news.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Briefing, BriefingSource};
    use chrono::Utc;

    #[tokio::test]
    async fn test_write_feed_empty_store() {
        let store = Store::open_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news_feed.json");

        let days = write_feed(&store, &path).await.unwrap();
        assert_eq!(days, 0);

        let contents = std::fs::read_to_string(&path).unwrap();
        let feed: NewsFeed = serde_json::from_str(&contents).unwrap();
        assert!(feed.visible);
        assert!(feed.news.is_empty());
    }

    #[tokio::test]
    async fn test_write_feed_sorted_descending() {
        let store = Store::open_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news_feed.json");

        for (i, day) in [1, 3, 2].iter().enumerate() {
            let date = NaiveDate::from_ymd_opt(2026, 7, *day).unwrap();
            store
                .save_briefing(&Briefing {
                    date,
                    executive_summary: format!("Briefing {i}"),
                    cache_hash: format!("h{i}"),
                    source: BriefingSource::LocalFallback,
                    gpr_index: 10,
                    market_sentiment: 0.0,
                    generated_at: Utc::now(),
                    top_clusters: vec![],
                })
                .await
                .unwrap();
        }

        write_feed(&store, &path).await.unwrap();
        let feed: NewsFeed =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(feed.news.len(), 3);
        assert!(feed.news[0].date > feed.news[1].date);
        assert!(feed.news[1].date > feed.news[2].date);
    }
}
