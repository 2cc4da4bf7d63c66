//! News provider adapters.
//!
//! Defines the `ArticleProvider` trait and provides implementations for
//! NewsAPI (multi-key rotation), RSS feeds, and GDELT. The collector
//! iterates registered providers in configured order and deduplicates
//! their output by URL.

pub mod gdelt;
pub mod newsapi;
pub mod rss;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{Category, RawArticle};

/// Options for one fetch pass.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Restrict to these categories; `None` means all.
    pub categories: Option<Vec<Category>>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    /// Cap on articles returned by one provider.
    pub max_articles: Option<usize>,
}

impl FetchOptions {
    /// The categories this fetch covers.
    pub fn categories(&self) -> Vec<Category> {
        self.categories
            .clone()
            .unwrap_or_else(|| Category::ALL.to_vec())
    }
}

/// Current rate-limit view of a provider.
#[derive(Debug, Clone, Default)]
pub struct RateLimitStatus {
    /// Keys (or calls) still usable, where the provider exposes it.
    pub remaining: Option<u32>,
    /// When the limited state clears, where known.
    pub reset_at: Option<DateTime<Utc>>,
    /// True when every key is currently marked limited.
    pub limited: bool,
}

/// Abstraction over news sources.
///
/// Implementors fetch raw articles for the configured categories.
/// Malformed items are dropped at this boundary; rate limiting is the
/// adapter's concern, not the collector's.
#[async_trait]
pub trait ArticleProvider: Send + Sync {
    /// Provider name for logging and the `RawArticle::provider` field.
    fn name(&self) -> &'static str;

    /// Whether the provider can currently serve requests.
    fn is_available(&self) -> bool;

    /// Current rate-limit view.
    fn rate_limit_status(&self) -> RateLimitStatus;

    /// Fetch articles for the given options.
    async fn fetch_articles(&self, options: &FetchOptions) -> Result<Vec<RawArticle>>;
}
