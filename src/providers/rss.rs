//! RSS feed provider.
//!
//! Fetches a static per-category feed list with a 10-second timeout per
//! feed, keeps the 10 most recent items of each, and filters by the
//! requested `date_from`. Never rate-limited.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use super::{ArticleProvider, FetchOptions, RateLimitStatus};
use crate::cache::article_id;
use crate::types::{Category, RawArticle};

/// Per-feed fetch timeout.
const FEED_TIMEOUT_SECS: u64 = 10;

/// Most recent items kept per feed.
const ITEMS_PER_FEED: usize = 10;

struct FeedSource {
    category: Category,
    url: &'static str,
    name: &'static str,
}

/// Static per-category feed list.
const FEEDS: &[FeedSource] = &[
    FeedSource {
        category: Category::AiComputeInfra,
        url: "https://www.datacenterdynamics.com/rss/",
        name: "DataCenter Dynamics",
    },
    FeedSource {
        category: Category::AiComputeInfra,
        url: "https://techcrunch.com/category/artificial-intelligence/feed/",
        name: "TechCrunch AI",
    },
    FeedSource {
        category: Category::FintechRegtech,
        url: "https://www.finextra.com/rss/headlines.aspx",
        name: "Finextra",
    },
    FeedSource {
        category: Category::RpaEnterpriseAi,
        url: "https://venturebeat.com/category/ai/feed/",
        name: "VentureBeat AI",
    },
    FeedSource {
        category: Category::Semiconductor,
        url: "https://www.tomshardware.com/feeds/all",
        name: "Tom's Hardware",
    },
    FeedSource {
        category: Category::Cybersecurity,
        url: "https://feeds.feedburner.com/TheHackersNews",
        name: "The Hacker News",
    },
    FeedSource {
        category: Category::Cybersecurity,
        url: "https://krebsonsecurity.com/feed/",
        name: "Krebs on Security",
    },
    FeedSource {
        category: Category::Geopolitics,
        url: "https://www.aljazeera.com/xml/rss/all.xml",
        name: "Al Jazeera",
    },
];

pub struct RssProvider {
    http: Client,
}

impl RssProvider {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(FEED_TIMEOUT_SECS))
            .user_agent(concat!("ARGUS/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build RSS HTTP client")?;
        Ok(Self { http })
    }

    async fn fetch_feed(
        &self,
        feed: &FeedSource,
        options: &FetchOptions,
    ) -> Vec<RawArticle> {
        let bytes = match self.http.get(feed.url).send().await {
            Ok(resp) => match resp.bytes().await {
                Ok(b) => b,
                Err(e) => {
                    debug!(feed = feed.name, error = %e, "Failed to read feed body");
                    return Vec::new();
                }
            },
            Err(e) => {
                debug!(feed = feed.name, error = %e, "Feed request failed");
                return Vec::new();
            }
        };

        let parsed = match feed_rs::parser::parse(bytes.as_ref()) {
            Ok(p) => p,
            Err(e) => {
                debug!(feed = feed.name, error = %e, "Failed to parse feed");
                return Vec::new();
            }
        };

        let mut entries = parsed.entries;
        // Newest first, then keep the head.
        entries.sort_by_key(|e| {
            std::cmp::Reverse(
                e.published
                    .or(e.updated)
                    .map(|d| d.timestamp())
                    .unwrap_or(i64::MIN),
            )
        });
        entries.truncate(ITEMS_PER_FEED);

        entries
            .into_iter()
            .filter_map(|entry| {
                let url = entry.links.first().map(|l| l.href.clone())?;
                let title = entry.title.as_ref().map(|t| t.content.trim().to_string())?;
                if title.is_empty() {
                    return None;
                }
                let published_at = entry.published.or(entry.updated)?;
                if let Some(from) = options.date_from {
                    if published_at < from {
                        return None;
                    }
                }
                Some(RawArticle {
                    id: article_id(&url),
                    title,
                    description: entry
                        .summary
                        .as_ref()
                        .map(|s| s.content.clone())
                        .unwrap_or_default(),
                    content: String::new(),
                    url,
                    source: feed.name.to_string(),
                    source_id: None,
                    published_at,
                    category: feed.category,
                    ticker: None,
                    provider: "rss".to_string(),
                    image_url: None,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ArticleProvider for RssProvider {
    fn name(&self) -> &'static str {
        "rss"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn rate_limit_status(&self) -> RateLimitStatus {
        RateLimitStatus {
            remaining: None,
            reset_at: None,
            limited: false,
        }
    }

    async fn fetch_articles(&self, options: &FetchOptions) -> Result<Vec<RawArticle>> {
        let categories = options.categories();
        let wanted: Vec<&FeedSource> = FEEDS
            .iter()
            .filter(|f| categories.contains(&f.category))
            .collect();

        // Feeds fetched concurrently; a hung feed only costs its own
        // timeout, not the whole pass.
        let results = futures::future::join_all(
            wanted.iter().map(|feed| self.fetch_feed(feed, options)),
        )
        .await;

        let mut out: Vec<RawArticle> = results.into_iter().flatten().collect();
        if let Some(max) = options.max_articles {
            out.sort_by_key(|a| std::cmp::Reverse(a.published_at));
            out.truncate(max);
        }
        info!(count = out.len(), "RSS fetch complete");
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
