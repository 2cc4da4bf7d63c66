//! NewsAPI provider with multi-key rotation.
//!
//! Holds an ordered pool of API keys. Keys are selected round-robin,
//! skipping any marked rate-limited; a key is marked on HTTP 429 or a
//! response body mentioning "rate limit" / "too many requests", and the
//! marked set is flushed 12 hours after marking. Requests are paced
//! 500 ms apart. Malformed articles are dropped at this boundary.
//!
//! API: `https://newsapi.org/v2/everything`
//! Auth: API key via `apiKey` query param. Free tier: 100 req/day.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ArticleProvider, FetchOptions, RateLimitStatus};
use crate::cache::article_id;
use crate::types::{Category, RawArticle};

const NEWSAPI_URL: &str = "https://newsapi.org/v2/everything";

/// Pause between consecutive requests.
const REQUEST_PACING_MS: u64 = 500;

/// Marked keys become usable again after this long.
const LIMIT_FLUSH_HOURS: i64 = 12;

/// Minimum acceptable title length.
const MIN_TITLE_LEN: usize = 20;

// ---------------------------------------------------------------------------
// Category queries
// ---------------------------------------------------------------------------

struct CategoryQuery {
    category: Category,
    query: &'static str,
    ticker: Option<&'static str>,
}

/// Fixed per-category query strings and tickers.
const CATEGORY_QUERIES: &[CategoryQuery] = &[
    CategoryQuery {
        category: Category::AiComputeInfra,
        query: "\"AI data center\" OR \"GPU compute\" OR hyperscaler OR \"AI infrastructure\"",
        ticker: Some("NVDA"),
    },
    CategoryQuery {
        category: Category::FintechRegtech,
        query: "fintech regulation OR \"payments compliance\" OR regtech",
        ticker: Some("PYPL"),
    },
    CategoryQuery {
        category: Category::RpaEnterpriseAi,
        query: "\"robotic process automation\" OR \"enterprise AI\" OR \"AI agents\" workplace",
        ticker: Some("PATH"),
    },
    CategoryQuery {
        category: Category::Semiconductor,
        query: "semiconductor OR \"chip manufacturing\" OR foundry OR lithography",
        ticker: Some("TSM"),
    },
    CategoryQuery {
        category: Category::Cybersecurity,
        query: "cybersecurity breach OR ransomware OR \"zero day\" OR infosec",
        ticker: Some("CRWD"),
    },
    CategoryQuery {
        category: Category::Geopolitics,
        query: "sanctions OR \"trade war\" OR \"export controls\" OR geopolitical tension",
        ticker: None,
    },
];

fn query_for(category: Category) -> &'static CategoryQuery {
    CATEGORY_QUERIES
        .iter()
        .find(|q| q.category == category)
        .unwrap_or(&CATEGORY_QUERIES[0])
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    source: Option<NewsApiSource>,
    #[serde(default, rename = "publishedAt")]
    published_at: Option<String>,
    #[serde(default, rename = "urlToImage")]
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSource {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

// ---------------------------------------------------------------------------
// Key pool
// ---------------------------------------------------------------------------

/// Ordered key pool with round-robin selection and rate-limit marking.
pub struct KeyPool {
    keys: Vec<String>,
    cursor: AtomicUsize,
    /// Key index → when it was marked limited.
    limited: Mutex<HashMap<usize, DateTime<Utc>>>,
}

impl KeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            cursor: AtomicUsize::new(0),
            limited: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Drop marks older than the flush window.
    fn flush_expired(&self) {
        let mut limited = self.limited.lock().unwrap_or_else(|e| e.into_inner());
        let cutoff = Utc::now() - Duration::hours(LIMIT_FLUSH_HOURS);
        limited.retain(|_, marked_at| *marked_at > cutoff);
    }

    /// Next usable key, round-robin, skipping limited ones. `None` when
    /// every key is marked.
    pub fn next_key(&self) -> Option<(usize, String)> {
        if self.keys.is_empty() {
            return None;
        }
        self.flush_expired();
        let limited = self.limited.lock().unwrap_or_else(|e| e.into_inner());
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        for offset in 0..self.keys.len() {
            let idx = (start + offset) % self.keys.len();
            if !limited.contains_key(&idx) {
                return Some((idx, self.keys[idx].clone()));
            }
        }
        None
    }

    /// Mark a key rate-limited.
    pub fn mark_limited(&self, idx: usize) {
        let mut limited = self.limited.lock().unwrap_or_else(|e| e.into_inner());
        limited.insert(idx, Utc::now());
    }

    /// Number of keys not currently marked.
    pub fn usable_count(&self) -> usize {
        self.flush_expired();
        let limited = self.limited.lock().unwrap_or_else(|e| e.into_inner());
        self.keys.len().saturating_sub(limited.len())
    }

    /// Earliest time a marked key becomes usable again.
    pub fn next_reset(&self) -> Option<DateTime<Utc>> {
        let limited = self.limited.lock().unwrap_or_else(|e| e.into_inner());
        limited
            .values()
            .min()
            .map(|marked_at| *marked_at + Duration::hours(LIMIT_FLUSH_HOURS))
    }
}

// ---------------------------------------------------------------------------
// Title filtering
// ---------------------------------------------------------------------------

/// Reject junk titles: empty, too short, source-echo, bare domains,
/// or NewsAPI's "[Removed]" tombstones.
fn title_ok(title: &str, source: &str) -> bool {
    let trimmed = title.trim();
    if trimmed.is_empty() || trimmed.len() < MIN_TITLE_LEN {
        return false;
    }
    if trimmed.contains("[Removed]") {
        return false;
    }
    let lower = trimmed.to_lowercase();
    let source_lower = source.trim().to_lowercase();
    if !source_lower.is_empty() && (lower == source_lower || lower.contains(&source_lower)) {
        return false;
    }
    if is_bare_domain(&lower) {
        return false;
    }
    true
}

/// True for titles that are just a domain name, e.g. "name.com".
fn is_bare_domain(lower: &str) -> bool {
    let parts: Vec<&str> = lower.split('.').collect();
    if parts.len() != 2 {
        return false;
    }
    let (name, tld) = (parts[0], parts[1]);
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return false;
    }
    matches!(tld, "com" | "net" | "org" | "io" | "co")
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct NewsApiProvider {
    http: Client,
    pool: KeyPool,
}

impl NewsApiProvider {
    pub fn new(keys: Vec<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent(concat!("ARGUS/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build NewsAPI HTTP client")?;
        Ok(Self {
            http,
            pool: KeyPool::new(keys),
        })
    }

    /// Access to the key pool (shared with tests).
    pub fn pool(&self) -> &KeyPool {
        &self.pool
    }

    fn build_url(query: &str, key: &str, options: &FetchOptions, page_size: usize) -> String {
        let mut url = format!(
            "{NEWSAPI_URL}?q={}&sortBy=publishedAt&pageSize={page_size}&language=en&apiKey={key}",
            urlencoding::encode(query),
        );
        if let Some(from) = options.date_from {
            url.push_str(&format!("&from={}", from.format("%Y-%m-%dT%H:%M:%S")));
        }
        if let Some(to) = options.date_to {
            url.push_str(&format!("&to={}", to.format("%Y-%m-%dT%H:%M:%S")));
        }
        url
    }

    /// Fetch one category, rotating keys on rate-limit signals.
    async fn fetch_category(
        &self,
        category: Category,
        options: &FetchOptions,
        page_size: usize,
    ) -> Result<Vec<RawArticle>> {
        let cq = query_for(category);

        loop {
            let Some((key_idx, key)) = self.pool.next_key() else {
                warn!(category = category.key(), "All NewsAPI keys rate-limited");
                return Ok(Vec::new());
            };

            let url = Self::build_url(cq.query, &key, options, page_size);
            let resp = match self.http.get(&url).send().await {
                Ok(r) => r,
                Err(e) => {
                    debug!(category = category.key(), error = %e, "NewsAPI request failed");
                    return Ok(Vec::new());
                }
            };

            if resp.status().as_u16() == 429 {
                warn!(key_idx, "NewsAPI key rate-limited (HTTP 429), rotating");
                self.pool.mark_limited(key_idx);
                continue;
            }

            let body = resp.text().await.unwrap_or_default();
            if body_signals_rate_limit(&body) {
                warn!(key_idx, "NewsAPI key rate-limited (body signal), rotating");
                self.pool.mark_limited(key_idx);
                continue;
            }

            let parsed: NewsApiResponse = match serde_json::from_str(&body) {
                Ok(p) => p,
                Err(e) => {
                    debug!(category = category.key(), error = %e, "Failed to parse NewsAPI response");
                    return Ok(Vec::new());
                }
            };
            if parsed.status != "ok" {
                debug!(
                    category = category.key(),
                    message = parsed.message.as_deref().unwrap_or(""),
                    "NewsAPI returned error status"
                );
                return Ok(Vec::new());
            }

            return Ok(parsed
                .articles
                .into_iter()
                .filter_map(|a| map_article(a, category, cq.ticker))
                .collect());
        }
    }
}

fn body_signals_rate_limit(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("rate limit") || lower.contains("too many requests")
}

fn map_article(
    a: NewsApiArticle,
    category: Category,
    ticker: Option<&'static str>,
) -> Option<RawArticle> {
    let url = a.url?;
    let title = a.title.unwrap_or_default();
    let source_name = a
        .source
        .as_ref()
        .and_then(|s| s.name.clone())
        .unwrap_or_default();
    if !title_ok(&title, &source_name) {
        return None;
    }
    let published_at = a
        .published_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))?;

    Some(RawArticle {
        id: article_id(&url),
        title: title.trim().to_string(),
        description: a.description.unwrap_or_default(),
        content: a.content.unwrap_or_default(),
        url,
        source: source_name,
        source_id: a.source.and_then(|s| s.id),
        published_at,
        category,
        ticker: ticker.map(String::from),
        provider: "newsapi".to_string(),
        image_url: a.image_url,
    })
}

#[async_trait]
impl ArticleProvider for NewsApiProvider {
    fn name(&self) -> &'static str {
        "newsapi"
    }

    fn is_available(&self) -> bool {
        !self.pool.is_empty() && self.pool.usable_count() > 0
    }

    fn rate_limit_status(&self) -> RateLimitStatus {
        let usable = self.pool.usable_count();
        RateLimitStatus {
            remaining: Some(usable as u32),
            reset_at: self.pool.next_reset(),
            limited: usable == 0,
        }
    }

    async fn fetch_articles(&self, options: &FetchOptions) -> Result<Vec<RawArticle>> {
        let categories = options.categories();
        let per_category = options
            .max_articles
            .map(|m| (m / categories.len().max(1)).max(1))
            .unwrap_or(20)
            .min(100);

        let mut out = Vec::new();
        for (i, category) in categories.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(REQUEST_PACING_MS)).await;
            }
            let mut batch = self.fetch_category(*category, options, per_category).await?;
            out.append(&mut batch);
        }

        if let Some(max) = options.max_articles {
            out.truncate(max);
        }
        info!(count = out.len(), "NewsAPI fetch complete");
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
