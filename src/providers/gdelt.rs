//! GDELT DOC API provider.
//!
//! Single public endpoint, one query per category, no auth and no rate
//! limit. GDELT timestamps come as `YYYYMMDDHHMMSS` and are parsed into
//! UTC datetimes; items that fail to parse are dropped.
//!
//! API: `https://api.gdeltproject.org/api/v2/doc/doc`

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::{ArticleProvider, FetchOptions, RateLimitStatus};
use crate::cache::article_id;
use crate::types::{Category, RawArticle};

const GDELT_URL: &str = "https://api.gdeltproject.org/api/v2/doc/doc";

const GDELT_DATE_FMT: &str = "%Y%m%d%H%M%S";

/// Per-category GDELT query strings.
fn query_for(category: Category) -> &'static str {
    match category {
        Category::AiComputeInfra => "\"artificial intelligence\" \"data center\"",
        Category::FintechRegtech => "fintech regulation",
        Category::RpaEnterpriseAi => "\"process automation\" enterprise",
        Category::Semiconductor => "semiconductor chip export",
        Category::Cybersecurity => "cyberattack ransomware",
        Category::Geopolitics => "sanctions \"trade war\"",
    }
}

/// Parse GDELT's `YYYYMMDDHHMMSS` format into UTC.
pub fn parse_gdelt_date(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), GDELT_DATE_FMT)
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Deserialize)]
struct GdeltResponse {
    #[serde(default)]
    articles: Vec<GdeltArticle>,
}

#[derive(Debug, Deserialize)]
struct GdeltArticle {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    seendate: Option<String>,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    socialimage: Option<String>,
}

pub struct GdeltProvider {
    http: Client,
}

impl GdeltProvider {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent(concat!("ARGUS/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build GDELT HTTP client")?;
        Ok(Self { http })
    }

    async fn fetch_category(
        &self,
        category: Category,
        options: &FetchOptions,
        max_records: usize,
    ) -> Vec<RawArticle> {
        let query = format!("{} sourcelang:english", query_for(category));
        let url = format!(
            "{GDELT_URL}?query={}&mode=artlist&format=json&maxrecords={max_records}&sort=datedesc",
            urlencoding::encode(&query),
        );

        let parsed: GdeltResponse = match self.http.get(&url).send().await {
            Ok(resp) => match resp.json().await {
                Ok(p) => p,
                Err(e) => {
                    debug!(category = category.key(), error = %e, "Failed to parse GDELT response");
                    return Vec::new();
                }
            },
            Err(e) => {
                debug!(category = category.key(), error = %e, "GDELT request failed");
                return Vec::new();
            }
        };

        parsed
            .articles
            .into_iter()
            .filter_map(|a| {
                let url = a.url?;
                let title = a.title.map(|t| t.trim().to_string())?;
                if title.is_empty() {
                    return None;
                }
                let published_at = parse_gdelt_date(a.seendate.as_deref()?)?;
                if let Some(from) = options.date_from {
                    if published_at < from {
                        return None;
                    }
                }
                Some(RawArticle {
                    id: article_id(&url),
                    title,
                    description: String::new(),
                    content: String::new(),
                    url,
                    source: a.domain.unwrap_or_else(|| "gdelt".to_string()),
                    source_id: None,
                    published_at,
                    category,
                    ticker: None,
                    provider: "gdelt".to_string(),
                    image_url: a.socialimage,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ArticleProvider for GdeltProvider {
    fn name(&self) -> &'static str {
        "gdelt"
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
        let per_category = options
            .max_articles
            .map(|m| (m / categories.len().max(1)).max(1))
            .unwrap_or(15)
            .min(75);

        let results = futures::future::join_all(
            categories
                .iter()
                .map(|c| self.fetch_category(*c, options, per_category)),
        )
        .await;

        let mut out: Vec<RawArticle> = results.into_iter().flatten().collect();
        if let Some(max) = options.max_articles {
            out.truncate(max);
        }
        info!(count = out.len(), "GDELT fetch complete");
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
