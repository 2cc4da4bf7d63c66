//! Shared mocks for the scenario tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use argus::cache::article_id;
use argus::llm::{BriefingGenerator, BriefingInput};
use argus::providers::{ArticleProvider, FetchOptions, RateLimitStatus};
use argus::types::{Category, RawArticle};

/// Fixed-output provider.
pub struct MockProvider {
    pub name: &'static str,
    pub available: bool,
    pub articles: Vec<RawArticle>,
}

impl MockProvider {
    pub fn with_articles(name: &'static str, articles: Vec<RawArticle>) -> Self {
        Self {
            name,
            available: true,
            articles,
        }
    }
}

#[async_trait]
impl ArticleProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn rate_limit_status(&self) -> RateLimitStatus {
        RateLimitStatus::default()
    }

    async fn fetch_articles(&self, _options: &FetchOptions) -> Result<Vec<RawArticle>> {
        Ok(self.articles.clone())
    }
}

/// Article factory for scenarios.
pub fn article(
    url: &str,
    title: &str,
    description: &str,
    category: Category,
    source: &str,
    published_at: DateTime<Utc>,
) -> RawArticle {
    RawArticle {
        id: article_id(url),
        title: title.to_string(),
        description: description.to_string(),
        content: String::new(),
        url: url.to_string(),
        source: source.to_string(),
        source_id: None,
        published_at,
        category,
        ticker: None,
        provider: "mock".to_string(),
        image_url: None,
    }
}

/// LLM mock that counts calls and can be told to fail.
pub struct MockLlm {
    pub calls: Arc<AtomicUsize>,
    pub fail: bool,
}

impl MockLlm {
    pub fn new() -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                calls: calls.clone(),
                fail: false,
            }),
            calls,
        )
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: true,
        })
    }
}

#[async_trait]
impl BriefingGenerator for MockLlm {
    async fn generate(&self, input: &BriefingInput) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("simulated model failure");
        }
        Ok(format!(
            "Briefing for {}: {} clusters analysed in measured prose.",
            input.date,
            input.clusters.len()
        ))
    }

    fn name(&self) -> &'static str {
        "mock-llm"
    }
}
