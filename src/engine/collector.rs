//! Article collector.
//!
//! Runs registered providers in configured order, skips unavailable
//! ones, deduplicates across providers by URL (first provider wins),
//! and persists the combined batch before returning. Per-provider
//! counts feed the health sidecar.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::providers::{ArticleProvider, FetchOptions};
use crate::storage::Store;
use crate::types::RawArticle;

/// Per-provider outcome of one collection pass.
#[derive(Debug, Clone)]
pub struct ProviderCount {
    pub provider: String,
    pub fetched: usize,
    /// Articles that survived cross-provider dedup.
    pub kept: usize,
    pub skipped: bool,
}

/// Outcome of one collection pass.
#[derive(Debug, Default)]
pub struct CollectionReport {
    pub counts: Vec<ProviderCount>,
    pub unique_articles: usize,
}

pub struct Collector {
    providers: Vec<Arc<dyn ArticleProvider>>,
    store: Arc<Store>,
}

impl Collector {
    /// Providers run in the order given here.
    pub fn new(providers: Vec<Arc<dyn ArticleProvider>>, store: Arc<Store>) -> Self {
        Self { providers, store }
    }

    /// Fetch from every available provider, dedup by URL, persist.
    pub async fn collect(
        &self,
        options: &FetchOptions,
    ) -> Result<(Vec<RawArticle>, CollectionReport)> {
        let mut report = CollectionReport::default();
        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut combined: Vec<RawArticle> = Vec::new();

        for provider in &self.providers {
            if !provider.is_available() {
                warn!(provider = provider.name(), "Provider unavailable, skipping");
                report.counts.push(ProviderCount {
                    provider: provider.name().to_string(),
                    fetched: 0,
                    kept: 0,
                    skipped: true,
                });
                continue;
            }

            // A failing provider yields partial results, not a dead run.
            let articles = match provider.fetch_articles(options).await {
                Ok(a) => a,
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Provider fetch failed");
                    report.counts.push(ProviderCount {
                        provider: provider.name().to_string(),
                        fetched: 0,
                        kept: 0,
                        skipped: false,
                    });
                    continue;
                }
            };

            let fetched = articles.len();
            let mut kept = 0usize;
            for article in articles {
                if seen_urls.insert(article.url.clone()) {
                    combined.push(article);
                    kept += 1;
                }
            }
            info!(provider = provider.name(), fetched, kept, "Provider pass complete");
            report.counts.push(ProviderCount {
                provider: provider.name().to_string(),
                fetched,
                kept,
                skipped: false,
            });
        }

        self.store.save_raw_articles(&combined).await?;
        report.unique_articles = combined.len();
        info!(unique = combined.len(), "Collection persisted");
        Ok((combined, report))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::RateLimitStatus;
    use crate::types::Category;
    use async_trait::async_trait;
    use chrono::Utc;

    /// Hand-written mock provider returning a fixed article set.
    struct MockProvider {
        name: &'static str,
        available: bool,
        urls: Vec<&'static str>,
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
            Ok(self
                .urls
                .iter()
                .map(|url| RawArticle {
                    id: crate::cache::article_id(url),
                    title: format!("Headline for {url} with enough length"),
                    description: String::new(),
                    content: String::new(),
                    url: url.to_string(),
                    source: self.name.to_string(),
                    source_id: None,
                    published_at: Utc::now(),
                    category: Category::Semiconductor,
                    ticker: None,
                    provider: self.name.to_string(),
                    image_url: None,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_dedup_first_provider_wins() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let collector = Collector::new(
            vec![
                Arc::new(MockProvider {
                    name: "newsapi",
                    available: true,
                    urls: vec!["https://e.com/shared", "https://e.com/a"],
                }),
                Arc::new(MockProvider {
                    name: "rss",
                    available: true,
                    urls: vec!["https://e.com/shared", "https://e.com/b"],
                }),
            ],
            store.clone(),
        );

        let (articles, report) = collector.collect(&FetchOptions::default()).await.unwrap();
        assert_eq!(articles.len(), 3);
        assert_eq!(report.unique_articles, 3);

        // Exactly one raw row for the shared URL, and it came from the
        // first provider in configured order.
        let row = store
            .get_raw_article_by_url("https://e.com/shared")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.provider, "newsapi");
        assert_eq!(store.count_raw_articles().await.unwrap(), 3);

        assert_eq!(report.counts[0].kept, 2);
        assert_eq!(report.counts[1].kept, 1);
    }

    #[tokio::test]
    async fn test_unavailable_provider_skipped() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let collector = Collector::new(
            vec![
                Arc::new(MockProvider {
                    name: "newsapi",
                    available: false,
                    urls: vec!["https://e.com/x"],
                }),
                Arc::new(MockProvider {
                    name: "rss",
                    available: true,
                    urls: vec!["https://e.com/y"],
                }),
            ],
            store.clone(),
        );

        let (articles, report) = collector.collect(&FetchOptions::default()).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert!(report.counts[0].skipped);
        assert_eq!(articles[0].provider, "rss");
    }

    #[tokio::test]
    async fn test_empty_providers() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let collector = Collector::new(vec![], store);
        let (articles, report) = collector.collect(&FetchOptions::default()).await.unwrap();
        assert!(articles.is_empty());
        assert!(report.counts.is_empty());
    }
}
