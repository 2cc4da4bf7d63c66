//! Article enrichment pipeline.
//!
//! For each raw article produces the enriched projection: sentiment
//! (transformer-first, lexicon fallback), geopolitical tags, named
//! entities, and the composite impact score. Articles are processed in
//! parallel batches and persisted one transaction per batch.

pub mod entities;
pub mod geo;
pub mod impact;
pub mod sentiment;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::storage::Store;
use crate::types::{EnrichedArticle, ImpactWeights, RawArticle};
use sentiment::SentimentAnalyzer;

/// Articles enriched concurrently per batch.
const BATCH_SIZE: usize = 8;

/// How often the optimized-weights table is consulted.
const WEIGHTS_CHECK_INTERVAL_MINS: i64 = 60;

/// Optimized weights older than this revert to defaults.
const WEIGHTS_MAX_AGE_DAYS: i64 = 7;

struct WeightsState {
    current: ImpactWeights,
    checked_at: Option<DateTime<Utc>>,
}

/// Orchestrates enrichment for the pipeline.
pub struct Enricher {
    store: Arc<Store>,
    analyzer: SentimentAnalyzer,
    weights: Mutex<WeightsState>,
}

impl Enricher {
    pub fn new(store: Arc<Store>, sentiment_model_url: Option<String>) -> Self {
        Self {
            store,
            analyzer: SentimentAnalyzer::new(sentiment_model_url),
            weights: Mutex::new(WeightsState {
                current: ImpactWeights::default(),
                checked_at: None,
            }),
        }
    }

    /// The impact weights in effect. The optimized-weights table is
    /// consulted at most hourly; an entry is used when it is at most
    /// 7 days old and its |r| beats the latest default-weight baseline,
    /// otherwise the defaults apply.
    pub async fn current_weights(&self) -> ImpactWeights {
        let mut state = self.weights.lock().await;
        let stale = state
            .checked_at
            .map(|t| Utc::now() - t > Duration::minutes(WEIGHTS_CHECK_INTERVAL_MINS))
            .unwrap_or(true);
        if !stale {
            return state.current;
        }

        let baseline_r = self
            .store
            .get_latest_backtest()
            .await
            .ok()
            .flatten()
            .map(|b| b.pearson.abs())
            .unwrap_or(0.0);

        let chosen = match self.store.get_current_weights().await {
            Ok(Some(opt)) => {
                let fresh = Utc::now() - opt.created_at <= Duration::days(WEIGHTS_MAX_AGE_DAYS);
                if fresh && opt.pearson.abs() > baseline_r {
                    debug!(
                        pearson = opt.pearson,
                        baseline = baseline_r,
                        "Using optimized impact weights"
                    );
                    opt.weights
                } else {
                    ImpactWeights::default()
                }
            }
            _ => ImpactWeights::default(),
        };

        state.current = chosen;
        state.checked_at = Some(Utc::now());
        chosen
    }

    /// Enrich one article. Cluster size is 1 at this point; clustering
    /// re-scores impact once true member counts are known.
    pub async fn enrich_article(
        &self,
        raw: &RawArticle,
        weights: &ImpactWeights,
    ) -> EnrichedArticle {
        let text = raw.analysis_text();
        let sentiment = self.analyzer.analyze(&text).await;
        let geo_tags = geo::geo_tags(&text);
        let entity_set = entities::extract_entities(&text);
        let topics = entity_set
            .topics
            .iter()
            .map(|t| t.to_lowercase())
            .collect();

        let impact_score = impact::impact_score(
            sentiment.normalized_score,
            1,
            &raw.source,
            raw.published_at,
            Utc::now(),
            weights,
        );

        EnrichedArticle {
            raw: raw.clone(),
            sentiment,
            impact_score,
            geo_tags,
            topics,
            entities: entity_set,
            cluster_id: None,
        }
    }

    /// Enrich all pending raw articles, in parallel batches, persisting
    /// each batch in one transaction. Returns the enriched articles.
    pub async fn enrich_pending(&self, limit: i64) -> Result<Vec<EnrichedArticle>> {
        let pending = self.store.get_unenriched_articles(limit).await?;
        if pending.is_empty() {
            info!("No articles pending enrichment");
            return Ok(Vec::new());
        }
        let weights = self.current_weights().await;

        let mut enriched = Vec::with_capacity(pending.len());
        for chunk in pending.chunks(BATCH_SIZE) {
            let batch = futures::future::join_all(
                chunk.iter().map(|raw| self.enrich_article(raw, &weights)),
            )
            .await;
            self.store.save_enriched_articles(&batch).await?;
            enriched.extend(batch);
        }

        info!(count = enriched.len(), "Enrichment complete");
        Ok(enriched)
    }

    /// Re-score impact for clustered articles with true member counts
    /// and persist the update (upsert by id).
    pub async fn rescore_clustered(
        &self,
        articles: &mut [EnrichedArticle],
        cluster_size: usize,
    ) -> Result<()> {
        let weights = self.current_weights().await;
        let now = Utc::now();
        for article in articles.iter_mut() {
            article.impact_score = impact::impact_score(
                article.sentiment.normalized_score,
                cluster_size,
                &article.raw.source,
                article.raw.published_at,
                now,
                &weights,
            );
        }
        self.store.save_enriched_articles(articles).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, SentimentMethod};

    fn raw(url: &str, title: &str, description: &str) -> RawArticle {
        RawArticle {
            id: crate::cache::article_id(url),
            title: title.to_string(),
            description: description.to_string(),
            content: String::new(),
            url: url.to_string(),
            source: "Reuters".to_string(),
            source_id: None,
            published_at: Utc::now(),
            category: Category::AiComputeInfra,
            ticker: None,
            provider: "newsapi".to_string(),
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_enrich_article_fields() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let enricher = Enricher::new(store, None);
        let weights = ImpactWeights::default();

        let article = raw(
            "https://example.com/nvda",
            "NVIDIA beats earnings estimates",
            "Record surge in data center profits for Nvidia in Taiwan",
        );
        let e = enricher.enrich_article(&article, &weights).await;

        assert!(e.sentiment.normalized_score > 0);
        assert_eq!(e.sentiment.method, SentimentMethod::Lexicon);
        assert!(e.impact_score >= 0 && e.impact_score <= 100);
        assert!(e.entities.organizations.iter().any(|o| o == "Nvidia"));
        assert!(e.entities.places.iter().any(|p| p == "Taiwan"));
        assert!(e.cluster_id.is_none());
    }

    #[tokio::test]
    async fn test_enrich_pending_persists() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let articles: Vec<RawArticle> = (0..10)
            .map(|i| {
                raw(
                    &format!("https://example.com/{i}"),
                    &format!("Semiconductor exports face new curbs round {i}"),
                    "Chip restrictions widen",
                )
            })
            .collect();
        store.save_raw_articles(&articles).await.unwrap();

        let enricher = Enricher::new(store.clone(), None);
        let enriched = enricher.enrich_pending(100).await.unwrap();
        assert_eq!(enriched.len(), 10);

        // Nothing left pending.
        assert!(store.get_unenriched_articles(100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_weights_default_without_optimizer_rows() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let enricher = Enricher::new(store, None);
        let w = enricher.current_weights().await;
        assert_eq!(w, ImpactWeights::default());
    }

    #[tokio::test]
    async fn test_weights_adopt_fresh_better_combo() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        store
            .save_optimized_weights(&crate::types::OptimizedWeights {
                created_at: Utc::now(),
                weights: ImpactWeights {
                    sentiment: 0.5,
                    cluster: 0.2,
                    source: 0.2,
                    recency: 0.1,
                },
                pearson: 0.42,
            })
            .await
            .unwrap();

        let enricher = Enricher::new(store, None);
        let w = enricher.current_weights().await;
        assert!((w.sentiment - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_weights_reject_stale_combo() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        store
            .save_optimized_weights(&crate::types::OptimizedWeights {
                created_at: Utc::now() - Duration::days(10),
                weights: ImpactWeights {
                    sentiment: 0.5,
                    cluster: 0.2,
                    source: 0.2,
                    recency: 0.1,
                },
                pearson: 0.9,
            })
            .await
            .unwrap();

        let enricher = Enricher::new(store, None);
        let w = enricher.current_weights().await;
        assert_eq!(w, ImpactWeights::default());
    }

    #[tokio::test]
    async fn test_rescore_clustered_updates_store() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let article = raw(
            "https://example.com/a",
            "AMD warns of GPU shortage ahead",
            "Supply crisis deepens",
        );
        store.save_raw_articles(&[article.clone()]).await.unwrap();

        let enricher = Enricher::new(store.clone(), None);
        let mut enriched = enricher.enrich_pending(10).await.unwrap();
        let before = enriched[0].impact_score;

        enriched[0].cluster_id = Some("c1".to_string());
        enricher.rescore_clustered(&mut enriched, 10).await.unwrap();
        let after = enriched[0].impact_score;
        assert!(after > before);

        let members = store.get_cluster_members("c1").await.unwrap();
        assert_eq!(members[0].impact_score, after);
    }
}
