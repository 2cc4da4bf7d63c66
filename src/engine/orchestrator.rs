//! Pipeline orchestrator.
//!
//! Single entry point `run(date?)` executing the stage sequence:
//! ingestion → enrichment → clustering → GPR → entity tracking →
//! anomaly → narrative → market-sentiment aggregate → synthesis →
//! feed mirror. Ingestion, enrichment, clustering, and synthesis are
//! fatal on failure; every other stage is isolated: its error lands in
//! the health table and the run report, and the run continues.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::analysis::clustering::ClusterEngine;
use crate::analysis::narrative::NarrativeEngine;
use crate::analysis::{anomaly, entity_sentiment, gpr};
use crate::engine::collector::Collector;
use crate::engine::synthesis::Synthesizer;
use crate::enrich::Enricher;
use crate::providers::FetchOptions;
use crate::storage::{feed, Store};
use crate::types::{ArgusError, GprTrend, HealthRecord, RunReport, StageStatus};

/// Upper bound on articles enriched per run.
const ENRICH_LIMIT: i64 = 1000;

pub struct Orchestrator {
    store: Arc<Store>,
    collector: Collector,
    enricher: Enricher,
    clustering: ClusterEngine,
    narrative: NarrativeEngine,
    synthesizer: Synthesizer,
    feed_path: PathBuf,
    lookback_days: i64,
    max_articles_per_provider: usize,
    /// Serializes concurrent run() calls (scheduler tick vs manual
    /// refresh).
    run_lock: tokio::sync::Mutex<()>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        collector: Collector,
        enricher: Enricher,
        clustering: ClusterEngine,
        narrative: NarrativeEngine,
        synthesizer: Synthesizer,
        feed_path: PathBuf,
        lookback_days: i64,
        max_articles_per_provider: usize,
    ) -> Self {
        Self {
            store,
            collector,
            enricher,
            clustering,
            narrative,
            synthesizer,
            feed_path,
            lookback_days,
            max_articles_per_provider,
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn record(
        &self,
        date: NaiveDate,
        step: &str,
        status: StageStatus,
        started: Instant,
        item_count: Option<i64>,
        err: Option<String>,
    ) {
        let record = HealthRecord {
            date,
            step: step.to_string(),
            status,
            duration_ms: started.elapsed().as_millis() as i64,
            item_count,
            error: err,
        };
        if let Err(e) = self.store.save_health_record(&record).await {
            warn!(step, error = %e, "Failed to persist health record");
        }
    }

    /// Run the full pipeline for `date` (default: today, UTC).
    pub async fn run(&self, date: Option<NaiveDate>) -> Result<RunReport> {
        let _guard = self.run_lock.lock().await;

        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        let run_started = Utc::now();
        let run_timer = Instant::now();
        let mut errors: Vec<String> = Vec::new();
        info!(%date, "Pipeline run starting");

        // -- Stage 1: ingestion (fatal) --------------------------------
        let stage = Instant::now();
        let options = FetchOptions {
            categories: None,
            date_from: Some(Utc::now() - chrono::Duration::days(self.lookback_days)),
            date_to: None,
            max_articles: Some(self.max_articles_per_provider),
        };
        let ingested = match self.collector.collect(&options).await {
            Ok((articles, _report)) => {
                self.record(date, "ingestion", StageStatus::Success, stage, Some(articles.len() as i64), None)
                    .await;
                articles.len()
            }
            Err(e) => {
                error!(error = %e, "Ingestion failed");
                self.record(date, "ingestion", StageStatus::Failure, stage, None, Some(e.to_string()))
                    .await;
                return Err(e).context(ArgusError::Stage {
                    stage: "ingestion".to_string(),
                    message: "fatal stage failure".to_string(),
                });
            }
        };

        // -- Stage 2: enrichment (fatal) -------------------------------
        let stage = Instant::now();
        let enriched_count = match self.enricher.enrich_pending(ENRICH_LIMIT).await {
            Ok(batch) => {
                self.record(date, "enrichment", StageStatus::Success, stage, Some(batch.len() as i64), None)
                    .await;
                batch.len()
            }
            Err(e) => {
                error!(error = %e, "Enrichment failed");
                self.record(date, "enrichment", StageStatus::Failure, stage, None, Some(e.to_string()))
                    .await;
                return Err(e).context(ArgusError::Stage {
                    stage: "enrichment".to_string(),
                    message: "fatal stage failure".to_string(),
                });
            }
        };

        let mut today_articles = self
            .store
            .get_enriched_by_date(date)
            .await
            .context("Failed to load today's enriched articles")?;

        // -- Stage 3: clustering (fatal) -------------------------------
        let stage = Instant::now();
        let clusters = match self.clustering.run(&self.enricher, &mut today_articles).await {
            Ok(c) => {
                self.record(date, "clustering", StageStatus::Success, stage, Some(c.len() as i64), None)
                    .await;
                c
            }
            Err(e) => {
                error!(error = %e, "Clustering failed");
                self.record(date, "clustering", StageStatus::Failure, stage, None, Some(e.to_string()))
                    .await;
                return Err(e).context(ArgusError::Stage {
                    stage: "clustering".to_string(),
                    message: "fatal stage failure".to_string(),
                });
            }
        };

        // -- Stage 4: GPR (non-fatal) ----------------------------------
        let stage = Instant::now();
        let (gpr_score, gpr_trend) = match gpr::run_gpr(&self.store, date, &today_articles).await {
            Ok((point, trend)) => {
                self.record(date, "gpr", StageStatus::Success, stage, Some(point.article_count as i64), None)
                    .await;
                (Some(point.score), trend)
            }
            Err(e) => {
                warn!(error = %e, "GPR stage failed, continuing");
                errors.push(format!("gpr: {e}"));
                self.record(date, "gpr", StageStatus::Failure, stage, None, Some(e.to_string()))
                    .await;
                (None, GprTrend::Stable)
            }
        };

        // -- Stage 5: entity tracking (non-fatal) ----------------------
        let stage = Instant::now();
        match entity_sentiment::run_tracker(&self.store, date, &today_articles).await {
            Ok(count) => {
                self.record(date, "entity_tracking", StageStatus::Success, stage, Some(count as i64), None)
                    .await;
            }
            Err(e) => {
                warn!(error = %e, "Entity tracking failed, continuing");
                errors.push(format!("entity_tracking: {e}"));
                self.record(date, "entity_tracking", StageStatus::Failure, stage, None, Some(e.to_string()))
                    .await;
            }
        }

        // -- Stage 6: anomaly (non-fatal) ------------------------------
        let stage = Instant::now();
        match anomaly::run_detector(&self.store, date, &today_articles).await {
            Ok(alerts) => {
                self.record(date, "anomaly", StageStatus::Success, stage, Some(alerts.len() as i64), None)
                    .await;
            }
            Err(e) => {
                warn!(error = %e, "Anomaly detection failed, continuing");
                errors.push(format!("anomaly: {e}"));
                self.record(date, "anomaly", StageStatus::Failure, stage, None, Some(e.to_string()))
                    .await;
            }
        }

        // -- Stage 7: narrative (non-fatal) ----------------------------
        let stage = Instant::now();
        let threads_updated = match self.narrative.run(date, &clusters, &today_articles).await {
            Ok(outcome) => {
                let touched = outcome.extended + outcome.created;
                self.record(date, "narrative", StageStatus::Success, stage, Some(touched as i64), None)
                    .await;
                touched
            }
            Err(e) => {
                warn!(error = %e, "Narrative stage failed, continuing");
                errors.push(format!("narrative: {e}"));
                self.record(date, "narrative", StageStatus::Failure, stage, None, Some(e.to_string()))
                    .await;
                0
            }
        };

        // -- Stage 8: market-sentiment aggregate (non-fatal) -----------
        let stage = Instant::now();
        let market_sentiment = if today_articles.is_empty() {
            0.0
        } else {
            today_articles
                .iter()
                .map(|a| a.sentiment.normalized_score as f64)
                .sum::<f64>()
                / today_articles.len() as f64
        };
        self.record(
            date,
            "market_sentiment",
            StageStatus::Success,
            stage,
            Some(today_articles.len() as i64),
            None,
        )
        .await;

        // -- Stage 9: synthesis (fatal) --------------------------------
        let stage = Instant::now();
        let briefing = match self
            .synthesizer
            .run(date, &clusters, gpr_score.unwrap_or(0), gpr_trend, market_sentiment)
            .await
        {
            Ok(b) => {
                self.record(date, "synthesis", StageStatus::Success, stage, Some(1), None)
                    .await;
                b
            }
            Err(e) => {
                error!(error = %e, "Synthesis failed");
                self.record(date, "synthesis", StageStatus::Failure, stage, None, Some(e.to_string()))
                    .await;
                return Err(e).context(ArgusError::Stage {
                    stage: "synthesis".to_string(),
                    message: "fatal stage failure".to_string(),
                });
            }
        };

        // -- Stage 10: feed mirror (non-fatal) -------------------------
        let stage = Instant::now();
        match feed::write_feed(&self.store, &self.feed_path).await {
            Ok(days) => {
                self.record(date, "feed_mirror", StageStatus::Success, stage, Some(days as i64), None)
                    .await;
            }
            Err(e) => {
                warn!(error = %e, "Feed mirror failed, continuing");
                errors.push(format!("feed_mirror: {e}"));
                self.record(date, "feed_mirror", StageStatus::Failure, stage, None, Some(e.to_string()))
                    .await;
            }
        }

        let report = RunReport {
            date,
            started_at: run_started,
            duration_ms: run_timer.elapsed().as_millis() as i64,
            articles_ingested: ingested,
            articles_enriched: enriched_count,
            cluster_count: clusters.len(),
            threads_updated,
            gpr_score,
            briefing_source: Some(briefing.source),
            errors,
        };
        info!("{report}");
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
