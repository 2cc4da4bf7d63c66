//! Persistence layer.
//!
//! A single embedded SQLite database owns every persisted row; all other
//! components hold transient copies and go through the typed accessors
//! here. Batch saves run inside one transaction. On open the schema is
//! created if missing and additively widened (columns are added, never
//! dropped), so the same database file survives upgrades and restarts.

pub mod feed;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::types::{
    BacktestResult, Briefing, BriefingSource, Category, Cluster, ClusterDigest,
    ConfidenceTier, EnrichedArticle, EntitySentimentPoint, EntityType, Escalation, GprPoint,
    HealthRecord, ImpactWeights, MarketDataPoint, NarrativeThread, OptimizedWeights, RawArticle,
    Sentiment, SentimentLabel, SentimentMethod, StageStatus, ThreadStatus, VolumeRecord,
    WeeklyScorecard,
};

/// Bounded history length for backtest and optimizer tables.
const HISTORY_CAP: i64 = 30;

const DATE_FMT: &str = "%Y-%m-%d";

fn fmt_date(d: NaiveDate) -> String {
    d.format(DATE_FMT).to_string()
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FMT).with_context(|| format!("Bad date in store: {s}"))
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Bad timestamp in store: {s}"))
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Process-wide handle to the embedded database.
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Open (creating if necessary) the database at `path` and bring the
    /// schema up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        let store = Self { pool };
        store.migrate().await?;
        info!(path = %path.display(), "Store opened");
        Ok(store)
    }

    /// In-memory database for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await
            .context("Failed to open in-memory database")?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Escape hatch for subsystems that need ad-hoc aggregate queries.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    // -- Schema ----------------------------------------------------------

    /// Create missing tables and additively widen existing ones. Safe to
    /// run on every open.
    async fn migrate(&self) -> Result<()> {
        for ddl in SCHEMA {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Schema statement failed: {ddl}"))?;
        }

        for (table, columns) in CURRENT_COLUMNS {
            self.widen_table(table, columns).await?;
        }

        for idx in INDEXES {
            sqlx::query(idx)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Index statement failed: {idx}"))?;
        }

        Ok(())
    }

    /// Add any column of the current schema the existing table lacks.
    async fn widen_table(&self, table: &str, columns: &[(&str, &str)]) -> Result<()> {
        let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("table_info failed for {table}"))?;

        let existing: Vec<String> = rows
            .iter()
            .map(|r| r.get::<String, _>("name"))
            .collect();

        for (name, decl) in columns {
            if !existing.iter().any(|c| c == name) {
                let stmt = format!("ALTER TABLE {table} ADD COLUMN {name} {decl}");
                debug!(table, column = name, "Widening schema");
                sqlx::query(&stmt)
                    .execute(&self.pool)
                    .await
                    .with_context(|| format!("Failed to add column {table}.{name}"))?;
            }
        }
        Ok(())
    }

    // -- Raw articles ----------------------------------------------------

    /// Upsert a batch of raw articles in one transaction. On URL conflict
    /// only title/description/content are refreshed (heals corrupted
    /// earlier fetches); everything else is first-writer-wins.
    pub async fn save_raw_articles(&self, batch: &[RawArticle]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for a in batch {
            sqlx::query(
                "INSERT INTO raw_articles \
                 (id, title, description, content, url, source, source_id, published_at, \
                  category, ticker, provider, image_url) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(url) DO UPDATE SET \
                   title = excluded.title, \
                   description = excluded.description, \
                   content = excluded.content",
            )
            .bind(&a.id)
            .bind(&a.title)
            .bind(&a.description)
            .bind(&a.content)
            .bind(&a.url)
            .bind(&a.source)
            .bind(&a.source_id)
            .bind(a.published_at.to_rfc3339())
            .bind(a.category.key())
            .bind(&a.ticker)
            .bind(&a.provider)
            .bind(&a.image_url)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(batch.len())
    }

    /// Raw rows with no matching enriched row, newest first.
    pub async fn get_unenriched_articles(&self, limit: i64) -> Result<Vec<RawArticle>> {
        let rows = sqlx::query(
            "SELECT r.* FROM raw_articles r \
             LEFT JOIN enriched_articles e ON e.id = r.id \
             WHERE e.id IS NULL \
             ORDER BY r.published_at DESC \
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(raw_from_row).collect()
    }

    pub async fn get_raw_article_by_url(&self, url: &str) -> Result<Option<RawArticle>> {
        let row = sqlx::query("SELECT * FROM raw_articles WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(raw_from_row).transpose()
    }

    pub async fn count_raw_articles(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM raw_articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    // -- Enriched articles -----------------------------------------------

    /// Upsert a batch of enriched articles by id, one transaction.
    pub async fn save_enriched_articles(&self, batch: &[EnrichedArticle]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for e in batch {
            sqlx::query(
                "INSERT OR REPLACE INTO enriched_articles \
                 (id, sentiment_score, normalized_score, confidence, label, method, \
                  impact_score, geo_tags, topics, entities, cluster_id) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&e.raw.id)
            .bind(e.sentiment.score)
            .bind(e.sentiment.normalized_score)
            .bind(e.sentiment.confidence)
            .bind(e.sentiment.label.as_str())
            .bind(e.sentiment.method.as_str())
            .bind(e.impact_score)
            .bind(to_json(&e.geo_tags))
            .bind(to_json(&e.topics))
            .bind(to_json(&e.entities))
            .bind(&e.cluster_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(batch.len())
    }

    /// Enriched articles published on a calendar date.
    pub async fn get_enriched_by_date(&self, date: NaiveDate) -> Result<Vec<EnrichedArticle>> {
        let rows = sqlx::query(&format!(
            "{ENRICHED_SELECT} WHERE substr(r.published_at, 1, 10) = ? \
             ORDER BY e.impact_score DESC"
        ))
        .bind(fmt_date(date))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(enriched_from_row).collect()
    }

    /// Enriched articles published within the trailing `days` window.
    pub async fn get_enriched_since(&self, days: i64) -> Result<Vec<EnrichedArticle>> {
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
        let rows = sqlx::query(&format!(
            "{ENRICHED_SELECT} WHERE r.published_at >= ? ORDER BY r.published_at DESC"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(enriched_from_row).collect()
    }

    /// Members of a cluster, highest impact first.
    pub async fn get_cluster_members(&self, cluster_id: &str) -> Result<Vec<EnrichedArticle>> {
        let rows = sqlx::query(&format!(
            "{ENRICHED_SELECT} WHERE e.cluster_id = ? ORDER BY e.impact_score DESC"
        ))
        .bind(cluster_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(enriched_from_row).collect()
    }

    /// Daily mean normalized sentiment, newest first.
    pub async fn get_sentiment_history(&self, days: i64) -> Result<Vec<(NaiveDate, f64)>> {
        let rows = sqlx::query(
            "SELECT substr(r.published_at, 1, 10) AS day, \
                    AVG(e.normalized_score) AS avg_sentiment \
             FROM enriched_articles e \
             JOIN raw_articles r ON r.id = e.id \
             GROUP BY day ORDER BY day DESC LIMIT ?",
        )
        .bind(days)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let day: String = row.get("day");
                let avg: f64 = row.get("avg_sentiment");
                Ok((parse_date(&day)?, avg))
            })
            .collect()
    }

    // -- Clusters --------------------------------------------------------

    pub async fn save_clusters(&self, batch: &[Cluster]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for c in batch {
            sqlx::query(
                "INSERT OR REPLACE INTO clusters \
                 (id, date, topic, keywords, article_count, aggregate_sentiment, \
                  aggregate_impact, categories, earliest, latest, unique_sources, \
                  confidence_tier, confidence_score) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&c.id)
            .bind(fmt_date(c.date))
            .bind(&c.topic)
            .bind(to_json(&c.keywords))
            .bind(c.article_count as i64)
            .bind(c.aggregate_sentiment)
            .bind(c.aggregate_impact)
            .bind(to_json(&c.categories))
            .bind(fmt_date(c.earliest))
            .bind(fmt_date(c.latest))
            .bind(c.unique_sources as i64)
            .bind(c.confidence_tier.as_str())
            .bind(c.confidence_score as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(batch.len())
    }

    /// Clusters keyed on their latest member's calendar date, highest
    /// impact first.
    pub async fn get_clusters_by_date(&self, date: NaiveDate) -> Result<Vec<Cluster>> {
        let rows = sqlx::query(
            "SELECT * FROM clusters WHERE date = ? ORDER BY aggregate_impact DESC",
        )
        .bind(fmt_date(date))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(cluster_from_row).collect()
    }

    /// Clusters whose date falls within the trailing `days` window,
    /// excluding `exclude_date` (used by the narrative engine to fetch
    /// history without today's clusters).
    pub async fn get_recent_clusters(
        &self,
        days: i64,
        exclude_date: NaiveDate,
    ) -> Result<Vec<Cluster>> {
        let cutoff = exclude_date - Duration::days(days);
        let rows = sqlx::query(
            "SELECT * FROM clusters WHERE date >= ? AND date < ? ORDER BY date DESC",
        )
        .bind(fmt_date(cutoff))
        .bind(fmt_date(exclude_date))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(cluster_from_row).collect()
    }

    // -- Briefings -------------------------------------------------------

    /// One briefing per date, upserted.
    pub async fn save_briefing(&self, b: &Briefing) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO briefings \
             (date, executive_summary, cache_hash, source, gpr_index, market_sentiment, \
              generated_at, top_clusters) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(fmt_date(b.date))
        .bind(&b.executive_summary)
        .bind(&b.cache_hash)
        .bind(b.source.as_str())
        .bind(b.gpr_index)
        .bind(b.market_sentiment)
        .bind(b.generated_at.to_rfc3339())
        .bind(to_json(&b.top_clusters))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_briefing(&self, date: NaiveDate) -> Result<Option<Briefing>> {
        let row = sqlx::query("SELECT * FROM briefings WHERE date = ?")
            .bind(fmt_date(date))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(briefing_from_row).transpose()
    }

    pub async fn get_recent_briefings(&self, limit: i64) -> Result<Vec<Briefing>> {
        let rows = sqlx::query("SELECT * FROM briefings ORDER BY date DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(briefing_from_row).collect()
    }

    // -- GPR -------------------------------------------------------------

    pub async fn save_gpr_point(&self, p: &GprPoint) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO gpr_history \
             (date, score, keyword_counts, top_keywords, article_count) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(fmt_date(p.date))
        .bind(p.score)
        .bind(to_json(&p.keyword_counts))
        .bind(to_json(&p.top_keywords))
        .bind(p.article_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// GPR points, newest first.
    pub async fn get_gpr_history(&self, limit: i64) -> Result<Vec<GprPoint>> {
        let rows = sqlx::query("SELECT * FROM gpr_history ORDER BY date DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(gpr_from_row).collect()
    }

    // -- Entity sentiment ------------------------------------------------

    /// Upsert on (entity, date), one transaction per batch.
    pub async fn save_entity_sentiment(&self, batch: &[EntitySentimentPoint]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for p in batch {
            sqlx::query(
                "INSERT INTO entity_sentiment \
                 (entity, entity_type, date, avg_sentiment, article_count) \
                 VALUES (?, ?, ?, ?, ?) \
                 ON CONFLICT(entity, date) DO UPDATE SET \
                   avg_sentiment = excluded.avg_sentiment, \
                   article_count = excluded.article_count, \
                   entity_type = excluded.entity_type",
            )
            .bind(&p.entity)
            .bind(p.entity_type.as_str())
            .bind(fmt_date(p.date))
            .bind(p.avg_sentiment)
            .bind(p.article_count as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(batch.len())
    }

    pub async fn get_entity_sentiment(
        &self,
        entity: &str,
        days: i64,
    ) -> Result<Vec<EntitySentimentPoint>> {
        let cutoff = Utc::now().date_naive() - Duration::days(days);
        let rows = sqlx::query(
            "SELECT * FROM entity_sentiment WHERE entity = ? AND date >= ? ORDER BY date DESC",
        )
        .bind(entity)
        .bind(fmt_date(cutoff))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entity_point_from_row).collect()
    }

    // -- Volume ----------------------------------------------------------

    pub async fn save_daily_volume(
        &self,
        date: NaiveDate,
        category: Category,
        count: u32,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO daily_volume (date, category, article_count) VALUES (?, ?, ?) \
             ON CONFLICT(date, category) DO UPDATE SET article_count = excluded.article_count",
        )
        .bind(fmt_date(date))
        .bind(category.key())
        .bind(count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Per-category volume history, newest first.
    pub async fn get_volume_history(
        &self,
        category: Category,
        days: i64,
    ) -> Result<Vec<VolumeRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM daily_volume WHERE category = ? ORDER BY date DESC LIMIT ?",
        )
        .bind(category.key())
        .bind(days)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(volume_from_row).collect()
    }

    // -- Narrative threads -----------------------------------------------

    /// Insert-or-replace each thread.
    pub async fn save_narrative_threads(&self, batch: &[NarrativeThread]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for t in batch {
            sqlx::query(
                "INSERT OR REPLACE INTO narrative_threads \
                 (id, title, first_seen, last_seen, duration_days, cluster_ids, \
                  sentiment_arc, entities, escalation, status) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&t.id)
            .bind(&t.title)
            .bind(fmt_date(t.first_seen))
            .bind(fmt_date(t.last_seen))
            .bind(t.duration_days)
            .bind(to_json(&t.cluster_ids))
            .bind(to_json(&t.sentiment_arc))
            .bind(to_json(&t.entities))
            .bind(t.escalation.as_str())
            .bind(t.status.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(batch.len())
    }

    /// Threads last seen within `days`, optionally filtered by status.
    pub async fn get_narrative_threads(
        &self,
        days: i64,
        status: Option<ThreadStatus>,
    ) -> Result<Vec<NarrativeThread>> {
        let cutoff = Utc::now().date_naive() - Duration::days(days);
        let rows = match status {
            Some(s) => {
                sqlx::query(
                    "SELECT * FROM narrative_threads WHERE last_seen >= ? AND status = ? \
                     ORDER BY last_seen DESC",
                )
                .bind(fmt_date(cutoff))
                .bind(s.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM narrative_threads WHERE last_seen >= ? \
                     ORDER BY last_seen DESC",
                )
                .bind(fmt_date(cutoff))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(thread_from_row).collect()
    }

    // -- Market data -----------------------------------------------------

    /// Insert candles, skipping (date, symbol) pairs already present.
    pub async fn save_market_data(&self, batch: &[MarketDataPoint]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;
        for p in batch {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO market_data (date, symbol, close, change_pct, volume) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(fmt_date(p.date))
            .bind(&p.symbol)
            .bind(p.close)
            .bind(p.change_pct)
            .bind(p.volume)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn get_market_data(&self, days: i64) -> Result<Vec<MarketDataPoint>> {
        let cutoff = Utc::now().date_naive() - Duration::days(days);
        let rows = sqlx::query("SELECT * FROM market_data WHERE date >= ? ORDER BY date ASC")
            .bind(fmt_date(cutoff))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(market_from_row).collect()
    }

    // -- Backtests / scorecards / weights --------------------------------

    pub async fn save_backtest(&self, b: &BacktestResult) -> Result<()> {
        sqlx::query(
            "INSERT INTO backtests \
             (run_at, days_window, aligned_days, pearson, spearman, direction_accuracy) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(b.run_at.to_rfc3339())
        .bind(b.days_window as i64)
        .bind(b.aligned_days as i64)
        .bind(b.pearson)
        .bind(b.spearman)
        .bind(b.direction_accuracy)
        .execute(&self.pool)
        .await?;

        // Bounded history.
        sqlx::query(
            "DELETE FROM backtests WHERE rowid NOT IN \
             (SELECT rowid FROM backtests ORDER BY run_at DESC LIMIT ?)",
        )
        .bind(HISTORY_CAP)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_latest_backtest(&self) -> Result<Option<BacktestResult>> {
        let row = sqlx::query("SELECT * FROM backtests ORDER BY run_at DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(backtest_from_row).transpose()
    }

    pub async fn save_weekly_scorecard(&self, s: &WeeklyScorecard) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO weekly_scorecards \
             (week_start, aligned_days, pearson, direction_accuracy, grade, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(fmt_date(s.week_start))
        .bind(s.aligned_days as i64)
        .bind(s.pearson)
        .bind(s.direction_accuracy)
        .bind(&s.grade)
        .bind(s.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_weekly_scorecard(&self, week_start: NaiveDate) -> Result<Option<WeeklyScorecard>> {
        let row = sqlx::query("SELECT * FROM weekly_scorecards WHERE week_start = ?")
            .bind(fmt_date(week_start))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(scorecard_from_row).transpose()
    }

    pub async fn save_optimized_weights(&self, w: &OptimizedWeights) -> Result<()> {
        sqlx::query(
            "INSERT INTO optimized_weights \
             (created_at, w_sentiment, w_cluster, w_source, w_recency, pearson) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(w.created_at.to_rfc3339())
        .bind(w.weights.sentiment)
        .bind(w.weights.cluster)
        .bind(w.weights.source)
        .bind(w.weights.recency)
        .bind(w.pearson)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "DELETE FROM optimized_weights WHERE rowid NOT IN \
             (SELECT rowid FROM optimized_weights ORDER BY created_at DESC LIMIT ?)",
        )
        .bind(HISTORY_CAP)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recently persisted optimizer winner.
    pub async fn get_current_weights(&self) -> Result<Option<OptimizedWeights>> {
        let row = sqlx::query("SELECT * FROM optimized_weights ORDER BY created_at DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(weights_from_row).transpose()
    }

    // -- Cache entries ---------------------------------------------------

    /// Fetch an unexpired cache entry. Expired entries are pruned here.
    pub async fn cache_get(&self, family: &str, key: &str) -> Result<Option<String>> {
        sqlx::query("DELETE FROM cache_entries WHERE expires_at < ?")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        let row = sqlx::query("SELECT value FROM cache_entries WHERE family = ? AND key = ?")
            .bind(family)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("value")))
    }

    pub async fn cache_put(
        &self,
        family: &str,
        key: &str,
        value: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO cache_entries (family, key, value, expires_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(family)
        .bind(key)
        .bind(value)
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -- Pipeline health -------------------------------------------------

    pub async fn save_health_record(&self, r: &HealthRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO pipeline_health (date, step, status, duration_ms, item_count, error) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(fmt_date(r.date))
        .bind(&r.step)
        .bind(r.status.as_str())
        .bind(r.duration_ms)
        .bind(r.item_count)
        .bind(&r.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Health rollup: the last run's step map, the 7-day failure rate,
    /// and the average total run duration.
    pub async fn get_health_rollup(&self) -> Result<HealthRollup> {
        let last_date: Option<String> =
            sqlx::query("SELECT MAX(date) AS d FROM pipeline_health")
                .fetch_one(&self.pool)
                .await?
                .get("d");

        let mut last_run = HashMap::new();
        if let Some(d) = &last_date {
            let rows = sqlx::query("SELECT * FROM pipeline_health WHERE date = ?")
                .bind(d)
                .fetch_all(&self.pool)
                .await?;
            for row in &rows {
                let rec = health_from_row(row)?;
                last_run.insert(rec.step.clone(), rec);
            }
        }

        let cutoff = fmt_date(Utc::now().date_naive() - Duration::days(7));
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
                    SUM(CASE WHEN status = 'failure' THEN 1 ELSE 0 END) AS failures \
             FROM pipeline_health WHERE date >= ?",
        )
        .bind(&cutoff)
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.get("total");
        let failures: i64 = row.get::<Option<i64>, _>("failures").unwrap_or(0);
        let failure_rate = if total > 0 {
            failures as f64 / total as f64
        } else {
            0.0
        };

        let row = sqlx::query(
            "SELECT AVG(run_ms) AS avg_ms FROM \
             (SELECT SUM(duration_ms) AS run_ms FROM pipeline_health \
              WHERE date >= ? GROUP BY date)",
        )
        .bind(&cutoff)
        .fetch_one(&self.pool)
        .await?;
        let avg_run_ms: f64 = row.get::<Option<f64>, _>("avg_ms").unwrap_or(0.0);

        Ok(HealthRollup {
            last_run_date: last_date.as_deref().map(parse_date).transpose()?,
            last_run,
            failure_rate_7d: failure_rate,
            avg_run_duration_ms: avg_run_ms,
        })
    }
}

/// Rollup view of recent pipeline health.
#[derive(Debug, Serialize)]
pub struct HealthRollup {
    pub last_run_date: Option<NaiveDate>,
    pub last_run: HashMap<String, HealthRecord>,
    pub failure_rate_7d: f64,
    pub avg_run_duration_ms: f64,
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS raw_articles (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT '',
        content TEXT NOT NULL DEFAULT '',
        url TEXT NOT NULL UNIQUE,
        source TEXT NOT NULL DEFAULT '',
        source_id TEXT,
        published_at TEXT NOT NULL DEFAULT '',
        category TEXT NOT NULL DEFAULT 'geopolitics',
        ticker TEXT,
        provider TEXT NOT NULL DEFAULT '',
        image_url TEXT
    )",
    "CREATE TABLE IF NOT EXISTS enriched_articles (
        id TEXT PRIMARY KEY,
        sentiment_score REAL NOT NULL DEFAULT 0,
        normalized_score INTEGER NOT NULL DEFAULT 0,
        confidence REAL NOT NULL DEFAULT 0,
        label TEXT NOT NULL DEFAULT 'neutral',
        method TEXT NOT NULL DEFAULT 'lexicon',
        impact_score INTEGER NOT NULL DEFAULT 0,
        geo_tags TEXT NOT NULL DEFAULT '[]',
        topics TEXT NOT NULL DEFAULT '[]',
        entities TEXT NOT NULL DEFAULT '{}',
        cluster_id TEXT
    )",
    "CREATE TABLE IF NOT EXISTS clusters (
        id TEXT PRIMARY KEY,
        date TEXT NOT NULL DEFAULT '',
        topic TEXT NOT NULL DEFAULT '',
        keywords TEXT NOT NULL DEFAULT '[]',
        article_count INTEGER NOT NULL DEFAULT 0,
        aggregate_sentiment REAL NOT NULL DEFAULT 0,
        aggregate_impact REAL NOT NULL DEFAULT 0,
        categories TEXT NOT NULL DEFAULT '[]',
        earliest TEXT NOT NULL DEFAULT '',
        latest TEXT NOT NULL DEFAULT '',
        unique_sources INTEGER NOT NULL DEFAULT 1,
        confidence_tier TEXT NOT NULL DEFAULT 'low',
        confidence_score INTEGER NOT NULL DEFAULT 20
    )",
    "CREATE TABLE IF NOT EXISTS narrative_threads (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL DEFAULT '',
        first_seen TEXT NOT NULL DEFAULT '',
        last_seen TEXT NOT NULL DEFAULT '',
        duration_days INTEGER NOT NULL DEFAULT 0,
        cluster_ids TEXT NOT NULL DEFAULT '[]',
        sentiment_arc TEXT NOT NULL DEFAULT '[]',
        entities TEXT NOT NULL DEFAULT '[]',
        escalation TEXT NOT NULL DEFAULT 'stable',
        status TEXT NOT NULL DEFAULT 'active'
    )",
    "CREATE TABLE IF NOT EXISTS gpr_history (
        date TEXT PRIMARY KEY,
        score INTEGER NOT NULL DEFAULT 0,
        keyword_counts TEXT NOT NULL DEFAULT '{}',
        top_keywords TEXT NOT NULL DEFAULT '[]',
        article_count INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS briefings (
        date TEXT PRIMARY KEY,
        executive_summary TEXT NOT NULL DEFAULT '',
        cache_hash TEXT NOT NULL DEFAULT '',
        source TEXT NOT NULL DEFAULT 'local_fallback',
        gpr_index INTEGER NOT NULL DEFAULT 0,
        market_sentiment REAL NOT NULL DEFAULT 0,
        generated_at TEXT NOT NULL DEFAULT '',
        top_clusters TEXT NOT NULL DEFAULT '[]'
    )",
    "CREATE TABLE IF NOT EXISTS entity_sentiment (
        entity TEXT NOT NULL,
        entity_type TEXT NOT NULL DEFAULT 'topic',
        date TEXT NOT NULL,
        avg_sentiment REAL NOT NULL DEFAULT 0,
        article_count INTEGER NOT NULL DEFAULT 0,
        UNIQUE(entity, date)
    )",
    "CREATE TABLE IF NOT EXISTS daily_volume (
        date TEXT NOT NULL,
        category TEXT NOT NULL,
        article_count INTEGER NOT NULL DEFAULT 0,
        UNIQUE(date, category)
    )",
    "CREATE TABLE IF NOT EXISTS market_data (
        date TEXT NOT NULL,
        symbol TEXT NOT NULL,
        close REAL NOT NULL DEFAULT 0,
        change_pct REAL NOT NULL DEFAULT 0,
        volume REAL NOT NULL DEFAULT 0,
        UNIQUE(date, symbol)
    )",
    "CREATE TABLE IF NOT EXISTS backtests (
        run_at TEXT NOT NULL,
        days_window INTEGER NOT NULL DEFAULT 0,
        aligned_days INTEGER NOT NULL DEFAULT 0,
        pearson REAL NOT NULL DEFAULT 0,
        spearman REAL NOT NULL DEFAULT 0,
        direction_accuracy REAL NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS weekly_scorecards (
        week_start TEXT PRIMARY KEY,
        aligned_days INTEGER NOT NULL DEFAULT 0,
        pearson REAL NOT NULL DEFAULT 0,
        direction_accuracy REAL NOT NULL DEFAULT 0,
        grade TEXT NOT NULL DEFAULT 'F',
        created_at TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS optimized_weights (
        created_at TEXT NOT NULL,
        w_sentiment REAL NOT NULL DEFAULT 0.4,
        w_cluster REAL NOT NULL DEFAULT 0.3,
        w_source REAL NOT NULL DEFAULT 0.2,
        w_recency REAL NOT NULL DEFAULT 0.1,
        pearson REAL NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS pipeline_health (
        date TEXT NOT NULL,
        step TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'success',
        duration_ms INTEGER NOT NULL DEFAULT 0,
        item_count INTEGER,
        error TEXT
    )",
    "CREATE TABLE IF NOT EXISTS cache_entries (
        family TEXT NOT NULL,
        key TEXT NOT NULL,
        value TEXT NOT NULL DEFAULT '',
        expires_at TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (family, key)
    )",
];

/// Current column set per table, used by the additive widening pass.
/// Only columns added after the initial release need entries, but listing
/// the full set keeps older database files upgradeable from any version.
const CURRENT_COLUMNS: &[(&str, &[(&str, &str)])] = &[
    (
        "raw_articles",
        &[
            ("content", "TEXT NOT NULL DEFAULT ''"),
            ("ticker", "TEXT"),
            ("image_url", "TEXT"),
            ("source_id", "TEXT"),
        ],
    ),
    (
        "enriched_articles",
        &[
            ("method", "TEXT NOT NULL DEFAULT 'lexicon'"),
            ("geo_tags", "TEXT NOT NULL DEFAULT '[]'"),
            ("cluster_id", "TEXT"),
        ],
    ),
    (
        "clusters",
        &[
            ("unique_sources", "INTEGER NOT NULL DEFAULT 1"),
            ("confidence_tier", "TEXT NOT NULL DEFAULT 'low'"),
            ("confidence_score", "INTEGER NOT NULL DEFAULT 20"),
        ],
    ),
    (
        "briefings",
        &[
            ("cache_hash", "TEXT NOT NULL DEFAULT ''"),
            ("market_sentiment", "REAL NOT NULL DEFAULT 0"),
            ("top_clusters", "TEXT NOT NULL DEFAULT '[]'"),
        ],
    ),
    (
        "narrative_threads",
        &[
            ("escalation", "TEXT NOT NULL DEFAULT 'stable'"),
            ("status", "TEXT NOT NULL DEFAULT 'active'"),
        ],
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_raw_published ON raw_articles (published_at)",
    "CREATE INDEX IF NOT EXISTS idx_raw_category ON raw_articles (category)",
    "CREATE INDEX IF NOT EXISTS idx_enriched_impact ON enriched_articles (impact_score)",
    "CREATE INDEX IF NOT EXISTS idx_enriched_cluster ON enriched_articles (cluster_id)",
    "CREATE INDEX IF NOT EXISTS idx_entity_date ON entity_sentiment (entity, date)",
    "CREATE INDEX IF NOT EXISTS idx_threads_last_seen ON narrative_threads (last_seen)",
];

/// Shared SELECT for the enriched ⋈ raw join.
const ENRICHED_SELECT: &str = "SELECT \
    r.id AS r_id, r.title, r.description, r.content, r.url, r.source, r.source_id, \
    r.published_at, r.category, r.ticker, r.provider, r.image_url, \
    e.sentiment_score, e.normalized_score, e.confidence, e.label, e.method, \
    e.impact_score, e.geo_tags, e.topics, e.entities, e.cluster_id \
    FROM enriched_articles e JOIN raw_articles r ON r.id = e.id";

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn raw_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<RawArticle> {
    let category: String = row.get("category");
    let published: String = row.get("published_at");
    Ok(RawArticle {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        content: row.get("content"),
        url: row.get("url"),
        source: row.get("source"),
        source_id: row.get("source_id"),
        published_at: parse_ts(&published)?,
        category: category.parse().unwrap_or(Category::Geopolitics),
        ticker: row.get("ticker"),
        provider: row.get("provider"),
        image_url: row.get("image_url"),
    })
}

fn enriched_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<EnrichedArticle> {
    let category: String = row.get("category");
    let published: String = row.get("published_at");
    let label: String = row.get("label");
    let method: String = row.get("method");
    let geo_tags: String = row.get("geo_tags");
    let topics: String = row.get("topics");
    let entities: String = row.get("entities");

    Ok(EnrichedArticle {
        raw: RawArticle {
            id: row.get("r_id"),
            title: row.get("title"),
            description: row.get("description"),
            content: row.get("content"),
            url: row.get("url"),
            source: row.get("source"),
            source_id: row.get("source_id"),
            published_at: parse_ts(&published)?,
            category: category.parse().unwrap_or(Category::Geopolitics),
            ticker: row.get("ticker"),
            provider: row.get("provider"),
            image_url: row.get("image_url"),
        },
        sentiment: Sentiment {
            score: row.get("sentiment_score"),
            normalized_score: row.get("normalized_score"),
            confidence: row.get("confidence"),
            label: label.parse().unwrap_or(SentimentLabel::Neutral),
            method: method.parse().unwrap_or(SentimentMethod::Lexicon),
        },
        impact_score: row.get("impact_score"),
        geo_tags: serde_json::from_str(&geo_tags).unwrap_or_default(),
        topics: serde_json::from_str(&topics).unwrap_or_default(),
        entities: serde_json::from_str(&entities).unwrap_or_default(),
        cluster_id: row.get("cluster_id"),
    })
}

fn cluster_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Cluster> {
    let date: String = row.get("date");
    let earliest: String = row.get("earliest");
    let latest: String = row.get("latest");
    let keywords: String = row.get("keywords");
    let categories: String = row.get("categories");
    let tier: String = row.get("confidence_tier");
    Ok(Cluster {
        id: row.get("id"),
        date: parse_date(&date)?,
        topic: row.get("topic"),
        keywords: serde_json::from_str(&keywords).unwrap_or_default(),
        article_count: row.get::<i64, _>("article_count") as u32,
        aggregate_sentiment: row.get("aggregate_sentiment"),
        aggregate_impact: row.get("aggregate_impact"),
        categories: serde_json::from_str(&categories).unwrap_or_default(),
        earliest: parse_date(&earliest)?,
        latest: parse_date(&latest)?,
        unique_sources: row.get::<i64, _>("unique_sources") as u32,
        confidence_tier: tier.parse().unwrap_or(ConfidenceTier::Low),
        confidence_score: row.get::<i64, _>("confidence_score") as u32,
        member_ids: Vec::new(),
    })
}

fn briefing_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Briefing> {
    let date: String = row.get("date");
    let source: String = row.get("source");
    let generated: String = row.get("generated_at");
    let top: String = row.get("top_clusters");
    Ok(Briefing {
        date: parse_date(&date)?,
        executive_summary: row.get("executive_summary"),
        cache_hash: row.get("cache_hash"),
        source: source.parse().unwrap_or(BriefingSource::LocalFallback),
        gpr_index: row.get("gpr_index"),
        market_sentiment: row.get("market_sentiment"),
        generated_at: parse_ts(&generated).unwrap_or_else(|_| Utc::now()),
        top_clusters: serde_json::from_str::<Vec<ClusterDigest>>(&top).unwrap_or_default(),
    })
}

fn gpr_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<GprPoint> {
    let date: String = row.get("date");
    let counts: String = row.get("keyword_counts");
    let top: String = row.get("top_keywords");
    Ok(GprPoint {
        date: parse_date(&date)?,
        score: row.get("score"),
        keyword_counts: serde_json::from_str(&counts).unwrap_or_default(),
        top_keywords: serde_json::from_str(&top).unwrap_or_default(),
        article_count: row.get::<i64, _>("article_count") as u32,
    })
}

fn entity_point_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<EntitySentimentPoint> {
    let date: String = row.get("date");
    let kind: String = row.get("entity_type");
    Ok(EntitySentimentPoint {
        entity: row.get("entity"),
        entity_type: kind.parse().unwrap_or(EntityType::Topic),
        date: parse_date(&date)?,
        avg_sentiment: row.get("avg_sentiment"),
        article_count: row.get::<i64, _>("article_count") as u32,
    })
}

fn volume_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<VolumeRecord> {
    let date: String = row.get("date");
    let category: String = row.get("category");
    Ok(VolumeRecord {
        date: parse_date(&date)?,
        category: category.parse().unwrap_or(Category::Geopolitics),
        article_count: row.get::<i64, _>("article_count") as u32,
    })
}

fn thread_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<NarrativeThread> {
    let first: String = row.get("first_seen");
    let last: String = row.get("last_seen");
    let cluster_ids: String = row.get("cluster_ids");
    let arc: String = row.get("sentiment_arc");
    let entities: String = row.get("entities");
    let escalation: String = row.get("escalation");
    let status: String = row.get("status");
    Ok(NarrativeThread {
        id: row.get("id"),
        title: row.get("title"),
        first_seen: parse_date(&first)?,
        last_seen: parse_date(&last)?,
        duration_days: row.get("duration_days"),
        cluster_ids: serde_json::from_str(&cluster_ids).unwrap_or_default(),
        sentiment_arc: serde_json::from_str(&arc).unwrap_or_default(),
        entities: serde_json::from_str(&entities).unwrap_or_default(),
        escalation: escalation.parse().unwrap_or(Escalation::Stable),
        status: status.parse().unwrap_or(ThreadStatus::Active),
    })
}

fn market_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<MarketDataPoint> {
    let date: String = row.get("date");
    Ok(MarketDataPoint {
        date: parse_date(&date)?,
        symbol: row.get("symbol"),
        close: row.get("close"),
        change_pct: row.get("change_pct"),
        volume: row.get("volume"),
    })
}

fn backtest_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<BacktestResult> {
    let run_at: String = row.get("run_at");
    Ok(BacktestResult {
        run_at: parse_ts(&run_at)?,
        days_window: row.get::<i64, _>("days_window") as u32,
        aligned_days: row.get::<i64, _>("aligned_days") as u32,
        pearson: row.get("pearson"),
        spearman: row.get("spearman"),
        direction_accuracy: row.get("direction_accuracy"),
    })
}

fn scorecard_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<WeeklyScorecard> {
    let week: String = row.get("week_start");
    let created: String = row.get("created_at");
    Ok(WeeklyScorecard {
        week_start: parse_date(&week)?,
        aligned_days: row.get::<i64, _>("aligned_days") as u32,
        pearson: row.get("pearson"),
        direction_accuracy: row.get("direction_accuracy"),
        grade: row.get("grade"),
        created_at: parse_ts(&created).unwrap_or_else(|_| Utc::now()),
    })
}

fn weights_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<OptimizedWeights> {
    let created: String = row.get("created_at");
    Ok(OptimizedWeights {
        created_at: parse_ts(&created)?,
        weights: ImpactWeights {
            sentiment: row.get("w_sentiment"),
            cluster: row.get("w_cluster"),
            source: row.get("w_source"),
            recency: row.get("w_recency"),
        },
        pearson: row.get("pearson"),
    })
}

fn health_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<HealthRecord> {
    let date: String = row.get("date");
    let status: String = row.get("status");
    Ok(HealthRecord {
        date: parse_date(&date)?,
        step: row.get("step"),
        status: status.parse().unwrap_or(StageStatus::Failure),
        duration_ms: row.get("duration_ms"),
        item_count: row.get("item_count"),
        error: row.get("error"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
