//! Shared types for the ARGUS pipeline.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that provider, analysis,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// News category for routing provider queries and bucketing volume.
/// Closed set; the pipeline never invents categories at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    AiComputeInfra,
    FintechRegtech,
    RpaEnterpriseAi,
    Semiconductor,
    Cybersecurity,
    Geopolitics,
}

impl Category {
    /// All known categories (useful for iteration).
    pub const ALL: &'static [Category] = &[
        Category::AiComputeInfra,
        Category::FintechRegtech,
        Category::RpaEnterpriseAi,
        Category::Semiconductor,
        Category::Cybersecurity,
        Category::Geopolitics,
    ];

    /// Stable snake_case key used in the database and the JSON feed.
    pub fn key(&self) -> &'static str {
        match self {
            Category::AiComputeInfra => "ai_compute_infra",
            Category::FintechRegtech => "fintech_regtech",
            Category::RpaEnterpriseAi => "rpa_enterprise_ai",
            Category::Semiconductor => "semiconductor",
            Category::Cybersecurity => "cybersecurity",
            Category::Geopolitics => "geopolitics",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::AiComputeInfra => write!(f, "AI & Compute Infrastructure"),
            Category::FintechRegtech => write!(f, "Fintech & RegTech"),
            Category::RpaEnterpriseAi => write!(f, "RPA & Enterprise AI"),
            Category::Semiconductor => write!(f, "Semiconductors"),
            Category::Cybersecurity => write!(f, "Cybersecurity"),
            Category::Geopolitics => write!(f, "Geopolitics"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ai_compute_infra" => Ok(Category::AiComputeInfra),
            "fintech_regtech" => Ok(Category::FintechRegtech),
            "rpa_enterprise_ai" => Ok(Category::RpaEnterpriseAi),
            "semiconductor" => Ok(Category::Semiconductor),
            "cybersecurity" => Ok(Category::Cybersecurity),
            "geopolitics" => Ok(Category::Geopolitics),
            _ => Err(anyhow::anyhow!("Unknown category: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Articles
// ---------------------------------------------------------------------------

/// A raw article as persisted by the collector. Immutable once written,
/// except that a later fetch of the same URL may heal title/description/
/// content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArticle {
    /// Stable identifier: first 16 hex chars of SHA-256 over the URL.
    pub id: String,
    pub title: String,
    pub description: String,
    pub content: String,
    /// Unique in the raw table.
    pub url: String,
    /// Human-readable source name ("Reuters", "TechCrunch").
    pub source: String,
    /// Provider-side identifier for the source, where one exists.
    pub source_id: Option<String>,
    pub published_at: DateTime<Utc>,
    pub category: Category,
    /// Related equity ticker, where the category query maps to one.
    pub ticker: Option<String>,
    /// Which adapter produced this row ("newsapi", "rss", "gdelt").
    pub provider: String,
    pub image_url: Option<String>,
}

impl fmt::Display for RawArticle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] {} ({})",
            self.provider,
            self.category.key(),
            self.title,
            self.published_at.format("%Y-%m-%d %H:%M"),
        )
    }
}

impl RawArticle {
    /// Calendar date of publication.
    pub fn published_date(&self) -> NaiveDate {
        self.published_at.date_naive()
    }

    /// Text used for sentiment and keyword analysis.
    pub fn analysis_text(&self) -> String {
        if self.description.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.description)
        }
    }
}

/// Sentiment classification label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }
}

impl std::str::FromStr for SentimentLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(SentimentLabel::Positive),
            "negative" => Ok(SentimentLabel::Negative),
            "neutral" => Ok(SentimentLabel::Neutral),
            _ => Err(anyhow::anyhow!("Unknown sentiment label: {s}")),
        }
    }
}

/// How a sentiment score was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentMethod {
    Transformer,
    Lexicon,
    Hybrid,
}

impl SentimentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentMethod::Transformer => "transformer",
            SentimentMethod::Lexicon => "lexicon",
            SentimentMethod::Hybrid => "hybrid",
        }
    }
}

impl std::str::FromStr for SentimentMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transformer" => Ok(SentimentMethod::Transformer),
            "lexicon" => Ok(SentimentMethod::Lexicon),
            "hybrid" => Ok(SentimentMethod::Hybrid),
            _ => Err(anyhow::anyhow!("Unknown sentiment method: {s}")),
        }
    }
}

/// Sentiment result for one article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentiment {
    /// Raw score in [-1, 1].
    pub score: f64,
    /// Score rescaled to [-100, 100] for aggregation and display.
    pub normalized_score: i64,
    /// Classifier confidence in [0, 1].
    pub confidence: f64,
    pub label: SentimentLabel,
    pub method: SentimentMethod,
}

impl Sentiment {
    /// A neutral zero-score sentiment (empty input, unparseable text).
    pub fn neutral(method: SentimentMethod) -> Self {
        Self {
            score: 0.0,
            normalized_score: 0,
            confidence: 0.0,
            label: SentimentLabel::Neutral,
            method,
        }
    }
}

/// Named entities extracted from one article, bucketed by kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitySet {
    pub people: Vec<String>,
    pub organizations: Vec<String>,
    pub places: Vec<String>,
    pub topics: Vec<String>,
}

impl EntitySet {
    /// All entities across the four buckets, in bucket order.
    pub fn all(&self) -> Vec<(&str, EntityType)> {
        let mut out = Vec::new();
        for p in &self.people {
            out.push((p.as_str(), EntityType::Person));
        }
        for o in &self.organizations {
            out.push((o.as_str(), EntityType::Organization));
        }
        for pl in &self.places {
            out.push((pl.as_str(), EntityType::Place));
        }
        for t in &self.topics {
            out.push((t.as_str(), EntityType::Topic));
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
            && self.organizations.is_empty()
            && self.places.is_empty()
            && self.topics.is_empty()
    }
}

/// Kind of a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Organization,
    Place,
    Topic,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Place => "place",
            EntityType::Topic => "topic",
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "person" => Ok(EntityType::Person),
            "organization" => Ok(EntityType::Organization),
            "place" => Ok(EntityType::Place),
            "topic" => Ok(EntityType::Topic),
            _ => Err(anyhow::anyhow!("Unknown entity type: {s}")),
        }
    }
}

/// An enriched article, 1:1 with a raw article, carrying the analytic
/// projection. `cluster_id` is filled by the clustering stage; everything
/// else is immutable after enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedArticle {
    pub raw: RawArticle,
    pub sentiment: Sentiment,
    /// Composite impact in [0, 100].
    pub impact_score: i64,
    pub geo_tags: Vec<String>,
    pub topics: Vec<String>,
    pub entities: EntitySet,
    pub cluster_id: Option<String>,
}

impl fmt::Display for EnrichedArticle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | sent={} ({}) impact={}",
            self.raw.title,
            self.sentiment.normalized_score,
            self.sentiment.label.as_str(),
            self.impact_score,
        )
    }
}

// ---------------------------------------------------------------------------
// Clusters
// ---------------------------------------------------------------------------

/// Multi-source confidence tier for a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
        }
    }
}

impl std::str::FromStr for ConfidenceTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(ConfidenceTier::High),
            "medium" => Ok(ConfidenceTier::Medium),
            "low" => Ok(ConfidenceTier::Low),
            _ => Err(anyhow::anyhow!("Unknown confidence tier: {s}")),
        }
    }
}

/// A group of articles judged to be about the same story, computed once
/// per run. Members relate via `EnrichedArticle::cluster_id`; the
/// `member_ids` list here is transient run-local state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    /// Latest member's calendar date.
    pub date: NaiveDate,
    pub topic: String,
    pub keywords: Vec<String>,
    pub article_count: u32,
    /// Arithmetic mean of member normalized sentiment, in [-100, 100].
    pub aggregate_sentiment: f64,
    /// Arithmetic mean of member impact, in [0, 100].
    pub aggregate_impact: f64,
    pub categories: Vec<Category>,
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
    /// Distinct lowercase source names among members.
    pub unique_sources: u32,
    pub confidence_tier: ConfidenceTier,
    pub confidence_score: u32,
    /// Run-local member list; the persisted relationship lives on the
    /// enriched articles.
    #[serde(default)]
    pub member_ids: Vec<String>,
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({} articles, sent={:.1}, impact={:.1})",
            self.date,
            self.topic,
            self.article_count,
            self.aggregate_sentiment,
            self.aggregate_impact,
        )
    }
}

/// Reduced cluster projection used for the briefing prompt, the
/// idempotence cache key, and `briefings.top_clusters`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDigest {
    pub topic: String,
    pub article_count: u32,
    pub aggregate_sentiment: f64,
    /// Top 5 keywords.
    pub keywords: Vec<String>,
}

impl ClusterDigest {
    pub fn from_cluster(c: &Cluster) -> Self {
        Self {
            topic: c.topic.clone(),
            article_count: c.article_count,
            aggregate_sentiment: c.aggregate_sentiment,
            keywords: c.keywords.iter().take(5).cloned().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Narrative threads
// ---------------------------------------------------------------------------

/// Direction of sentiment drift along a thread. Negative drift means
/// tension is rising.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Escalation {
    Rising,
    Stable,
    Declining,
}

impl Escalation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Escalation::Rising => "rising",
            Escalation::Stable => "stable",
            Escalation::Declining => "declining",
        }
    }
}

impl std::str::FromStr for Escalation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rising" => Ok(Escalation::Rising),
            "stable" => Ok(Escalation::Stable),
            "declining" => Ok(Escalation::Declining),
            _ => Err(anyhow::anyhow!("Unknown escalation: {s}")),
        }
    }
}

/// Thread lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    Active,
    Resolved,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadStatus::Active => "active",
            ThreadStatus::Resolved => "resolved",
        }
    }
}

impl std::str::FromStr for ThreadStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ThreadStatus::Active),
            "resolved" => Ok(ThreadStatus::Resolved),
            _ => Err(anyhow::anyhow!("Unknown thread status: {s}")),
        }
    }
}

/// A chain of clusters across days judged to be the same evolving story.
///
/// Invariants: `cluster_ids` is ordered by date; `sentiment_arc` is
/// parallel to `cluster_ids`; `duration_days` is the whole-day difference
/// between `first_seen` and `last_seen`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeThread {
    pub id: String,
    pub title: String,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    pub duration_days: i64,
    pub cluster_ids: Vec<String>,
    pub sentiment_arc: Vec<f64>,
    pub entities: Vec<String>,
    pub escalation: Escalation,
    pub status: ThreadStatus,
}

impl fmt::Display for NarrativeThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}..{}, {}d, {} clusters, {}, {}]",
            self.title,
            self.first_seen,
            self.last_seen,
            self.duration_days,
            self.cluster_ids.len(),
            self.escalation.as_str(),
            self.status.as_str(),
        )
    }
}

impl NarrativeThread {
    /// Age in whole days relative to `today`.
    pub fn age_days(&self, today: NaiveDate) -> i64 {
        (today - self.first_seen).num_days()
    }

    /// Days since the thread last advanced.
    pub fn idle_days(&self, today: NaiveDate) -> i64 {
        (today - self.last_seen).num_days()
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// One day's Geopolitical Risk datapoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GprPoint {
    pub date: NaiveDate,
    /// Normalized index in [0, 100].
    pub score: i64,
    pub keyword_counts: HashMap<String, u32>,
    pub top_keywords: Vec<String>,
    pub article_count: u32,
}

/// GPR index direction over the trailing 14 days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GprTrend {
    Rising,
    Falling,
    Stable,
}

impl GprTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            GprTrend::Rising => "rising",
            GprTrend::Falling => "falling",
            GprTrend::Stable => "stable",
        }
    }
}

/// Daily average sentiment for one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySentimentPoint {
    pub entity: String,
    pub entity_type: EntityType,
    pub date: NaiveDate,
    pub avg_sentiment: f64,
    pub article_count: u32,
}

/// Per-category daily article volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub date: NaiveDate,
    pub category: Category,
    pub article_count: u32,
}

/// A volume spike detected against the trailing 7-day history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyAlert {
    pub date: NaiveDate,
    pub category: Category,
    pub multiplier: f64,
    pub z_score: f64,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Briefings
// ---------------------------------------------------------------------------

/// Where a briefing's prose came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BriefingSource {
    Llm,
    LocalFallback,
}

impl BriefingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BriefingSource::Llm => "llm",
            BriefingSource::LocalFallback => "local_fallback",
        }
    }
}

impl std::str::FromStr for BriefingSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "llm" => Ok(BriefingSource::Llm),
            "local_fallback" => Ok(BriefingSource::LocalFallback),
            _ => Err(anyhow::anyhow!("Unknown briefing source: {s}")),
        }
    }
}

/// The daily executive briefing. One per date, upserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Briefing {
    pub date: NaiveDate,
    pub executive_summary: String,
    /// Content hash of the cluster projection that produced this briefing.
    pub cache_hash: String,
    pub source: BriefingSource,
    pub gpr_index: i64,
    /// Mean normalized sentiment across the day's enriched articles.
    pub market_sentiment: f64,
    pub generated_at: DateTime<Utc>,
    pub top_clusters: Vec<ClusterDigest>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// One daily market candle for the validation subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataPoint {
    pub date: NaiveDate,
    pub symbol: String,
    pub close: f64,
    pub change_pct: f64,
    pub volume: f64,
}

/// Result of one sentiment ↔ market correlation backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub run_at: DateTime<Utc>,
    pub days_window: u32,
    pub aligned_days: u32,
    pub pearson: f64,
    pub spearman: f64,
    /// Fraction of aligned pairs with matching sign, in [0, 1].
    pub direction_accuracy: f64,
}

/// Weekly validation scorecard with a letter grade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyScorecard {
    pub week_start: NaiveDate,
    pub aligned_days: u32,
    pub pearson: f64,
    pub direction_accuracy: f64,
    pub grade: String,
    pub created_at: DateTime<Utc>,
}

/// The four impact-score weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactWeights {
    pub sentiment: f64,
    pub cluster: f64,
    pub source: f64,
    pub recency: f64,
}

impl Default for ImpactWeights {
    fn default() -> Self {
        Self {
            sentiment: 0.4,
            cluster: 0.3,
            source: 0.2,
            recency: 0.1,
        }
    }
}

impl ImpactWeights {
    pub fn sum(&self) -> f64 {
        self.sentiment + self.cluster + self.source + self.recency
    }
}

/// A grid-search winner persisted for the enricher to consult.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizedWeights {
    pub created_at: DateTime<Utc>,
    pub weights: ImpactWeights,
    /// Pearson r achieved by this combo on the alignment window.
    pub pearson: f64,
}

// ---------------------------------------------------------------------------
// Pipeline health
// ---------------------------------------------------------------------------

/// Outcome of one orchestrator stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Success,
    Failure,
    Skipped,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Success => "success",
            StageStatus::Failure => "failure",
            StageStatus::Skipped => "skipped",
        }
    }
}

impl std::str::FromStr for StageStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(StageStatus::Success),
            "failure" => Ok(StageStatus::Failure),
            "skipped" => Ok(StageStatus::Skipped),
            _ => Err(anyhow::anyhow!("Unknown stage status: {s}")),
        }
    }
}

/// One health row per stage per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    pub date: NaiveDate,
    pub step: String,
    pub status: StageStatus,
    pub duration_ms: i64,
    pub item_count: Option<i64>,
    pub error: Option<String>,
}

/// Summary of one full pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub articles_ingested: usize,
    pub articles_enriched: usize,
    pub cluster_count: usize,
    pub threads_updated: usize,
    pub gpr_score: Option<i64>,
    pub briefing_source: Option<BriefingSource>,
    /// Non-fatal stage errors collected along the way.
    pub errors: Vec<String>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Run {}: ingested={} enriched={} clusters={} threads={} gpr={} briefing={} errors={} ({}ms)",
            self.date,
            self.articles_ingested,
            self.articles_enriched,
            self.cluster_count,
            self.threads_updated,
            self.gpr_score.map_or("-".to_string(), |g| g.to_string()),
            self.briefing_source.map_or("-", |s| s.as_str()),
            self.errors.len(),
            self.duration_ms,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error kinds for ARGUS.
#[derive(Debug, thiserror::Error)]
pub enum ArgusError {
    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("Rate limited ({provider})")]
    RateLimited { provider: String },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Stage failed ({stage}): {message}")]
    Stage { stage: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw() -> RawArticle {
        RawArticle {
            id: "abcdef0123456789".to_string(),
            title: "NVIDIA beats earnings estimates".to_string(),
            description: "Record data center revenue".to_string(),
            content: String::new(),
            url: "https://example.com/nvda".to_string(),
            source: "Reuters".to_string(),
            source_id: Some("reuters".to_string()),
            published_at: Utc::now(),
            category: Category::AiComputeInfra,
            ticker: Some("NVDA".to_string()),
            provider: "newsapi".to_string(),
            image_url: None,
        }
    }

    // -- Category tests --

    #[test]
    fn test_category_all() {
        assert_eq!(Category::ALL.len(), 6);
    }

    #[test]
    fn test_category_key_roundtrip() {
        for cat in Category::ALL {
            assert_eq!(cat.key().parse::<Category>().unwrap(), *cat);
        }
    }

    #[test]
    fn test_category_serde_snake_case() {
        let json = serde_json::to_string(&Category::AiComputeInfra).unwrap();
        assert_eq!(json, "\"ai_compute_infra\"");
        let parsed: Category = serde_json::from_str("\"cybersecurity\"").unwrap();
        assert_eq!(parsed, Category::Cybersecurity);
    }

    #[test]
    fn test_category_display() {
        assert_eq!(format!("{}", Category::Cybersecurity), "Cybersecurity");
        assert_eq!(format!("{}", Category::Geopolitics), "Geopolitics");
    }

    #[test]
    fn test_category_from_str_unknown() {
        assert!("nonsense".parse::<Category>().is_err());
    }

    // -- Article tests --

    #[test]
    fn test_raw_article_analysis_text() {
        let a = sample_raw();
        assert_eq!(
            a.analysis_text(),
            "NVIDIA beats earnings estimates Record data center revenue"
        );

        let mut bare = sample_raw();
        bare.description = String::new();
        assert_eq!(bare.analysis_text(), bare.title);
    }

    #[test]
    fn test_raw_article_serde_roundtrip() {
        let a = sample_raw();
        let json = serde_json::to_string(&a).unwrap();
        let parsed: RawArticle = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, a.id);
        assert_eq!(parsed.category, Category::AiComputeInfra);
        assert_eq!(parsed.ticker.as_deref(), Some("NVDA"));
    }

    #[test]
    fn test_sentiment_neutral() {
        let s = Sentiment::neutral(SentimentMethod::Lexicon);
        assert_eq!(s.normalized_score, 0);
        assert_eq!(s.label, SentimentLabel::Neutral);
        assert_eq!(s.method, SentimentMethod::Lexicon);
    }

    #[test]
    fn test_sentiment_label_roundtrip() {
        for label in [
            SentimentLabel::Positive,
            SentimentLabel::Negative,
            SentimentLabel::Neutral,
        ] {
            assert_eq!(label.as_str().parse::<SentimentLabel>().unwrap(), label);
        }
    }

    #[test]
    fn test_entity_set_all_and_empty() {
        let mut set = EntitySet::default();
        assert!(set.is_empty());
        set.people.push("Jensen Huang".to_string());
        set.places.push("Taiwan".to_string());
        let all = set.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], ("Jensen Huang", EntityType::Person));
        assert_eq!(all[1], ("Taiwan", EntityType::Place));
        assert!(!set.is_empty());
    }

    // -- Cluster tests --

    #[test]
    fn test_cluster_digest_takes_top5_keywords() {
        let cluster = Cluster {
            id: "c1".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            topic: "Trends in Chips, Exports, Tariffs".to_string(),
            keywords: (0..8).map(|i| format!("kw{i}")).collect(),
            article_count: 4,
            aggregate_sentiment: -12.5,
            aggregate_impact: 61.0,
            categories: vec![Category::Semiconductor],
            earliest: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            latest: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            unique_sources: 3,
            confidence_tier: ConfidenceTier::Medium,
            confidence_score: 50,
            member_ids: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        };
        let digest = ClusterDigest::from_cluster(&cluster);
        assert_eq!(digest.keywords.len(), 5);
        assert_eq!(digest.article_count, 4);
    }

    // -- Thread tests --

    #[test]
    fn test_thread_age_and_idle() {
        let t = NarrativeThread {
            id: "t1".to_string(),
            title: "Chip exports (3 days developing)".to_string(),
            first_seen: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            last_seen: NaiveDate::from_ymd_opt(2026, 7, 3).unwrap(),
            duration_days: 2,
            cluster_ids: vec!["a".into(), "b".into()],
            sentiment_arc: vec![-30.0, -60.0],
            entities: vec!["Nvidia".into(), "Tsmc".into()],
            escalation: Escalation::Rising,
            status: ThreadStatus::Active,
        };
        let today = NaiveDate::from_ymd_opt(2026, 7, 8).unwrap();
        assert_eq!(t.age_days(today), 7);
        assert_eq!(t.idle_days(today), 5);
    }

    // -- Weights tests --

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = ImpactWeights::default();
        assert!((w.sum() - 1.0).abs() < 1e-9);
    }

    // -- Enum string roundtrips --

    #[test]
    fn test_enum_str_roundtrips() {
        for e in [Escalation::Rising, Escalation::Stable, Escalation::Declining] {
            assert_eq!(e.as_str().parse::<Escalation>().unwrap(), e);
        }
        for s in [ThreadStatus::Active, ThreadStatus::Resolved] {
            assert_eq!(s.as_str().parse::<ThreadStatus>().unwrap(), s);
        }
        for b in [BriefingSource::Llm, BriefingSource::LocalFallback] {
            assert_eq!(b.as_str().parse::<BriefingSource>().unwrap(), b);
        }
        for st in [StageStatus::Success, StageStatus::Failure, StageStatus::Skipped] {
            assert_eq!(st.as_str().parse::<StageStatus>().unwrap(), st);
        }
    }

    // -- Run report --

    #[test]
    fn test_run_report_display() {
        let report = RunReport {
            date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            started_at: Utc::now(),
            duration_ms: 4200,
            articles_ingested: 42,
            articles_enriched: 40,
            cluster_count: 5,
            threads_updated: 2,
            gpr_score: Some(31),
            briefing_source: Some(BriefingSource::Llm),
            errors: vec![],
        };
        let display = format!("{report}");
        assert!(display.contains("ingested=42"));
        assert!(display.contains("gpr=31"));
        assert!(display.contains("briefing=llm"));
    }

    // -- Error display --

    #[test]
    fn test_argus_error_display() {
        let e = ArgusError::Provider {
            provider: "newsapi".to_string(),
            message: "connection timeout".to_string(),
        };
        assert_eq!(format!("{e}"), "Provider error (newsapi): connection timeout");

        let e = ArgusError::RateLimited {
            provider: "newsapi".to_string(),
        };
        assert!(format!("{e}").contains("Rate limited"));
    }
}
