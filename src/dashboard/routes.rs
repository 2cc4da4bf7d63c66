//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::engine::orchestrator::Orchestrator;
use crate::storage::feed::{build_feed, FeedDay, NewsFeed};
use crate::storage::{HealthRollup, Store};
use crate::types::{Category, ClusterDigest};

/// Day caps per endpoint.
const NEWS_DAYS: usize = 30;
const TERMINAL_MAX_DAYS: i64 = 30;
const SENTIMENT_MAX_DAYS: i64 = 90;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct DashboardState {
    pub store: Arc<Store>,
    pub orchestrator: Arc<Orchestrator>,
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<i64>,
}

fn clamp_days(query: Option<i64>, max: i64) -> i64 {
    query.unwrap_or(max).clamp(1, max)
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub message: String,
    #[serde(rename = "fetchedDates")]
    pub fetched_dates: Vec<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct DayAnalysis {
    pub date: NaiveDate,
    pub executive_summary: String,
    pub source: String,
    pub gpr_index: i64,
    pub market_sentiment: f64,
    pub top_clusters: Vec<ClusterDigest>,
}

#[derive(Debug, Serialize)]
pub struct SentimentPoint {
    pub date: NaiveDate,
    pub avg_sentiment: f64,
}

#[derive(Debug, Serialize)]
pub struct TerminalResponse {
    pub analyses: Vec<DayAnalysis>,
    #[serde(rename = "sentimentHistory")]
    pub sentiment_history: Vec<SentimentPoint>,
    #[serde(rename = "categoryNames")]
    pub category_names: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct LatestResponse {
    pub analysis: Option<DayAnalysis>,
    #[serde(rename = "sentimentHistory")]
    pub sentiment_history: Vec<SentimentPoint>,
}

#[derive(Debug, Serialize)]
pub struct GprHistoryResponse {
    pub gpr: Vec<GprEntry>,
}

#[derive(Debug, Serialize)]
pub struct GprEntry {
    pub date: NaiveDate,
    pub score: i64,
    pub top_keywords: Vec<String>,
    pub article_count: u32,
}

fn category_names() -> BTreeMap<String, String> {
    Category::ALL
        .iter()
        .map(|c| (c.key().to_string(), c.to_string()))
        .collect()
}

async fn analyses(store: &Store, days: i64) -> Vec<DayAnalysis> {
    match store.get_recent_briefings(days).await {
        Ok(briefings) => briefings
            .into_iter()
            .map(|b| DayAnalysis {
                date: b.date,
                executive_summary: b.executive_summary,
                source: b.source.as_str().to_string(),
                gpr_index: b.gpr_index,
                market_sentiment: b.market_sentiment,
                top_clusters: b.top_clusters,
            })
            .collect(),
        Err(e) => {
            warn!(error = %e, "Briefing query failed");
            Vec::new()
        }
    }
}

async fn sentiment_points(store: &Store, days: i64) -> Vec<SentimentPoint> {
    match store.get_sentiment_history(days).await {
        Ok(points) => points
            .into_iter()
            .map(|(date, avg_sentiment)| SentimentPoint {
                date,
                avg_sentiment,
            })
            .collect(),
        Err(e) => {
            warn!(error = %e, "Sentiment history query failed");
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /news — the daily feed, newest first.
pub async fn news(State(state): State<AppState>) -> Json<NewsFeed> {
    match build_feed(&state.store, NEWS_DAYS).await {
        Ok(feed) => Json(feed),
        Err(e) => {
            warn!(error = %e, "Feed assembly failed");
            Json(NewsFeed {
                news: Vec::new(),
                visible: true,
            })
        }
    }
}

/// GET /news/{date} — a single day or 404.
pub async fn news_by_date(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<FeedDay>, StatusCode> {
    let date: NaiveDate = date.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    let feed = build_feed(&state.store, NEWS_DAYS)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    feed.news
        .into_iter()
        .find(|d| d.date == date)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// POST /news/refresh — one synchronous pipeline run.
pub async fn refresh(State(state): State<AppState>) -> Json<RefreshResponse> {
    match state.orchestrator.run(None).await {
        Ok(report) => Json(RefreshResponse {
            success: true,
            message: format!(
                "Fetched {} articles, {} clusters, briefing via {}",
                report.articles_ingested,
                report.cluster_count,
                report.briefing_source.map_or("-", |s| s.as_str()),
            ),
            fetched_dates: vec![report.date],
        }),
        Err(e) => Json(RefreshResponse {
            success: false,
            message: e.to_string(),
            fetched_dates: Vec::new(),
        }),
    }
}

/// GET /market-terminal?days=N (N ≤ 30).
pub async fn market_terminal(
    State(state): State<AppState>,
    Query(query): Query<DaysQuery>,
) -> Json<TerminalResponse> {
    let days = clamp_days(query.days, TERMINAL_MAX_DAYS);
    Json(TerminalResponse {
        analyses: analyses(&state.store, days).await,
        sentiment_history: sentiment_points(&state.store, days).await,
        category_names: category_names(),
    })
}

/// GET /market-terminal/latest — last day's briefing plus history.
pub async fn market_terminal_latest(State(state): State<AppState>) -> Json<LatestResponse> {
    let mut latest = analyses(&state.store, 1).await;
    Json(LatestResponse {
        analysis: latest.pop(),
        sentiment_history: sentiment_points(&state.store, TERMINAL_MAX_DAYS).await,
    })
}

/// GET /market-terminal/sentiment?days=N (N ≤ 90).
pub async fn sentiment_history(
    State(state): State<AppState>,
    Query(query): Query<DaysQuery>,
) -> Json<Vec<SentimentPoint>> {
    let days = clamp_days(query.days, SENTIMENT_MAX_DAYS);
    Json(sentiment_points(&state.store, days).await)
}

/// GET /market-terminal/history?days=N (N ≤ 30) — GPR index history.
pub async fn gpr_history(
    State(state): State<AppState>,
    Query(query): Query<DaysQuery>,
) -> Json<GprHistoryResponse> {
    let days = clamp_days(query.days, TERMINAL_MAX_DAYS);
    let gpr = match state.store.get_gpr_history(days).await {
        Ok(points) => points
            .into_iter()
            .map(|p| GprEntry {
                date: p.date,
                score: p.score,
                top_keywords: p.top_keywords,
                article_count: p.article_count,
            })
            .collect(),
        Err(e) => {
            warn!(error = %e, "GPR history query failed");
            Vec::new()
        }
    };
    Json(GprHistoryResponse { gpr })
}

/// GET /health — pipeline health rollup.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthRollup>, StatusCode> {
    state
        .store
        .get_health_rollup()
        .await
        .map(Json)
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
