//! ARGUS — Market Intelligence Pipeline
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the pipeline components, spawns the dashboard, and enters the
//! scheduled run loop with graceful shutdown on Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use argus::analysis::clustering::ClusterEngine;
use argus::analysis::narrative::NarrativeEngine;
use argus::config::AppConfig;
use argus::dashboard;
use argus::dashboard::routes::DashboardState;
use argus::engine::collector::Collector;
use argus::engine::orchestrator::Orchestrator;
use argus::engine::synthesis::Synthesizer;
use argus::enrich::Enricher;
use argus::llm::gemini::GeminiClient;
use argus::providers::gdelt::GdeltProvider;
use argus::providers::newsapi::NewsApiProvider;
use argus::providers::rss::RssProvider;
use argus::providers::ArticleProvider;
use argus::storage::Store;
use argus::validation;

const BANNER: &str = r#"
    _    ____   ____ _   _ ____
   / \  |  _ \ / ___| | | / ___|
  / _ \ | |_) | |  _| | | \___ \
 / ___ \|  _ <| |_| | |_| |___) |
/_/   \_\_| \_\\____|\___/|____/

  Aggregated Risk & Geopolitical Understanding System
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;
    init_logging();

    println!("{BANNER}");
    info!(
        pipeline = %cfg.pipeline.name,
        interval_hours = cfg.pipeline.interval_hours,
        providers = ?cfg.providers.order,
        "ARGUS starting up"
    );

    let store = Arc::new(
        Store::open(&AppConfig::db_path())
            .await
            .context("Failed to open the store")?,
    );

    let orchestrator = Arc::new(build_orchestrator(&cfg, store.clone())?);

    // Dashboard runs for the life of the process.
    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState {
            store: store.clone(),
            orchestrator: orchestrator.clone(),
        });
        let port = cfg.dashboard.port;
        tokio::spawn(async move {
            if let Err(e) = dashboard::serve(state, port).await {
                error!(error = %e, "Dashboard exited");
            }
        });
    }

    // One run at startup, then on the fixed interval.
    run_once(&orchestrator, &store, &cfg).await;

    let mut interval =
        tokio::time::interval(Duration::from_secs(cfg.pipeline.interval_hours * 3600));
    interval.tick().await; // the startup run covered the first tick
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        "Entering scheduler loop (every {}h). Press Ctrl+C to stop.",
        cfg.pipeline.interval_hours
    );
    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_once(&orchestrator, &store, &cfg).await;
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received, exiting gracefully");
                break;
            }
        }
    }

    info!("ARGUS shut down cleanly.");
    Ok(())
}

fn build_orchestrator(cfg: &AppConfig, store: Arc<Store>) -> Result<Orchestrator> {
    let mut providers: Vec<Arc<dyn ArticleProvider>> = Vec::new();
    for name in &cfg.providers.order {
        match name.as_str() {
            "newsapi" if cfg.providers.newsapi.enabled => {
                let keys = AppConfig::key_pool(&cfg.providers.newsapi.api_key_env);
                if keys.is_empty() {
                    warn!("No NewsAPI keys in the environment; adapter will report unavailable");
                }
                providers.push(Arc::new(NewsApiProvider::new(keys)?));
            }
            "rss" if cfg.providers.rss.enabled => {
                providers.push(Arc::new(RssProvider::new()?));
            }
            "gdelt" if cfg.providers.gdelt.enabled => {
                providers.push(Arc::new(GdeltProvider::new()?));
            }
            other => warn!(provider = other, "Provider disabled or unknown, skipping"),
        }
    }

    let gemini = GeminiClient::new(
        AppConfig::key_pool(&cfg.llm.api_key_env),
        cfg.llm.model.clone(),
        cfg.llm.max_output_tokens,
    )?;
    if !gemini.has_keys() {
        warn!("No LLM keys in the environment; briefings will use the local fallback");
    }

    Ok(Orchestrator::new(
        store.clone(),
        Collector::new(providers, store.clone()),
        Enricher::new(store.clone(), cfg.models.sentiment_url.clone()),
        ClusterEngine::new(store.clone(), cfg.models.embedding_url.clone()),
        NarrativeEngine::new(store.clone()),
        Synthesizer::new(store, Arc::new(gemini)),
        AppConfig::feed_path(),
        cfg.pipeline.lookback_days,
        cfg.pipeline.max_articles_per_provider,
    ))
}

async fn run_once(orchestrator: &Arc<Orchestrator>, store: &Arc<Store>, cfg: &AppConfig) {
    match orchestrator.run(None).await {
        Ok(report) => info!("{report}"),
        Err(e) => error!(error = %e, "Pipeline run failed"),
    }
    // Validation is best-effort and never blocks the schedule.
    if let Err(e) = validation::run_validation(store, &cfg.validation).await {
        warn!(error = %e, "Validation pass failed");
    }
}

/// Initialise the `tracing` subscriber.
///
/// - In development (RUST_LOG set), uses human-readable format.
/// - With ARGUS_LOG_JSON set, uses structured JSON logging to stdout.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("argus=info"));

    if std::env::var("ARGUS_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
