//! End-to-end acceptance scenarios.

use chrono::{Duration, Utc};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use argus::analysis::anomaly;
use argus::analysis::clustering::ClusterEngine;
use argus::analysis::narrative::NarrativeEngine;
use argus::engine::collector::Collector;
use argus::engine::orchestrator::Orchestrator;
use argus::engine::synthesis::Synthesizer;
use argus::enrich::Enricher;
use argus::llm::BriefingGenerator;
use argus::providers::newsapi::NewsApiProvider;
use argus::providers::ArticleProvider;
use argus::storage::Store;
use argus::types::{
    BriefingSource, Category, Cluster, ConfidenceTier, EnrichedArticle, Escalation, RawArticle,
    Sentiment, SentimentLabel, SentimentMethod, ThreadStatus,
};

use crate::mock_provider::{article, MockLlm, MockProvider};

fn build_orchestrator(
    store: Arc<Store>,
    providers: Vec<Arc<dyn ArticleProvider>>,
    llm: Arc<dyn BriefingGenerator>,
    feed_dir: &std::path::Path,
    sentiment_url: Option<String>,
) -> Orchestrator {
    Orchestrator::new(
        store.clone(),
        Collector::new(providers, store.clone()),
        Enricher::new(store.clone(), sentiment_url),
        ClusterEngine::new(store.clone(), None),
        NarrativeEngine::new(store.clone()),
        Synthesizer::new(store, llm),
        feed_dir.join("news_feed.json"),
        2,
        100,
    )
}

fn ai_compute_articles() -> Vec<RawArticle> {
    let now = Utc::now();
    vec![
        article(
            "https://example.com/nvda",
            "NVIDIA beats earnings estimates",
            "Record results lift the GPU market",
            Category::AiComputeInfra,
            "Reuters",
            now,
        ),
        article(
            "https://example.com/amd",
            "AMD warns of GPU shortage",
            "Supply decline weighs on the GPU market",
            Category::AiComputeInfra,
            "Bloomberg",
            now,
        ),
        article(
            "https://example.com/intc",
            "Intel announces layoffs",
            "Cuts hit the GPU market division",
            Category::AiComputeInfra,
            "CNBC",
            now,
        ),
    ]
}

// ---------------------------------------------------------------------------
// S1 — happy path with briefing idempotence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s1_happy_path_and_briefing_idempotence() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open_in_memory().await.unwrap());
    let (llm, calls) = MockLlm::new();
    let provider: Arc<dyn ArticleProvider> =
        Arc::new(MockProvider::with_articles("mock", ai_compute_articles()));
    let orch = build_orchestrator(store.clone(), vec![provider], llm, dir.path(), None);

    let first = orch.run(None).await.unwrap();
    assert_eq!(first.articles_ingested, 3);
    assert_eq!(first.articles_enriched, 3);
    assert!(first.cluster_count >= 1 && first.cluster_count <= 2);
    assert_eq!(first.briefing_source, Some(BriefingSource::Llm));

    // No geopolitical keywords → GPR small.
    let gpr = store.get_gpr_history(1).await.unwrap();
    assert!(gpr[0].score <= 10);

    // Two negative headlines vs one mildly positive → negative day.
    let briefing = store.get_briefing(first.date).await.unwrap().unwrap();
    assert!(briefing.market_sentiment < 0.0);

    // Second run on the identical enriched set: cache hit, still
    // sourced llm, no additional LLM call, identical prose.
    let second = orch.run(None).await.unwrap();
    assert_eq!(second.briefing_source, Some(BriefingSource::Llm));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let briefing2 = store.get_briefing(second.date).await.unwrap().unwrap();
    assert_eq!(briefing.executive_summary, briefing2.executive_summary);
}

// ---------------------------------------------------------------------------
// S2 — rate-limit failover across the key pool
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s2_key_pool_failover_semantics() {
    let provider = NewsApiProvider::new(vec!["key-1".into(), "key-2".into()]).unwrap();

    // Key 1 gets marked (what a 429 or a body signal does).
    provider.pool().mark_limited(0);

    // The same request path now lands on key 2, repeatedly.
    for _ in 0..3 {
        let (idx, key) = provider.pool().next_key().unwrap();
        assert_eq!(idx, 1);
        assert_eq!(key, "key-2");
    }

    // Adapter still reports available with one usable key.
    assert!(provider.is_available());
    let status = provider.rate_limit_status();
    assert_eq!(status.remaining, Some(1));
    assert!(!status.limited);

    // Exhausting the pool flips the limited flag.
    provider.pool().mark_limited(1);
    assert!(provider.rate_limit_status().limited);
    assert!(!provider.is_available());
}

#[tokio::test]
async fn s2_no_duplicate_rows_across_providers() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open_in_memory().await.unwrap());
    let (llm, _calls) = MockLlm::new();
    let now = Utc::now();

    let shared = article(
        "https://example.com/shared",
        "TSMC expands Arizona fab capacity",
        "Construction accelerates",
        Category::Semiconductor,
        "Reuters",
        now,
    );
    let p1: Arc<dyn ArticleProvider> =
        Arc::new(MockProvider::with_articles("newsapi", vec![shared.clone()]));
    let p2: Arc<dyn ArticleProvider> =
        Arc::new(MockProvider::with_articles("rss", vec![shared]));
    let orch = build_orchestrator(store.clone(), vec![p1, p2], llm, dir.path(), None);

    orch.run(None).await.unwrap();
    assert_eq!(store.count_raw_articles().await.unwrap(), 1);
    let row = store
        .get_raw_article_by_url("https://example.com/shared")
        .await
        .unwrap()
        .unwrap();
    // First provider in configured order wins.
    assert_eq!(row.provider, "newsapi");
}

// ---------------------------------------------------------------------------
// S3 — transformer absent, lexicon end-to-end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s3_model_absent_run_succeeds_on_lexicon() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open_in_memory().await.unwrap());
    let (llm, _calls) = MockLlm::new();
    let provider: Arc<dyn ArticleProvider> =
        Arc::new(MockProvider::with_articles("mock", ai_compute_articles()));
    // Nothing listens on this port: the transformer init fails and the
    // lexicon path is sticky.
    let orch = build_orchestrator(
        store.clone(),
        vec![provider],
        llm,
        dir.path(),
        Some("http://127.0.0.1:1".to_string()),
    );

    let report = orch.run(None).await.unwrap();
    assert_eq!(report.articles_enriched, 3);
    assert_eq!(report.briefing_source, Some(BriefingSource::Llm));

    let enriched = store.get_enriched_by_date(report.date).await.unwrap();
    assert_eq!(enriched.len(), 3);
    for e in &enriched {
        assert_eq!(e.sentiment.method, SentimentMethod::Lexicon);
    }
}

// ---------------------------------------------------------------------------
// LLM failure — deterministic fallback, cached like any briefing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn llm_failure_produces_cached_local_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open_in_memory().await.unwrap());
    let llm = MockLlm::failing();
    let calls = llm.calls.clone();
    let provider: Arc<dyn ArticleProvider> =
        Arc::new(MockProvider::with_articles("mock", ai_compute_articles()));
    let orch = build_orchestrator(store.clone(), vec![provider], llm, dir.path(), None);

    let first = orch.run(None).await.unwrap();
    assert_eq!(first.briefing_source, Some(BriefingSource::LocalFallback));
    let briefing = store.get_briefing(first.date).await.unwrap().unwrap();
    assert!(briefing
        .executive_summary
        .starts_with("Daily Market Intelligence Report."));

    // The fallback was cached: the failing LLM is not retried on the
    // same inputs.
    let second = orch.run(None).await.unwrap();
    assert_eq!(second.briefing_source, Some(BriefingSource::LocalFallback));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// S4 — narrative extension across days
// ---------------------------------------------------------------------------

fn enriched_member(
    url: &str,
    title: &str,
    category: Category,
    normalized: i64,
    orgs: &[&str],
    places: &[&str],
    published_at: chrono::DateTime<Utc>,
    cluster_id: Option<&str>,
) -> EnrichedArticle {
    let raw = article(url, title, "", category, "Reuters", published_at);
    EnrichedArticle {
        raw,
        sentiment: Sentiment {
            score: normalized as f64 / 100.0,
            normalized_score: normalized,
            confidence: 0.8,
            label: SentimentLabel::Negative,
            method: SentimentMethod::Lexicon,
        },
        impact_score: 60,
        geo_tags: vec![],
        topics: vec![],
        entities: argus::types::EntitySet {
            people: vec![],
            organizations: orgs.iter().map(|s| s.to_string()).collect(),
            places: places.iter().map(|s| s.to_string()).collect(),
            topics: vec![],
        },
        cluster_id: cluster_id.map(String::from),
    }
}

fn cluster_fixture(
    id: &str,
    date: chrono::NaiveDate,
    keywords: &[&str],
    sentiment: f64,
    member_ids: Vec<String>,
) -> Cluster {
    Cluster {
        id: id.to_string(),
        date,
        topic: format!("Trends in {}", keywords[0]),
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
        article_count: member_ids.len() as u32,
        aggregate_sentiment: sentiment,
        aggregate_impact: 55.0,
        categories: vec![Category::Semiconductor],
        earliest: date,
        latest: date,
        unique_sources: 2,
        confidence_tier: ConfidenceTier::Medium,
        confidence_score: 35,
        member_ids,
    }
}

#[tokio::test]
async fn s4_thread_created_with_rising_escalation() {
    let store = Arc::new(Store::open_in_memory().await.unwrap());
    let today = Utc::now().date_naive();
    let day1 = today - Duration::days(2);
    let day1_ts = Utc::now() - Duration::days(2);

    // Day-1 cluster A persisted with members carrying NVIDIA/Taiwan/TSMC.
    let a1 = enriched_member(
        "https://e.com/a1",
        "Chip export rules tighten",
        Category::Semiconductor,
        -30,
        &["Nvidia", "Tsmc"],
        &["Taiwan"],
        day1_ts,
        Some("cluster-a"),
    );
    let a2 = enriched_member(
        "https://e.com/a2",
        "Export controls rattle chip supply",
        Category::Semiconductor,
        -30,
        &["Nvidia"],
        &["Taiwan"],
        day1_ts,
        Some("cluster-a"),
    );
    store
        .save_raw_articles(&[a1.raw.clone(), a2.raw.clone()])
        .await
        .unwrap();
    store.save_enriched_articles(&[a1, a2]).await.unwrap();
    let cluster_a = cluster_fixture(
        "cluster-a",
        day1,
        &["chip", "export"],
        -30.0,
        vec!["x".into()],
    );
    store.save_clusters(&[cluster_a]).await.unwrap();

    // Day-3 cluster B with NVIDIA/TSMC/China members.
    let b1 = enriched_member(
        "https://e.com/b1",
        "Sanctions hit chip exports to China",
        Category::Semiconductor,
        -60,
        &["Nvidia", "Tsmc"],
        &["China"],
        Utc::now(),
        Some("cluster-b"),
    );
    let b2 = enriched_member(
        "https://e.com/b2",
        "Chip sanctions broaden",
        Category::Semiconductor,
        -60,
        &["Tsmc"],
        &["China"],
        Utc::now(),
        Some("cluster-b"),
    );
    let today_articles = vec![b1.clone(), b2.clone()];
    let cluster_b = cluster_fixture(
        "cluster-b",
        today,
        &["chip", "sanctions"],
        -60.0,
        vec![b1.raw.id.clone(), b2.raw.id.clone()],
    );

    let engine = NarrativeEngine::new(store.clone());
    let outcome = engine
        .run(today, &[cluster_b], &today_articles)
        .await
        .unwrap();
    assert_eq!(outcome.created, 1);

    let threads = store
        .get_narrative_threads(30, Some(ThreadStatus::Active))
        .await
        .unwrap();
    assert_eq!(threads.len(), 1);
    let t = &threads[0];
    assert_eq!(t.first_seen, day1);
    assert_eq!(t.last_seen, today);
    assert_eq!(t.duration_days, 2);
    assert_eq!(t.cluster_ids, vec!["cluster-a".to_string(), "cluster-b".to_string()]);
    // Δ = −60 − (−30) = −30 ≤ −10 → tension rising.
    assert_eq!(t.escalation, Escalation::Rising);
}

// ---------------------------------------------------------------------------
// S5 — stale threads resolve and leave the candidate set
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s5_stale_thread_resolves() {
    let store = Arc::new(Store::open_in_memory().await.unwrap());
    let today = Utc::now().date_naive();

    let thread = argus::types::NarrativeThread {
        id: "t1".to_string(),
        title: "Old chip story (4 days developing)".to_string(),
        first_seen: today - Duration::days(10),
        last_seen: today - Duration::days(6),
        duration_days: 4,
        cluster_ids: vec!["old-a".into(), "old-b".into()],
        sentiment_arc: vec![-20.0, -25.0],
        entities: vec!["Nvidia".into()],
        escalation: Escalation::Stable,
        status: ThreadStatus::Active,
    };
    store.save_narrative_threads(&[thread]).await.unwrap();

    let engine = NarrativeEngine::new(store.clone());
    let outcome = engine.run(today, &[], &[]).await.unwrap();
    assert_eq!(outcome.resolved, 1);

    let active = store
        .get_narrative_threads(30, Some(ThreadStatus::Active))
        .await
        .unwrap();
    assert!(active.is_empty());

    // A second pass finds nothing left to resolve.
    let outcome = engine.run(today, &[], &[]).await.unwrap();
    assert_eq!(outcome.resolved, 0);
}

// ---------------------------------------------------------------------------
// S6 — volume anomaly alert with the literal message
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s6_volume_anomaly_message() {
    let store = Arc::new(Store::open_in_memory().await.unwrap());
    let today = Utc::now().date_naive();

    // Seed the prior 7 days of cybersecurity volume.
    for (i, count) in [3u32, 2, 4, 3, 2, 3, 3].iter().enumerate() {
        store
            .save_daily_volume(today - Duration::days(7 - i as i64), Category::Cybersecurity, *count)
            .await
            .unwrap();
    }

    // Today: 12 cybersecurity articles.
    let now = Utc::now();
    let today_articles: Vec<EnrichedArticle> = (0..12)
        .map(|i| {
            enriched_member(
                &format!("https://e.com/cyber/{i}"),
                "Ransomware wave continues",
                Category::Cybersecurity,
                -20,
                &[],
                &[],
                now,
                None,
            )
        })
        .collect();

    let alerts = anomaly::run_detector(&store, today, &today_articles)
        .await
        .unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].message, "4.2x normal coverage on Cybersecurity");
    assert!(alerts[0].z_score > 2.0);
}
