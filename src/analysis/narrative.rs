//! Narrative threading.
//!
//! Links today's clusters to the last seven days' clusters by entity and
//! keyword overlap, extending active threads or opening new two-node
//! ones. Sentiment drift along a thread's arc classifies escalation
//! (negative drift = tension rising). Threads idle for five days resolve
//! and never reactivate.

use anyhow::Result;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::storage::Store;
use crate::types::{Cluster, EnrichedArticle, Escalation, NarrativeThread, ThreadStatus};

/// Days of cluster history examined for matches.
const HISTORY_DAYS: i64 = 7;

/// A thread older than this cannot be extended.
const MAX_EXTEND_AGE_DAYS: i64 = 14;

/// Idle days after which an active thread resolves.
const STALE_AFTER_DAYS: i64 = 5;

/// Admission gates.
const MIN_ENTITY_OVERLAP: usize = 2;
const MIN_KEYWORD_OVERLAP: usize = 2;
const MAX_SENTIMENT_GAP: f64 = 80.0;
const MIN_MATCH_SCORE: f64 = 10.0;

/// Escalation thresholds on arc drift.
const ESCALATION_BAND: f64 = 10.0;

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Entities of a cluster: union of its members' entity buckets,
/// lowercased.
fn cluster_entities(cluster: &Cluster, articles: &[EnrichedArticle]) -> HashSet<String> {
    let member_set: HashSet<&str> = cluster.member_ids.iter().map(|s| s.as_str()).collect();
    let mut out = HashSet::new();
    for article in articles {
        if !member_set.contains(article.raw.id.as_str()) {
            continue;
        }
        for (entity, _) in article.entities.all() {
            out.insert(entity.to_lowercase());
        }
    }
    out
}

fn overlap(a: &HashSet<String>, b: &HashSet<String>) -> usize {
    a.intersection(b).count()
}

/// Candidate score: `3·entity_overlap + 2·keyword_overlap +
/// 2·category_match_bit`.
fn match_score(entity_overlap: usize, keyword_overlap: usize, category_match: bool) -> f64 {
    3.0 * entity_overlap as f64
        + 2.0 * keyword_overlap as f64
        + if category_match { 2.0 } else { 0.0 }
}

struct Candidate<'a> {
    historical: &'a Cluster,
    score: f64,
    entities: HashSet<String>,
}

/// Best admissible historical match for a today-cluster, if any.
fn best_match<'a>(
    today: &Cluster,
    today_entities: &HashSet<String>,
    history: &'a [(Cluster, HashSet<String>)],
) -> Option<Candidate<'a>> {
    let today_keywords: HashSet<String> =
        today.keywords.iter().map(|k| k.to_lowercase()).collect();

    let mut best: Option<Candidate<'a>> = None;
    for (historical, hist_entities) in history {
        let entity_overlap = overlap(today_entities, hist_entities);
        let hist_keywords: HashSet<String> =
            historical.keywords.iter().map(|k| k.to_lowercase()).collect();
        let keyword_overlap = today_keywords.intersection(&hist_keywords).count();
        let category_match = today
            .categories
            .iter()
            .any(|c| historical.categories.contains(c));

        // Either overlap signal clears its own bar; the score floor
        // below rejects weak combinations.
        if entity_overlap < MIN_ENTITY_OVERLAP && keyword_overlap < MIN_KEYWORD_OVERLAP {
            continue;
        }
        if !category_match {
            continue;
        }
        if (today.aggregate_sentiment - historical.aggregate_sentiment).abs() > MAX_SENTIMENT_GAP {
            continue;
        }
        let score = match_score(entity_overlap, keyword_overlap, category_match);
        if score < MIN_MATCH_SCORE {
            continue;
        }

        let better = best.as_ref().map(|b| score > b.score).unwrap_or(true);
        if better {
            best = Some(Candidate {
                historical,
                score,
                entities: hist_entities.clone(),
            });
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Escalation
// ---------------------------------------------------------------------------

/// Classify escalation from the sentiment arc: `diff = last − first`;
/// below −10 rising, above +10 declining, otherwise stable.
pub fn classify_escalation(arc: &[f64]) -> Escalation {
    if arc.len() < 2 {
        return Escalation::Stable;
    }
    let diff = arc[arc.len() - 1] - arc[0];
    if diff < -ESCALATION_BAND {
        Escalation::Rising
    } else if diff > ESCALATION_BAND {
        Escalation::Declining
    } else {
        Escalation::Stable
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct NarrativeEngine {
    store: Arc<Store>,
}

/// Outcome of one narrative pass.
#[derive(Debug, Default)]
pub struct NarrativeOutcome {
    pub extended: usize,
    pub created: usize,
    pub resolved: usize,
}

impl NarrativeEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Run threading for `today`. Serial per today-cluster, so two
    /// clusters cannot both extend the same thread in one run.
    pub async fn run(
        &self,
        today: NaiveDate,
        today_clusters: &[Cluster],
        today_articles: &[EnrichedArticle],
    ) -> Result<NarrativeOutcome> {
        let mut outcome = NarrativeOutcome::default();

        // Resolve stale threads first so they drop out of the candidate
        // set for this run.
        let mut active = self
            .store
            .get_narrative_threads(HISTORY_DAYS + MAX_EXTEND_AGE_DAYS, Some(ThreadStatus::Active))
            .await?;
        let mut to_save: Vec<NarrativeThread> = Vec::new();
        active.retain_mut(|thread| {
            if thread.idle_days(today) >= STALE_AFTER_DAYS {
                thread.status = ThreadStatus::Resolved;
                to_save.push(thread.clone());
                outcome.resolved += 1;
                false
            } else {
                true
            }
        });

        // Historical member lists are not persisted on the cluster row;
        // entity state is rebuilt from the stored member relation.
        let history_clusters = self.store.get_recent_clusters(HISTORY_DAYS, today).await?;
        let mut history: Vec<(Cluster, HashSet<String>)> =
            Vec::with_capacity(history_clusters.len());
        for cluster in history_clusters {
            let mut entities = HashSet::new();
            for member in self.store.get_cluster_members(&cluster.id).await? {
                for (entity, _) in member.entities.all() {
                    entities.insert(entity.to_lowercase());
                }
            }
            history.push((cluster, entities));
        }

        // Threads already extended this run cannot be extended twice.
        let mut claimed: HashSet<String> = HashSet::new();

        for cluster in today_clusters {
            let today_entities = cluster_entities(cluster, today_articles);
            let Some(candidate) = best_match(cluster, &today_entities, &history) else {
                continue;
            };

            // A matched historical cluster may already sit inside an
            // active thread; extend it when young enough.
            let existing = active.iter_mut().find(|t| {
                t.cluster_ids.contains(&candidate.historical.id) && !claimed.contains(&t.id)
            });

            match existing {
                Some(thread) if thread.age_days(today) <= MAX_EXTEND_AGE_DAYS => {
                    extend_thread(thread, cluster, &today_entities, today);
                    claimed.insert(thread.id.clone());
                    to_save.push(thread.clone());
                    outcome.extended += 1;
                    debug!(thread = %thread.id, cluster = %cluster.id, "Thread extended");
                }
                _ => {
                    let thread = open_thread(
                        candidate.historical,
                        cluster,
                        &candidate.entities,
                        &today_entities,
                        today,
                    );
                    debug!(thread = %thread.id, "Thread opened");
                    claimed.insert(thread.id.clone());
                    to_save.push(thread);
                    outcome.created += 1;
                }
            }
        }

        self.store.save_narrative_threads(&to_save).await?;
        info!(
            extended = outcome.extended,
            created = outcome.created,
            resolved = outcome.resolved,
            "Narrative pass complete"
        );
        Ok(outcome)
    }
}

/// Append today's cluster to an existing thread.
fn extend_thread(
    thread: &mut NarrativeThread,
    cluster: &Cluster,
    today_entities: &HashSet<String>,
    today: NaiveDate,
) {
    thread.cluster_ids.push(cluster.id.clone());
    thread.last_seen = today;
    thread.duration_days = (thread.last_seen - thread.first_seen).num_days();
    thread.sentiment_arc.push(cluster.aggregate_sentiment);

    let mut merged: HashSet<String> = thread.entities.iter().map(|e| e.to_lowercase()).collect();
    merged.extend(today_entities.iter().cloned());
    let mut entities: Vec<String> = merged
        .into_iter()
        .map(|e| crate::enrich::entities::title_case(&e))
        .collect();
    entities.sort();
    thread.entities = entities;

    thread.title = format!("{} ({} days developing)", cluster.topic, thread.duration_days);
    thread.escalation = classify_escalation(&thread.sentiment_arc);
}

/// Open a new two-node thread from a historical cluster and today's.
fn open_thread(
    historical: &Cluster,
    today_cluster: &Cluster,
    historical_entities: &HashSet<String>,
    today_entities: &HashSet<String>,
    today: NaiveDate,
) -> NarrativeThread {
    let first_seen = historical.date;
    let duration_days = (today - first_seen).num_days();
    let arc = vec![historical.aggregate_sentiment, today_cluster.aggregate_sentiment];

    let mut merged: HashSet<String> = historical_entities.clone();
    merged.extend(today_entities.iter().cloned());
    let mut entities: Vec<String> = merged
        .into_iter()
        .map(|e| crate::enrich::entities::title_case(&e))
        .collect();
    entities.sort();

    NarrativeThread {
        id: uuid::Uuid::new_v4().to_string(),
        title: format!("{} ({duration_days} days developing)", today_cluster.topic),
        first_seen,
        last_seen: today,
        duration_days,
        cluster_ids: vec![historical.id.clone(), today_cluster.id.clone()],
        sentiment_arc: arc.clone(),
        entities,
        escalation: classify_escalation(&arc),
        status: ThreadStatus::Active,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, ConfidenceTier};

    fn cluster(
        id: &str,
        date: NaiveDate,
        keywords: &[&str],
        category: Category,
        sentiment: f64,
    ) -> Cluster {
        Cluster {
            id: id.to_string(),
            date,
            topic: format!("Trends in {}", keywords.first().unwrap_or(&"Other")),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            article_count: 2,
            aggregate_sentiment: sentiment,
            aggregate_impact: 50.0,
            categories: vec![category],
            earliest: date,
            latest: date,
            unique_sources: 2,
            confidence_tier: ConfidenceTier::Medium,
            confidence_score: 35,
            member_ids: vec![],
        }
    }

    fn entities(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_lowercase()).collect()
    }

    #[test]
    fn test_match_score_formula() {
        assert_eq!(match_score(2, 2, true), 12.0);
        assert_eq!(match_score(3, 2, false), 13.0);
        assert_eq!(match_score(0, 0, true), 2.0);
    }

    #[test]
    fn test_escalation_classification() {
        assert_eq!(classify_escalation(&[-30.0, -60.0]), Escalation::Rising);
        assert_eq!(classify_escalation(&[-30.0, 20.0]), Escalation::Declining);
        assert_eq!(classify_escalation(&[-30.0, -35.0]), Escalation::Stable);
        assert_eq!(classify_escalation(&[10.0]), Escalation::Stable);
        assert_eq!(classify_escalation(&[]), Escalation::Stable);
    }

    #[test]
    fn test_best_match_gates() {
        let d1 = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let today_cluster = cluster(
            "today",
            NaiveDate::from_ymd_opt(2026, 7, 3).unwrap(),
            &["chip", "sanctions"],
            Category::Semiconductor,
            -60.0,
        );
        let today_entities = entities(&["nvidia", "tsmc", "china"]);

        // One entity + one keyword overlap clears neither bar → no match.
        let weak = cluster("h1", d1, &["chip", "export"], Category::Semiconductor, -30.0);
        let history = vec![(weak, entities(&["nvidia", "intel", "korea"]))];
        assert!(best_match(&today_cluster, &today_entities, &history).is_none());

        // Two shared keywords but zero shared entities: keyword bar
        // clears, score 2·2 + 2 = 6 < 10 → rejected on the floor.
        let low_score = cluster("h2", d1, &["chip", "sanctions"], Category::Semiconductor, -30.0);
        let history = vec![(low_score, entities(&["intel", "korea"]))];
        assert!(best_match(&today_cluster, &today_entities, &history).is_none());

        // Two shared entities, one shared keyword: 3·2 + 2·1 + 2 = 10 →
        // admitted at the floor (the multi-day story case).
        let strong = cluster("h3", d1, &["chip", "export"], Category::Semiconductor, -30.0);
        let history = vec![(strong, entities(&["nvidia", "tsmc", "taiwan"]))];
        let m = best_match(&today_cluster, &today_entities, &history).unwrap();
        assert_eq!(m.historical.id, "h3");
        assert_eq!(m.score, 10.0);
    }

    #[test]
    fn test_best_match_rejects_category_and_sentiment_gap() {
        let d1 = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let today_cluster = cluster(
            "today",
            NaiveDate::from_ymd_opt(2026, 7, 3).unwrap(),
            &["chip", "sanctions"],
            Category::Semiconductor,
            -60.0,
        );
        let today_entities = entities(&["nvidia", "tsmc"]);

        // Wrong category.
        let wrong_cat = cluster("h1", d1, &["chip", "sanctions"], Category::Cybersecurity, -30.0);
        let history = vec![(wrong_cat, entities(&["nvidia", "tsmc"]))];
        assert!(best_match(&today_cluster, &today_entities, &history).is_none());

        // Sentiment gap > 80.
        let too_far = cluster("h2", d1, &["chip", "sanctions"], Category::Semiconductor, 40.0);
        let history = vec![(too_far, entities(&["nvidia", "tsmc"]))];
        assert!(best_match(&today_cluster, &today_entities, &history).is_none());
    }

    #[test]
    fn test_open_thread_shape() {
        // A chip-export story surfacing on day 1 and again on day 3.
        let d1 = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let d3 = NaiveDate::from_ymd_opt(2026, 7, 3).unwrap();
        let a = cluster("a", d1, &["chip", "export"], Category::Semiconductor, -30.0);
        let b = cluster("b", d3, &["chip", "sanctions"], Category::Semiconductor, -60.0);

        let thread = open_thread(
            &a,
            &b,
            &entities(&["nvidia", "taiwan", "tsmc"]),
            &entities(&["nvidia", "tsmc", "china"]),
            d3,
        );
        assert_eq!(thread.first_seen, d1);
        assert_eq!(thread.last_seen, d3);
        assert_eq!(thread.duration_days, 2);
        assert_eq!(thread.cluster_ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(thread.sentiment_arc, vec![-30.0, -60.0]);
        // Δ = −30 → rising tension.
        assert_eq!(thread.escalation, Escalation::Rising);
        assert_eq!(thread.status, ThreadStatus::Active);
        // Merged entity set.
        assert!(thread.entities.iter().any(|e| e == "China"));
        assert!(thread.entities.iter().any(|e| e == "Taiwan"));
    }

    #[test]
    fn test_extend_thread_updates_invariants() {
        let d1 = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let d3 = NaiveDate::from_ymd_opt(2026, 7, 3).unwrap();
        let d5 = NaiveDate::from_ymd_opt(2026, 7, 5).unwrap();
        let a = cluster("a", d1, &["chip", "export"], Category::Semiconductor, -30.0);
        let b = cluster("b", d3, &["chip", "sanctions"], Category::Semiconductor, -60.0);
        let mut thread = open_thread(&a, &b, &entities(&["nvidia"]), &entities(&["tsmc"]), d3);

        let c = cluster("c", d5, &["chip", "sanctions"], Category::Semiconductor, -20.0);
        extend_thread(&mut thread, &c, &entities(&["nvidia", "china"]), d5);

        assert_eq!(thread.cluster_ids.len(), 3);
        assert_eq!(thread.sentiment_arc.len(), 3);
        assert_eq!(thread.duration_days, 4);
        assert_eq!(thread.last_seen, d5);
        assert!(thread.title.contains("4 days developing"));
        // diff = −20 − (−30) = 10 → stable band.
        assert_eq!(thread.escalation, Escalation::Stable);
    }

    #[tokio::test]
    async fn test_stale_threads_resolve() {
        let store = Arc::new(Store::open_in_memory().await.unwrap());
        let today = chrono::Utc::now().date_naive();
        let stale = NarrativeThread {
            id: "t-stale".to_string(),
            title: "Old story (3 days developing)".to_string(),
            first_seen: today - chrono::Duration::days(9),
            last_seen: today - chrono::Duration::days(6),
            duration_days: 3,
            cluster_ids: vec!["x".into(), "y".into()],
            sentiment_arc: vec![-10.0, -20.0],
            entities: vec!["Nvidia".into()],
            escalation: Escalation::Stable,
            status: ThreadStatus::Active,
        };
        store.save_narrative_threads(&[stale]).await.unwrap();

        let engine = NarrativeEngine::new(store.clone());
        let outcome = engine.run(today, &[], &[]).await.unwrap();
        assert_eq!(outcome.resolved, 1);

        let resolved = store
            .get_narrative_threads(30, Some(ThreadStatus::Resolved))
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, "t-stale");
        // No active threads remain as candidates.
        let active = store
            .get_narrative_threads(30, Some(ThreadStatus::Active))
            .await
            .unwrap();
        assert!(active.is_empty());
    }
}
