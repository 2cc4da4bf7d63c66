//! Topic clustering.
//!
//! Primary path embeds `title + " " + description` through the shared
//! embedding engine and clusters greedily by cosine similarity. When
//! the engine is unavailable the TF-IDF + k-means fallback runs instead
//! (seeded, so assignments are deterministic for a fixed input).
//!
//! Singleton clusters are dropped; three or more singletons coalesce
//! into one "other" cluster. Results are persisted, cached on the
//! sorted article-id list, and returned ordered by aggregate impact.

use anyhow::Result;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::embedding::{cosine, EmbeddingEngine};
use crate::cache::{hash16, ClusterCache};
use crate::enrich::entities::{extract_keywords, title_case};
use crate::enrich::Enricher;
use crate::storage::Store;
use crate::types::{Category, Cluster, ConfidenceTier, EnrichedArticle};

/// Cosine admission threshold.
const SIM_THRESHOLD: f32 = 0.55;
/// Relaxed threshold for large batches.
const SIM_THRESHOLD_LARGE: f32 = 0.50;
/// Batch size above which the relaxed threshold applies.
const LARGE_BATCH: usize = 50;

/// Singletons needed before they coalesce into an "other" cluster.
const MIN_OTHER_SINGLETONS: usize = 3;

/// Maximum keywords kept per cluster.
const MAX_KEYWORDS: usize = 10;

/// Fixed seed for the k-means fallback.
const KMEANS_SEED: u64 = 42;
const KMEANS_ITERATIONS: usize = 20;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ClusterEngine {
    store: Arc<Store>,
    embedder: EmbeddingEngine,
}

impl ClusterEngine {
    pub fn new(store: Arc<Store>, embedding_url: Option<String>) -> Self {
        Self {
            store,
            embedder: EmbeddingEngine::new(embedding_url),
        }
    }

    /// Cluster today's enriched articles. Consults the cluster cache
    /// first; on a miss computes assignments, re-scores member impact
    /// with true cluster sizes, persists, and caches.
    pub async fn run(
        &self,
        enricher: &Enricher,
        articles: &mut Vec<EnrichedArticle>,
    ) -> Result<Vec<Cluster>> {
        if articles.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = articles.iter().map(|a| a.raw.id.clone()).collect();
        let cache = ClusterCache::new(&self.store);
        if let Some(cached) = cache.get(&ids).await {
            info!(clusters = cached.len(), "Cluster cache hit");
            return Ok(cached);
        }

        let assignments = self.assign(articles).await;

        // Materialize clusters from assignment groups.
        let mut groups: std::collections::BTreeMap<usize, Vec<usize>> = std::collections::BTreeMap::new();
        for (article_idx, group) in assignments.iter().enumerate() {
            // usize::MAX marks a dropped singleton.
            if *group != usize::MAX {
                groups.entry(*group).or_default().push(article_idx);
            }
        }

        let mut clusters = Vec::new();
        for (_, member_idxs) in groups {
            let mut cluster = build_cluster(articles, &member_idxs);
            for idx in &member_idxs {
                articles[*idx].cluster_id = Some(cluster.id.clone());
            }
            // True member count is known now; re-score impact.
            let mut members: Vec<EnrichedArticle> =
                member_idxs.iter().map(|i| articles[*i].clone()).collect();
            enricher
                .rescore_clustered(&mut members, member_idxs.len())
                .await?;
            for (slot, idx) in member_idxs.iter().enumerate() {
                articles[*idx].impact_score = members[slot].impact_score;
            }
            cluster.aggregate_impact = mean(members.iter().map(|m| m.impact_score as f64));
            clusters.push(cluster);
        }

        clusters.sort_by(|a, b| {
            b.aggregate_impact
                .partial_cmp(&a.aggregate_impact)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        self.store.save_clusters(&clusters).await?;
        cache.put(&ids, &clusters).await?;
        info!(clusters = clusters.len(), articles = articles.len(), "Clustering complete");
        Ok(clusters)
    }

    /// Produce group indices per article: semantic when embeddings are
    /// available, TF-IDF + k-means otherwise. Group usize::MAX marks a
    /// dropped singleton.
    async fn assign(&self, articles: &[EnrichedArticle]) -> Vec<usize> {
        let texts: Vec<String> = articles
            .iter()
            .map(|a| format!("{} {}", a.raw.title, a.raw.description))
            .collect();

        match self.embedder.embed_all(&texts).await {
            Ok(embeddings) => {
                debug!("Semantic clustering path");
                greedy_cluster(&embeddings, articles.len())
            }
            Err(e) => {
                warn!(error = %e, "Falling back to TF-IDF clustering");
                let vectors = tfidf_vectors(&texts);
                let k = ((articles.len() as f64 / 10.0).ceil() as usize).clamp(2, 15);
                kmeans(&vectors, k, KMEANS_SEED)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Greedy semantic clustering
// ---------------------------------------------------------------------------

/// For each unassigned article in input order, open a cluster and admit
/// every remaining unassigned article above the similarity threshold.
/// Surviving singletons either coalesce into one "other" group (when at
/// least three exist) or are dropped (marked usize::MAX).
fn greedy_cluster(embeddings: &[Vec<f32>], n: usize) -> Vec<usize> {
    let threshold = if n > LARGE_BATCH {
        SIM_THRESHOLD_LARGE
    } else {
        SIM_THRESHOLD
    };

    let mut assignment = vec![usize::MAX; n];
    let mut next_group = 0usize;

    for i in 0..n {
        if assignment[i] != usize::MAX {
            continue;
        }
        assignment[i] = next_group;
        for j in (i + 1)..n {
            if assignment[j] == usize::MAX && cosine(&embeddings[i], &embeddings[j]) >= threshold {
                assignment[j] = next_group;
            }
        }
        next_group += 1;
    }

    // Count group sizes; demote singletons.
    let mut sizes: HashMap<usize, usize> = HashMap::new();
    for g in &assignment {
        *sizes.entry(*g).or_insert(0) += 1;
    }
    let singleton_groups: HashSet<usize> = sizes
        .iter()
        .filter(|(_, size)| **size == 1)
        .map(|(g, _)| *g)
        .collect();

    if singleton_groups.len() >= MIN_OTHER_SINGLETONS {
        // Coalesce all singletons into one "other" group.
        let other = next_group;
        for g in assignment.iter_mut() {
            if singleton_groups.contains(g) {
                *g = other;
            }
        }
    } else {
        for g in assignment.iter_mut() {
            if singleton_groups.contains(g) {
                *g = usize::MAX;
            }
        }
    }

    assignment
}

// ---------------------------------------------------------------------------
// TF-IDF + k-means fallback
// ---------------------------------------------------------------------------

/// Dense TF-IDF vectors over headline + description tokens.
fn tfidf_vectors(texts: &[String]) -> Vec<Vec<f32>> {
    let n = texts.len();
    let docs: Vec<Vec<String>> = texts
        .iter()
        .map(|t| {
            t.to_lowercase()
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| w.len() > 3)
                .map(String::from)
                .collect()
        })
        .collect();

    // Vocabulary with document frequencies, insertion-ordered for
    // determinism.
    let mut vocab: Vec<String> = Vec::new();
    let mut vocab_idx: HashMap<String, usize> = HashMap::new();
    let mut df: Vec<usize> = Vec::new();
    for doc in &docs {
        let unique: HashSet<&String> = doc.iter().collect();
        for word in unique {
            match vocab_idx.get(word) {
                Some(idx) => df[*idx] += 1,
                None => {
                    vocab_idx.insert(word.clone(), vocab.len());
                    vocab.push(word.clone());
                    df.push(1);
                }
            }
        }
    }

    docs.iter()
        .map(|doc| {
            let mut v = vec![0.0_f32; vocab.len()];
            if doc.is_empty() {
                return v;
            }
            let mut counts: HashMap<&String, usize> = HashMap::new();
            for word in doc {
                *counts.entry(word).or_insert(0) += 1;
            }
            for (word, count) in counts {
                if let Some(idx) = vocab_idx.get(word) {
                    let tf = count as f32 / doc.len() as f32;
                    let idf = ((n as f32) / (1.0 + df[*idx] as f32)).ln().max(0.0);
                    v[*idx] = tf * idf;
                }
            }
            super::embedding::l2_normalize(&mut v);
            v
        })
        .collect()
}

/// Seeded k-means on cosine distance. Deterministic for a fixed seed
/// and input order.
fn kmeans(vectors: &[Vec<f32>], k: usize, seed: u64) -> Vec<usize> {
    let n = vectors.len();
    if n == 0 {
        return Vec::new();
    }
    let k = k.min(n);
    let dim = vectors[0].len();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);
    let mut centroids: Vec<Vec<f32>> = indices[..k].iter().map(|i| vectors[*i].clone()).collect();

    let mut assignment = vec![0usize; n];
    for _ in 0..KMEANS_ITERATIONS {
        let mut changed = false;
        for (i, v) in vectors.iter().enumerate() {
            let mut best = 0usize;
            let mut best_sim = f32::NEG_INFINITY;
            for (c, centroid) in centroids.iter().enumerate() {
                let sim = cosine(v, centroid);
                if sim > best_sim {
                    best_sim = sim;
                    best = c;
                }
            }
            if assignment[i] != best {
                assignment[i] = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        // Recompute centroids; empty clusters keep their previous one.
        for (c, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<&Vec<f32>> = vectors
                .iter()
                .enumerate()
                .filter(|(i, _)| assignment[*i] == c)
                .map(|(_, v)| v)
                .collect();
            if members.is_empty() {
                continue;
            }
            let mut mean_vec = vec![0.0_f32; dim];
            for m in &members {
                for (slot, x) in m.iter().enumerate() {
                    mean_vec[slot] += x;
                }
            }
            for x in mean_vec.iter_mut() {
                *x /= members.len() as f32;
            }
            super::embedding::l2_normalize(&mut mean_vec);
            *centroid = mean_vec;
        }
    }

    assignment
}

// ---------------------------------------------------------------------------
// Cluster materialization
// ---------------------------------------------------------------------------

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let collected: Vec<f64> = values.collect();
    if collected.is_empty() {
        0.0
    } else {
        collected.iter().sum::<f64>() / collected.len() as f64
    }
}

/// Human-readable topic: "Trends in " + top-3 keywords title-cased, or
/// the first headline truncated to 47 chars + "…".
fn cluster_topic(keywords: &[String], first_headline: &str) -> String {
    if keywords.is_empty() {
        let mut truncated: String = first_headline.chars().take(47).collect();
        if first_headline.chars().count() > 47 {
            truncated.push('…');
        }
        return truncated;
    }
    let top: Vec<String> = keywords.iter().take(3).map(|k| title_case(k)).collect();
    format!("Trends in {}", top.join(", "))
}

/// Tier by distinct source count: ≥4 high, 2–3 medium, 1 low.
fn confidence(unique_sources: u32) -> (ConfidenceTier, u32) {
    let tier = match unique_sources {
        s if s >= 4 => ConfidenceTier::High,
        2..=3 => ConfidenceTier::Medium,
        _ => ConfidenceTier::Low,
    };
    let score = (20 + 15 * unique_sources.saturating_sub(1)).min(100);
    (tier, score)
}

fn build_cluster(articles: &[EnrichedArticle], member_idxs: &[usize]) -> Cluster {
    let members: Vec<&EnrichedArticle> = member_idxs.iter().map(|i| &articles[*i]).collect();

    let mut member_ids: Vec<String> = members.iter().map(|m| m.raw.id.clone()).collect();
    member_ids.sort();
    let id = hash16(member_ids.join(",").as_bytes());

    let combined_text: String = members
        .iter()
        .map(|m| m.raw.analysis_text())
        .collect::<Vec<_>>()
        .join(" ");
    let keywords = extract_keywords(&combined_text, MAX_KEYWORDS);
    let topic = cluster_topic(&keywords, &members[0].raw.title);

    let dates: Vec<chrono::NaiveDate> = members.iter().map(|m| m.raw.published_date()).collect();
    let earliest = *dates.iter().min().unwrap_or(&dates[0]);
    let latest = *dates.iter().max().unwrap_or(&dates[0]);

    let mut categories: Vec<Category> = Vec::new();
    for m in &members {
        if !categories.contains(&m.raw.category) {
            categories.push(m.raw.category);
        }
    }

    let unique_sources = members
        .iter()
        .map(|m| m.raw.source.to_lowercase())
        .collect::<HashSet<_>>()
        .len() as u32;
    let (confidence_tier, confidence_score) = confidence(unique_sources);

    Cluster {
        id,
        date: latest,
        topic,
        keywords,
        article_count: members.len() as u32,
        aggregate_sentiment: mean(members.iter().map(|m| m.sentiment.normalized_score as f64)),
        aggregate_impact: mean(members.iter().map(|m| m.impact_score as f64)),
        categories,
        earliest,
        latest,
        unique_sources,
        confidence_tier,
        confidence_score,
        member_ids,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
