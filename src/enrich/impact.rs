//! Impact scoring.
//!
//! `impact = w_s·|normalized_sentiment| + w_c·cluster_size_score +
//! w_src·source_score + w_r·recency_score`, rounded and clamped to
//! [0, 100]. Weights default to (0.4, 0.3, 0.2, 0.1) and are replaced
//! by grid-search winners when the validation subsystem has produced a
//! better-correlating combo.

use chrono::{DateTime, Utc};

use crate::types::ImpactWeights;

/// Cluster size at which the cluster contribution saturates.
const CLUSTER_SATURATION: f64 = 20.0;

/// Recency decay constant per hour.
const RECENCY_DECAY: f64 = 0.05;

/// Fixed source credibility tiers.
const SOURCE_TIERS: &[(&str, f64)] = &[
    ("reuters", 1.3),
    ("bloomberg", 1.3),
    ("financial times", 1.3),
    ("techcrunch", 1.1),
    ("the verge", 1.1),
    ("cnbc", 1.1),
    ("wall street journal", 1.0),
    ("new york times", 1.0),
    ("associated press", 1.0),
    ("the guardian", 1.0),
    ("bbc", 1.0),
    ("al jazeera", 1.0),
    ("ars technica", 1.0),
    ("wired", 1.0),
];

/// Tier for unrecognized sources.
const UNKNOWN_TIER: f64 = 0.8;

/// Raw credibility tier for a source name.
pub fn source_tier(source: &str) -> f64 {
    let lower = source.trim().to_lowercase();
    SOURCE_TIERS
        .iter()
        .find(|(name, _)| lower.contains(name))
        .map(|(_, tier)| *tier)
        .unwrap_or(UNKNOWN_TIER)
}

/// Tier rescaled to [0, 100]: `(tier − 0.7) / 0.6 · 100`.
pub fn source_score(source: &str) -> f64 {
    (source_tier(source) - 0.7) / 0.6 * 100.0
}

/// Exponential recency decay: `round(exp(−0.05 · hours_old) · 100)`.
pub fn recency_score(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let hours_old = (now - published_at).num_minutes().max(0) as f64 / 60.0;
    ((-RECENCY_DECAY * hours_old).exp() * 100.0).round()
}

/// Cluster-size contribution: `min(100, size/20 · 100)`.
pub fn cluster_size_score(size: usize) -> f64 {
    ((size as f64 / CLUSTER_SATURATION) * 100.0).min(100.0)
}

/// Composite impact for one article.
pub fn impact_score(
    normalized_sentiment: i64,
    cluster_size: usize,
    source: &str,
    published_at: DateTime<Utc>,
    now: DateTime<Utc>,
    weights: &ImpactWeights,
) -> i64 {
    let sum = weights.sentiment * normalized_sentiment.unsigned_abs() as f64
        + weights.cluster * cluster_size_score(cluster_size)
        + weights.source * source_score(source)
        + weights.recency * recency_score(published_at, now);
    sum.clamp(0.0, 100.0).round() as i64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
