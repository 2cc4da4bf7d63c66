//! Content-addressed caching.
//!
//! Three cache families, all keyed by a deterministic hash over their
//! input: sentiment scores (in-memory, bounded LRU, 7-day TTL), cluster
//! results (persisted, 6-hour TTL), and briefings (persisted, 24-hour
//! TTL). The briefing cache is the idempotence gate that keeps the
//! pipeline from issuing duplicate LLM calls on identical inputs.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::storage::Store;
use crate::types::{Briefing, Cluster, ClusterDigest, Sentiment};

/// Truncated-hash length. Collisions are acceptable at this cardinality.
const HASH_LEN: usize = 16;

/// Sentiment cache TTL.
const SENTIMENT_TTL_DAYS: i64 = 7;
/// Sentiment cache capacity (entries).
const SENTIMENT_CAP: usize = 4096;
/// Cluster cache TTL.
const CLUSTER_TTL_HOURS: i64 = 6;
/// Briefing cache TTL.
const BRIEFING_TTL_HOURS: i64 = 24;

/// Cache family names as persisted in `cache_entries`.
pub const FAMILY_CLUSTER: &str = "cluster";
pub const FAMILY_BRIEFING: &str = "briefing";

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// First 16 hex chars of SHA-256 over raw bytes.
pub fn hash16(input: &[u8]) -> String {
    let digest = Sha256::digest(input);
    hex::encode(digest)[..HASH_LEN].to_string()
}

/// Stable article identifier derived from its URL.
pub fn article_id(url: &str) -> String {
    hash16(url.as_bytes())
}

/// Deterministic hash over a serializable value.
///
/// The value is serialized through `serde_json::Value`, whose object map
/// is key-ordered, so field order in the source struct cannot change the
/// hash.
pub fn stable_hash<T: Serialize>(value: &T) -> String {
    let canonical = serde_json::to_value(value)
        .and_then(|v| serde_json::to_string(&v))
        .unwrap_or_default();
    hash16(canonical.as_bytes())
}

/// Cache key for a cluster run: the sorted article-id list.
pub fn cluster_key(article_ids: &[String]) -> String {
    let mut ids: Vec<&str> = article_ids.iter().map(|s| s.as_str()).collect();
    ids.sort_unstable();
    hash16(ids.join(",").as_bytes())
}

// ---------------------------------------------------------------------------
// Sentiment cache (in-memory LRU)
// ---------------------------------------------------------------------------

struct SentimentEntry {
    value: Sentiment,
    inserted_at: DateTime<Utc>,
    last_used: u64,
}

/// Process-wide sentiment cache. Keyed by the hash of the normalized
/// (lower-cased, trimmed) text. Expired entries are dropped on access;
/// over capacity, the least-recently-used entry is evicted.
pub struct SentimentCache {
    inner: Mutex<SentimentState>,
}

struct SentimentState {
    entries: HashMap<String, SentimentEntry>,
    tick: u64,
}

impl Default for SentimentCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SentimentState {
                entries: HashMap::new(),
                tick: 0,
            }),
        }
    }

    /// Cache key for a text: hash of its normalized form.
    pub fn key_for(text: &str) -> String {
        hash16(text.trim().to_lowercase().as_bytes())
    }

    pub fn get(&self, text: &str) -> Option<Sentiment> {
        let key = Self::key_for(text);
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.tick += 1;
        let tick = state.tick;

        let expired = state
            .entries
            .get(&key)
            .map(|e| Utc::now() - e.inserted_at > Duration::days(SENTIMENT_TTL_DAYS))?;
        if expired {
            state.entries.remove(&key);
            return None;
        }

        let entry = state.entries.get_mut(&key)?;
        entry.last_used = tick;
        Some(entry.value.clone())
    }

    pub fn put(&self, text: &str, value: Sentiment) {
        let key = Self::key_for(text);
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.tick += 1;
        let tick = state.tick;
        state.entries.insert(
            key,
            SentimentEntry {
                value,
                inserted_at: Utc::now(),
                last_used: tick,
            },
        );
        if state.entries.len() > SENTIMENT_CAP {
            if let Some(victim) = state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                state.entries.remove(&victim);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Cluster cache (persisted)
// ---------------------------------------------------------------------------

/// Persisted cluster-result cache keyed on the sorted article-id list.
/// A hit returns the previously computed clusters verbatim.
pub struct ClusterCache<'a> {
    store: &'a Store,
}

impl<'a> ClusterCache<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub async fn get(&self, article_ids: &[String]) -> Option<Vec<Cluster>> {
        let key = cluster_key(article_ids);
        let value = self.store.cache_get(FAMILY_CLUSTER, &key).await.ok()??;
        serde_json::from_str(&value).ok()
    }

    pub async fn put(&self, article_ids: &[String], clusters: &[Cluster]) -> anyhow::Result<()> {
        let key = cluster_key(article_ids);
        let value = serde_json::to_string(clusters)?;
        let expires = Utc::now() + Duration::hours(CLUSTER_TTL_HOURS);
        self.store
            .cache_put(FAMILY_CLUSTER, &key, &value, expires)
            .await
    }
}

// ---------------------------------------------------------------------------
// Briefing cache (persisted) — the LLM idempotence gate
// ---------------------------------------------------------------------------

/// Outcome of the pre-LLM idempotence check.
#[derive(Debug)]
pub struct LlmGate {
    /// False when an unexpired briefing exists for this exact input.
    pub should_call: bool,
    /// The cached briefing, when one exists.
    pub cached: Option<Briefing>,
    /// Hash of the cluster projection, stored on whatever briefing the
    /// synthesis stage ends up producing.
    pub input_hash: String,
}

/// Persisted briefing cache keyed on a reduced projection of the day's
/// clusters.
pub struct BriefingCache<'a> {
    store: &'a Store,
}

impl<'a> BriefingCache<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Compute the input hash for a cluster set. Uses the reduced digest
    /// projection so immaterial cluster fields cannot bust the cache.
    pub fn input_hash(digests: &[ClusterDigest]) -> String {
        stable_hash(&digests)
    }

    /// The idempotence gate: hash today's cluster projection and look for
    /// an unexpired briefing produced from the same input.
    pub async fn check_before_llm_call(&self, digests: &[ClusterDigest]) -> LlmGate {
        let input_hash = Self::input_hash(digests);
        let cached = match self.store.cache_get(FAMILY_BRIEFING, &input_hash).await {
            Ok(Some(value)) => serde_json::from_str::<Briefing>(&value).ok(),
            _ => None,
        };
        LlmGate {
            should_call: cached.is_none(),
            cached,
            input_hash,
        }
    }

    /// Store a briefing under its input hash. Fallback briefings are
    /// cached too, so repeated runs on the same inputs do not retry the
    /// LLM.
    pub async fn put(&self, input_hash: &str, briefing: &Briefing) -> anyhow::Result<()> {
        let value = serde_json::to_string(briefing)?;
        let expires = Utc::now() + Duration::hours(BRIEFING_TTL_HOURS);
        self.store
            .cache_put(FAMILY_BRIEFING, input_hash, &value, expires)
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
