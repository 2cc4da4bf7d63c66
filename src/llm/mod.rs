//! LLM integration for briefing synthesis.
//!
//! Defines the `BriefingGenerator` trait, the briefing input model, and
//! the round-robin key pool shared by LLM clients. The Gemini client is
//! the production generator; the deterministic local fallback covers
//! every LLM failure mode.

pub mod fallback;
pub mod gemini;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::types::{ClusterDigest, GprTrend};

/// One cluster as presented to the LLM: the digest projection plus
/// impact and up to three member headlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BriefingCluster {
    pub digest: ClusterDigest,
    pub aggregate_impact: f64,
    /// Up to 3 member headlines.
    pub headlines: Vec<String>,
}

/// Everything the synthesis stage hands to a generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BriefingInput {
    pub date: NaiveDate,
    pub gpr_score: i64,
    pub gpr_trend: GprTrend,
    pub market_sentiment: f64,
    /// Top clusters by impact, at most 5.
    pub clusters: Vec<BriefingCluster>,
}

/// Abstraction over briefing generators.
#[async_trait]
pub trait BriefingGenerator: Send + Sync {
    /// Produce 250–350 words of analytical prose for the day.
    async fn generate(&self, input: &BriefingInput) -> Result<String>;

    /// Generator name for logging and health records.
    fn name(&self) -> &'static str;
}

/// Ordered LLM key pool: round-robin per call, no failure marking.
/// A single error does not poison a key.
pub struct LlmKeyPool {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl LlmKeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Next key in rotation.
    pub fn next_key(&self) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        Some(self.keys[idx].clone())
    }
}
