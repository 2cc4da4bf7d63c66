//! Sentence-embedding engine.
//!
//! Talks to a local 384-dim embedding sidecar over HTTP, batching up to
//! 16 texts per call and L2-normalizing the results. Initialises lazily
//! and is shared process-wide; after the first failed init the engine
//! reports unavailable for the rest of the process lifetime and the
//! clustering stage uses its TF-IDF fallback instead.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Embedding dimensionality (BGE-small class models).
pub const EMBEDDING_DIM: usize = 384;

/// Maximum texts per sidecar call.
const EMBED_BATCH: usize = 16;

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

struct SidecarClient {
    http: Client,
    url: String,
}

impl SidecarClient {
    async fn init(url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("Failed to build embedding HTTP client")?;
        let health = format!("{}/health", url.trim_end_matches('/'));
        let resp = http
            .get(&health)
            .send()
            .await
            .context("Embedding model health probe failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("Embedding model health probe returned {}", resp.status());
        }
        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
        })
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let resp: EmbedResponse = self
            .http
            .post(format!("{}/embed", self.url))
            .json(&serde_json::json!({ "texts": texts }))
            .send()
            .await
            .context("Embedding request failed")?
            .json()
            .await
            .context("Embedding response malformed")?;

        if resp.embeddings.len() != texts.len() {
            anyhow::bail!(
                "Embedding count mismatch: sent {}, got {}",
                texts.len(),
                resp.embeddings.len()
            );
        }
        for v in &resp.embeddings {
            if v.len() != EMBEDDING_DIM {
                anyhow::bail!("Unexpected embedding dimension {}", v.len());
            }
        }
        Ok(resp.embeddings)
    }
}

enum EngineState {
    Untried,
    Ready(SidecarClient),
    Unavailable,
}

/// Process-wide lazy embedding engine.
pub struct EmbeddingEngine {
    url: Option<String>,
    state: Mutex<EngineState>,
}

impl EmbeddingEngine {
    pub fn new(url: Option<String>) -> Self {
        Self {
            url,
            state: Mutex::new(EngineState::Untried),
        }
    }

    /// Embed all texts, batched, L2-normalized. Errors once the engine
    /// is (or becomes) unavailable; callers fall back to TF-IDF.
    pub async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut state = self.state.lock().await;

        if let EngineState::Untried = *state {
            *state = match &self.url {
                Some(url) => match SidecarClient::init(url).await {
                    Ok(client) => {
                        info!(url, "Embedding engine loaded");
                        EngineState::Ready(client)
                    }
                    Err(e) => {
                        warn!(error = %e, "Embedding engine unavailable, TF-IDF fallback is now sticky");
                        EngineState::Unavailable
                    }
                },
                None => EngineState::Unavailable,
            };
        }

        let client = match &*state {
            EngineState::Ready(c) => c,
            _ => anyhow::bail!("Embedding engine unavailable"),
        };

        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(EMBED_BATCH) {
            let mut batch = client.embed(chunk).await?;
            for v in &mut batch {
                l2_normalize(v);
            }
            out.append(&mut batch);
        }
        Ok(out)
    }
}

/// In-place L2 normalization.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity. For L2-normalized inputs this is the dot product.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
