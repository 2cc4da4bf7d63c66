//! Gemini briefing generator.
//!
//! Implements `BriefingGenerator` against the Gemini `generateContent`
//! API. Keys rotate round-robin per call from the env pool; retryable
//! errors (429, 5xx) back off exponentially and move to the next key.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{BriefingGenerator, BriefingInput, LlmKeyPool};

const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Maximum attempts across the key pool.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GeminiClient {
    http: Client,
    pool: LlmKeyPool,
    model: String,
    max_output_tokens: u32,
}

impl GeminiClient {
    pub fn new(keys: Vec<String>, model: String, max_output_tokens: u32) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .user_agent(concat!("ARGUS/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build Gemini HTTP client")?;
        Ok(Self {
            http,
            pool: LlmKeyPool::new(keys),
            model,
            max_output_tokens,
        })
    }

    pub fn has_keys(&self) -> bool {
        !self.pool.is_empty()
    }

    /// Build the briefing prompt: date, GPR state, and the top clusters
    /// with keywords, sentiment, impact, and up to three headlines each.
    pub fn build_prompt(input: &BriefingInput) -> String {
        let mut prompt = String::with_capacity(2000);

        prompt.push_str(&format!(
            "You are writing the executive intelligence briefing for {}.\n",
            input.date.format("%Y-%m-%d"),
        ));
        prompt.push_str(&format!(
            "Geopolitical risk index: {} (trend: {}). Market sentiment: {:.1} on a -100..100 scale.\n\n",
            input.gpr_score,
            input.gpr_trend.as_str(),
            input.market_sentiment,
        ));

        prompt.push_str("Today's top story clusters:\n");
        for (i, cluster) in input.clusters.iter().take(5).enumerate() {
            prompt.push_str(&format!(
                "{}. {} — {} articles, sentiment {:.0}, impact {:.0}, keywords: {}\n",
                i + 1,
                cluster.digest.topic,
                cluster.digest.article_count,
                cluster.digest.aggregate_sentiment,
                cluster.aggregate_impact,
                cluster.digest.keywords.join(", "),
            ));
            for headline in cluster.headlines.iter().take(3) {
                prompt.push_str(&format!("   - {headline}\n"));
            }
        }

        prompt.push_str(
            "\nWrite 250-350 words of analytical prose connecting these developments \
             for an investor audience. No headers, no bullet points, no preamble — \
             prose only.\n",
        );
        prompt
    }

    async fn call_api(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "maxOutputTokens": self.max_output_tokens }
        });

        let mut last_error = None;
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, "Retrying Gemini call");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let key = self.pool.next_key().ok_or_else(|| {
                anyhow::Error::new(crate::types::ArgusError::Llm(
                    "no Gemini API keys configured".to_string(),
                ))
            })?;
            let url = format!("{GEMINI_URL}/{}:generateContent?key={key}", self.model);

            let resp = match self.http.post(&url).json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(attempt, error = %e, "Gemini request failed");
                    last_error = Some(format!("Request error: {e}"));
                    continue;
                }
            };

            let status = resp.status();
            if status.is_success() {
                let parsed: GenerateResponse =
                    resp.json().await.context("Failed to parse Gemini response")?;
                let text = parsed
                    .candidates
                    .first()
                    .and_then(|c| c.content.as_ref())
                    .map(|c| {
                        c.parts
                            .iter()
                            .filter_map(|p| p.text.as_deref())
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .unwrap_or_default();
                if text.trim().is_empty() {
                    anyhow::bail!("Gemini returned an empty briefing");
                }
                return Ok(text.trim().to_string());
            }

            if status.as_u16() == 429 || status.as_u16() >= 500 {
                let error_text = resp.text().await.unwrap_or_default();
                warn!(status = %status, attempt, "Retryable Gemini error");
                last_error = Some(format!("HTTP {status}: {error_text}"));
                continue;
            }

            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error {status}: {error_text}");
        }

        anyhow::bail!(
            "Gemini API failed after {MAX_RETRIES} attempts: {}",
            last_error.unwrap_or_default()
        )
    }
}

#[async_trait]
impl BriefingGenerator for GeminiClient {
    async fn generate(&self, input: &BriefingInput) -> Result<String> {
        let prompt = Self::build_prompt(input);
        debug!(model = %self.model, clusters = input.clusters.len(), "Requesting briefing");
        let text = self.call_api(&prompt).await?;
        info!(words = text.split_whitespace().count(), "Briefing generated");
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
