//! Sentiment scoring.
//!
//! Preferred path is a local transformer classifier (finance-tuned where
//! available) reached over HTTP on localhost. The classifier initialises
//! lazily on first use and is shared process-wide; if it cannot be
//! reached the lexicon path becomes sticky for the process lifetime
//! (no retry storms). Results are cached by normalized text.
//!
//! Lexicon scoring: weighted finance dictionary, comparative = sum of
//! weights / word count, `normalized = clamp(round(comparative × 20),
//! -100, 100)`, label at ±10, confidence =
//! `min(0.95, 0.1·|score| + 0.02·word_count)`.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::SentimentCache;
use crate::types::{Sentiment, SentimentLabel, SentimentMethod};

/// Label thresholds on the normalized score.
const LABEL_THRESHOLD: i64 = 10;

// ---------------------------------------------------------------------------
// Lexicon
// ---------------------------------------------------------------------------

/// Hand-curated finance dictionary. Weights are AFINN-style: ±1 mild,
/// ±3 strong.
const LEXICON: &[(&str, f64)] = &[
    // Positive
    ("beat", 2.0),
    ("beats", 2.0),
    ("surge", 3.0),
    ("surges", 3.0),
    ("rally", 2.5),
    ("rallies", 2.5),
    ("record", 2.0),
    ("growth", 2.0),
    ("profit", 2.0),
    ("profits", 2.0),
    ("gain", 2.0),
    ("gains", 2.0),
    ("upgrade", 2.0),
    ("upgraded", 2.0),
    ("outperform", 2.5),
    ("bullish", 2.5),
    ("strong", 1.5),
    ("boost", 2.0),
    ("boosts", 2.0),
    ("expansion", 1.5),
    ("expands", 1.5),
    ("breakthrough", 3.0),
    ("innovation", 1.5),
    ("partnership", 1.0),
    ("approval", 2.0),
    ("approved", 2.0),
    ("exceeds", 2.5),
    ("optimistic", 2.0),
    ("recovery", 2.0),
    ("rebound", 2.0),
    ("dividend", 1.0),
    ("buyback", 1.5),
    ("milestone", 1.5),
    ("momentum", 1.0),
    ("demand", 1.0),
    ("win", 2.0),
    ("wins", 2.0),
    ("success", 2.0),
    ("successful", 2.0),
    ("soar", 3.0),
    ("soars", 3.0),
    // Negative
    ("miss", -2.0),
    ("misses", -2.0),
    ("plunge", -3.0),
    ("plunges", -3.0),
    ("crash", -3.0),
    ("crashes", -3.0),
    ("loss", -2.0),
    ("losses", -2.0),
    ("layoff", -2.5),
    ("layoffs", -2.5),
    ("downgrade", -2.0),
    ("downgraded", -2.0),
    ("bearish", -2.5),
    ("weak", -1.5),
    ("warns", -2.0),
    ("warning", -2.0),
    ("shortage", -2.0),
    ("shortfall", -2.0),
    ("decline", -2.0),
    ("declines", -2.0),
    ("drop", -1.5),
    ("drops", -1.5),
    ("fall", -1.5),
    ("falls", -1.5),
    ("slump", -2.5),
    ("recession", -3.0),
    ("bankruptcy", -3.0),
    ("default", -2.5),
    ("fraud", -3.0),
    ("investigation", -1.5),
    ("lawsuit", -2.0),
    ("fine", -1.5),
    ("fined", -2.0),
    ("breach", -2.5),
    ("hack", -2.5),
    ("hacked", -2.5),
    ("ransomware", -2.5),
    ("sanction", -2.0),
    ("sanctions", -2.0),
    ("tariff", -1.5),
    ("tariffs", -1.5),
    ("war", -2.5),
    ("conflict", -2.0),
    ("crisis", -3.0),
    ("fear", -2.0),
    ("fears", -2.0),
    ("concern", -1.5),
    ("concerns", -1.5),
    ("risk", -1.0),
    ("risks", -1.0),
    ("threat", -2.0),
    ("volatile", -1.5),
    ("uncertainty", -1.5),
    ("halt", -2.0),
    ("halts", -2.0),
    ("ban", -2.0),
    ("bans", -2.0),
    ("curb", -1.5),
    ("curbs", -1.5),
    ("restriction", -1.5),
    ("restrictions", -1.5),
    ("delay", -1.5),
    ("delays", -1.5),
    ("cut", -1.5),
    ("cuts", -1.5),
];

/// Score a text with the lexicon.
pub fn lexicon_sentiment(text: &str) -> Sentiment {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let word_count = words.len();
    if word_count == 0 {
        return Sentiment::neutral(SentimentMethod::Lexicon);
    }

    let mut score = 0.0_f64;
    for word in &words {
        if let Some((_, weight)) = LEXICON.iter().find(|(term, _)| term == word) {
            score += weight;
        }
    }

    let comparative = score / word_count as f64;
    let normalized = (comparative * 20.0).round().clamp(-100.0, 100.0) as i64;
    let label = if normalized > LABEL_THRESHOLD {
        SentimentLabel::Positive
    } else if normalized < -LABEL_THRESHOLD {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    };
    let confidence = (0.1 * score.abs() + 0.02 * word_count as f64).min(0.95);

    Sentiment {
        score: normalized as f64 / 100.0,
        normalized_score: normalized,
        confidence,
        label,
        method: SentimentMethod::Lexicon,
    }
}

// ---------------------------------------------------------------------------
// Transformer classifier
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    label: String,
    score: f64,
}

/// HTTP client against the local inference sidecar.
struct TransformerClassifier {
    http: Client,
    url: String,
}

impl TransformerClassifier {
    /// Connect to the sidecar. A failed health probe here means the
    /// model is unavailable for the whole process lifetime.
    async fn init(url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build classifier HTTP client")?;
        let health = format!("{}/health", url.trim_end_matches('/'));
        let resp = http.get(&health).send().await.map_err(|e| {
            crate::types::ArgusError::ModelUnavailable(format!("sentiment probe: {e}"))
        })?;
        if !resp.status().is_success() {
            return Err(crate::types::ArgusError::ModelUnavailable(format!(
                "sentiment probe returned {}",
                resp.status()
            ))
            .into());
        }
        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
        })
    }

    async fn classify(&self, text: &str) -> Result<Sentiment> {
        let resp: ClassifyResponse = self
            .http
            .post(format!("{}/classify", self.url))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .context("Classifier request failed")?
            .json()
            .await
            .context("Classifier returned malformed response")?;

        let confidence = resp.score.clamp(0.0, 1.0);
        let (label, normalized) = match resp.label.to_lowercase().as_str() {
            "positive" => (SentimentLabel::Positive, (confidence * 50.0).round() as i64),
            "negative" => (SentimentLabel::Negative, -(confidence * 50.0).round() as i64),
            _ => (SentimentLabel::Neutral, 0),
        };

        Ok(Sentiment {
            score: normalized as f64 / 100.0,
            normalized_score: normalized,
            confidence,
            label,
            method: SentimentMethod::Transformer,
        })
    }
}

enum ModelState {
    Untried,
    Ready(TransformerClassifier),
    /// Sticky: after the first failed init the lexicon path is used for
    /// the rest of the process lifetime.
    Unavailable,
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Process-wide sentiment analyzer: transformer-first, lexicon fallback,
/// cached by normalized text.
pub struct SentimentAnalyzer {
    model_url: Option<String>,
    state: Mutex<ModelState>,
    cache: SentimentCache,
}

impl SentimentAnalyzer {
    pub fn new(model_url: Option<String>) -> Self {
        Self {
            model_url,
            state: Mutex::new(ModelState::Untried),
            cache: SentimentCache::new(),
        }
    }

    /// Analyze one text. Cache hits return the exact previously stored
    /// value.
    pub async fn analyze(&self, text: &str) -> Sentiment {
        if text.trim().is_empty() {
            return Sentiment::neutral(SentimentMethod::Lexicon);
        }
        if let Some(hit) = self.cache.get(text) {
            return hit;
        }

        let result = self.classify(text).await;
        self.cache.put(text, result.clone());
        result
    }

    async fn classify(&self, text: &str) -> Sentiment {
        let mut state = self.state.lock().await;

        if let ModelState::Untried = *state {
            *state = match &self.model_url {
                Some(url) => match TransformerClassifier::init(url).await {
                    Ok(classifier) => {
                        info!(url, "Sentiment transformer loaded");
                        ModelState::Ready(classifier)
                    }
                    Err(e) => {
                        warn!(error = %e, "Sentiment transformer unavailable, lexicon fallback is now sticky");
                        ModelState::Unavailable
                    }
                },
                None => {
                    debug!("No sentiment model configured, using lexicon");
                    ModelState::Unavailable
                }
            };
        }

        match &*state {
            ModelState::Ready(classifier) => match classifier.classify(text).await {
                Ok(s) => s,
                Err(e) => {
                    // Per-call failure does not poison the model.
                    debug!(error = %e, "Classifier call failed, lexicon for this text");
                    lexicon_sentiment(text)
                }
            },
            _ => lexicon_sentiment(text),
        }
    }

    /// Number of cached sentiment entries (observability).
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexicon_positive() {
        let s = lexicon_sentiment("NVIDIA beats estimates with record surge in profits");
        assert!(s.normalized_score > 0, "score {} should be positive", s.normalized_score);
        assert_eq!(s.method, SentimentMethod::Lexicon);
    }

    #[test]
    fn test_lexicon_negative() {
        let s = lexicon_sentiment("Markets crash as recession fears spark crisis and losses");
        assert!(s.normalized_score < 0, "score {} should be negative", s.normalized_score);
        assert_eq!(s.label, SentimentLabel::Negative);
    }

    #[test]
    fn test_lexicon_neutral() {
        let s = lexicon_sentiment("The committee met on Tuesday to discuss the agenda");
        assert_eq!(s.normalized_score, 0);
        assert_eq!(s.label, SentimentLabel::Neutral);
    }

    #[test]
    fn test_lexicon_empty() {
        let s = lexicon_sentiment("");
        assert_eq!(s.normalized_score, 0);
        assert_eq!(s.confidence, 0.0);
    }

    #[test]
    fn test_lexicon_bounds() {
        // Pile up strong words; normalized must stay within [-100, 100]
        // and confidence within [0, 0.95].
        let text = "crash crisis crash crisis crash crisis crash crisis";
        let s = lexicon_sentiment(text);
        assert!(s.normalized_score >= -100);
        assert!(s.confidence <= 0.95);
    }

    #[test]
    fn test_lexicon_label_thresholds() {
        // comparative = -3.0/4 = -0.75 → normalized -15 → negative.
        let s = lexicon_sentiment("a crisis is here");
        assert_eq!(s.normalized_score, -15);
        assert_eq!(s.label, SentimentLabel::Negative);

        // comparative = -1.0/5 = -0.2 → normalized -4 → neutral band.
        let s = lexicon_sentiment("some risk in the air");
        assert_eq!(s.normalized_score, -4);
        assert_eq!(s.label, SentimentLabel::Neutral);
    }

    #[tokio::test]
    async fn test_analyzer_sticky_fallback_without_model() {
        let analyzer = SentimentAnalyzer::new(None);
        let s = analyzer.analyze("Intel announces layoffs").await;
        assert_eq!(s.method, SentimentMethod::Lexicon);
        assert!(s.normalized_score < 0);
    }

    #[tokio::test]
    async fn test_analyzer_unreachable_model_degrades() {
        // Nothing listens here; init fails and the lexicon is sticky.
        let analyzer = SentimentAnalyzer::new(Some("http://127.0.0.1:1".to_string()));
        let s = analyzer.analyze("AMD warns of GPU shortage").await;
        assert_eq!(s.method, SentimentMethod::Lexicon);
        let s2 = analyzer.analyze("A second headline with losses").await;
        assert_eq!(s2.method, SentimentMethod::Lexicon);
    }

    #[tokio::test]
    async fn test_analyzer_cache_round_trip() {
        let analyzer = SentimentAnalyzer::new(None);
        let first = analyzer.analyze("NVIDIA beats earnings estimates").await;
        let second = analyzer.analyze("NVIDIA beats earnings estimates").await;
        assert_eq!(first.normalized_score, second.normalized_score);
        assert_eq!(first.confidence, second.confidence);
        assert_eq!(analyzer.cache_len(), 1);
    }
}
