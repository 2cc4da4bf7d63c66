//! Geopolitical Risk (GPR) index.
//!
//! A fixed weighted keyword dictionary over six buckets. Each article
//! contributes keyword match counts and weighted hits; the daily raw
//! score is `(weighted_sum / articles) · 100`, normalized to
//! `round(min(100, raw · 2.5))`. The trailing-14-day trend compares the
//! last-7 mean to the prior-7 mean.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::storage::Store;
use crate::types::{EnrichedArticle, GprPoint, GprTrend};

/// Trend threshold in percent.
const TREND_THRESHOLD_PCT: f64 = 10.0;

/// Weighted GPR dictionary: six buckets, selected terms weighted
/// 1.5–3.0, everything else 1.0.
const GPR_KEYWORDS: &[(&str, f64)] = &[
    // sanctions & export controls
    ("sanctions", 2.0),
    ("sanction", 2.0),
    ("embargo", 2.0),
    ("export controls", 2.5),
    ("blacklist", 1.5),
    ("seizure", 1.0),
    // armed conflict
    ("war", 3.0),
    ("invasion", 3.0),
    ("missile", 2.5),
    ("airstrike", 2.5),
    ("military", 1.5),
    ("troops", 1.5),
    ("ceasefire", 1.0),
    // trade war
    ("tariff", 2.0),
    ("tariffs", 2.0),
    ("trade war", 2.5),
    ("retaliation", 1.5),
    ("trade dispute", 1.5),
    ("decoupling", 1.5),
    // political instability
    ("coup", 3.0),
    ("unrest", 2.0),
    ("protest", 1.0),
    ("martial law", 3.0),
    ("impeachment", 1.5),
    // diplomatic tension
    ("diplomatic crisis", 2.0),
    ("ambassador", 1.0),
    ("expelled", 1.5),
    ("summit", 1.0),
    ("ultimatum", 2.0),
    // regional hotspots
    ("taiwan strait", 3.0),
    ("south china sea", 2.5),
    ("middle east", 1.5),
    ("strait of hormuz", 2.5),
    ("border clash", 2.0),
];

/// Occurrences of a keyword: whole tokens for single words ("war" must
/// not fire on "warns"), substring count for phrases.
fn keyword_matches(text_lower: &str, tokens: &[&str], keyword: &str) -> u32 {
    if keyword.contains(' ') {
        text_lower.matches(keyword).count() as u32
    } else {
        tokens.iter().filter(|t| **t == keyword).count() as u32
    }
}

/// One day's accumulation pass over enriched articles.
pub fn compute_gpr(date: chrono::NaiveDate, articles: &[EnrichedArticle]) -> GprPoint {
    let mut keyword_counts: HashMap<String, u32> = HashMap::new();
    let mut weighted_sum = 0.0_f64;

    for article in articles {
        let text = article.raw.analysis_text().to_lowercase();
        let tokens = crate::enrich::geo::tokenize(&text);
        for (keyword, weight) in GPR_KEYWORDS {
            let matches = keyword_matches(&text, &tokens, keyword);
            if matches > 0 {
                *keyword_counts.entry((*keyword).to_string()).or_insert(0) += matches;
                weighted_sum += matches as f64 * weight;
            }
        }
    }

    let article_count = articles.len() as u32;
    let raw = if article_count > 0 {
        (weighted_sum / article_count as f64) * 100.0
    } else {
        0.0
    };
    let score = (raw * 2.5).min(100.0).round() as i64;

    let mut ranked: Vec<(&String, &u32)> = keyword_counts.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    let top_keywords = ranked.iter().take(5).map(|(k, _)| (*k).clone()).collect();

    GprPoint {
        date,
        score,
        keyword_counts,
        top_keywords,
        article_count,
    }
}

/// Index trend over the last 14 days: last-7 mean vs prior-7 mean.
pub fn gpr_trend(history: &[GprPoint]) -> GprTrend {
    if history.len() < 14 {
        return GprTrend::Stable;
    }
    // History arrives newest-first from the store.
    let recent: f64 = history[..7].iter().map(|p| p.score as f64).sum::<f64>() / 7.0;
    let prior: f64 = history[7..14].iter().map(|p| p.score as f64).sum::<f64>() / 7.0;
    if prior == 0.0 {
        return if recent > 0.0 {
            GprTrend::Rising
        } else {
            GprTrend::Stable
        };
    }
    let delta_pct = (recent - prior) / prior * 100.0;
    if delta_pct > TREND_THRESHOLD_PCT {
        GprTrend::Rising
    } else if delta_pct < -TREND_THRESHOLD_PCT {
        GprTrend::Falling
    } else {
        GprTrend::Stable
    }
}

/// Compute, persist, and return today's GPR point plus the trend.
pub async fn run_gpr(
    store: &Arc<Store>,
    date: chrono::NaiveDate,
    articles: &[EnrichedArticle],
) -> Result<(GprPoint, GprTrend)> {
    let point = compute_gpr(date, articles);
    store.save_gpr_point(&point).await?;
    let history = store.get_gpr_history(14).await?;
    let trend = gpr_trend(&history);
    info!(score = point.score, trend = trend.as_str(), "GPR computed");
    Ok((point, trend))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, EntitySet, RawArticle, Sentiment, SentimentMethod};
    use chrono::{NaiveDate, Utc};

    fn article(title: &str) -> EnrichedArticle {
        EnrichedArticle {
            raw: RawArticle {
                id: crate::cache::article_id(title),
                title: title.to_string(),
                description: String::new(),
                content: String::new(),
                url: format!("https://e.com/{}", crate::cache::article_id(title)),
                source: "Reuters".to_string(),
                source_id: None,
                published_at: Utc::now(),
                category: Category::Geopolitics,
                ticker: None,
                provider: "newsapi".to_string(),
                image_url: None,
            },
            sentiment: Sentiment::neutral(SentimentMethod::Lexicon),
            impact_score: 0,
            geo_tags: vec![],
            topics: vec![],
            entities: EntitySet::default(),
            cluster_id: None,
        }
    }

    fn point(date: NaiveDate, score: i64) -> GprPoint {
        GprPoint {
            date,
            score,
            keyword_counts: HashMap::new(),
            top_keywords: vec![],
            article_count: 1,
        }
    }

    #[test]
    fn test_gpr_zero_for_calm_news() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let articles = vec![
            article("NVIDIA beats earnings estimates"),
            article("AMD announces new GPU line"),
        ];
        let p = compute_gpr(date, &articles);
        assert_eq!(p.score, 0);
        assert!(p.keyword_counts.is_empty());
        assert!(p.top_keywords.is_empty());
    }

    #[test]
    fn test_gpr_accumulates_weighted_matches() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let articles = vec![
            article("Sanctions escalate trade war fears"),
            article("Missile strike reported near the Taiwan Strait"),
        ];
        let p = compute_gpr(date, &articles);
        assert!(p.score > 0);
        assert!(p.keyword_counts.contains_key("sanctions"));
        assert!(p.keyword_counts.contains_key("taiwan strait"));
        assert!(p.top_keywords.len() <= 5);
    }

    #[test]
    fn test_gpr_score_capped_at_100() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let heavy = "war war war invasion invasion missile coup martial law";
        let articles = vec![article(heavy)];
        let p = compute_gpr(date, &articles);
        assert_eq!(p.score, 100);
    }

    #[test]
    fn test_gpr_empty_input() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let p = compute_gpr(date, &[]);
        assert_eq!(p.score, 0);
        assert_eq!(p.article_count, 0);
    }

    #[test]
    fn test_trend_needs_14_days() {
        let base = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let short: Vec<GprPoint> = (0..10).map(|i| point(base, 50 + i)).collect();
        assert_eq!(gpr_trend(&short), GprTrend::Stable);
    }

    #[test]
    fn test_trend_rising_and_falling() {
        let base = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        // Newest-first: recent mean 60, prior mean 40 → +50% → rising.
        let mut history: Vec<GprPoint> = Vec::new();
        for _ in 0..7 {
            history.push(point(base, 60));
        }
        for _ in 0..7 {
            history.push(point(base, 40));
        }
        assert_eq!(gpr_trend(&history), GprTrend::Rising);

        // Inverted → falling.
        let mut history: Vec<GprPoint> = Vec::new();
        for _ in 0..7 {
            history.push(point(base, 40));
        }
        for _ in 0..7 {
            history.push(point(base, 60));
        }
        assert_eq!(gpr_trend(&history), GprTrend::Falling);
    }

    #[test]
    fn test_trend_stable_band() {
        let base = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let mut history: Vec<GprPoint> = Vec::new();
        for _ in 0..7 {
            history.push(point(base, 52));
        }
        for _ in 0..7 {
            history.push(point(base, 50));
        }
        assert_eq!(gpr_trend(&history), GprTrend::Stable);
    }
}
