//! Deterministic local briefing fallback.
//!
//! Produces the same prose for the same input, with no external calls.
//! Used whenever the LLM path fails (error, timeout, malformed
//! response) and cached like any other briefing so repeated runs on the
//! same inputs do not retry the LLM.

use super::BriefingInput;
use crate::types::GprTrend;

/// GPR level at which risk reads as elevated.
const ELEVATED_GPR: i64 = 50;

/// Build the local fallback briefing.
pub fn build_fallback(input: &BriefingInput) -> String {
    let mut out = String::with_capacity(600);
    out.push_str("Daily Market Intelligence Report. ");

    match input.clusters.first() {
        Some(top) => {
            out.push_str(&format!(
                "Top trending topic today is '{}'. ",
                top.digest.topic
            ));
        }
        None => {
            out.push_str("No dominant topic emerged from today's coverage. ");
        }
    }

    let risk_level = if input.gpr_score >= ELEVATED_GPR {
        "Elevated"
    } else {
        "Stable"
    };
    out.push_str(&format!(
        "Geopolitical risk remains {risk_level} at index level {}. ",
        input.gpr_score
    ));
    match input.gpr_trend {
        GprTrend::Rising => out.push_str("The risk index has been rising over the past two weeks. "),
        GprTrend::Falling => out.push_str("The risk index has been easing over the past two weeks. "),
        GprTrend::Stable => {}
    }

    let tone = if input.market_sentiment > 10.0 {
        "positive"
    } else if input.market_sentiment < -10.0 {
        "negative"
    } else {
        "mixed"
    };
    out.push_str(&format!(
        "Aggregate news sentiment is {tone} at {:.1}. ",
        input.market_sentiment
    ));

    if input.clusters.len() > 1 {
        let others: Vec<&str> = input
            .clusters
            .iter()
            .skip(1)
            .take(3)
            .map(|c| c.digest.topic.as_str())
            .collect();
        out.push_str(&format!(
            "Other active story lines: {}. ",
            others.join("; ")
        ));
    }

    let total_articles: u32 = input.clusters.iter().map(|c| c.digest.article_count).sum();
    out.push_str(&format!(
        "This report covers {} clustered articles across {} story groups. ",
        total_articles,
        input.clusters.len()
    ));
    out.push_str("Automated summary generated without model assistance.");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::BriefingCluster;
    use crate::types::ClusterDigest;
    use chrono::NaiveDate;

    fn input(gpr: i64, clusters: usize) -> BriefingInput {
        BriefingInput {
            date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            gpr_score: gpr,
            gpr_trend: GprTrend::Stable,
            market_sentiment: -20.0,
            clusters: (0..clusters)
                .map(|i| BriefingCluster {
                    digest: ClusterDigest {
                        topic: format!("Trends in Topic{i}"),
                        article_count: 3,
                        aggregate_sentiment: -10.0,
                        keywords: vec![],
                    },
                    aggregate_impact: 50.0,
                    headlines: vec![],
                })
                .collect(),
        }
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let i = input(30, 2);
        assert_eq!(build_fallback(&i), build_fallback(&i));
    }

    #[test]
    fn test_fallback_contains_required_phrases() {
        let text = build_fallback(&input(30, 1));
        assert!(text.starts_with("Daily Market Intelligence Report."));
        assert!(text.contains("Top trending topic today is 'Trends in Topic0'"));
        assert!(text.contains("Geopolitical risk remains Stable at index level 30"));
    }

    #[test]
    fn test_fallback_elevated_threshold() {
        let text = build_fallback(&input(75, 1));
        assert!(text.contains("Elevated"));
    }

    #[test]
    fn test_fallback_no_clusters() {
        let text = build_fallback(&input(10, 0));
        assert!(text.contains("No dominant topic"));
    }
}
