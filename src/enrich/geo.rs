//! Geopolitical tagging.
//!
//! Weighted keyword match over seven buckets. One keyword hit per
//! bucket suffices to attach the tag; weights are shared with the GPR
//! dictionary consumers.

/// A tag bucket: name plus its trigger keywords.
pub struct GeoBucket {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    /// Relative severity weight, used by downstream scoring.
    pub weight: f64,
}

pub const GEO_BUCKETS: &[GeoBucket] = &[
    GeoBucket {
        name: "sanctions",
        keywords: &["sanction", "sanctions", "embargo", "export control", "export controls", "export ban", "blacklist"],
        weight: 2.0,
    },
    GeoBucket {
        name: "conflict",
        keywords: &["war", "military", "missile", "missiles", "invasion", "airstrike", "troops", "offensive"],
        weight: 3.0,
    },
    GeoBucket {
        name: "trade_war",
        keywords: &["tariff", "tariffs", "trade war", "trade dispute", "import duty", "retaliation"],
        weight: 2.0,
    },
    GeoBucket {
        name: "political_instability",
        keywords: &["coup", "unrest", "protest", "protests", "impeachment", "regime", "martial law"],
        weight: 2.5,
    },
    GeoBucket {
        name: "diplomatic_tension",
        keywords: &["diplomatic", "ambassador", "expelled", "talks collapse", "summit"],
        weight: 1.5,
    },
    GeoBucket {
        name: "regional_hotspot",
        keywords: &["taiwan strait", "south china sea", "middle east", "border clash", "red sea"],
        weight: 2.5,
    },
    GeoBucket {
        name: "security",
        keywords: &["espionage", "cyberattack", "cyberattacks", "terrorism", "spy", "sabotage"],
        weight: 2.0,
    },
];

/// True when `keyword` occurs in the text. Single words must match a
/// whole token ("war" must not fire on "warns"); phrases match as
/// substrings.
pub fn keyword_present(text_lower: &str, tokens: &[&str], keyword: &str) -> bool {
    if keyword.contains(' ') {
        text_lower.contains(keyword)
    } else {
        tokens.contains(&keyword)
    }
}

/// Lower-cased alphanumeric tokens of a text.
pub fn tokenize(text_lower: &str) -> Vec<&str> {
    text_lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Tags for one article text. A single keyword match per bucket is
/// enough; each bucket appears at most once.
pub fn geo_tags(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let tokens = tokenize(&lower);
    GEO_BUCKETS
        .iter()
        .filter(|bucket| {
            bucket
                .keywords
                .iter()
                .any(|kw| keyword_present(&lower, &tokens, kw))
        })
        .map(|bucket| bucket.name.to_string())
        .collect()
}
