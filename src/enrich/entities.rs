//! Lightweight noun-phrase entity extraction.
//!
//! Scans for capitalized token runs and classifies them into people,
//! organizations, places, and topics. Entities are deduplicated
//! case-insensitively; topics exclude a stop list, digit-only tokens,
//! and anything already classified under the other three buckets.

use std::collections::HashSet;

use crate::types::EntitySet;

/// Corporate suffixes that mark an organization.
const ORG_SUFFIXES: &[&str] = &[
    "inc", "corp", "corporation", "ltd", "llc", "plc", "group", "labs",
    "technologies", "systems", "holdings", "bank", "capital", "partners",
    "ventures", "semiconductor", "electronics",
];

/// Well-known organizations that carry no suffix.
const KNOWN_ORGS: &[&str] = &[
    "nvidia", "amd", "intel", "tsmc", "openai", "anthropic", "google",
    "microsoft", "amazon", "apple", "meta", "samsung", "asml", "arm",
    "qualcomm", "broadcom", "oracle", "ibm", "tesla", "huawei", "baidu",
    "tencent", "alibaba", "sk hynix", "micron", "crowdstrike", "palantir",
    "uipath", "fed", "ecb", "sec", "nato", "un", "imf", "opec", "pentagon",
    "white house", "congress", "kremlin",
];

/// Known geographic entities.
const KNOWN_PLACES: &[&str] = &[
    "taiwan", "china", "united states", "us", "usa", "america", "russia",
    "ukraine", "europe", "germany", "france", "japan", "south korea",
    "korea", "india", "israel", "iran", "beijing", "washington", "moscow",
    "brussels", "london", "tokyo", "seoul", "taipei", "shenzhen",
    "silicon valley", "arizona", "texas", "netherlands", "middle east",
    "asia", "gulf", "red sea", "hong kong", "singapore", "taiwan strait",
    "south china sea", "eastern europe",
];

/// Words never emitted as topics.
const TOPIC_STOP_LIST: &[&str] = &[
    "the", "a", "an", "this", "that", "these", "those", "new", "latest",
    "breaking", "update", "report", "reports", "news", "today", "yesterday",
    "tomorrow", "week", "month", "year", "monday", "tuesday", "wednesday",
    "thursday", "friday", "saturday", "sunday", "january", "february",
    "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "inc", "corp", "ltd", "with",
    "after", "before", "amid", "over", "under", "says", "said", "will",
    "could", "would", "how", "why", "what", "when",
];

/// Titles that prefix a person's name.
const PERSON_TITLES: &[&str] = &[
    "president", "ceo", "chairman", "minister", "secretary", "senator",
    "governor", "chancellor", "dr", "mr", "ms", "mrs",
];

/// Normalize an entity to title case ("sk hynix" → "Sk Hynix").
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_capitalized(word: &str) -> bool {
    word.chars().next().is_some_and(|c| c.is_uppercase())
}

fn clean_token(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-')
}

/// Collect runs of consecutive capitalized tokens as candidate phrases.
fn capitalized_phrases(text: &str) -> Vec<String> {
    let mut phrases = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for raw in text.split_whitespace() {
        let token = clean_token(raw);
        if token.len() > 1 && is_capitalized(token) {
            current.push(token);
        } else {
            if !current.is_empty() {
                phrases.push(current.join(" "));
                current.clear();
            }
        }
    }
    if !current.is_empty() {
        phrases.push(current.join(" "));
    }
    phrases
}

fn is_org(phrase_lower: &str) -> bool {
    if KNOWN_ORGS.contains(&phrase_lower) {
        return true;
    }
    phrase_lower
        .split_whitespace()
        .last()
        .is_some_and(|last| ORG_SUFFIXES.contains(&last))
}

fn is_place(phrase_lower: &str) -> bool {
    KNOWN_PLACES.contains(&phrase_lower)
}

fn looks_like_person(phrase_lower: &str) -> bool {
    let words: Vec<&str> = phrase_lower.split_whitespace().collect();
    if words
        .iter()
        .any(|w| TOPIC_STOP_LIST.contains(w) || KNOWN_PLACES.contains(w) || KNOWN_ORGS.contains(w))
    {
        return false;
    }
    match words.len() {
        // "President Macron" style: title + name.
        2 | 3 if PERSON_TITLES.contains(&words[0]) => true,
        // Two plain capitalized words with no digits reads as a name.
        2 => words.iter().all(|w| w.chars().all(|c| c.is_alphabetic())),
        _ => false,
    }
}

/// Push normalized, deduplicating case-insensitively across all buckets.
fn push_unique(bucket: &mut Vec<String>, seen: &mut HashSet<String>, phrase: &str) {
    let key = phrase.to_lowercase();
    if seen.insert(key) {
        bucket.push(title_case(phrase));
    }
}

/// Extract entities from article text.
pub fn extract_entities(text: &str) -> EntitySet {
    let mut set = EntitySet::default();
    let mut seen: HashSet<String> = HashSet::new();

    for phrase in capitalized_phrases(text) {
        let lower = phrase.to_lowercase();

        if is_org(&lower) {
            push_unique(&mut set.organizations, &mut seen, &phrase);
        } else if is_place(&lower) {
            push_unique(&mut set.places, &mut seen, &phrase);
        } else if looks_like_person(&lower) {
            let name = lower
                .split_whitespace()
                .filter(|w| !PERSON_TITLES.contains(w))
                .collect::<Vec<_>>()
                .join(" ");
            if !name.is_empty() {
                push_unique(&mut set.people, &mut seen, &name);
            }
        } else {
            // Single capitalized words: check word-level membership, then
            // treat the survivors as topic candidates.
            for word in phrase.split_whitespace() {
                let word_lower = word.to_lowercase();
                if is_org(&word_lower) {
                    push_unique(&mut set.organizations, &mut seen, word);
                } else if is_place(&word_lower) {
                    push_unique(&mut set.places, &mut seen, word);
                } else if word_lower.len() > 3
                    && !word_lower.chars().all(|c| c.is_ascii_digit())
                    && !TOPIC_STOP_LIST.contains(&word_lower.as_str())
                {
                    push_unique(&mut set.topics, &mut seen, word);
                }
            }
        }
    }

    set
}

/// Topic keywords for clustering: entity topics plus plain nouns longer
/// than 3 chars, stop-listed and deduplicated, original text order.
pub fn extract_keywords(text: &str, max: usize) -> Vec<String> {
    let set = extract_entities(text);
    let mut seen: HashSet<String> = HashSet::new();
    let mut keywords = Vec::new();

    for topic in &set.topics {
        let key = topic.to_lowercase();
        if seen.insert(key.clone()) {
            keywords.push(key);
        }
    }

    for raw in text.split_whitespace() {
        if keywords.len() >= max {
            break;
        }
        let token = clean_token(raw).to_lowercase();
        if token.len() > 3
            && !token.chars().all(|c| c.is_ascii_digit())
            && !TOPIC_STOP_LIST.contains(&token.as_str())
            && seen.insert(token.clone())
        {
            keywords.push(token);
        }
    }

    keywords.truncate(max);
    keywords
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
