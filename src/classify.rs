//! Query classification.
//!
//! Maps a raw chat message to a [`Classification`]: which backends to call,
//! which structured endpoints to narrow to, and which entities were found in
//! the text. Classification is a pure function with no I/O and never fails;
//! a query with no recognizable signal falls through to a low-confidence
//! semantic classification.
//!
//! # Rules
//!
//! Evaluated in priority order, first match wins:
//!
//! | Rule | Type | Confidence | Structured endpoints |
//! |------|------|------------|----------------------|
//! | room id found (`A12`) | hybrid | 0.9 | rooms |
//! | region found (`region B`) | hybrid | 0.8 | rooms |
//! | structured > semantic and structured >= 2 | structured | min(0.95, 0.6 + 0.1 * s) | detected, else spells + monsters |
//! | structured > 0 and semantic > 0 | hybrid | 0.7 | detected, else all |
//! | otherwise | semantic | min(0.9, 0.6 + 0.1 * m), or 0.6 | all |
//!
//! Both backends are always queried; the type label only picks endpoints and
//! feeds logs.
//!
//! # Known limitations
//!
//! The name heuristics are phrase patterns, not a parser. Ordinary prose can
//! trip them ("the best spell" yields spell name `best`), dice notation
//! such as `d20` reads as a room id in region D, and the article in "an area
//! a wizard can rest in" reads as region A.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{
    Classification, ExtractedEntities, QueryType, RoutingDirective, StructuredEndpoint,
};

static ROOM_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b([a-d])(\d{1,3})\b").expect("room id regex is valid"));

static REGION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:region|area|wing)\s+([a-d])\b").expect("region regex is valid")
});

static LEVEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\blevel\s+([0-9])\b|\b([1-9])(?:st|nd|rd|th)[\s-]level\b")
        .expect("level regex is valid")
});

static CR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:cr|challenge(?:\s+rating)?)\s*(\d{1,2}/\d{1,2}|\d{1,2})\b")
        .expect("cr regex is valid")
});

static SPELL_CAST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bcast(?:s|ing)?\s+([a-z][a-z']*(?:\s+[a-z][a-z']*){0,2}?)(?:\s+(?:spell|on|at|against|in|with)\b|\s*[?.!,]|\s*$)",
    )
    .expect("spell cast regex is valid")
});

static SPELL_NOUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([a-z][a-z']*(?:\s+[a-z][a-z']*){0,2})\s+spell\b")
        .expect("spell noun regex is valid")
});

static MONSTER_VERB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:fight(?:ing)?|encounter(?:ing)?|facing|against)\s+([a-z][a-z']*(?:\s+[a-z][a-z']*){0,2}?)(?:\s+(?:in|at|with|on)\b|\s*[?.!,]|\s*$)",
    )
    .expect("monster verb regex is valid")
});

static MONSTER_NOUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([a-z][a-z']*(?:\s+[a-z][a-z']*){0,2})\s+(?:monster|creature)\b")
        .expect("monster noun regex is valid")
});

/// Keywords that signal a lookup, listing, or count.
const STRUCTURED_KEYWORDS: &[&str] = &[
    "list",
    "all",
    "how many",
    "count",
    "cr",
    "challenge rating",
    "find",
    "show",
    "which",
    "what level",
    "stats",
    "statistics",
    "table",
    "compare",
];

/// Keywords that signal explanation, narrative, or rules questions.
const SEMANTIC_KEYWORDS: &[&str] = &[
    "how does",
    "how do",
    "explain",
    "why",
    "lore",
    "story",
    "history",
    "describe",
    "mechanics",
    "rule",
    "rules",
    "work",
    "works",
    "strategy",
    "tactics",
    "what happens",
];

const SPELL_TERMS: &[&str] = &[
    "spell", "spells", "cantrip", "cantrips", "cast", "casting", "wizard", "cleric", "sorcerer",
    "warlock", "druid", "bard", "paladin", "ranger",
];

const MONSTER_TERMS: &[&str] = &[
    "monster",
    "monsters",
    "creature",
    "creatures",
    "cr",
    "challenge rating",
    "beast",
    "undead",
    "dragon",
];

const EQUIPMENT_TERMS: &[&str] = &[
    "equipment",
    "weapon",
    "weapons",
    "armor",
    "armour",
    "gear",
    "item",
    "items",
    "cost",
];

const ROOM_TERMS: &[&str] = &["room", "rooms", "area", "region", "chamber", "dungeon"];

const CATEGORY_TERMS: [(StructuredEndpoint, &[&str]); 4] = [
    (StructuredEndpoint::Spells, SPELL_TERMS),
    (StructuredEndpoint::Monsters, MONSTER_TERMS),
    (StructuredEndpoint::Equipment, EQUIPMENT_TERMS),
    (StructuredEndpoint::Rooms, ROOM_TERMS),
];

/// Dropped during search-term distillation. Category words are included so
/// the remaining terms name the subject, not the table.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "could", "did", "do",
    "does", "for", "from", "had", "has", "have", "how", "i", "if", "in", "into", "is", "it",
    "its", "me", "my", "of", "on", "or", "our", "should", "so", "tell", "than", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "those", "to", "us", "was", "we",
    "were", "what", "when", "where", "which", "who", "why", "will", "with", "would", "you",
    "your", "about", "all", "any", "some", "list", "show", "find", "give", "get", "many",
    "much", "spell", "spells", "monster", "monsters", "creature", "creatures", "room", "rooms",
    "level", "levels",
];

/// Words trimmed from the edges of a captured spell or monster name.
const NAME_EDGE_WORDS: &[&str] = &[
    "a", "an", "the", "this", "that", "these", "those", "is", "are", "was", "what", "which",
    "who", "how", "does", "do", "can", "could", "my", "your", "our", "their", "his", "her",
    "its", "some", "any", "level", "i", "we", "you", "they", "it", "of", "for", "to", "about",
    "tell", "me", "explain", "describe", "when", "where", "why", "cast", "casting",
];

/// Classifies a query. Always succeeds.
pub fn classify(query: &str) -> Classification {
    let entities = extract_entities(query);
    let text = keyword_text(query);

    if let Some(room_id) = &entities.room_id {
        let reasoning = format!("room id {} found; room lookup plus narrative search", room_id);
        return Classification {
            query_type: QueryType::Hybrid,
            confidence: 0.9,
            routing: RoutingDirective::both(&[StructuredEndpoint::Rooms]),
            entities,
            reasoning,
        };
    }

    if let Some(region) = &entities.region {
        let reasoning = format!("region {} found; room lookup plus narrative search", region);
        return Classification {
            query_type: QueryType::Hybrid,
            confidence: 0.8,
            routing: RoutingDirective::both(&[StructuredEndpoint::Rooms]),
            entities,
            reasoning,
        };
    }

    let structured_hits = matched_keywords(&text, STRUCTURED_KEYWORDS);
    let semantic_hits = matched_keywords(&text, SEMANTIC_KEYWORDS);
    let categories = detected_categories(&text);

    let structured_score = structured_hits.len() as f64 + 0.5 * categories.len() as f64;
    let semantic_score = semantic_hits.len() as f64;

    let mut reasoning = format!(
        "structured score {} ({}), semantic score {} ({})",
        structured_score,
        describe(&structured_hits),
        semantic_score,
        describe(&semantic_hits)
    );
    if !categories.is_empty() {
        let names: Vec<&str> = categories.iter().map(|c| c.path()).collect();
        reasoning.push_str(&format!("; categories: {}", names.join(", ")));
    }
    let found = describe_entities(&entities);
    if !found.is_empty() {
        reasoning.push_str(&format!("; entities: {}", found));
    }

    let (query_type, confidence, endpoints) =
        if structured_score > semantic_score && structured_score >= 2.0 {
            let endpoints = if categories.is_empty() {
                vec![StructuredEndpoint::Spells, StructuredEndpoint::Monsters]
            } else {
                categories
            };
            (
                QueryType::Structured,
                (0.6 + 0.1 * structured_score).min(0.95),
                endpoints,
            )
        } else if structured_score > 0.0 && semantic_score > 0.0 {
            let endpoints = if categories.is_empty() {
                StructuredEndpoint::ALL.to_vec()
            } else {
                categories
            };
            (QueryType::Hybrid, 0.7, endpoints)
        } else {
            let confidence = if semantic_score > 0.0 {
                (0.6 + 0.1 * semantic_score).min(0.9)
            } else {
                0.6
            };
            (
                QueryType::Semantic,
                confidence,
                StructuredEndpoint::ALL.to_vec(),
            )
        };

    Classification {
        query_type,
        confidence: round2(confidence),
        routing: RoutingDirective::both(&endpoints),
        entities,
        reasoning,
    }
}

/// Runs every entity pattern over the query. Several entities may be found
/// at once.
pub fn extract_entities(query: &str) -> ExtractedEntities {
    let lower = query.to_lowercase();
    let mut entities = ExtractedEntities {
        search_terms: distill_search_terms(query),
        ..Default::default()
    };

    if let Some(caps) = ROOM_ID_RE.captures(query) {
        let letter = caps[1].to_uppercase();
        entities.room_id = Some(format!("{}{}", letter, &caps[2]));
        entities.region = Some(letter);
    }

    if entities.region.is_none() {
        if let Some(caps) = REGION_RE.captures(query) {
            entities.region = Some(caps[1].to_uppercase());
        }
    }

    if let Some(caps) = LEVEL_RE.captures(query) {
        entities.level = caps
            .get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse().ok());
    } else if contains_word(&lower, "cantrip") || contains_word(&lower, "cantrips") {
        entities.level = Some(0);
    }

    if let Some(caps) = CR_RE.captures(query) {
        entities.cr = Some(caps[1].to_string());
    }

    entities.spell_name = first_name(&[&*SPELL_CAST_RE, &*SPELL_NOUN_RE], &lower);
    entities.monster_name = first_name(&[&*MONSTER_VERB_RE, &*MONSTER_NOUN_RE], &lower);

    entities
}

/// Reduces a query to its subject terms.
///
/// Lower-cases, strips punctuation, and drops one-character tokens and stop
/// words. Falls back to the original query when nothing survives, so the
/// result is never empty for non-empty input.
pub fn distill_search_terms(query: &str) -> String {
    let terms: Vec<String> = tokenize(query)
        .into_iter()
        .filter(|t| t.chars().count() > 1 && !STOP_WORDS.contains(&t.as_str()))
        .collect();

    if terms.is_empty() {
        query.to_string()
    } else {
        terms.join(" ")
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().map(str::to_string).collect()
}

/// Space-padded token stream so phrases match on whole words only.
fn keyword_text(query: &str) -> String {
    format!(" {} ", tokenize(query).join(" "))
}

fn contains_word(text: &str, word: &str) -> bool {
    keyword_text(text).contains(&format!(" {} ", word))
}

fn matched_keywords(text: &str, keywords: &[&'static str]) -> Vec<&'static str> {
    keywords
        .iter()
        .copied()
        .filter(|kw| text.contains(&format!(" {} ", kw)))
        .collect()
}

fn detected_categories(text: &str) -> Vec<StructuredEndpoint> {
    CATEGORY_TERMS
        .iter()
        .filter(|(_, terms)| !matched_keywords(text, terms).is_empty())
        .map(|(endpoint, _)| *endpoint)
        .collect()
}

fn first_name(patterns: &[&Regex], lower: &str) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures_iter(lower)
            .find_map(|caps| caps.get(1).and_then(|m| clean_name(m.as_str())))
    })
}

/// Trims filler words from both ends of a captured name.
fn clean_name(raw: &str) -> Option<String> {
    let words: Vec<&str> = raw.split_whitespace().collect();
    let start = words
        .iter()
        .position(|w| !NAME_EDGE_WORDS.contains(w))?;
    let end = words
        .iter()
        .rposition(|w| !NAME_EDGE_WORDS.contains(w))?;
    let name = words[start..=end].join(" ");
    if name.chars().count() < 3 {
        None
    } else {
        Some(name)
    }
}

fn describe(hits: &[&str]) -> String {
    if hits.is_empty() {
        "none".to_string()
    } else {
        hits.join(", ")
    }
}

fn describe_entities(e: &ExtractedEntities) -> String {
    let mut parts = Vec::new();
    if let Some(v) = &e.spell_name {
        parts.push(format!("spell '{}'", v));
    }
    if let Some(v) = &e.monster_name {
        parts.push(format!("monster '{}'", v));
    }
    if let Some(v) = e.level {
        parts.push(format!("level {}", v));
    }
    if let Some(v) = &e.cr {
        parts.push(format!("cr {}", v));
    }
    parts.join(", ")
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
