//! Client for the external SRD reference API (dnd5eapi-compatible).
//!
//! Names are resolved to the API's canonical index (`"Magic Missile"` →
//! `magic-missile`) and fetched from the typed collection. Every found
//! record is rendered to a plain-text block and paired with its canonical
//! URL so it can be cited. A 404 is a normal outcome and yields `Ok(None)`.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::SrdConfig;
use crate::error::{ensure_success, BackendError};
use crate::models::{ReferenceKind, ReferenceRecord};
use crate::rag::probe;
use crate::traits::ReferenceLookup;

pub struct SrdClient {
    client: reqwest::Client,
    base_url: String,
}

/// Converts a display name to the API index: lower-case, runs of
/// non-alphanumerics collapsed to `-`, and no leading or trailing `-`.
pub fn to_index(name: &str) -> String {
    let mut index = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !index.is_empty() {
                index.push('-');
            }
            pending_dash = false;
            index.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    index
}

impl SrdClient {
    pub fn new(config: &SrdConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetches the per-level progression of a class (features, proficiency
    /// bonus, spell slots).
    pub async fn class_level(
        &self,
        class_name: &str,
        level: u8,
    ) -> Result<Option<ReferenceRecord>, BackendError> {
        let index = to_index(class_name);
        if index.is_empty() {
            return Ok(None);
        }
        let url = format!("{}/classes/{}/levels/{}", self.base_url, index, level);
        Ok(self
            .get_json(&url)
            .await?
            .map(|json| ReferenceRecord {
                title: format!("{} level {}", display_name(&json, class_name), level),
                text: format_class_level(&json),
                url,
            }))
    }

    async fn get_json(&self, url: &str) -> Result<Option<Value>, BackendError> {
        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response).await?;
        let json = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(Some(json))
    }
}

#[async_trait]
impl ReferenceLookup for SrdClient {
    async fn lookup(
        &self,
        kind: ReferenceKind,
        name: &str,
    ) -> Result<Option<ReferenceRecord>, BackendError> {
        let index = to_index(name);
        if index.is_empty() {
            return Ok(None);
        }
        let url = format!("{}/{}/{}", self.base_url, kind.collection(), index);
        let Some(json) = self.get_json(&url).await? else {
            return Ok(None);
        };
        Ok(Some(ReferenceRecord {
            title: display_name(&json, name),
            text: format_record(kind, &json),
            url,
        }))
    }

    async fn healthy(&self) -> bool {
        probe(&self.client, &self.base_url).await
    }
}

pub fn format_record(kind: ReferenceKind, json: &Value) -> String {
    match kind {
        ReferenceKind::Spell => format_spell(json),
        ReferenceKind::Monster => format_monster(json),
        ReferenceKind::Class => format_class(json),
        ReferenceKind::Race => format_race(json),
    }
}

fn display_name(json: &Value, fallback: &str) -> String {
    json["name"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

fn text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Joins a string array, or the `name` of each object in an array.
fn names(v: &Value) -> Option<String> {
    let items: Vec<String> = v
        .as_array()?
        .iter()
        .filter_map(|item| text(item).or_else(|| text(&item["name"])))
        .collect();
    (!items.is_empty()).then(|| items.join(", "))
}

fn paragraphs(v: &Value) -> Option<String> {
    match v {
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(text).collect();
            (!parts.is_empty()).then(|| parts.join("\n"))
        }
        other => text(other),
    }
}

fn push_line(out: &mut Vec<String>, label: &str, value: Option<String>) {
    if let Some(v) = value {
        out.push(format!("{}: {}", label, v));
    }
}

fn format_spell(json: &Value) -> String {
    let mut out = vec![display_name(json, "Unknown spell")];
    let level = json["level"].as_u64();
    let school = json["school"]["name"].as_str();
    match (level, school) {
        (Some(0), Some(s)) => out.push(format!("{} cantrip", s)),
        (Some(l), Some(s)) => out.push(format!("Level {} {}", l, s.to_lowercase())),
        (Some(l), None) => out.push(format!("Level {}", l)),
        _ => {}
    }
    push_line(&mut out, "Casting Time", text(&json["casting_time"]));
    push_line(&mut out, "Range", text(&json["range"]));
    let components = names(&json["components"]).map(|c| match json["material"].as_str() {
        Some(m) => format!("{} ({})", c, m),
        None => c,
    });
    push_line(&mut out, "Components", components);
    let duration = text(&json["duration"]).map(|d| {
        if json["concentration"].as_bool() == Some(true) {
            format!("Concentration, {}", d)
        } else {
            d
        }
    });
    push_line(&mut out, "Duration", duration);
    push_line(&mut out, "Classes", names(&json["classes"]));
    if let Some(desc) = paragraphs(&json["desc"]) {
        out.push(desc);
    }
    push_line(&mut out, "At Higher Levels", paragraphs(&json["higher_level"]));
    out.join("\n")
}

fn format_monster(json: &Value) -> String {
    let mut out = vec![display_name(json, "Unknown monster")];
    let kind: Vec<String> = ["size", "type", "alignment"]
        .iter()
        .filter_map(|k| text(&json[*k]))
        .collect();
    if !kind.is_empty() {
        out.push(kind.join(" "));
    }
    let ac = match &json["armor_class"] {
        Value::Array(items) => items.first().and_then(|a| text(&a["value"])),
        other => text(other),
    };
    push_line(&mut out, "Armor Class", ac);
    let hp = text(&json["hit_points"]).map(|hp| match json["hit_dice"].as_str() {
        Some(dice) => format!("{} ({})", hp, dice),
        None => hp,
    });
    push_line(&mut out, "Hit Points", hp);
    if let Some(speed) = json["speed"].as_object() {
        let parts: Vec<String> = speed
            .iter()
            .filter_map(|(mode, v)| text(v).map(|v| format!("{} {}", mode, v)))
            .collect();
        push_line(&mut out, "Speed", (!parts.is_empty()).then(|| parts.join(", ")));
    }
    let abilities: Vec<String> = [
        ("STR", "strength"),
        ("DEX", "dexterity"),
        ("CON", "constitution"),
        ("INT", "intelligence"),
        ("WIS", "wisdom"),
        ("CHA", "charisma"),
    ]
    .iter()
    .filter_map(|(abbr, key)| json[*key].as_i64().map(|v| format!("{} {}", abbr, v)))
    .collect();
    if !abilities.is_empty() {
        out.push(abilities.join(" | "));
    }
    let cr = text(&json["challenge_rating"]).map(|cr| match json["xp"].as_u64() {
        Some(xp) => format!("{} ({} XP)", cr, xp),
        None => cr,
    });
    push_line(&mut out, "Challenge", cr);
    for (label, key) in [("Trait", "special_abilities"), ("Action", "actions")] {
        if let Some(items) = json[key].as_array() {
            for item in items {
                if let (Some(name), Some(desc)) = (item["name"].as_str(), item["desc"].as_str()) {
                    out.push(format!("{} - {}: {}", label, name, desc));
                }
            }
        }
    }
    out.join("\n")
}

fn format_class(json: &Value) -> String {
    let mut out = vec![display_name(json, "Unknown class")];
    push_line(&mut out, "Hit Die", text(&json["hit_die"]).map(|d| format!("d{}", d)));
    push_line(&mut out, "Proficiencies", names(&json["proficiencies"]));
    push_line(&mut out, "Saving Throws", names(&json["saving_throws"]));
    push_line(
        &mut out,
        "Spellcasting Ability",
        text(&json["spellcasting"]["spellcasting_ability"]["name"]),
    );
    push_line(&mut out, "Subclasses", names(&json["subclasses"]));
    out.join("\n")
}

fn format_race(json: &Value) -> String {
    let mut out = vec![display_name(json, "Unknown race")];
    push_line(&mut out, "Speed", text(&json["speed"]));
    if let Some(bonuses) = json["ability_bonuses"].as_array() {
        let parts: Vec<String> = bonuses
            .iter()
            .filter_map(|b| {
                let ability = b["ability_score"]["name"].as_str()?;
                let bonus = b["bonus"].as_i64()?;
                Some(format!("{} {:+}", ability, bonus))
            })
            .collect();
        push_line(
            &mut out,
            "Ability Bonuses",
            (!parts.is_empty()).then(|| parts.join(", ")),
        );
    }
    push_line(&mut out, "Size", text(&json["size"]));
    push_line(&mut out, "Alignment", text(&json["alignment"]));
    push_line(&mut out, "Age", text(&json["age"]));
    push_line(&mut out, "Languages", names(&json["languages"]));
    push_line(&mut out, "Traits", names(&json["traits"]));
    out.join("\n")
}

fn format_class_level(json: &Value) -> String {
    let mut out = Vec::new();
    push_line(&mut out, "Level", text(&json["level"]));
    push_line(
        &mut out,
        "Proficiency Bonus",
        json["prof_bonus"].as_i64().map(|b| format!("{:+}", b)),
    );
    push_line(&mut out, "Features", names(&json["features"]));
    if let Some(slots) = json["spellcasting"].as_object() {
        let mut parts: Vec<(String, String)> = slots
            .iter()
            .filter_map(|(k, v)| text(v).map(|v| (k.clone(), v)))
            .collect();
        parts.sort();
        let rendered: Vec<String> = parts.iter().map(|(k, v)| format!("{} {}", k, v)).collect();
        push_line(
            &mut out,
            "Spellcasting",
            (!rendered.is_empty()).then(|| rendered.join(", ")),
        );
    }
    out.join("\n")
}
