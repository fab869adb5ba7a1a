//! Context assembly.
//!
//! Turns whatever the backends returned into one bounded text block for the
//! LLM. Every entry is tagged `[S<n>]` and paired with a [`SourceRef`] the
//! caller can resolve. Exact structured matches come first, then SRD
//! reference records, then semantic hits by descending score. Entries that
//! do not fit in the budget are dropped; only included entries are cited.

use serde_json::Value;

use crate::models::{
    Equipment, Monster, ReferenceKind, ReferenceRecord, Room, SearchHit, SourceOrigin,
    SourceRef, Spell, StructuredRows,
};
use crate::srd::to_index;

/// One citable piece of retrieved material.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEntry {
    pub origin: SourceOrigin,
    pub reference: String,
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    pub text: String,
    pub sources: Vec<SourceRef>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

fn origin_rank(origin: SourceOrigin) -> u8 {
    match origin {
        SourceOrigin::Sqlite => 0,
        SourceOrigin::Srd => 1,
        SourceOrigin::Rag => 2,
    }
}

/// Orders, tags, and bounds the entries.
///
/// The first entry is truncated rather than dropped so a single oversized
/// row still grounds the answer.
pub fn assemble(mut entries: Vec<ContextEntry>, max_chars: usize) -> AssembledContext {
    entries.sort_by_key(|e| origin_rank(e.origin));

    let mut out = AssembledContext::default();
    let mut used = 0usize;

    for entry in entries {
        let tag = format!("S{}", out.sources.len() + 1);
        let header = format!("[{}] {} ({})\n", tag, entry.title, entry.reference);
        let mut block = format!("{}{}\n\n", header, entry.text.trim());
        let len = block.chars().count();

        if used + len > max_chars {
            if !out.sources.is_empty() {
                break;
            }
            let room = max_chars.saturating_sub(used);
            if room <= header.chars().count() {
                break;
            }
            block = truncate_chars(&block, room);
        }

        used += block.chars().count();
        out.text.push_str(&block);
        out.sources.push(SourceRef {
            tag,
            origin: entry.origin,
            reference: entry.reference,
            title: entry.title,
        });
    }

    let trimmed = out.text.trim_end().len();
    out.text.truncate(trimmed);
    out
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

// ============ Entry builders ============

pub fn entries_from_rows(rows: &StructuredRows) -> Vec<ContextEntry> {
    match rows {
        StructuredRows::Spells(r) => r.iter().map(spell_entry).collect(),
        StructuredRows::Monsters(r) => r.iter().map(monster_entry).collect(),
        StructuredRows::Equipment(r) => r.iter().map(equipment_entry).collect(),
        StructuredRows::Rooms(r) => r.iter().map(room_entry).collect(),
    }
}

/// Semantic hits, best score first.
pub fn entries_from_hits(hits: &[SearchHit]) -> Vec<ContextEntry> {
    let mut sorted: Vec<&SearchHit> = hits.iter().filter(|h| !h.text.trim().is_empty()).collect();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));
    sorted
        .into_iter()
        .map(|hit| ContextEntry {
            origin: SourceOrigin::Rag,
            reference: format!("chunk/{}", hit.id),
            title: ["title", "source", "section"]
                .iter()
                .find_map(|k| hit.metadata.get(*k).and_then(Value::as_str))
                .unwrap_or(hit.id.as_str())
                .to_string(),
            text: hit.text.clone(),
        })
        .collect()
}

pub fn entry_from_reference(kind: ReferenceKind, record: &ReferenceRecord) -> ContextEntry {
    ContextEntry {
        origin: SourceOrigin::Srd,
        reference: record.url.clone(),
        title: format!("SRD {}: {}", kind.collection(), record.title),
        text: record.text.clone(),
    }
}

fn line(out: &mut Vec<String>, label: &str, value: Option<&str>) {
    if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
        out.push(format!("{}: {}", label, v.trim()));
    }
}

fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_text).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .filter_map(|(k, v)| value_text(v).map(|v| format!("{} {}", k, v)))
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        other => Some(other.to_string()),
    }
}

fn spell_entry(spell: &Spell) -> ContextEntry {
    let mut out = Vec::new();
    match (spell.level, spell.school.as_deref()) {
        (Some(0), Some(school)) => out.push(format!("{} cantrip", school)),
        (Some(level), Some(school)) => out.push(format!("Level {} {}", level, school)),
        (Some(level), None) => out.push(format!("Level {}", level)),
        (None, Some(school)) => out.push(school.to_string()),
        (None, None) => {}
    }
    line(&mut out, "Casting Time", spell.casting_time.as_deref());
    line(&mut out, "Range", spell.range.as_deref());
    line(&mut out, "Components", spell.components.as_deref());
    line(&mut out, "Duration", spell.duration.as_deref());
    line(&mut out, "Classes", spell.classes.as_deref());
    if let Some(desc) = spell.description.as_deref() {
        out.push(desc.trim().to_string());
    }
    line(&mut out, "At Higher Levels", spell.higher_levels.as_deref());
    line(&mut out, "Source", spell.source.as_deref());

    ContextEntry {
        origin: SourceOrigin::Sqlite,
        reference: format!("spells/{}", to_index(&spell.name)),
        title: spell.name.clone(),
        text: out.join("\n"),
    }
}

fn monster_entry(monster: &Monster) -> ContextEntry {
    let mut out = Vec::new();
    let kind: Vec<&str> = [
        monster.size.as_deref(),
        monster.creature_type.as_deref(),
        monster.alignment.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !kind.is_empty() {
        out.push(kind.join(" "));
    }
    line(&mut out, "Challenge Rating", monster.cr.as_deref());
    let ac = monster.ac.as_ref().and_then(value_text);
    line(&mut out, "Armor Class", ac.as_deref());
    let hp = monster.hp.as_ref().and_then(value_text);
    line(&mut out, "Hit Points", hp.as_deref());
    line(&mut out, "Speed", monster.speed.as_deref());
    let abilities = monster.abilities.as_ref().and_then(value_text);
    line(&mut out, "Abilities", abilities.as_deref());
    line(&mut out, "Source", monster.source.as_deref());

    ContextEntry {
        origin: SourceOrigin::Sqlite,
        reference: format!("monsters/{}", to_index(&monster.name)),
        title: monster.name.clone(),
        text: out.join("\n"),
    }
}

fn equipment_entry(item: &Equipment) -> ContextEntry {
    let mut out = Vec::new();
    line(&mut out, "Category", item.category.as_deref());
    line(&mut out, "Cost", item.cost.as_deref());
    let weight = item.weight.as_ref().and_then(value_text);
    line(&mut out, "Weight", weight.as_deref());
    if let Some(desc) = item.description.as_deref() {
        out.push(desc.trim().to_string());
    }
    line(&mut out, "Source", item.source.as_deref());

    ContextEntry {
        origin: SourceOrigin::Sqlite,
        reference: format!("equipment/{}", to_index(&item.name)),
        title: item.name.clone(),
        text: out.join("\n"),
    }
}

fn room_entry(room: &Room) -> ContextEntry {
    let mut out = Vec::new();
    line(&mut out, "Region", room.region.as_deref());
    line(&mut out, "Dimensions", room.dimensions.as_deref());
    if let Some(desc) = room.description.as_deref() {
        out.push(desc.trim().to_string());
    }
    line(&mut out, "Features", room.features.as_deref());
    if !room.monsters.is_empty() {
        let monsters: Vec<String> = room
            .monsters
            .iter()
            .map(|m| match m.count {
                Some(n) if n > 1 => format!("{} x{}", m.name, n),
                _ => m.name.clone(),
            })
            .collect();
        out.push(format!("Monsters: {}", monsters.join(", ")));
    }
    line(&mut out, "Treasure", room.treasure.as_deref());
    line(&mut out, "Traps", room.traps.as_deref());
    line(&mut out, "Notes", room.notes.as_deref());

    let title = match room.name.as_deref() {
        Some(name) => format!("Room {}: {}", room.room_id, name),
        None => format!("Room {}", room.room_id),
    };

    ContextEntry {
        origin: SourceOrigin::Sqlite,
        reference: format!("rooms/{}", room.room_id),
        title,
        text: out.join("\n"),
    }
}
