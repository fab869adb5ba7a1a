//! Core data models used throughout the router.
//!
//! These types represent the classification of a query, the rows and hits
//! returned by each backend, and the request/response bodies of the chat API.
//! Nothing here outlives a single request.

use serde::{Deserialize, Serialize};

/// Coarse intent label attached to every classified query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Semantic,
    Structured,
    Hybrid,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Semantic => "semantic",
            QueryType::Structured => "structured",
            QueryType::Hybrid => "hybrid",
        }
    }
}

/// A read endpoint of the structured-data backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructuredEndpoint {
    Spells,
    Monsters,
    Equipment,
    Rooms,
}

impl StructuredEndpoint {
    pub const ALL: [StructuredEndpoint; 4] = [
        StructuredEndpoint::Spells,
        StructuredEndpoint::Monsters,
        StructuredEndpoint::Equipment,
        StructuredEndpoint::Rooms,
    ];

    /// Path segment on the structured-data backend.
    pub fn path(&self) -> &'static str {
        match self {
            StructuredEndpoint::Spells => "spells",
            StructuredEndpoint::Monsters => "monsters",
            StructuredEndpoint::Equipment => "equipment",
            StructuredEndpoint::Rooms => "rooms",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "spells" | "spell" => Some(StructuredEndpoint::Spells),
            "monsters" | "monster" => Some(StructuredEndpoint::Monsters),
            "equipment" => Some(StructuredEndpoint::Equipment),
            "rooms" | "room" => Some(StructuredEndpoint::Rooms),
            _ => None,
        }
    }
}

/// Entities pulled out of the query text. Absence means "no match".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spell_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monster_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cr: Option<String>,
    /// Stop-word-filtered search terms; never empty for non-empty input.
    pub search_terms: String,
}

/// Which backends to call and which structured endpoints to hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDirective {
    pub query_vector_backend: bool,
    pub query_structured_backend: bool,
    pub structured_endpoints: Vec<StructuredEndpoint>,
}

impl RoutingDirective {
    /// Routes to both backends, with endpoints de-duplicated in canonical order.
    pub fn both(endpoints: &[StructuredEndpoint]) -> Self {
        let mut structured_endpoints = endpoints.to_vec();
        structured_endpoints.sort();
        structured_endpoints.dedup();
        Self {
            query_vector_backend: true,
            query_structured_backend: !structured_endpoints.is_empty(),
            structured_endpoints,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "type")]
    pub query_type: QueryType,
    pub confidence: f64,
    pub routing: RoutingDirective,
    pub entities: ExtractedEntities,
    pub reasoning: String,
}

// ============ Backend payloads ============

/// One result from the semantic-search backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Spell {
    pub name: String,
    pub level: Option<i64>,
    pub school: Option<String>,
    pub casting_time: Option<String>,
    pub range: Option<String>,
    pub components: Option<String>,
    pub duration: Option<String>,
    pub classes: Option<String>,
    pub description: Option<String>,
    pub higher_levels: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Monster {
    pub name: String,
    #[serde(deserialize_with = "deserialize_cr")]
    pub cr: Option<String>,
    pub cr_numeric: Option<f64>,
    #[serde(rename = "type")]
    pub creature_type: Option<String>,
    pub size: Option<String>,
    pub alignment: Option<String>,
    pub ac: Option<serde_json::Value>,
    pub hp: Option<serde_json::Value>,
    pub speed: Option<String>,
    pub abilities: Option<serde_json::Value>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Equipment {
    pub name: String,
    pub category: Option<String>,
    pub cost: Option<String>,
    pub weight: Option<serde_json::Value>,
    pub description: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomMonster {
    pub name: String,
    #[serde(default)]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Room {
    pub room_id: String,
    pub region: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub dimensions: Option<String>,
    pub features: Option<String>,
    #[serde(deserialize_with = "deserialize_room_monsters")]
    pub monsters: Vec<RoomMonster>,
    pub treasure: Option<String>,
    pub traps: Option<String>,
    pub notes: Option<String>,
}

/// Challenge ratings arrive as text ("1/4") or as a bare number (2).
fn deserialize_cr<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) if s.trim().is_empty() => None,
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// The rooms table stores `monsters` as a JSON array, which some backends
/// return still encoded as a string. Hand-written notes ("3 goblins") are
/// kept verbatim as a single entry.
fn deserialize_room_monsters<'de, D>(deserializer: D) -> Result<Vec<RoomMonster>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let items = match value {
        serde_json::Value::Null => return Ok(Vec::new()),
        serde_json::Value::String(s) if s.trim().is_empty() => return Ok(Vec::new()),
        serde_json::Value::String(s) => match serde_json::from_str(&s) {
            Ok(serde_json::Value::Array(items)) => items,
            _ => {
                return Ok(vec![RoomMonster {
                    name: s.trim().to_string(),
                    count: None,
                }])
            }
        },
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };

    Ok(items.into_iter().filter_map(room_monster).collect())
}

fn room_monster(item: serde_json::Value) -> Option<RoomMonster> {
    match item {
        serde_json::Value::String(name) if !name.trim().is_empty() => Some(RoomMonster {
            name: name.trim().to_string(),
            count: None,
        }),
        serde_json::Value::Object(_) => serde_json::from_value(item).ok(),
        _ => None,
    }
}

/// Rows returned by one structured endpoint.
#[derive(Debug, Clone)]
pub enum StructuredRows {
    Spells(Vec<Spell>),
    Monsters(Vec<Monster>),
    Equipment(Vec<Equipment>),
    Rooms(Vec<Room>),
}

impl StructuredRows {
    pub fn endpoint(&self) -> StructuredEndpoint {
        match self {
            StructuredRows::Spells(_) => StructuredEndpoint::Spells,
            StructuredRows::Monsters(_) => StructuredEndpoint::Monsters,
            StructuredRows::Equipment(_) => StructuredEndpoint::Equipment,
            StructuredRows::Rooms(_) => StructuredEndpoint::Rooms,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StructuredRows::Spells(r) => r.len(),
            StructuredRows::Monsters(r) => r.len(),
            StructuredRows::Equipment(r) => r.len(),
            StructuredRows::Rooms(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Filters sent to a structured endpoint. Unset fields are omitted from the
/// query string.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StructuredQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    pub limit: usize,
}

/// Kinds of record served by the SRD reference API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Spell,
    Monster,
    Class,
    Race,
}

impl ReferenceKind {
    pub fn collection(&self) -> &'static str {
        match self {
            ReferenceKind::Spell => "spells",
            ReferenceKind::Monster => "monsters",
            ReferenceKind::Class => "classes",
            ReferenceKind::Race => "races",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "spell" | "spells" => Some(ReferenceKind::Spell),
            "monster" | "monsters" => Some(ReferenceKind::Monster),
            "class" | "classes" => Some(ReferenceKind::Class),
            "race" | "races" => Some(ReferenceKind::Race),
            _ => None,
        }
    }
}

/// A formatted record from the SRD reference API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceRecord {
    pub title: String,
    pub text: String,
    /// Canonical URL of the record on the reference API.
    pub url: String,
}

// ============ Sources and chat API ============

/// Which backend a cited source came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceOrigin {
    /// Semantic (vector) search.
    Rag,
    /// Structured-data backend.
    Sqlite,
    /// External SRD reference API.
    Srd,
}

/// A citation the caller can resolve: a row identifier, a chunk identifier,
/// or a canonical URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Label used inside the context block, e.g. `S1`.
    pub tag: String,
    pub origin: SourceOrigin,
    pub reference: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatHints {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub context: Option<ChatHints>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub query_type: QueryType,
    pub confidence: f64,
    /// False when no retrieved context backed the answer.
    pub grounded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_both_dedups_in_canonical_order() {
        let r = RoutingDirective::both(&[
            StructuredEndpoint::Rooms,
            StructuredEndpoint::Spells,
            StructuredEndpoint::Rooms,
        ]);
        assert!(r.query_vector_backend);
        assert!(r.query_structured_backend);
        assert_eq!(
            r.structured_endpoints,
            vec![StructuredEndpoint::Spells, StructuredEndpoint::Rooms]
        );
    }

    #[test]
    fn room_monsters_accepts_encoded_string() {
        let room: Room = serde_json::from_value(serde_json::json!({
            "room_id": "A12",
            "monsters": "[{\"name\": \"Goblin\", \"count\": 3}]"
        }))
        .unwrap();
        assert_eq!(room.monsters.len(), 1);
        assert_eq!(room.monsters[0].name, "Goblin");
        assert_eq!(room.monsters[0].count, Some(3));
    }

    #[test]
    fn room_monsters_accepts_array_and_null() {
        let room: Room = serde_json::from_value(serde_json::json!({
            "room_id": "B3",
            "monsters": [{"name": "Ghoul"}]
        }))
        .unwrap();
        assert_eq!(room.monsters[0].count, None);

        let room: Room = serde_json::from_value(serde_json::json!({
            "room_id": "B4",
            "monsters": null
        }))
        .unwrap();
        assert!(room.monsters.is_empty());
    }

    #[test]
    fn room_monsters_keeps_prose_notes() {
        let room: Room = serde_json::from_value(serde_json::json!({
            "room_id": "C2",
            "monsters": "3 goblins and a sleeping ogre"
        }))
        .unwrap();
        assert_eq!(room.monsters.len(), 1);
        assert_eq!(room.monsters[0].name, "3 goblins and a sleeping ogre");
        assert_eq!(room.monsters[0].count, None);

        let room: Room = serde_json::from_value(serde_json::json!({
            "room_id": "C3",
            "monsters": ["Stirge", {"name": "Ghast", "count": 2}]
        }))
        .unwrap();
        assert_eq!(room.monsters.len(), 2);
        assert_eq!(room.monsters[0].name, "Stirge");
        assert_eq!(room.monsters[1].count, Some(2));
    }

    #[test]
    fn monster_cr_accepts_text_or_number() {
        let goblin: Monster =
            serde_json::from_value(serde_json::json!({ "name": "Goblin", "cr": "1/4" })).unwrap();
        assert_eq!(goblin.cr.as_deref(), Some("1/4"));

        let ogre: Monster =
            serde_json::from_value(serde_json::json!({ "name": "Ogre", "cr": 2 })).unwrap();
        assert_eq!(ogre.cr.as_deref(), Some("2"));

        let blank: Monster =
            serde_json::from_value(serde_json::json!({ "name": "Rat", "cr": null })).unwrap();
        assert!(blank.cr.is_none());
    }

    #[test]
    fn structured_query_omits_unset_filters() {
        let q = StructuredQuery {
            room_id: Some("A12".to_string()),
            limit: 5,
            ..Default::default()
        };
        let v = serde_json::to_value(&q).unwrap();
        assert_eq!(v, serde_json::json!({ "room_id": "A12", "limit": 5 }));
    }

    #[test]
    fn classification_serializes_type_field() {
        let c = Classification {
            query_type: QueryType::Hybrid,
            confidence: 0.9,
            routing: RoutingDirective::both(&[StructuredEndpoint::Rooms]),
            entities: ExtractedEntities::default(),
            reasoning: String::new(),
        };
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["type"], "hybrid");
        assert_eq!(v["routing"]["structured_endpoints"][0], "rooms");
    }
}
