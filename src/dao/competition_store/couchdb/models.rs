use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::dao::{
    competition_store::PlayerQuery,
    models::{CompetitionEntity, PlayerEntity},
};

pub const COMPETITION_PREFIX: &str = "competition::";
pub const PLAYER_PREFIX: &str = "player::";
pub const COMPETITION_TYPE: &str = "competition";
pub const PLAYER_TYPE: &str = "player";
/// Upper bound on documents returned by a single `_find`; far above any party.
pub const FIND_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchCompetitionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub competition: CompetitionEntity,
}

impl CouchCompetitionDocument {
    pub fn from_entity(competition: CompetitionEntity, rev: Option<String>) -> Self {
        Self {
            id: competition_doc_id(&competition.id),
            rev,
            kind: COMPETITION_TYPE.to_string(),
            competition,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchPlayerDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub competition_id: String,
    #[serde(flatten)]
    pub player: PlayerEntity,
}

impl CouchPlayerDocument {
    pub fn from_entity(competition_id: &str, player: PlayerEntity, rev: Option<String>) -> Self {
        Self {
            id: player_doc_id(competition_id, &player.id),
            rev,
            kind: PLAYER_TYPE.to_string(),
            competition_id: competition_id.to_string(),
            player,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FindResponse {
    pub docs: Vec<Value>,
}

/// Mango `_find` body selecting the players a query may return.
///
/// Ordering and limits are applied in process so both adapters break ties identically.
pub fn find_players_request(competition_id: &str, query: &PlayerQuery) -> Value {
    let mut selector = json!({
        "type": PLAYER_TYPE,
        "competition_id": competition_id,
    });
    if let Some(session_id) = &query.session_id {
        selector["sessionId"] = Value::String(session_id.clone());
    }

    json!({
        "selector": selector,
        "limit": FIND_LIMIT,
    })
}

pub fn competition_doc_id(competition_id: &str) -> String {
    format!("{COMPETITION_PREFIX}{competition_id}")
}

pub fn player_doc_id(competition_id: &str, player_id: &str) -> String {
    format!("{PLAYER_PREFIX}{competition_id}::{player_id}")
}
