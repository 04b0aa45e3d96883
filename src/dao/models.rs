use serde::{Deserialize, Serialize};
use serde_with::{DefaultOnNull, serde_as};
use time::OffsetDateTime;

/// Lifecycle marker stored on the competition document.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompetitionStatus {
    /// Players may still join. Competitions are never closed explicitly.
    #[default]
    Active,
}

/// Competition document, keyed by `comp-<YYYY-MM-DD>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompetitionEntity {
    /// Deterministic identifier derived from the UTC date.
    pub id: String,
    /// UTC calendar date (`YYYY-MM-DD`) the competition belongs to.
    pub date: String,
    /// Lifecycle marker.
    #[serde(default)]
    pub status: CompetitionStatus,
    /// Set by the store on first creation and preserved by later merges.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl CompetitionEntity {
    /// Build the document written when a player registers.
    pub fn new(id: String, date: String) -> Self {
        Self {
            id,
            date,
            status: CompetitionStatus::Active,
            created_at: None,
        }
    }
}

/// Player document stored under a competition.
///
/// Every field except `id` may be missing in a stored document; decoding falls back to the
/// field default (absent or null `score` reads as 0).
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEntity {
    /// Store-assigned document identifier.
    #[serde(default)]
    pub id: String,
    /// Display name chosen at registration.
    #[serde(default)]
    pub name: String,
    /// Athlete variant name (e.g. `ski-jumper`).
    #[serde(default)]
    pub icon: String,
    /// Trays eaten, as last synced by the owning session.
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub score: u32,
    /// Session that owns this player.
    #[serde(default)]
    pub session_id: String,
    /// False once the player pressed finish.
    #[serde(default)]
    pub is_active: bool,
    /// Store timestamp of the registration.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub joined_at: Option<OffsetDateTime>,
    /// Store timestamp of the last write.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_updated_at: Option<OffsetDateTime>,
}

/// Fields supplied by the client when creating a player; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlayerEntity {
    pub name: String,
    pub icon: String,
    pub session_id: String,
}

impl NewPlayerEntity {
    /// Materialize the stored document once the store picked an id and a timestamp.
    pub fn into_entity(self, id: String, now: OffsetDateTime) -> PlayerEntity {
        PlayerEntity {
            id,
            name: self.name,
            icon: self.icon,
            score: 0,
            session_id: self.session_id,
            is_active: true,
            joined_at: Some(now),
            last_updated_at: Some(now),
        }
    }
}

/// Partial update of a player document. `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerPatch {
    pub score: Option<u32>,
    pub is_active: Option<bool>,
}

impl PlayerPatch {
    /// Debounced score write.
    pub fn score(score: u32) -> Self {
        Self {
            score: Some(score),
            is_active: None,
        }
    }

    /// Final write issued when the player finishes.
    pub fn finish(score: u32) -> Self {
        Self {
            score: Some(score),
            is_active: Some(false),
        }
    }

    /// Write issued when the player restarts from the ceremony.
    pub fn restart() -> Self {
        Self {
            score: Some(0),
            is_active: Some(true),
        }
    }

    /// Flip the active flag only.
    pub fn active(is_active: bool) -> Self {
        Self {
            score: None,
            is_active: Some(is_active),
        }
    }

    /// Apply the patch and bump the update timestamp.
    pub fn apply(&self, player: &mut PlayerEntity, now: OffsetDateTime) {
        if let Some(score) = self.score {
            player.score = score;
        }
        if let Some(is_active) = self.is_active {
            player.is_active = is_active;
        }
        player.last_updated_at = Some(now);
    }
}
