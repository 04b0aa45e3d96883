//! DTO definitions used by the kiosk REST API and SSE payloads.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    dto::validation::{validate_athlete, validate_player_name},
    services::{
        leader_feed::Leader,
        podium::{Podium, PodiumSlot},
    },
    state::{
        session::{Athlete, BoundPlayer},
        state_machine::Page,
    },
};

/// One line of the tray stack, repeated once per tray eaten.
pub const TRAY_LINE: &str = "  [~~~~CHEESE~~~~]=\n";

/// Payload submitted from the registration page.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default)]
    #[validate(custom(function = "validate_player_name"))]
    pub name: String,
    /// Athlete identifier, e.g. `ski-jumper`.
    #[serde(default)]
    #[validate(custom(function = "validate_athlete"))]
    pub icon: String,
}

impl RegisterRequest {
    /// Display name with surrounding whitespace removed.
    pub fn trimmed_name(&self) -> &str {
        self.name.trim()
    }

    /// Parsed athlete, when the identifier is known.
    pub fn athlete(&self) -> Option<Athlete> {
        self.icon.trim().parse().ok()
    }
}

/// Page currently shown by the kiosk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageView {
    Registration,
    Game,
    Ceremony,
}

impl From<Page> for PageView {
    fn from(value: Page) -> Self {
        match value {
            Page::Registration => PageView::Registration,
            Page::Game => PageView::Game,
            Page::Ceremony => PageView::Ceremony,
        }
    }
}

/// Athlete with its on-screen label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AthleteView {
    pub id: Athlete,
    pub label: &'static str,
}

impl From<Athlete> for AthleteView {
    fn from(value: Athlete) -> Self {
        Self {
            id: value,
            label: value.label(),
        }
    }
}

/// Player this kiosk plays as.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub icon: Option<AthleteView>,
    /// Set when the player was restored from an earlier visit.
    pub returning: bool,
}

impl PlayerView {
    pub fn new(player: &BoundPlayer, returning: bool) -> Self {
        Self {
            id: player.id.clone(),
            name: player.name.clone(),
            icon: player.icon.map(Into::into),
            returning,
        }
    }
}

/// Local tray counter and its stacked rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraysView {
    pub count: u32,
    pub stack: String,
}

impl TraysView {
    pub fn new(count: u32) -> Self {
        Self {
            count,
            stack: TRAY_LINE.repeat(count as usize),
        }
    }
}

/// Current leader of the competition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderView {
    pub player_id: String,
    pub name: String,
    pub icon: Option<AthleteView>,
    pub score: u32,
}

impl From<&Leader> for LeaderView {
    fn from(value: &Leader) -> Self {
        Self {
            player_id: value.player_id.clone(),
            name: value.name.clone(),
            icon: value.icon.map(Into::into),
            score: value.score,
        }
    }
}

/// One podium step; vacant steps read `---` with a zero score.
#[derive(Debug, Clone, Serialize)]
pub struct PodiumSlotView {
    pub rank: usize,
    pub name: String,
    pub icon: Option<AthleteView>,
    pub score: u32,
}

impl PodiumSlotView {
    fn new(rank: usize, slot: &PodiumSlot) -> Self {
        Self {
            rank,
            name: slot.name.clone(),
            icon: slot.icon.map(Into::into),
            score: slot.score,
        }
    }

    /// Ranked steps of a podium, first place first.
    pub fn from_podium(podium: &Podium) -> Vec<Self> {
        podium
            .slots()
            .iter()
            .enumerate()
            .map(|(index, slot)| Self::new(index + 1, slot))
            .collect()
    }
}

/// Everything a front end needs to render the kiosk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitionView {
    pub page: PageView,
    pub version: usize,
    pub competition_id: Option<String>,
    /// Long form UTC date shown in the header.
    pub date: String,
    pub player: Option<PlayerView>,
    pub trays: TraysView,
    pub leader: Option<LeaderView>,
    /// Present on the ceremony page only.
    pub podium: Option<Vec<PodiumSlotView>>,
    /// Present on the ceremony page only.
    pub final_score: Option<u32>,
}

/// Athlete picker entries, in picker order.
#[derive(Debug, Serialize)]
pub struct AthletesResponse {
    pub athletes: Vec<AthleteView>,
}

impl AthletesResponse {
    pub fn all() -> Self {
        Self {
            athletes: Athlete::ALL.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn register_request_rejects_blank_name_and_missing_athlete() {
        let request: RegisterRequest = serde_json::from_value(json!({ "name": "   " })).unwrap();
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("icon"));
    }

    #[test]
    fn register_request_accepts_trimmed_name() {
        let request: RegisterRequest =
            serde_json::from_value(json!({ "name": "  Heidi ", "icon": "luge" })).unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.trimmed_name(), "Heidi");
        assert_eq!(request.athlete(), Some(Athlete::Luge));
    }

    #[test]
    fn register_request_accepts_padded_athlete() {
        let request: RegisterRequest =
            serde_json::from_value(json!({ "name": "Heidi", "icon": " curler " })).unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.athlete(), Some(Athlete::Curler));
    }

    #[test]
    fn tray_stack_has_one_line_per_tray() {
        assert_eq!(TraysView::new(0).stack, "");
        let view = TraysView::new(3);
        assert_eq!(view.count, 3);
        assert_eq!(view.stack.lines().count(), 3);
        assert!(view.stack.lines().all(|line| line == "  [~~~~CHEESE~~~~]="));
    }

    #[test]
    fn athlete_view_serializes_id_and_label() {
        let value = serde_json::to_value(AthleteView::from(Athlete::SkiJumper)).unwrap();
        assert_eq!(value, json!({ "id": "ski-jumper", "label": "SKI JUMP" }));
    }

    #[test]
    fn vacant_podium_steps_render_placeholders() {
        let podium = Podium::from_ranked(&[], 3);
        let steps = PodiumSlotView::from_podium(&podium);
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[2].rank, 3);
        assert_eq!(steps[2].name, "---");
        assert_eq!(steps[2].score, 0);
        assert!(steps[2].icon.is_none());
    }
}
