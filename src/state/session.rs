use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::dao::models::PlayerEntity;

/// Avatar a player picks at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Athlete {
    DownhillSkier,
    FigureSkater,
    SkiJumper,
    HockeyPlayer,
    Bobsled,
    Snowboarder,
    Luge,
    Curler,
}

impl Athlete {
    /// Every athlete, in picker order.
    pub const ALL: [Athlete; 8] = [
        Athlete::DownhillSkier,
        Athlete::FigureSkater,
        Athlete::SkiJumper,
        Athlete::HockeyPlayer,
        Athlete::Bobsled,
        Athlete::Snowboarder,
        Athlete::Luge,
        Athlete::Curler,
    ];

    /// Identifier stored in player documents.
    pub fn as_str(self) -> &'static str {
        match self {
            Athlete::DownhillSkier => "downhill-skier",
            Athlete::FigureSkater => "figure-skater",
            Athlete::SkiJumper => "ski-jumper",
            Athlete::HockeyPlayer => "hockey-player",
            Athlete::Bobsled => "bobsled",
            Athlete::Snowboarder => "snowboarder",
            Athlete::Luge => "luge",
            Athlete::Curler => "curler",
        }
    }

    /// Short label shown next to the player's name.
    pub fn label(self) -> &'static str {
        match self {
            Athlete::DownhillSkier => "DOWNHILL",
            Athlete::FigureSkater => "SKATER",
            Athlete::SkiJumper => "SKI JUMP",
            Athlete::HockeyPlayer => "HOCKEY",
            Athlete::Bobsled => "BOBSLED",
            Athlete::Snowboarder => "SNOWBOARD",
            Athlete::Luge => "LUGE",
            Athlete::Curler => "CURLING",
        }
    }
}

impl fmt::Display for Athlete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known athlete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown athlete `{0}`")]
pub struct UnknownAthlete(pub String);

impl FromStr for Athlete {
    type Err = UnknownAthlete;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Athlete::ALL
            .into_iter()
            .find(|athlete| athlete.as_str() == value)
            .ok_or_else(|| UnknownAthlete(value.to_string()))
    }
}

/// Address of a player document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRef {
    pub competition_id: String,
    pub player_id: String,
}

/// The player this kiosk plays as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundPlayer {
    pub id: String,
    pub name: String,
    /// `None` when a stored document names an athlete this build does not know.
    pub icon: Option<Athlete>,
}

impl From<&PlayerEntity> for BoundPlayer {
    fn from(value: &PlayerEntity) -> Self {
        Self {
            id: value.id.clone(),
            name: value.name.clone(),
            icon: value.icon.parse().ok(),
        }
    }
}

/// Kiosk-local, possibly stale projection of one player.
///
/// The tray count is the provisional source of truth; the remote score trails it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalSession {
    pub competition_id: Option<String>,
    pub player: Option<BoundPlayer>,
    pub trays: u32,
    pub returning: bool,
}

impl LocalSession {
    /// Bind the session to a player, taking the score from the stored document.
    pub fn bind(&mut self, competition_id: String, player: &PlayerEntity, returning: bool) {
        self.competition_id = Some(competition_id);
        self.player = Some(player.into());
        self.trays = player.score;
        self.returning = returning;
    }

    /// Address of the bound player, if any.
    pub fn player_ref(&self) -> Option<PlayerRef> {
        let competition_id = self.competition_id.clone()?;
        let player = self.player.as_ref()?;
        Some(PlayerRef {
            competition_id,
            player_id: player.id.clone(),
        })
    }

    /// Forget everything about the player.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
