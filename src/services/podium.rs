use crate::{dao::models::PlayerEntity, state::session::Athlete};

/// Name shown on an empty podium step.
pub const VACANT_NAME: &str = "---";

/// One step of the podium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodiumSlot {
    pub name: String,
    pub icon: Option<Athlete>,
    pub score: u32,
}

impl PodiumSlot {
    /// Placeholder for a rank nobody holds yet.
    pub fn vacant() -> Self {
        Self {
            name: VACANT_NAME.into(),
            icon: None,
            score: 0,
        }
    }

    /// Whether a player holds this step.
    pub fn is_vacant(&self) -> bool {
        self.icon.is_none() && self.name == VACANT_NAME && self.score == 0
    }
}

impl From<&PlayerEntity> for PodiumSlot {
    fn from(player: &PlayerEntity) -> Self {
        Self {
            name: player.name.clone(),
            icon: player.icon.parse().ok(),
            score: player.score,
        }
    }
}

/// Top of the competition, shown at the ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Podium {
    slots: Vec<PodiumSlot>,
}

impl Podium {
    /// Build a podium of `size` steps from players already ranked by score.
    ///
    /// Extra players are ignored; missing ranks are vacant.
    pub fn from_ranked(players: &[PlayerEntity], size: usize) -> Self {
        let mut slots: Vec<PodiumSlot> = players.iter().take(size).map(PodiumSlot::from).collect();
        slots.resize_with(size, PodiumSlot::vacant);
        Self { slots }
    }

    /// Steps in rank order, first place first.
    pub fn slots(&self) -> &[PodiumSlot] {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(count: usize) -> Vec<PlayerEntity> {
        (0..count)
            .map(|index| PlayerEntity {
                id: format!("p{index}"),
                name: format!("Player {index}"),
                icon: "luge".into(),
                score: 10 - index as u32,
                session_id: format!("s{index}"),
                is_active: true,
                joined_at: None,
                last_updated_at: None,
            })
            .collect()
    }

    fn filled(podium: &Podium) -> usize {
        podium.slots().iter().filter(|slot| !slot.is_vacant()).count()
    }

    #[test]
    fn fills_min_of_three_and_count() {
        for count in [0, 1, 2, 3, 4] {
            let podium = Podium::from_ranked(&ranked(count), 3);
            assert_eq!(filled(&podium), count.min(3), "with {count} players");
        }
    }

    #[test]
    fn empty_competition_shows_placeholders() {
        let podium = Podium::from_ranked(&[], 3);
        assert_eq!(podium.slots().len(), 3);
        for slot in podium.slots() {
            assert_eq!(slot, &PodiumSlot::vacant());
            assert_eq!(slot.name, "---");
            assert_eq!(slot.score, 0);
        }
    }

    #[test]
    fn size_is_configurable() {
        let podium = Podium::from_ranked(&ranked(2), 5);
        assert_eq!(podium.slots().len(), 5);
        assert_eq!(filled(&podium), 2);
        assert_eq!(podium.slots()[0].score, 10);
    }

    #[test]
    fn keeps_rank_order() {
        let podium = Podium::from_ranked(&ranked(4), 3);
        let [first, second, third] = podium.slots() else {
            panic!("expected three steps");
        };
        assert_eq!(first.name, "Player 0");
        assert_eq!(first.score, 10);
        assert_eq!(second.name, "Player 1");
        assert_eq!(third.name, "Player 2");
        assert_eq!(third.icon, Some(Athlete::Luge));
    }
}
