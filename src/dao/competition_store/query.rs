use std::cmp::Ordering;

use crate::dao::models::PlayerEntity;

/// Ordering applied to query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerOrder {
    /// Store document order (insertion order).
    Document,
    /// Highest score first; ties go to the earliest `joinedAt`, then document order.
    ScoreDesc,
}

/// Equality filter, order and limit over the players of one competition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerQuery {
    pub session_id: Option<String>,
    pub order: PlayerOrder,
    pub limit: Option<usize>,
}

impl PlayerQuery {
    /// The player owned by `session_id`, first match only.
    pub fn by_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            order: PlayerOrder::Document,
            limit: Some(1),
        }
    }

    /// The current score leader.
    pub fn leader() -> Self {
        Self::top(1)
    }

    /// The `count` best players.
    pub fn top(count: usize) -> Self {
        Self {
            session_id: None,
            order: PlayerOrder::ScoreDesc,
            limit: Some(count),
        }
    }

    /// Whether `player` passes the equality filter.
    pub fn matches(&self, player: &PlayerEntity) -> bool {
        self.session_id
            .as_deref()
            .is_none_or(|session_id| player.session_id == session_id)
    }

    /// Filter, sort and truncate players given in document order.
    pub fn apply<I>(&self, players: I) -> Vec<PlayerEntity>
    where
        I: IntoIterator<Item = PlayerEntity>,
    {
        let mut selected: Vec<PlayerEntity> =
            players.into_iter().filter(|p| self.matches(p)).collect();

        if self.order == PlayerOrder::ScoreDesc {
            // Stable sort keeps document order among full ties.
            selected.sort_by(by_score_desc);
        }

        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

fn by_score_desc(a: &PlayerEntity, b: &PlayerEntity) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| match (a.joined_at, b.joined_at) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn player(id: &str, session: &str, score: u32, minute: u8) -> PlayerEntity {
        PlayerEntity {
            id: id.into(),
            name: id.to_uppercase(),
            icon: "luge".into(),
            score,
            session_id: session.into(),
            is_active: true,
            joined_at: Some(datetime!(2026-10-16 18:00 UTC) + time::Duration::minutes(minute.into())),
            last_updated_at: None,
        }
    }

    #[test]
    fn session_filter_keeps_first_match_only() {
        let players = vec![
            player("a", "s1", 3, 0),
            player("b", "s2", 5, 1),
            player("c", "s2", 9, 2),
        ];

        let found = PlayerQuery::by_session("s2").apply(players);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "b");
    }

    #[test]
    fn top_orders_by_score_then_earliest_join() {
        let players = vec![
            player("late", "s1", 7, 5),
            player("low", "s2", 2, 0),
            player("early", "s3", 7, 1),
            player("best", "s4", 11, 9),
        ];

        let ids: Vec<_> = PlayerQuery::top(3)
            .apply(players)
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, ["best", "early", "late"]);
    }

    #[test]
    fn full_ties_keep_document_order() {
        let mut first = player("first", "s1", 4, 0);
        let mut second = player("second", "s2", 4, 0);
        first.joined_at = None;
        second.joined_at = None;

        let leader = PlayerQuery::leader().apply(vec![first, second]);
        assert_eq!(leader[0].id, "first");
    }

    #[test]
    fn empty_input_yields_empty_result() {
        assert!(PlayerQuery::top(3).apply(Vec::new()).is_empty());
    }
}
