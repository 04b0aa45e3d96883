//! In-process document store. Shares state between clones, not between processes.

use std::sync::Arc;

use async_stream::stream;
use dashmap::DashMap;
use futures::future::{BoxFuture, ready};
use indexmap::IndexMap;
use time::OffsetDateTime;
use tokio::sync::watch;
use uuid::Uuid;

use crate::dao::{
    competition_store::{CompetitionStore, PlayerFeed, PlayerQuery},
    models::{CompetitionEntity, NewPlayerEntity, PlayerEntity, PlayerPatch},
    storage::{StorageError, StorageResult},
};

/// Documents of one competition plus a revision counter that wakes live queries.
struct CompetitionBucket {
    competition: Option<CompetitionEntity>,
    players: IndexMap<String, PlayerEntity>,
    revision: watch::Sender<u64>,
}

impl CompetitionBucket {
    fn new() -> Self {
        let (revision, _rx) = watch::channel(0);
        Self {
            competition: None,
            players: IndexMap::new(),
            revision,
        }
    }

    fn touch(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

/// [`CompetitionStore`] keeping every document in memory.
#[derive(Clone, Default)]
pub struct MemoryCompetitionStore {
    competitions: Arc<DashMap<String, CompetitionBucket>>,
}

impl MemoryCompetitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read back a stored competition document.
    pub fn competition(&self, competition_id: &str) -> Option<CompetitionEntity> {
        self.competitions
            .get(competition_id)
            .and_then(|bucket| bucket.competition.clone())
    }

    /// Read back a stored player document.
    pub fn player(&self, competition_id: &str, player_id: &str) -> Option<PlayerEntity> {
        self.competitions
            .get(competition_id)
            .and_then(|bucket| bucket.players.get(player_id).cloned())
    }

    fn select(&self, competition_id: &str, query: &PlayerQuery) -> Vec<PlayerEntity> {
        match self.competitions.get(competition_id) {
            Some(bucket) => query.apply(bucket.players.values().cloned()),
            None => Vec::new(),
        }
    }

    fn upsert_now(&self, competition: CompetitionEntity) {
        let mut bucket = self
            .competitions
            .entry(competition.id.clone())
            .or_insert_with(CompetitionBucket::new);
        let created_at = bucket
            .competition
            .as_ref()
            .and_then(|existing| existing.created_at)
            .or(competition.created_at)
            .unwrap_or_else(OffsetDateTime::now_utc);
        bucket.competition = Some(CompetitionEntity {
            created_at: Some(created_at),
            ..competition
        });
        bucket.touch();
    }

    fn add_now(&self, competition_id: &str, player: NewPlayerEntity) -> PlayerEntity {
        let id = Uuid::new_v4().simple().to_string();
        let entity = player.into_entity(id.clone(), OffsetDateTime::now_utc());

        let mut bucket = self
            .competitions
            .entry(competition_id.to_string())
            .or_insert_with(CompetitionBucket::new);
        bucket.players.insert(id, entity.clone());
        bucket.touch();
        entity
    }

    fn update_now(
        &self,
        competition_id: &str,
        player_id: &str,
        patch: PlayerPatch,
    ) -> StorageResult<()> {
        let mut bucket = self
            .competitions
            .get_mut(competition_id)
            .ok_or_else(|| StorageError::missing(player_path(competition_id, player_id)))?;
        let player = bucket
            .players
            .get_mut(player_id)
            .ok_or_else(|| StorageError::missing(player_path(competition_id, player_id)))?;
        patch.apply(player, OffsetDateTime::now_utc());
        bucket.touch();
        Ok(())
    }

    fn revisions(&self, competition_id: &str) -> watch::Receiver<u64> {
        self.competitions
            .entry(competition_id.to_string())
            .or_insert_with(CompetitionBucket::new)
            .revision
            .subscribe()
    }
}

impl CompetitionStore for MemoryCompetitionStore {
    fn upsert_competition(
        &self,
        competition: CompetitionEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.upsert_now(competition);
        Box::pin(ready(Ok(())))
    }

    fn add_player(
        &self,
        competition_id: &str,
        player: NewPlayerEntity,
    ) -> BoxFuture<'static, StorageResult<PlayerEntity>> {
        let entity = self.add_now(competition_id, player);
        Box::pin(ready(Ok(entity)))
    }

    fn update_player(
        &self,
        competition_id: &str,
        player_id: &str,
        patch: PlayerPatch,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let outcome = self.update_now(competition_id, player_id, patch);
        Box::pin(ready(outcome))
    }

    fn query_players(
        &self,
        competition_id: &str,
        query: PlayerQuery,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let players = self.select(competition_id, &query);
        Box::pin(ready(Ok(players)))
    }

    fn subscribe_players(&self, competition_id: &str, query: PlayerQuery) -> PlayerFeed {
        let store = self.clone();
        let competition_id = competition_id.to_string();
        let mut revisions = self.revisions(&competition_id);

        Box::pin(stream! {
            let mut last: Option<Vec<PlayerEntity>> = None;
            loop {
                let players = store.select(&competition_id, &query);
                if last.as_ref() != Some(&players) {
                    last = Some(players.clone());
                    yield Ok::<_, StorageError>(players);
                }
                if revisions.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(ready(Ok(())))
    }
}

fn player_path(competition_id: &str, player_id: &str) -> String {
    format!("competitions/{competition_id}/players/{player_id}")
}
