#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
mod query;

use futures::{future::BoxFuture, stream::BoxStream};

use crate::dao::{
    models::{CompetitionEntity, NewPlayerEntity, PlayerEntity, PlayerPatch},
    storage::StorageResult,
};

pub use self::query::{PlayerOrder, PlayerQuery};

/// Live feed of query results. Dropping the stream cancels the subscription.
pub type PlayerFeed = BoxStream<'static, StorageResult<Vec<PlayerEntity>>>;

/// Abstraction over the remote document store shared by every kiosk.
///
/// Players live under their competition. Timestamps are always assigned by the store.
pub trait CompetitionStore: Send + Sync {
    /// Merge-upsert the competition document, keeping any existing creation timestamp.
    fn upsert_competition(
        &self,
        competition: CompetitionEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Create a player with a store-generated id and return the stored document.
    fn add_player(
        &self,
        competition_id: &str,
        player: NewPlayerEntity,
    ) -> BoxFuture<'static, StorageResult<PlayerEntity>>;
    /// Patch an existing player. Fails with [`StorageError::Missing`] for unknown players.
    ///
    /// [`StorageError::Missing`]: crate::dao::storage::StorageError::Missing
    fn update_player(
        &self,
        competition_id: &str,
        player_id: &str,
        patch: PlayerPatch,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// One-shot query over the players of a competition.
    fn query_players(
        &self,
        competition_id: &str,
        query: PlayerQuery,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>>;
    /// Live query: yields the current result first, then every time it changes.
    fn subscribe_players(&self, competition_id: &str, query: PlayerQuery) -> PlayerFeed;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
