//! The durable score store consumed by the realtime gateway.

#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::dao::{models::ScoreEntity, storage::StorageResult};
use crate::state::{GameId, TeamId};

/// Abstraction over the persistence layer for team/game scores.
///
/// The gateway only ever looks up, lists, and upserts score rows; everything
/// else about the scoring database belongs to the admin application and is
/// out of scope here.
pub trait ScoreStore: Send + Sync {
    /// Fetch the score row for a (game, team) pair, if one exists.
    fn find_score(
        &self,
        game_id: GameId,
        team_id: TeamId,
    ) -> BoxFuture<'static, StorageResult<Option<ScoreEntity>>>;
    /// Insert or replace the score row for its (game, team) pair.
    fn upsert_score(&self, score: ScoreEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// All score rows recorded for a game, used to seed joining clients.
    fn list_scores(&self, game_id: GameId) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>>;
    /// Cheap liveness probe used by the storage supervisor.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the underlying connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
