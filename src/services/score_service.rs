//! Bridge between the realtime gateway and the durable score store.

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    dao::models::ScoreEntity,
    dto::game::ScoreSnapshot,
    error::ServiceError,
    state::{GameId, SharedState, TeamId},
};

/// Look up or create the score row for (game, team) and apply the submitted
/// values, returning the persisted entity.
///
/// `score` always overwrites the stored metric value (submitting `None`
/// clears it); `points` only overwrites when provided. The write completes
/// before any broadcast happens, so callers can suppress room notifications
/// when persistence fails.
pub async fn persist_score(
    state: &SharedState,
    game_id: GameId,
    team_id: TeamId,
    score: Option<f64>,
    points: Option<i32>,
) -> Result<ScoreEntity, ServiceError> {
    let store = state.require_score_store().await?;

    let mut entity = store
        .find_score(game_id, team_id)
        .await?
        .unwrap_or_else(|| ScoreEntity::new(game_id, team_id));

    entity.score_value = score;
    if let Some(points) = points {
        entity.points = points;
    }
    entity.updated_at = std::time::SystemTime::now();

    store.upsert_score(entity.clone()).await?;
    debug!(game_id, team_id, score = ?entity.score_value, points = entity.points, "score persisted");
    Ok(entity)
}

/// All persisted score rows for a game, keyed by team in team order.
/// Used to seed the view of a just-joined client.
pub async fn scores_for_game(
    state: &SharedState,
    game_id: GameId,
) -> Result<IndexMap<TeamId, ScoreSnapshot>, ServiceError> {
    let store = state.require_score_store().await?;
    let rows = store.list_scores(game_id).await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.team_id, row.into()))
        .collect())
}
