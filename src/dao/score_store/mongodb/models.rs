//! BSON document mapping for score rows.

use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::dao::models::ScoreEntity;
use crate::state::{GameId, TeamId};

/// Stored shape of a score row. Game and team ids double as the lookup key;
/// the unique `(game_id, team_id)` index keeps upserts single-row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoScoreDocument {
    game_id: GameId,
    team_id: TeamId,
    score_value: Option<f64>,
    points: i32,
    updated_at: DateTime,
}

impl From<ScoreEntity> for MongoScoreDocument {
    fn from(value: ScoreEntity) -> Self {
        Self {
            game_id: value.game_id,
            team_id: value.team_id,
            score_value: value.score_value,
            points: value.points,
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoScoreDocument> for ScoreEntity {
    fn from(value: MongoScoreDocument) -> Self {
        Self {
            game_id: value.game_id,
            team_id: value.team_id,
            score_value: value.score_value,
            points: value.points,
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

/// Filter selecting the single row for a (game, team) pair.
pub fn score_key(game_id: GameId, team_id: TeamId) -> Document {
    doc! { "game_id": game_id as i64, "team_id": team_id as i64 }
}

/// Filter selecting every row of a game.
pub fn game_key(game_id: GameId) -> Document {
    doc! { "game_id": game_id as i64 }
}
