//! Database model definitions.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::state::{GameId, TeamId};

/// Persisted score row for one (game, team) pair.
///
/// This is the only durable entity the gateway touches: locks, active timers,
/// and recorded readings all live in process memory for the duration of a
/// scoring session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreEntity {
    /// Game the score belongs to.
    pub game_id: GameId,
    /// Team the score belongs to.
    pub team_id: TeamId,
    /// Raw metric value (seconds, goals, ...); `None` until first submitted.
    pub score_value: Option<f64>,
    /// Leaderboard points awarded for this game.
    pub points: i32,
    /// Last write timestamp.
    pub updated_at: SystemTime,
}

impl ScoreEntity {
    /// Fresh, empty score row for a (game, team) pair.
    pub fn new(game_id: GameId, team_id: TeamId) -> Self {
        Self {
            game_id,
            team_id,
            score_value: None,
            points: 0,
            updated_at: SystemTime::now(),
        }
    }
}
