//! Snapshots of persisted scores and held locks, used to seed joining clients.

use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dao::models::ScoreEntity,
    dto::format_system_time,
    state::{TeamId, locks::HeldLock, timers::RunningTimer},
};

/// Current persisted values for one team's score row.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScoreSnapshot {
    /// Raw metric value, `None` until first submitted.
    pub score_value: Option<f64>,
    /// Leaderboard points awarded.
    pub points: i32,
}

impl From<ScoreEntity> for ScoreSnapshot {
    fn from(value: ScoreEntity) -> Self {
        Self {
            score_value: value.score_value,
            points: value.points,
        }
    }
}

/// One active edit lock as shown to newly joining clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LockView {
    /// Team whose field is locked.
    pub team_id: TeamId,
    /// Locked field tag.
    pub field: String,
    /// Identity of the holder.
    pub user_id: String,
    /// Display name of the holder.
    pub display_name: String,
    /// RFC3339 timestamp of the (latest) acquisition.
    pub locked_at: String,
}

impl From<HeldLock> for LockView {
    fn from(value: HeldLock) -> Self {
        Self {
            team_id: value.team_id,
            field: value.field,
            user_id: value.user_id,
            display_name: value.display_name,
            locked_at: format_system_time(value.acquired_at),
        }
    }
}

/// One still-running stopwatch as shown to newly joining clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TimerHolderView {
    /// Team being timed.
    pub team_id: TeamId,
    /// Identity of the timing holder.
    pub user_id: String,
    /// Display name of the holder.
    pub display_name: String,
    /// Seconds elapsed since the stopwatch was started.
    pub running_for_secs: f64,
}

impl From<RunningTimer> for TimerHolderView {
    fn from(value: RunningTimer) -> Self {
        Self {
            team_id: value.team_id,
            user_id: value.user_id,
            display_name: value.display_name,
            running_for_secs: value.running_for_secs,
        }
    }
}
