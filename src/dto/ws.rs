//! WebSocket message contracts for the live-scoring channel.
//!
//! Every frame is a JSON object tagged with a `type` field. Inbound frames
//! are parsed through [`ClientMessage::from_json_str`], which also applies
//! payload validation so handlers never see malformed key parts.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::{
        game::{LockView, ScoreSnapshot, TimerHolderView},
        validation::validate_field_tag,
    },
    state::{GameId, TeamId},
};

/// Messages accepted from live-scoring WebSocket clients.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a game room for realtime updates.
    JoinGame(RoomPayload),
    /// Leave a game room.
    LeaveGame(RoomPayload),
    /// Request an exclusive edit lock on one scoring field.
    RequestEditLock(LockRequest),
    /// Release a held lock, optionally submitting the final values.
    ReleaseEditLock(LockRelease),
    /// Unlocked score update (public scoring mode, last write wins).
    UpdateScore(ScoreUpdate),
    /// Start this user's stopwatch for a team.
    StartTimer(TimerStart),
    /// Stop this user's stopwatch and submit the elapsed reading.
    StopTimer(TimerStop),
    /// Wipe all recorded readings for a team (admin only).
    ClearTimers(TimerClear),
    /// Any unrecognized message type; ignored with a warning.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse and validate a raw text frame.
    pub fn from_json_str(payload: &str) -> Result<Self, InboundError> {
        let message: Self = serde_json::from_str(payload)?;
        match &message {
            Self::RequestEditLock(request) => request.validate()?,
            Self::ReleaseEditLock(release) => release.validate()?,
            _ => {}
        }
        Ok(message)
    }
}

/// Error produced while decoding an inbound frame.
#[derive(Debug, Error)]
pub enum InboundError {
    /// The frame was not valid JSON or did not match any message shape.
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    /// The frame decoded but carried invalid payload values.
    #[error("invalid message: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Room join/leave payload.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct RoomPayload {
    /// Game room to join or leave.
    pub game_id: GameId,
}

/// Lock acquisition request for one (game, team, field) key.
#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct LockRequest {
    /// Game part of the lock key.
    pub game_id: GameId,
    /// Team part of the lock key.
    pub team_id: TeamId,
    /// Application-defined field tag being locked.
    #[validate(custom(function = validate_field_tag))]
    pub field: String,
}

/// Lock release, optionally carrying the final edited values.
#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct LockRelease {
    /// Game part of the lock key.
    pub game_id: GameId,
    /// Team part of the lock key.
    pub team_id: TeamId,
    /// Field tag being unlocked.
    #[validate(custom(function = validate_field_tag))]
    pub field: String,
    /// Final metric value; persisted together with `points` when both are set.
    pub score: Option<f64>,
    /// Final points value.
    pub points: Option<i32>,
}

/// Direct score update without lock enforcement.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ScoreUpdate {
    /// Game the score belongs to.
    pub game_id: GameId,
    /// Team the score belongs to.
    pub team_id: TeamId,
    /// New metric value; `None` clears the stored value.
    pub score: Option<f64>,
    /// New points value; `None` keeps the stored one.
    pub points: Option<i32>,
}

/// Stopwatch start for one (game, team) pair.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct TimerStart {
    /// Game being timed.
    pub game_id: GameId,
    /// Team being timed.
    pub team_id: TeamId,
}

/// Stopwatch stop carrying the client-measured elapsed seconds.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct TimerStop {
    /// Game being timed.
    pub game_id: GameId,
    /// Team being timed.
    pub team_id: TeamId,
    /// Elapsed seconds measured by the client.
    pub time_value: f64,
}

/// Admin request to wipe a team's recorded readings.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct TimerClear {
    /// Game whose readings are wiped.
    pub game_id: GameId,
    /// Team whose readings are wiped.
    pub team_id: TeamId,
}

/// Messages emitted to live-scoring WebSocket clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Identity assigned to the connection, sent once after upgrade.
    Connected {
        /// Resolved identity string.
        user_id: String,
        /// Display name shown to other participants.
        display_name: String,
    },
    /// Current scores, active locks, and running stopwatches, seeding a
    /// just-joined client.
    GameState {
        /// Game the snapshot describes.
        game_id: GameId,
        /// Persisted score rows keyed by team, in team order.
        scores: IndexMap<TeamId, ScoreSnapshot>,
        /// Edits currently in progress.
        locks: Vec<LockView>,
        /// Stopwatches currently running in this game.
        active_timers: Vec<TimerHolderView>,
    },
    /// Another participant joined the room.
    UserJoined {
        /// Identity of the joining participant.
        user_id: String,
        /// Their display name.
        display_name: String,
    },
    /// A participant left the room.
    UserLeft {
        /// Identity of the leaving participant.
        user_id: String,
        /// Their display name.
        display_name: String,
    },
    /// The sender's lock request was granted.
    LockAcquired {
        /// Game part of the granted key.
        game_id: GameId,
        /// Team part of the granted key.
        team_id: TeamId,
        /// Granted field tag.
        field: String,
    },
    /// A field became locked by some participant.
    FieldLocked {
        /// Team whose field is locked.
        team_id: TeamId,
        /// Locked field tag.
        field: String,
        /// Identity of the holder.
        user_id: String,
        /// Display name of the holder.
        display_name: String,
    },
    /// The sender's lock request was denied.
    LockDenied {
        /// Team part of the contested key.
        team_id: TeamId,
        /// Contested field tag.
        field: String,
        /// Identity of the current holder.
        locked_by: String,
        /// Display name of the current holder.
        display_name: String,
    },
    /// A field was unlocked, optionally with confirmed final values.
    FieldUnlocked {
        /// Team whose field was unlocked.
        team_id: TeamId,
        /// Unlocked field tag.
        field: String,
        /// Persisted metric value, absent when nothing was saved.
        #[serde(skip_serializing_if = "Option::is_none")]
        score: Option<f64>,
        /// Persisted points value, absent when nothing was saved.
        #[serde(skip_serializing_if = "Option::is_none")]
        points: Option<i32>,
        /// Display name of the releasing participant, when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        updated_by: Option<String>,
    },
    /// A score row changed through the unlocked update path. Carries the
    /// persisted values, not the raw submission.
    ScoreUpdated {
        /// Team whose score changed.
        team_id: TeamId,
        /// Stored metric value.
        score: Option<f64>,
        /// Stored points value.
        points: i32,
        /// Display name of the submitting participant.
        updated_by: String,
    },
    /// A participant started timing a team.
    TimerStarted {
        /// Team being timed.
        team_id: TeamId,
        /// Identity of the timing participant.
        user_id: String,
        /// Their display name.
        display_name: String,
    },
    /// A participant's stopwatch concluded, by reading or by disconnect.
    TimerStopped {
        /// Team that was being timed.
        team_id: TeamId,
        /// Identity of the timing participant.
        user_id: String,
        /// Their display name.
        display_name: String,
        /// Submitted reading; absent when the stopwatch was abandoned.
        #[serde(skip_serializing_if = "Option::is_none")]
        time: Option<f64>,
        /// Running arithmetic mean over all recorded readings.
        #[serde(skip_serializing_if = "Option::is_none")]
        average: Option<f64>,
        /// All recorded readings in insertion order.
        all_times: Vec<f64>,
        /// Number of recorded readings.
        timer_count: usize,
    },
    /// An administrator wiped a team's recorded readings.
    TimersCleared {
        /// Team whose readings were wiped.
        team_id: TeamId,
        /// Number of readings removed.
        count: usize,
    },
    /// Connection-local failure notice; never broadcast to the room.
    Error {
        /// Human-readable description of the failure.
        message: String,
    },
}
