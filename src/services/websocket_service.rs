//! WebSocket gateway for the live-scoring channel.
//!
//! Each connection gets a resolved identity, a dedicated writer task, and a
//! dispatch loop that routes room-scoped events through the lock manager and
//! timer aggregator. On disconnect both registries are swept for the
//! connection's identity and the releases are broadcast to every affected
//! room.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dto::ws::{
        ClientMessage, LockRelease, LockRequest, RoomPayload, ScoreUpdate, ServerMessage,
        TimerClear, TimerStart, TimerStop,
    },
    error::ServiceError,
    services::score_service,
    state::{
        SharedState,
        locks::{AcquireOutcome, LockKey},
        rooms::ConnectionIdentity,
        timers::TimerKey,
    },
};

/// Internal error type for gateway event handling.
///
/// All of these are connection-local: a failing handler reports back to the
/// originating connection and never tears down anyone else's session.
#[derive(Debug, Error)]
enum GatewayError {
    /// Writer channel closed - connection should be terminated immediately.
    #[error("connection closed")]
    ConnectionClosed,
    /// Privileged event from a non-admin connection.
    #[error("only admins can clear timers")]
    AdminOnly,
    /// Lock key did not survive manager-side validation.
    #[error("invalid lock key: {0}")]
    InvalidKey(String),
    /// Error from persistence operations.
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
}

/// Resolve who a connection is before any event is processed.
///
/// A known admin token yields the stable identity `admin_<id>`; everything
/// else gets an ephemeral identity derived from the session id.
fn resolve_identity(
    config: &AppConfig,
    session_id: Uuid,
    token: Option<&str>,
) -> ConnectionIdentity {
    match token.and_then(|token| config.resolve_admin(token)) {
        Some(admin_id) => ConnectionIdentity {
            user_id: format!("admin_{admin_id}"),
            display_name: "admin".into(),
            admin: true,
        },
        None => ConnectionIdentity {
            user_id: format!("anon_{session_id}"),
            display_name: "Player".into(),
            admin: false,
        },
    }
}

/// Handle the full lifecycle for an individual live-scoring WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket, token: Option<String>) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let session_id = Uuid::new_v4();
    let identity = resolve_identity(state.config(), session_id, token.as_deref());

    state
        .rooms()
        .register(session_id, identity.clone(), outbound_tx.clone());

    if send_to_sender(
        &outbound_tx,
        &ServerMessage::Connected {
            user_id: identity.user_id.clone(),
            display_name: identity.display_name.clone(),
        },
    )
    .is_err()
    {
        state.rooms().unregister(session_id);
        finalize(writer_task, outbound_tx).await;
        return;
    }

    info!(session_id = %session_id, user_id = %identity.user_id, "client connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                match dispatch(&state, session_id, &identity, &outbound_tx, &text).await {
                    Ok(()) => {}
                    Err(GatewayError::ConnectionClosed) => {
                        info!(session_id = %session_id, "writer closed during event handling, terminating");
                        break;
                    }
                    Err(err) => {
                        warn!(user_id = %identity.user_id, error = %err, "event handling failed");
                        let _ = send_to_sender(
                            &outbound_tx,
                            &ServerMessage::Error {
                                message: err.to_string(),
                            },
                        );
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(session_id = %session_id, "client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "websocket error");
                break;
            }
        }
    }

    handle_disconnect(&state, session_id, &identity);
    info!(session_id = %session_id, user_id = %identity.user_id, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Parse one inbound frame and route it to the matching handler.
async fn dispatch(
    state: &SharedState,
    session_id: Uuid,
    identity: &ConnectionIdentity,
    tx: &mpsc::UnboundedSender<Message>,
    text: &str,
) -> Result<(), GatewayError> {
    let message = match ClientMessage::from_json_str(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(user_id = %identity.user_id, error = %err, "failed to parse or validate client message");
            return send_to_sender(
                tx,
                &ServerMessage::Error {
                    message: err.to_string(),
                },
            );
        }
    };

    match message {
        ClientMessage::JoinGame(payload) => {
            handle_join_game(state, session_id, identity, tx, payload).await
        }
        ClientMessage::LeaveGame(payload) => handle_leave_game(state, session_id, identity, payload),
        ClientMessage::RequestEditLock(request) => {
            handle_request_lock(state, session_id, identity, tx, request)
        }
        ClientMessage::ReleaseEditLock(release) => {
            handle_release_lock(state, session_id, identity, tx, release).await
        }
        ClientMessage::UpdateScore(update) => handle_update_score(state, identity, update).await,
        ClientMessage::StartTimer(start) => handle_start_timer(state, identity, start),
        ClientMessage::StopTimer(stop) => handle_stop_timer(state, identity, stop),
        ClientMessage::ClearTimers(clear) => handle_clear_timers(state, identity, clear),
        ClientMessage::Unknown => {
            warn!(user_id = %identity.user_id, "ignoring unknown client message");
            Ok(())
        }
    }
}

/// Join a game room: seed the client with scores and active locks, then
/// announce the newcomer to everyone else in the room.
async fn handle_join_game(
    state: &SharedState,
    session_id: Uuid,
    identity: &ConnectionIdentity,
    tx: &mpsc::UnboundedSender<Message>,
    payload: RoomPayload,
) -> Result<(), GatewayError> {
    let game_id = payload.game_id;
    state.rooms().join(session_id, game_id);

    let scores = match score_service::scores_for_game(state, game_id).await {
        Ok(scores) => scores,
        Err(err) => {
            // Joining still succeeds: the client gets live updates and the
            // current locks, just no persisted history.
            warn!(game_id, error = %err, "could not seed scores on join");
            let _ = send_to_sender(
                tx,
                &ServerMessage::Error {
                    message: err.to_string(),
                },
            );
            Default::default()
        }
    };

    let locks = state
        .locks()
        .locks_for_game(game_id)
        .into_iter()
        .map(Into::into)
        .collect();
    let active_timers = state
        .timers()
        .active_timers_for_game(game_id)
        .into_iter()
        .map(Into::into)
        .collect();

    send_to_sender(
        tx,
        &ServerMessage::GameState {
            game_id,
            scores,
            locks,
            active_timers,
        },
    )?;

    state.rooms().broadcast(
        game_id,
        Some(session_id),
        &ServerMessage::UserJoined {
            user_id: identity.user_id.clone(),
            display_name: identity.display_name.clone(),
        },
    );
    Ok(())
}

/// Leave a game room and notify the remaining participants.
fn handle_leave_game(
    state: &SharedState,
    session_id: Uuid,
    identity: &ConnectionIdentity,
    payload: RoomPayload,
) -> Result<(), GatewayError> {
    if state.rooms().leave(session_id, payload.game_id) {
        state.rooms().broadcast(
            payload.game_id,
            Some(session_id),
            &ServerMessage::UserLeft {
                user_id: identity.user_id.clone(),
                display_name: identity.display_name.clone(),
            },
        );
    }
    Ok(())
}

/// Try to acquire an exclusive edit lock on a scoring field.
fn handle_request_lock(
    state: &SharedState,
    session_id: Uuid,
    identity: &ConnectionIdentity,
    tx: &mpsc::UnboundedSender<Message>,
    request: LockRequest,
) -> Result<(), GatewayError> {
    let key = LockKey::new(request.game_id, request.team_id, request.field.clone());

    match state
        .locks()
        .acquire(key, &identity.user_id, &identity.display_name)
    {
        AcquireOutcome::Granted => {
            send_to_sender(
                tx,
                &ServerMessage::LockAcquired {
                    game_id: request.game_id,
                    team_id: request.team_id,
                    field: request.field.clone(),
                },
            )?;
            state.rooms().broadcast(
                request.game_id,
                Some(session_id),
                &ServerMessage::FieldLocked {
                    team_id: request.team_id,
                    field: request.field,
                    user_id: identity.user_id.clone(),
                    display_name: identity.display_name.clone(),
                },
            );
            Ok(())
        }
        AcquireOutcome::Denied {
            locked_by,
            display_name,
        } => send_to_sender(
            tx,
            &ServerMessage::LockDenied {
                team_id: request.team_id,
                field: request.field,
                locked_by,
                display_name,
            },
        ),
        AcquireOutcome::Invalid => Err(GatewayError::InvalidKey(request.field)),
    }
}

/// Release a held lock, persisting the final values first when supplied.
///
/// Persistence failures suppress the value portion of the broadcast: the
/// unlock itself is still announced, but without values that never made it
/// to the store. The sender alone learns about the failure.
async fn handle_release_lock(
    state: &SharedState,
    _session_id: Uuid,
    identity: &ConnectionIdentity,
    tx: &mpsc::UnboundedSender<Message>,
    release: LockRelease,
) -> Result<(), GatewayError> {
    let mut confirmed: Option<(Option<f64>, i32)> = None;

    if release.score.is_some() && release.points.is_some() {
        match score_service::persist_score(
            state,
            release.game_id,
            release.team_id,
            release.score,
            release.points,
        )
        .await
        {
            Ok(entity) => confirmed = Some((entity.score_value, entity.points)),
            Err(err) => {
                warn!(
                    game_id = release.game_id,
                    team_id = release.team_id,
                    error = %err,
                    "failed to persist score on unlock"
                );
                let _ = send_to_sender(
                    tx,
                    &ServerMessage::Error {
                        message: err.to_string(),
                    },
                );
            }
        }
    }

    let key = LockKey::new(release.game_id, release.team_id, release.field.clone());
    state.locks().release(&key, &identity.user_id);

    let (score, points) = match confirmed {
        Some((score, points)) => (score, Some(points)),
        None => (None, None),
    };
    state.rooms().broadcast(
        release.game_id,
        None,
        &ServerMessage::FieldUnlocked {
            team_id: release.team_id,
            field: release.field,
            score,
            points,
            updated_by: Some(identity.display_name.clone()),
        },
    );
    Ok(())
}

/// Persist an unlocked score submission, then announce the stored values.
///
/// No lock is required on this path: public scoring deliberately runs with
/// last-write-wins semantics. The broadcast only happens once the write is
/// confirmed.
async fn handle_update_score(
    state: &SharedState,
    identity: &ConnectionIdentity,
    update: ScoreUpdate,
) -> Result<(), GatewayError> {
    let entity = score_service::persist_score(
        state,
        update.game_id,
        update.team_id,
        update.score,
        update.points,
    )
    .await?;

    state.rooms().broadcast(
        update.game_id,
        None,
        &ServerMessage::ScoreUpdated {
            team_id: update.team_id,
            score: entity.score_value,
            points: entity.points,
            updated_by: identity.display_name.clone(),
        },
    );
    Ok(())
}

/// Register the sender's stopwatch and announce it to the room.
fn handle_start_timer(
    state: &SharedState,
    identity: &ConnectionIdentity,
    start: TimerStart,
) -> Result<(), GatewayError> {
    let key = TimerKey::new(start.game_id, start.team_id);
    state
        .timers()
        .start_timer(key, &identity.user_id, &identity.display_name);

    state.rooms().broadcast(
        start.game_id,
        None,
        &ServerMessage::TimerStarted {
            team_id: start.team_id,
            user_id: identity.user_id.clone(),
            display_name: identity.display_name.clone(),
        },
    );
    Ok(())
}

/// Record the sender's elapsed reading and announce the updated aggregate.
fn handle_stop_timer(
    state: &SharedState,
    identity: &ConnectionIdentity,
    stop: TimerStop,
) -> Result<(), GatewayError> {
    let key = TimerKey::new(stop.game_id, stop.team_id);
    state.timers().record_time(
        key,
        &identity.user_id,
        &identity.display_name,
        stop.time_value,
    );

    let snapshot = state.timers().team_timers(key);
    state.rooms().broadcast(
        stop.game_id,
        None,
        &ServerMessage::TimerStopped {
            team_id: stop.team_id,
            user_id: identity.user_id.clone(),
            display_name: identity.display_name.clone(),
            time: Some(stop.time_value),
            average: snapshot.average(),
            all_times: snapshot.times(),
            timer_count: snapshot.count(),
        },
    );
    Ok(())
}

/// Wipe a team's recorded readings; admin connections only.
fn handle_clear_timers(
    state: &SharedState,
    identity: &ConnectionIdentity,
    clear: TimerClear,
) -> Result<(), GatewayError> {
    if !identity.admin {
        return Err(GatewayError::AdminOnly);
    }

    let key = TimerKey::new(clear.game_id, clear.team_id);
    let count = state.timers().clear_team_timers(key);

    state.rooms().broadcast(
        clear.game_id,
        None,
        &ServerMessage::TimersCleared {
            team_id: clear.team_id,
            count,
        },
    );
    Ok(())
}

/// Sweep both registries for this identity and broadcast the releases to
/// every affected room before the connection is forgotten.
fn handle_disconnect(state: &SharedState, session_id: Uuid, identity: &ConnectionIdentity) {
    for key in state.locks().release_all(&identity.user_id) {
        state.rooms().broadcast(
            key.game_id,
            Some(session_id),
            &ServerMessage::FieldUnlocked {
                team_id: key.team_id,
                field: key.field,
                score: None,
                points: None,
                updated_by: Some(identity.display_name.clone()),
            },
        );
    }

    for key in state.timers().stop_user_timers(&identity.user_id) {
        // Abandoned stopwatch: no reading was recorded, the room just learns
        // this holder is no longer timing.
        let snapshot = state.timers().team_timers(key);
        state.rooms().broadcast(
            key.game_id,
            Some(session_id),
            &ServerMessage::TimerStopped {
                team_id: key.team_id,
                user_id: identity.user_id.clone(),
                display_name: identity.display_name.clone(),
                time: None,
                average: snapshot.average(),
                all_times: snapshot.times(),
                timer_count: snapshot.count(),
            },
        );
    }

    state.rooms().unregister(session_id);
}

/// Serialize a payload and push it onto the sender's writer channel.
///
/// Serialization failure is a permanent error (bug in code), logged and
/// swallowed; a closed writer is transient and reported so the caller can
/// terminate the connection.
fn send_to_sender(
    tx: &mpsc::UnboundedSender<Message>,
    message: &ServerMessage,
) -> Result<(), GatewayError> {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{message:?}` (permanent error, not retrying)");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| GatewayError::ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::Value;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::config::AppConfig;
    use crate::state::AppState;

    struct TestClient {
        session_id: Uuid,
        identity: ConnectionIdentity,
        tx: mpsc::UnboundedSender<Message>,
        rx: UnboundedReceiver<Message>,
    }

    fn connect(state: &SharedState, user_id: &str, display_name: &str, admin: bool) -> TestClient {
        let (tx, rx) = mpsc::unbounded_channel();
        let session_id = Uuid::new_v4();
        let identity = ConnectionIdentity {
            user_id: user_id.into(),
            display_name: display_name.into(),
            admin,
        };
        state.rooms().register(session_id, identity.clone(), tx.clone());
        TestClient {
            session_id,
            identity,
            tx,
            rx,
        }
    }

    fn state_without_store() -> SharedState {
        AppState::new(AppConfig::for_tests(vec![], Duration::from_secs(300)))
    }

    fn next_json(client: &mut TestClient) -> Value {
        match client.rx.try_recv().expect("expected a message") {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    fn assert_silent(client: &mut TestClient) {
        assert!(client.rx.try_recv().is_err(), "expected no message");
    }

    #[test]
    fn identity_resolution_distinguishes_admins_from_players() {
        let config = AppConfig::for_tests(vec![("sesame".into(), 1)], Duration::from_secs(300));
        let session_id = Uuid::new_v4();

        let admin = resolve_identity(&config, session_id, Some("sesame"));
        assert_eq!(admin.user_id, "admin_1");
        assert_eq!(admin.display_name, "admin");
        assert!(admin.admin);

        let anon = resolve_identity(&config, session_id, Some("wrong"));
        assert_eq!(anon.user_id, format!("anon_{session_id}"));
        assert_eq!(anon.display_name, "Player");
        assert!(!anon.admin);

        let untokened = resolve_identity(&config, session_id, None);
        assert!(!untokened.admin);
    }

    #[tokio::test]
    async fn join_seeds_state_and_notifies_room() {
        let state = state_without_store();
        let mut watcher = connect(&state, "anon_7", "Player", false);
        let mut joiner = connect(&state, "anon_9", "Player", false);
        state.rooms().join(watcher.session_id, 5);

        state
            .locks()
            .acquire(LockKey::new(5, 2, "score"), "anon_7", "Player");
        state.timers().start_timer(TimerKey::new(5, 3), "anon_7", "Player");

        handle_join_game(
            &state,
            joiner.session_id,
            &joiner.identity,
            &joiner.tx,
            RoomPayload { game_id: 5 },
        )
        .await
        .unwrap();

        // No store installed: the join still succeeds, with an error notice
        // ahead of the (scoreless) snapshot.
        let error = next_json(&mut joiner);
        assert_eq!(error["type"], "error");

        let seeded = next_json(&mut joiner);
        assert_eq!(seeded["type"], "game_state");
        assert_eq!(seeded["game_id"], 5);
        assert_eq!(seeded["scores"], serde_json::json!({}));
        assert_eq!(seeded["locks"].as_array().unwrap().len(), 1);
        assert_eq!(seeded["locks"][0]["team_id"], 2);
        assert_eq!(seeded["locks"][0]["field"], "score");
        assert_eq!(seeded["locks"][0]["user_id"], "anon_7");
        assert_eq!(seeded["active_timers"].as_array().unwrap().len(), 1);
        assert_eq!(seeded["active_timers"][0]["team_id"], 3);
        assert_eq!(seeded["active_timers"][0]["display_name"], "Player");
        assert_silent(&mut joiner);

        // The room hears about the newcomer; the newcomer does not.
        let announced = next_json(&mut watcher);
        assert_eq!(announced["type"], "user_joined");
        assert_eq!(announced["user_id"], "anon_9");
        assert_silent(&mut watcher);
    }

    #[tokio::test]
    async fn leave_notifies_remaining_members_only() {
        let state = state_without_store();
        let mut leaver = connect(&state, "anon_9", "Player", false);
        let mut watcher = connect(&state, "anon_7", "Player", false);
        state.rooms().join(leaver.session_id, 5);
        state.rooms().join(watcher.session_id, 5);

        handle_leave_game(
            &state,
            leaver.session_id,
            &leaver.identity,
            RoomPayload { game_id: 5 },
        )
        .unwrap();
        let left = next_json(&mut watcher);
        assert_eq!(left["type"], "user_left");
        assert_eq!(left["user_id"], "anon_9");
        assert_silent(&mut leaver);

        // Leaving a room the connection is not in broadcasts nothing.
        handle_leave_game(
            &state,
            leaver.session_id,
            &leaver.identity,
            RoomPayload { game_id: 5 },
        )
        .unwrap();
        assert_silent(&mut watcher);
    }

    #[tokio::test]
    async fn lock_contention_round_trip() {
        let state = state_without_store();
        let mut admin = connect(&state, "admin_1", "admin", true);
        let mut player = connect(&state, "anon_9", "Player", false);
        state.rooms().join(admin.session_id, 5);
        state.rooms().join(player.session_id, 5);

        let request = |field: &str| LockRequest {
            game_id: 5,
            team_id: 2,
            field: field.into(),
        };

        handle_request_lock(&state, admin.session_id, &admin.identity, &admin.tx, request("score"))
            .unwrap();
        let granted = next_json(&mut admin);
        assert_eq!(granted["type"], "lock_acquired");
        let seen_by_player = next_json(&mut player);
        assert_eq!(seen_by_player["type"], "field_locked");
        assert_eq!(seen_by_player["user_id"], "admin_1");

        handle_request_lock(
            &state,
            player.session_id,
            &player.identity,
            &player.tx,
            request("score"),
        )
        .unwrap();
        let denied = next_json(&mut player);
        assert_eq!(denied["type"], "lock_denied");
        assert_eq!(denied["locked_by"], "admin_1");
        assert_silent(&mut admin);

        // Release without final values: no persistence is attempted, the
        // whole room (sender included) sees the unlock.
        handle_release_lock(
            &state,
            admin.session_id,
            &admin.identity,
            &admin.tx,
            LockRelease {
                game_id: 5,
                team_id: 2,
                field: "score".into(),
                score: None,
                points: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(next_json(&mut admin)["type"], "field_unlocked");
        assert_eq!(next_json(&mut player)["type"], "field_unlocked");

        handle_request_lock(
            &state,
            player.session_id,
            &player.identity,
            &player.tx,
            request("score"),
        )
        .unwrap();
        assert_eq!(next_json(&mut player)["type"], "lock_acquired");
    }

    #[tokio::test]
    async fn unlock_with_failed_persist_broadcasts_without_values() {
        let state = state_without_store();
        let mut editor = connect(&state, "admin_1", "admin", true);
        let mut watcher = connect(&state, "anon_9", "Player", false);
        state.rooms().join(editor.session_id, 5);
        state.rooms().join(watcher.session_id, 5);

        state
            .locks()
            .acquire(LockKey::new(5, 2, "score"), "admin_1", "admin");

        handle_release_lock(
            &state,
            editor.session_id,
            &editor.identity,
            &editor.tx,
            LockRelease {
                game_id: 5,
                team_id: 2,
                field: "score".into(),
                score: Some(12.5),
                points: Some(3),
            },
        )
        .await
        .unwrap();

        // Sender alone learns about the storage failure.
        let error = next_json(&mut editor);
        assert_eq!(error["type"], "error");
        let unlocked = next_json(&mut editor);
        assert_eq!(unlocked["type"], "field_unlocked");
        assert!(unlocked.get("score").is_none());
        assert!(unlocked.get("points").is_none());

        let seen_by_watcher = next_json(&mut watcher);
        assert_eq!(seen_by_watcher["type"], "field_unlocked");
        assert!(seen_by_watcher.get("score").is_none());
        assert_silent(&mut watcher);

        // The lock itself is gone regardless of the failed write.
        assert!(state.locks().is_empty());
    }

    #[tokio::test]
    async fn update_score_failure_never_reaches_the_room() {
        let state = state_without_store();
        let updater = connect(&state, "anon_9", "Player", false);
        let mut watcher = connect(&state, "anon_7", "Player", false);
        state.rooms().join(updater.session_id, 5);
        state.rooms().join(watcher.session_id, 5);

        let result = handle_update_score(
            &state,
            &updater.identity,
            ScoreUpdate {
                game_id: 5,
                team_id: 2,
                score: Some(10.0),
                points: Some(1),
            },
        )
        .await;

        assert!(matches!(
            result,
            Err(GatewayError::Service(ServiceError::Degraded))
        ));
        assert_silent(&mut watcher);
    }

    #[tokio::test]
    async fn timer_stop_broadcasts_running_aggregate() {
        let state = state_without_store();
        let mut alice = connect(&state, "anon_a", "Alice", false);
        let mut bob = connect(&state, "anon_b", "Bob", false);
        state.rooms().join(alice.session_id, 5);
        state.rooms().join(bob.session_id, 5);

        for client in [&alice, &bob] {
            handle_start_timer(
                &state,
                &client.identity,
                TimerStart {
                    game_id: 5,
                    team_id: 2,
                },
            )
            .unwrap();
        }
        // Both see both timer_started events.
        for client in [&mut alice, &mut bob] {
            assert_eq!(next_json(client)["type"], "timer_started");
            assert_eq!(next_json(client)["type"], "timer_started");
        }

        handle_stop_timer(
            &state,
            &alice.identity,
            TimerStop {
                game_id: 5,
                team_id: 2,
                time_value: 12.3,
            },
        )
        .unwrap();
        handle_stop_timer(
            &state,
            &bob.identity,
            TimerStop {
                game_id: 5,
                team_id: 2,
                time_value: 11.8,
            },
        )
        .unwrap();

        let _first = next_json(&mut alice);
        let second = next_json(&mut alice);
        assert_eq!(second["type"], "timer_stopped");
        assert_eq!(second["all_times"], serde_json::json!([12.3, 11.8]));
        assert_eq!(second["timer_count"], 2);
        let average = second["average"].as_f64().unwrap();
        assert!((average - (12.3 + 11.8) / 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn clear_timers_is_admin_only() {
        let state = state_without_store();
        let mut admin = connect(&state, "admin_1", "admin", true);
        let player = connect(&state, "anon_9", "Player", false);
        state.rooms().join(admin.session_id, 5);
        state.rooms().join(player.session_id, 5);

        state
            .timers()
            .record_time(TimerKey::new(5, 2), "anon_9", "Player", 8.0);

        let refused = handle_clear_timers(
            &state,
            &player.identity,
            TimerClear {
                game_id: 5,
                team_id: 2,
            },
        );
        assert!(matches!(refused, Err(GatewayError::AdminOnly)));
        assert_eq!(state.timers().team_timers(TimerKey::new(5, 2)).count(), 1);

        handle_clear_timers(
            &state,
            &admin.identity,
            TimerClear {
                game_id: 5,
                team_id: 2,
            },
        )
        .unwrap();
        let cleared = next_json(&mut admin);
        assert_eq!(cleared["type"], "timers_cleared");
        assert_eq!(cleared["count"], 1);
        assert_eq!(state.timers().team_timers(TimerKey::new(5, 2)).count(), 0);
    }

    #[tokio::test]
    async fn disconnect_sweeps_locks_and_timers_and_notifies_rooms() {
        let state = state_without_store();
        let leaver = connect(&state, "anon_9", "Player", false);
        let mut watcher = connect(&state, "anon_7", "Player", false);
        state.rooms().join(leaver.session_id, 5);
        state.rooms().join(watcher.session_id, 5);

        state
            .locks()
            .acquire(LockKey::new(5, 2, "score"), "anon_9", "Player");
        state
            .locks()
            .acquire(LockKey::new(5, 3, "points"), "anon_9", "Player");
        state
            .timers()
            .start_timer(TimerKey::new(5, 2), "anon_9", "Player");

        handle_disconnect(&state, leaver.session_id, &leaver.identity);

        let mut unlock_count = 0;
        let mut stopped_count = 0;
        while let Ok(Message::Text(text)) = watcher.rx.try_recv() {
            let value: Value = serde_json::from_str(&text).unwrap();
            match value["type"].as_str().unwrap() {
                "field_unlocked" => unlock_count += 1,
                "timer_stopped" => {
                    stopped_count += 1;
                    // Abandoned stopwatch: no reading was appended.
                    assert!(value.get("time").is_none());
                    assert_eq!(value["timer_count"], 0);
                }
                other => panic!("unexpected broadcast {other}"),
            }
        }
        assert_eq!(unlock_count, 2);
        assert_eq!(stopped_count, 1);

        assert!(state.locks().is_empty());
        assert!(state.timers().stop_user_timers("anon_9").is_empty());
        assert!(state.rooms().identity(leaver.session_id).is_none());
    }
}
