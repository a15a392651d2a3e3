//! Registry of live connections and their game-room memberships.

use std::collections::HashSet;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::dto::ws::ServerMessage;
use crate::state::GameId;

/// Who a connection is, resolved once at upgrade time.
#[derive(Debug, Clone)]
pub struct ConnectionIdentity {
    /// Stable (`admin_<id>`) or ephemeral (`anon_<session>`) identity string.
    pub user_id: String,
    /// Name shown to other room participants.
    pub display_name: String,
    /// Whether the connection may perform privileged actions.
    pub admin: bool,
}

/// Per-connection bookkeeping: identity, joined rooms, and the writer channel.
struct ClientConnection {
    identity: ConnectionIdentity,
    rooms: HashSet<GameId>,
    tx: mpsc::UnboundedSender<Message>,
}

/// Registry mapping session ids to connections, with room-scoped fan-out.
///
/// A room is simply the set of connections that joined a given game id; the
/// registry owns no lock or timer state, only identities and writer handles.
pub struct RoomRegistry {
    connections: DashMap<Uuid, ClientConnection>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Track a freshly upgraded connection.
    pub fn register(
        &self,
        session_id: Uuid,
        identity: ConnectionIdentity,
        tx: mpsc::UnboundedSender<Message>,
    ) {
        self.connections.insert(
            session_id,
            ClientConnection {
                identity,
                rooms: HashSet::new(),
                tx,
            },
        );
    }

    /// Forget a connection, returning its identity for disconnect cleanup.
    pub fn unregister(&self, session_id: Uuid) -> Option<ConnectionIdentity> {
        self.connections
            .remove(&session_id)
            .map(|(_, connection)| connection.identity)
    }

    /// Add the connection to a game room. Returns `false` for unknown sessions.
    pub fn join(&self, session_id: Uuid, game_id: GameId) -> bool {
        match self.connections.get_mut(&session_id) {
            Some(mut connection) => {
                connection.rooms.insert(game_id);
                true
            }
            None => false,
        }
    }

    /// Remove the connection from a game room. Returns whether it was a member.
    pub fn leave(&self, session_id: Uuid, game_id: GameId) -> bool {
        match self.connections.get_mut(&session_id) {
            Some(mut connection) => connection.rooms.remove(&game_id),
            None => false,
        }
    }

    /// Resolved identity of a session, if it is still connected.
    pub fn identity(&self, session_id: Uuid) -> Option<ConnectionIdentity> {
        self.connections
            .get(&session_id)
            .map(|connection| connection.identity.clone())
    }

    /// Push `message` to every member of the `game_id` room, optionally
    /// skipping one session (the sender, for "notify others" semantics).
    ///
    /// Delivery is best-effort: a closed writer just logs a warning, and the
    /// owning socket handler removes the connection when it unwinds.
    pub fn broadcast(&self, game_id: GameId, skip: Option<Uuid>, message: &ServerMessage) {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to serialize room broadcast `{message:?}`");
                return;
            }
        };

        for entry in self.connections.iter() {
            if Some(*entry.key()) == skip || !entry.value().rooms.contains(&game_id) {
                continue;
            }
            if entry
                .value()
                .tx
                .send(Message::Text(payload.clone().into()))
                .is_err()
            {
                warn!(
                    session_id = %entry.key(),
                    user_id = %entry.value().identity.user_id,
                    "room broadcast dropped: writer closed"
                );
            }
        }
    }

    /// Number of connections currently joined to the room.
    pub fn member_count(&self, game_id: GameId) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.value().rooms.contains(&game_id))
            .count()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(user_id: &str) -> ConnectionIdentity {
        ConnectionIdentity {
            user_id: user_id.into(),
            display_name: "Player".into(),
            admin: false,
        }
    }

    fn text_of(message: Message) -> String {
        match message {
            Message::Text(text) => text.to_string(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn broadcast_reaches_room_members_and_skips_sender() {
        let rooms = RoomRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let (sid_a, sid_b) = (Uuid::new_v4(), Uuid::new_v4());

        rooms.register(sid_a, identity("anon_a"), tx_a);
        rooms.register(sid_b, identity("anon_b"), tx_b);
        assert!(rooms.join(sid_a, 5));
        assert!(rooms.join(sid_b, 5));

        rooms.broadcast(
            5,
            Some(sid_a),
            &ServerMessage::UserJoined {
                user_id: "anon_a".into(),
                display_name: "Player".into(),
            },
        );

        assert!(rx_a.try_recv().is_err());
        let delivered = text_of(rx_b.try_recv().unwrap());
        assert!(delivered.contains("\"user_joined\""));
        assert!(delivered.contains("anon_a"));
    }

    #[test]
    fn broadcast_is_scoped_to_the_game_room() {
        let rooms = RoomRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sid = Uuid::new_v4();
        rooms.register(sid, identity("anon_a"), tx);
        rooms.join(sid, 6);

        rooms.broadcast(
            5,
            None,
            &ServerMessage::TimersCleared { team_id: 2, count: 0 },
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(rooms.member_count(5), 0);
        assert_eq!(rooms.member_count(6), 1);
    }

    #[test]
    fn leave_and_unregister_stop_delivery() {
        let rooms = RoomRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sid = Uuid::new_v4();
        rooms.register(sid, identity("anon_a"), tx);
        rooms.join(sid, 5);
        assert!(rooms.leave(sid, 5));

        rooms.broadcast(
            5,
            None,
            &ServerMessage::TimersCleared { team_id: 2, count: 0 },
        );
        assert!(rx.try_recv().is_err());

        let removed = rooms.unregister(sid).unwrap();
        assert_eq!(removed.user_id, "anon_a");
        assert!(rooms.identity(sid).is_none());
    }
}
