//! In-memory registry of exclusive per-field edit locks.

use std::time::{Duration, SystemTime};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::state::{GameId, TeamId};

/// Composite key identifying one editable scoring field.
///
/// The field component is an open string tag chosen by the UI (`"score"`,
/// `"points"`, `"notes"`, ...): the set of editable fields is not a core
/// invariant, so no enum is imposed here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    /// Game the field belongs to.
    pub game_id: GameId,
    /// Team whose row is being edited.
    pub team_id: TeamId,
    /// Application-defined field tag.
    pub field: String,
}

impl LockKey {
    /// Build a key from its parts.
    pub fn new(game_id: GameId, team_id: TeamId, field: impl Into<String>) -> Self {
        Self {
            game_id,
            team_id,
            field: field.into(),
        }
    }
}

/// A granted edit lock and the identity holding it.
#[derive(Debug, Clone)]
struct EditLock {
    user_id: String,
    display_name: String,
    acquired_at: SystemTime,
}

impl EditLock {
    fn new(user_id: &str, display_name: &str) -> Self {
        Self {
            user_id: user_id.to_owned(),
            display_name: display_name.to_owned(),
            acquired_at: SystemTime::now(),
        }
    }

    fn is_expired(&self, timeout: Duration) -> bool {
        self.acquired_at
            .elapsed()
            .map(|age| age > timeout)
            .unwrap_or(false)
    }
}

/// Outcome of a lock acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller now holds (or already held) the lock.
    Granted,
    /// Someone else holds the lock.
    Denied {
        /// Identity of the current holder.
        locked_by: String,
        /// Display name of the current holder, for the denial notice.
        display_name: String,
    },
    /// The key was malformed (empty field tag); nothing was mutated.
    Invalid,
}

/// Read-only view of a held lock, exposed to newly joining clients.
#[derive(Debug, Clone, PartialEq)]
pub struct HeldLock {
    /// Team whose field is locked.
    pub team_id: TeamId,
    /// Locked field tag.
    pub field: String,
    /// Identity of the holder.
    pub user_id: String,
    /// Display name of the holder.
    pub display_name: String,
    /// When the hold was (last) acquired.
    pub acquired_at: SystemTime,
}

/// Serializes concurrent edit access to individual scoring fields.
///
/// Purely local coordination: a process restart drops every lock, which is
/// acceptable because locks only prevent collisions within a live session.
/// No operation returns an error; malformed input yields a negative result
/// without mutating shared state.
pub struct LockManager {
    locks: DashMap<LockKey, EditLock>,
    timeout: Duration,
}

impl LockManager {
    /// Create an empty registry whose locks expire after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    /// Attempt to acquire the lock for `key` on behalf of `user_id`.
    ///
    /// Re-acquiring a lock already held by the same user succeeds and
    /// refreshes its TTL clock. A lock whose holder went silent for longer
    /// than the TTL can be taken over by a different user.
    pub fn acquire(&self, key: LockKey, user_id: &str, display_name: &str) -> AcquireOutcome {
        if key.field.trim().is_empty() {
            return AcquireOutcome::Invalid;
        }

        match self.locks.entry(key) {
            Entry::Occupied(mut occupied) => {
                let lock = occupied.get_mut();
                if lock.user_id == user_id {
                    lock.acquired_at = SystemTime::now();
                    return AcquireOutcome::Granted;
                }
                if lock.is_expired(self.timeout) {
                    *lock = EditLock::new(user_id, display_name);
                    return AcquireOutcome::Granted;
                }
                AcquireOutcome::Denied {
                    locked_by: lock.user_id.clone(),
                    display_name: lock.display_name.clone(),
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(EditLock::new(user_id, display_name));
                AcquireOutcome::Granted
            }
        }
    }

    /// Release the lock for `key` if `user_id` currently holds it.
    ///
    /// Returns whether a lock was removed. Releasing a lock that does not
    /// exist, or that someone else holds, is a no-op: a stale or malicious
    /// release must never steal another holder's lock.
    pub fn release(&self, key: &LockKey, user_id: &str) -> bool {
        self.locks
            .remove_if(key, |_, lock| lock.user_id == user_id)
            .is_some()
    }

    /// Whether `user_id` currently holds the lock for `key`.
    pub fn has_lock(&self, key: &LockKey, user_id: &str) -> bool {
        self.locks
            .get(key)
            .map(|lock| lock.user_id == user_id)
            .unwrap_or(false)
    }

    /// Release every lock held by `user_id`, returning the released keys so
    /// callers can broadcast unlock notifications per game room. Used on
    /// disconnect.
    pub fn release_all(&self, user_id: &str) -> Vec<LockKey> {
        let candidates: Vec<LockKey> = self
            .locks
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.key().clone())
            .collect();

        let mut released = Vec::with_capacity(candidates.len());
        for key in candidates {
            // Re-check ownership under the shard lock: the entry may have
            // been taken over between the scan and the removal.
            if self
                .locks
                .remove_if(&key, |_, lock| lock.user_id == user_id)
                .is_some()
            {
                released.push(key);
            }
        }
        released
    }

    /// Snapshot of every active lock within one game, seeding the view of a
    /// just-connected client.
    pub fn locks_for_game(&self, game_id: GameId) -> Vec<HeldLock> {
        self.locks
            .iter()
            .filter(|entry| entry.key().game_id == game_id)
            .map(|entry| {
                let (key, lock) = entry.pair();
                HeldLock {
                    team_id: key.team_id,
                    field: key.field.clone(),
                    user_id: lock.user_id.clone(),
                    display_name: lock.display_name.clone(),
                    acquired_at: lock.acquired_at,
                }
            })
            .collect()
    }

    /// Drop every lock older than the TTL, returning how many were removed.
    /// Invoked periodically by the janitor task.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.locks.len();
        self.locks
            .retain(|_, lock| !lock.is_expired(self.timeout));
        before.saturating_sub(self.locks.len())
    }

    /// Number of currently held locks.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no lock is currently held.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> LockManager {
        LockManager::new(Duration::from_secs(300))
    }

    fn key(game: GameId, team: TeamId, field: &str) -> LockKey {
        LockKey::new(game, team, field)
    }

    #[test]
    fn acquire_on_free_key_is_granted() {
        let locks = manager();
        let outcome = locks.acquire(key(5, 2, "score"), "admin_1", "admin");
        assert_eq!(outcome, AcquireOutcome::Granted);
        assert!(locks.has_lock(&key(5, 2, "score"), "admin_1"));
    }

    #[test]
    fn second_holder_is_denied_with_current_holder_name() {
        let locks = manager();
        assert_eq!(
            locks.acquire(key(5, 2, "score"), "admin_1", "admin"),
            AcquireOutcome::Granted
        );
        assert_eq!(
            locks.acquire(key(5, 2, "score"), "anon_9", "Player"),
            AcquireOutcome::Denied {
                locked_by: "admin_1".into(),
                display_name: "admin".into()
            }
        );
        // The losing attempt must not have disturbed the existing hold.
        assert!(locks.has_lock(&key(5, 2, "score"), "admin_1"));
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn reacquire_by_holder_is_idempotent() {
        let locks = manager();
        let k = key(5, 2, "score");
        assert_eq!(
            locks.acquire(k.clone(), "admin_1", "admin"),
            AcquireOutcome::Granted
        );
        assert_eq!(
            locks.acquire(k.clone(), "admin_1", "admin"),
            AcquireOutcome::Granted
        );
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn distinct_fields_lock_independently() {
        let locks = manager();
        assert_eq!(
            locks.acquire(key(5, 2, "score"), "admin_1", "admin"),
            AcquireOutcome::Granted
        );
        assert_eq!(
            locks.acquire(key(5, 2, "points"), "anon_9", "Player"),
            AcquireOutcome::Granted
        );
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn release_then_acquire_by_other_holder_succeeds() {
        let locks = manager();
        let k = key(5, 2, "score");
        locks.acquire(k.clone(), "admin_1", "admin");
        assert!(locks.release(&k, "admin_1"));
        assert_eq!(
            locks.acquire(k, "anon_9", "Player"),
            AcquireOutcome::Granted
        );
    }

    #[test]
    fn release_by_non_holder_is_a_noop() {
        let locks = manager();
        let k = key(5, 2, "score");
        locks.acquire(k.clone(), "admin_1", "admin");
        assert!(!locks.release(&k, "anon_9"));
        assert!(locks.has_lock(&k, "admin_1"));
    }

    #[test]
    fn release_of_missing_lock_is_a_noop() {
        let locks = manager();
        assert!(!locks.release(&key(5, 2, "score"), "admin_1"));
    }

    #[test]
    fn empty_field_tag_is_rejected_without_mutation() {
        let locks = manager();
        assert_eq!(
            locks.acquire(key(5, 2, ""), "admin_1", "admin"),
            AcquireOutcome::Invalid
        );
        assert_eq!(
            locks.acquire(key(5, 2, "   "), "admin_1", "admin"),
            AcquireOutcome::Invalid
        );
        assert!(locks.is_empty());
    }

    #[test]
    fn release_all_returns_only_that_holders_keys() {
        let locks = manager();
        locks.acquire(key(5, 2, "score"), "admin_1", "admin");
        locks.acquire(key(5, 3, "points"), "admin_1", "admin");
        locks.acquire(key(6, 1, "score"), "anon_9", "Player");

        let mut released = locks.release_all("admin_1");
        released.sort_by_key(|k| (k.game_id, k.team_id));
        assert_eq!(
            released,
            vec![key(5, 2, "score"), key(5, 3, "points")]
        );
        assert_eq!(locks.len(), 1);
        assert!(locks.has_lock(&key(6, 1, "score"), "anon_9"));
    }

    #[test]
    fn release_all_frees_keys_for_other_holders() {
        let locks = manager();
        let k = key(5, 2, "score");
        locks.acquire(k.clone(), "admin_1", "admin");
        locks.release_all("admin_1");
        assert_eq!(
            locks.acquire(k, "anon_9", "Player"),
            AcquireOutcome::Granted
        );
    }

    #[test]
    fn locks_for_game_filters_by_game() {
        let locks = manager();
        locks.acquire(key(5, 2, "score"), "admin_1", "admin");
        locks.acquire(key(6, 2, "score"), "anon_9", "Player");

        let snapshot = locks.locks_for_game(5);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].team_id, 2);
        assert_eq!(snapshot[0].field, "score");
        assert_eq!(snapshot[0].user_id, "admin_1");
    }

    #[test]
    fn expired_lock_can_be_taken_over() {
        let locks = LockManager::new(Duration::ZERO);
        locks.acquire(key(5, 2, "score"), "admin_1", "admin");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(
            locks.acquire(key(5, 2, "score"), "anon_9", "Player"),
            AcquireOutcome::Granted
        );
        assert!(locks.has_lock(&key(5, 2, "score"), "anon_9"));
    }

    #[test]
    fn cleanup_removes_only_expired_locks() {
        let locks = LockManager::new(Duration::ZERO);
        locks.acquire(key(5, 2, "score"), "admin_1", "admin");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(locks.cleanup_expired(), 1);
        assert!(locks.is_empty());

        let relaxed = manager();
        relaxed.acquire(key(5, 2, "score"), "admin_1", "admin");
        assert_eq!(relaxed.cleanup_expired(), 0);
        assert_eq!(relaxed.len(), 1);
    }
}
