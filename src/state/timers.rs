//! In-memory registry for multi-user stopwatch readings.
//!
//! Several people may time the same team's attempt simultaneously; the
//! aggregator keeps one active session per (game, team, holder) and an
//! append-only list of recorded readings per (game, team) whose running
//! arithmetic mean is shown to the whole room.

use std::time::Instant;

use dashmap::DashMap;

use crate::state::{GameId, TeamId};

/// (game, team) pair a set of readings belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    /// Game being timed.
    pub game_id: GameId,
    /// Team being timed.
    pub team_id: TeamId,
}

impl TimerKey {
    /// Build a key from its parts.
    pub fn new(game_id: GameId, team_id: TeamId) -> Self {
        Self { game_id, team_id }
    }
}

/// Key of one holder's active stopwatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    game_id: GameId,
    team_id: TeamId,
    user_id: String,
}

/// A running stopwatch that has not reported a reading yet.
#[derive(Debug, Clone)]
struct ActiveTimer {
    display_name: String,
    started_at: Instant,
}

/// One recorded elapsed reading, tagged with the holder who submitted it.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerReading {
    /// Identity of the holder who submitted the reading.
    pub user_id: String,
    /// Display name of the holder.
    pub display_name: String,
    /// Elapsed seconds reported by the client.
    pub time_value: f64,
}

/// One still-running stopwatch, as shown to newly joining clients.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningTimer {
    /// Team being timed.
    pub team_id: TeamId,
    /// Identity of the timing holder.
    pub user_id: String,
    /// Display name of the holder.
    pub display_name: String,
    /// Seconds elapsed since the stopwatch was started.
    pub running_for_secs: f64,
}

/// Read-only snapshot of a team's recorded readings, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct TeamTimerSnapshot {
    /// Readings in the order they were recorded.
    pub readings: Vec<TimerReading>,
}

impl TeamTimerSnapshot {
    /// Elapsed values only, parallel to the holder names.
    pub fn times(&self) -> Vec<f64> {
        self.readings.iter().map(|r| r.time_value).collect()
    }

    /// Holder display names, parallel to the times.
    pub fn holders(&self) -> Vec<String> {
        self.readings.iter().map(|r| r.display_name.clone()).collect()
    }

    /// Arithmetic mean over all recorded readings; `None` when empty.
    ///
    /// Recomputed on every read. O(n) is fine here: n is bounded by the
    /// number of humans timing one attempt, not by a data stream.
    pub fn average(&self) -> Option<f64> {
        if self.readings.is_empty() {
            return None;
        }
        let sum: f64 = self.readings.iter().map(|r| r.time_value).sum();
        Some(sum / self.readings.len() as f64)
    }

    /// Number of recorded readings.
    pub fn count(&self) -> usize {
        self.readings.len()
    }
}

/// Registry of concurrently running stopwatches and recorded readings.
///
/// Records accumulate until explicitly cleared; they are only ever appended
/// to. Like the lock table, everything here is process-lifetime state.
pub struct TimerAggregator {
    active: DashMap<SessionKey, ActiveTimer>,
    records: DashMap<TimerKey, Vec<TimerReading>>,
}

impl TimerAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
            records: DashMap::new(),
        }
    }

    /// Register an active stopwatch for `user_id` on `key`.
    ///
    /// Starting again before stopping silently replaces the previous start:
    /// one holder never stacks duplicate sessions on the same key.
    pub fn start_timer(&self, key: TimerKey, user_id: &str, display_name: &str) {
        self.active.insert(
            SessionKey {
                game_id: key.game_id,
                team_id: key.team_id,
                user_id: user_id.to_owned(),
            },
            ActiveTimer {
                display_name: display_name.to_owned(),
                started_at: Instant::now(),
            },
        );
    }

    /// Conclude `user_id`'s stopwatch on `key` and append the client-reported
    /// elapsed reading.
    ///
    /// The reading is appended even when no tracked start exists: a dropped
    /// `start_timer` frame must not discard the holder's measurement.
    pub fn record_time(
        &self,
        key: TimerKey,
        user_id: &str,
        display_name: &str,
        time_value: f64,
    ) -> TimerReading {
        self.active.remove(&SessionKey {
            game_id: key.game_id,
            team_id: key.team_id,
            user_id: user_id.to_owned(),
        });

        let reading = TimerReading {
            user_id: user_id.to_owned(),
            display_name: display_name.to_owned(),
            time_value,
        };
        self.records
            .entry(key)
            .or_default()
            .push(reading.clone());
        reading
    }

    /// Snapshot of the readings recorded for `key`, empty when none exist.
    pub fn team_timers(&self, key: TimerKey) -> TeamTimerSnapshot {
        TeamTimerSnapshot {
            readings: self
                .records
                .get(&key)
                .map(|entry| entry.value().clone())
                .unwrap_or_default(),
        }
    }

    /// Wipe the recorded readings and any still-active sessions for `key`.
    ///
    /// Returns the number of readings removed. Privileged: the caller is
    /// responsible for enforcing that only administrators reach this.
    pub fn clear_team_timers(&self, key: TimerKey) -> usize {
        let removed = self
            .records
            .remove(&key)
            .map(|(_, readings)| readings.len())
            .unwrap_or(0);
        self.active
            .retain(|session, _| session.game_id != key.game_id || session.team_id != key.team_id);
        removed
    }

    /// Drop every active session belonging to `user_id` without recording a
    /// reading, returning the affected (game, team) pairs. Used on abrupt
    /// disconnection, where no final reading was submitted.
    pub fn stop_user_timers(&self, user_id: &str) -> Vec<TimerKey> {
        let candidates: Vec<SessionKey> = self
            .active
            .iter()
            .filter(|entry| entry.key().user_id == user_id)
            .map(|entry| entry.key().clone())
            .collect();

        let mut stopped = Vec::with_capacity(candidates.len());
        for session in candidates {
            if self.active.remove(&session).is_some() {
                stopped.push(TimerKey::new(session.game_id, session.team_id));
            }
        }
        stopped
    }

    /// Every still-running stopwatch within one game, seeding the view of a
    /// just-connected client.
    pub fn active_timers_for_game(&self, game_id: GameId) -> Vec<RunningTimer> {
        self.active
            .iter()
            .filter(|entry| entry.key().game_id == game_id)
            .map(|entry| {
                let (session, timer) = entry.pair();
                RunningTimer {
                    team_id: session.team_id,
                    user_id: session.user_id.clone(),
                    display_name: timer.display_name.clone(),
                    running_for_secs: timer.started_at.elapsed().as_secs_f64(),
                }
            })
            .collect()
    }

    /// Whether `user_id` has an active stopwatch on `key`.
    pub fn has_active_timer(&self, key: TimerKey, user_id: &str) -> bool {
        self.active.contains_key(&SessionKey {
            game_id: key.game_id,
            team_id: key.team_id,
            user_id: user_id.to_owned(),
        })
    }
}

impl Default for TimerAggregator {
    fn default() -> Self {
        Self::new()
    }
}
