//! Long-lived shared state: the two collaborative-editing registries, the
//! room registry, and the durable score store handle.

/// Field-level edit-lock registry.
pub mod locks;
/// Connection and room-membership registry.
pub mod rooms;
/// Multi-user stopwatch registry.
pub mod timers;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::score_store::ScoreStore,
    error::ServiceError,
    state::{locks::LockManager, rooms::RoomRegistry, timers::TimerAggregator},
};

/// Identifier of one scored activity within a game night.
pub type GameId = u32;
/// Identifier of a competing team.
pub type TeamId = u32;

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// Central application state injected into every route and service.
///
/// The lock and timer registries are owned here rather than living as module
/// globals, so tests can spin up isolated instances and the gateway receives
/// them by injection.
pub struct AppState {
    config: AppConfig,
    score_store: RwLock<Option<Arc<dyn ScoreStore>>>,
    degraded: watch::Sender<bool>,
    locks: LockManager,
    timers: TimerAggregator,
    rooms: RoomRegistry,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a score store is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let lock_timeout = config.lock_timeout();
        Arc::new(Self {
            config,
            score_store: RwLock::new(None),
            degraded: degraded_tx,
            locks: LockManager::new(lock_timeout),
            timers: TimerAggregator::new(),
            rooms: RoomRegistry::new(),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current score store, if one is installed.
    pub async fn score_store(&self) -> Option<Arc<dyn ScoreStore>> {
        let guard = self.score_store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the score store or fail with a degraded-mode error.
    pub async fn require_score_store(&self) -> Result<Arc<dyn ScoreStore>, ServiceError> {
        self.score_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new score store implementation and leave degraded mode.
    pub async fn set_score_store(&self, store: Arc<dyn ScoreStore>) {
        {
            let mut guard = self.score_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        if self.is_degraded().await == value {
            return;
        }

        let _ = self.degraded.send(value);
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Registry of field-level edit locks.
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Registry of active stopwatches and recorded readings.
    pub fn timers(&self) -> &TimerAggregator {
        &self.timers
    }

    /// Registry of live connections and room memberships.
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }
}
