//! Keeps the score store connected and the degraded flag accurate.
//!
//! The supervisor owns the whole storage lifecycle: it establishes the first
//! connection, polls health, attempts bounded in-place reconnects, and falls
//! back to a full reconnect with exponential backoff when those are
//! exhausted. Gateway handlers never talk to the backend directly; they only
//! see the store handle installed here.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{score_store::ScoreStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Exponential backoff clock shared by the connect and recovery loops.
struct Backoff {
    delay: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            delay: INITIAL_DELAY,
        }
    }

    fn reset(&mut self) {
        self.delay = INITIAL_DELAY;
    }

    async fn wait(&mut self) {
        sleep(self.delay).await;
        self.delay = (self.delay * 2).min(MAX_DELAY);
    }
}

/// Connect to the score store via `connect` and supervise it forever,
/// toggling degraded mode on the shared state as connectivity changes.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn ScoreStore>, StorageError>> + Send,
{
    let mut backoff = Backoff::new();

    loop {
        let store = match connect().await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "score store connection attempt failed");
                backoff.wait().await;
                continue;
            }
        };

        state.set_score_store(store.clone()).await;
        info!("score store connected; leaving degraded mode");
        backoff.reset();

        // Returns only once in-place recovery is exhausted; after that the
        // store is reconnected from scratch.
        supervise(&state, store.as_ref()).await;
        backoff.wait().await;
    }
}

/// Poll the store's health and recover it in place while possible.
async fn supervise(state: &SharedState, store: &dyn ScoreStore) {
    loop {
        sleep(HEALTH_POLL_INTERVAL).await;

        if store.health_check().await.is_ok() {
            if state.is_degraded().await {
                info!("score store healthy again; leaving degraded mode");
                state.update_degraded(false).await;
            }
            continue;
        }

        warn!("score store health check failed; entering degraded mode");
        state.update_degraded(true).await;

        if attempt_recovery(store).await {
            info!("score store reconnected after health check failure");
            state.update_degraded(false).await;
        } else {
            warn!("exhausted score store reconnect attempts; reconnecting from scratch");
            return;
        }
    }
}

/// Bounded in-place reconnect attempts with exponential backoff.
async fn attempt_recovery(store: &dyn ScoreStore) -> bool {
    let mut delay = INITIAL_DELAY;

    for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => return true,
            Err(err) => {
                warn!(attempt, error = %err, "score store reconnect attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }

    false
}
