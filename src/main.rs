//! Game Night Back binary entrypoint wiring the HTTP, WebSocket, and storage layers.

use std::{env, net::SocketAddr, time::Duration};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dao;
mod dto;
mod error;
mod routes;
mod services;
mod state;

use config::AppConfig;
use state::{AppState, SharedState};

const LOCK_JANITOR_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_config = AppConfig::load();
    let app_state = AppState::new(app_config);

    #[cfg(feature = "mongo-store")]
    spawn_mongo_supervisor(app_state.clone());
    #[cfg(not(feature = "mongo-store"))]
    tracing::warn!("no storage backend compiled in; running in degraded mode");

    tokio::spawn(run_lock_janitor(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Supervise the MongoDB-backed score store, reconnecting in the background
/// and toggling degraded mode when connectivity changes.
#[cfg(feature = "mongo-store")]
fn spawn_mongo_supervisor(state: SharedState) {
    use std::sync::Arc;

    use crate::dao::score_store::{
        ScoreStore,
        mongodb::{MongoConfig, MongoScoreStore},
    };

    let mongo_uri = env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
    let mongo_db = env::var("MONGO_DB").ok();

    tokio::spawn(services::storage_supervisor::run(state, move || {
        let uri = mongo_uri.clone();
        let db = mongo_db.clone();
        async move {
            let config = MongoConfig::from_uri(&uri, db.as_deref()).await?;
            let store = MongoScoreStore::connect(config).await?;
            Ok(Arc::new(store) as Arc<dyn ScoreStore>)
        }
    }));
}

/// Periodically drop edit locks whose holders went silent past the TTL.
async fn run_lock_janitor(state: SharedState) {
    let mut ticker = tokio::time::interval(LOCK_JANITOR_INTERVAL);
    loop {
        ticker.tick().await;
        let removed = state.locks().cleanup_expired();
        if removed > 0 {
            info!(removed, "dropped expired edit locks");
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
