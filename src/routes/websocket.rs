use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;

use crate::{services::websocket_service, state::SharedState};

/// Query parameters accepted on the WebSocket upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Admin token; connections without a recognized token join anonymously.
    pub token: Option<String>,
}

#[utoipa::path(
    get,
    path = "/ws",
    params(
        ("token" = Option<String>, Query, description = "Admin token granting a stable privileged identity")
    ),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a live-scoring WebSocket session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_service::handle_socket(state, socket, query.token))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
