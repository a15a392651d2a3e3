use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Game Night Back.
#[openapi(
    paths(crate::routes::health::healthcheck, crate::routes::websocket::ws_handler),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::game::ScoreSnapshot,
            crate::dto::game::LockView,
            crate::dto::game::TimerHolderView,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "scoring", description = "WebSocket operations for live collaborative scoring"),
    )
)]
pub struct ApiDoc;
