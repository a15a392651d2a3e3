/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Score persistence orchestration for the realtime gateway.
pub mod score_service;
/// Score store connection supervision and degraded-mode tracking.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
