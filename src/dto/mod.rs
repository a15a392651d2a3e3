//! Wire-level payload types shared by the WebSocket channel and HTTP routes.

use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Score and lock snapshots sent to joining clients.
pub mod game;
/// Health endpoint payloads.
pub mod health;
/// Validation helpers for DTOs.
pub mod validation;
/// WebSocket message contracts.
pub mod ws;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
