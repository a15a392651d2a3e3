//! Persistence layer: the score store abstraction and its backends.

/// Database model definitions.
pub mod models;
/// Score persistence and retrieval operations.
pub mod score_store;
/// Storage abstraction layer for database operations.
pub mod storage;
