//! MongoDB-specific error taxonomy for the score store.

use mongodb::error::Error as MongoError;
use thiserror::Error;

use crate::state::{GameId, TeamId};

/// Result alias for MongoDB score store operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Errors raised while talking to the MongoDB score store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The configured connection string could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// URI that failed to parse.
        uri: String,
        /// Driver-level cause.
        #[source]
        source: MongoError,
    },
    /// The client could not be built from the parsed options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver-level cause.
        #[source]
        source: MongoError,
    },
    /// The server never answered the initial ping.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Number of ping attempts made before giving up.
        attempts: u32,
        /// Driver-level cause.
        #[source]
        source: MongoError,
    },
    /// A periodic health ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver-level cause.
        #[source]
        source: MongoError,
    },
    /// Index creation failed during startup.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection the index belongs to.
        collection: &'static str,
        /// Index definition name.
        index: &'static str,
        /// Driver-level cause.
        #[source]
        source: MongoError,
    },
    /// Writing a score row failed.
    #[error("failed to save score for game `{game_id}` team `{team_id}`")]
    SaveScore {
        /// Game part of the score key.
        game_id: GameId,
        /// Team part of the score key.
        team_id: TeamId,
        /// Driver-level cause.
        #[source]
        source: MongoError,
    },
    /// Reading a score row failed.
    #[error("failed to load score for game `{game_id}` team `{team_id}`")]
    LoadScore {
        /// Game part of the score key.
        game_id: GameId,
        /// Team part of the score key.
        team_id: TeamId,
        /// Driver-level cause.
        #[source]
        source: MongoError,
    },
    /// Listing the scores of a game failed.
    #[error("failed to list scores for game `{game_id}`")]
    ListScores {
        /// Game whose scores were requested.
        game_id: GameId,
        /// Driver-level cause.
        #[source]
        source: MongoError,
    },
}
