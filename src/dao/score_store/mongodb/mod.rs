//! MongoDB backend for the score store, enabled by the `mongo-store` feature.

mod connection;
mod error;
mod models;
/// Store implementation and connection lifecycle.
pub mod store;

/// Connection configuration parsed from a URI or the environment.
pub mod config;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoScoreStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
