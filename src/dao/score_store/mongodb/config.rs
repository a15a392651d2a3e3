//! MongoDB connection configuration.

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

/// Parsed client options plus the target database name.
#[derive(Clone)]
pub struct MongoConfig {
    /// Driver options parsed from the connection URI.
    pub options: ClientOptions,
    /// Database holding the score collection.
    pub database_name: String,
}

impl MongoConfig {
    /// Parse a connection URI, defaulting the database name when not given.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or("game_night").to_owned();
        let options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;

        Ok(Self {
            options,
            database_name,
        })
    }
}
