//! MongoDB-backed implementation of [`ScoreStore`].

use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{Client, Collection, Database, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoScoreDocument, game_key, score_key},
};
use crate::dao::{models::ScoreEntity, score_store::ScoreStore, storage::StorageResult};
use crate::state::{GameId, TeamId};

const SCORE_COLLECTION_NAME: &str = "scores";

/// Cheaply clonable handle on the MongoDB score store.
#[derive(Clone)]
pub struct MongoScoreStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoScoreStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.collection().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"game_id": 1, "team_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("score_game_team_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SCORE_COLLECTION_NAME,
                index: "game_id,team_id",
                source,
            })?;

        Ok(())
    }

    async fn collection(&self) -> Collection<MongoScoreDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoScoreDocument>(SCORE_COLLECTION_NAME)
    }

    async fn find_score(
        &self,
        game_id: GameId,
        team_id: TeamId,
    ) -> MongoResult<Option<ScoreEntity>> {
        let collection = self.collection().await;

        let document = collection
            .find_one(score_key(game_id, team_id))
            .await
            .map_err(|source| MongoDaoError::LoadScore {
                game_id,
                team_id,
                source,
            })?;

        Ok(document.map(Into::into))
    }

    async fn upsert_score(&self, score: ScoreEntity) -> MongoResult<()> {
        let (game_id, team_id) = (score.game_id, score.team_id);
        let document: MongoScoreDocument = score.into();
        let collection = self.collection().await;

        collection
            .replace_one(score_key(game_id, team_id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveScore {
                game_id,
                team_id,
                source,
            })?;

        Ok(())
    }

    async fn list_scores(&self, game_id: GameId) -> MongoResult<Vec<ScoreEntity>> {
        let collection = self.collection().await;

        let documents: Vec<MongoScoreDocument> = collection
            .find(game_key(game_id))
            .sort(doc! { "team_id": 1 })
            .await
            .map_err(|source| MongoDaoError::ListScores { game_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListScores { game_id, source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }
}

impl ScoreStore for MongoScoreStore {
    fn find_score(
        &self,
        game_id: GameId,
        team_id: TeamId,
    ) -> BoxFuture<'static, StorageResult<Option<ScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_score(game_id, team_id).await.map_err(Into::into) })
    }

    fn upsert_score(&self, score: ScoreEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_score(score).await.map_err(Into::into) })
    }

    fn list_scores(&self, game_id: GameId) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_scores(game_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
