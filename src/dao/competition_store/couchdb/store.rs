use std::{sync::Arc, time::Duration};

use async_stream::stream;
use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value};
use time::OffsetDateTime;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;
use uuid::Uuid;

use crate::dao::{
    competition_store::{CompetitionStore, PlayerFeed, PlayerQuery},
    models::{CompetitionEntity, NewPlayerEntity, PlayerEntity, PlayerPatch},
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        CouchCompetitionDocument, CouchPlayerDocument, FindResponse, competition_doc_id,
        find_players_request, player_doc_id,
    },
};

#[derive(Clone)]
pub struct CouchCompetitionStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
    poll_interval: Duration,
}

impl CouchCompetitionStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
            poll_interval: config.poll_interval,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorize(self.client.request(method, url))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: response.status(),
            })
        }
    }

    /// Run a Mango query and decode every returned player document.
    async fn find_players(
        &self,
        competition_id: &str,
        query: &PlayerQuery,
    ) -> CouchResult<Vec<PlayerEntity>> {
        const FIND: &str = "_find";
        let body = find_players_request(competition_id, query);

        let response = self
            .request(Method::POST, FIND)
            .json(&body)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: FIND.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: FIND.to_string(),
                status: response.status(),
            });
        }

        let payload = response
            .json::<FindResponse>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: FIND.to_string(),
                source,
            })?;

        let players = payload
            .docs
            .into_iter()
            .map(|doc: Value| {
                from_value::<CouchPlayerDocument>(doc)
                    .map(|doc| doc.player)
                    .map_err(|source| CouchDaoError::DeserializeValue {
                        path: FIND.to_string(),
                        source,
                    })
            })
            .collect::<CouchResult<Vec<_>>>()?;

        Ok(query.apply(players))
    }

    async fn merge_competition(&self, competition: CompetitionEntity) -> CouchResult<()> {
        let doc_id = competition_doc_id(&competition.id);
        let existing = self
            .get_document::<CouchCompetitionDocument>(&doc_id)
            .await?;

        let (rev, created_at) = match existing {
            Some(doc) => (doc.rev, doc.competition.created_at),
            None => (None, None),
        };
        let created_at = created_at
            .or(competition.created_at)
            .unwrap_or_else(OffsetDateTime::now_utc);

        let doc = CouchCompetitionDocument::from_entity(
            CompetitionEntity {
                created_at: Some(created_at),
                ..competition
            },
            rev,
        );
        self.put_document(&doc_id, &doc).await
    }

    async fn patch_player(
        &self,
        competition_id: &str,
        player_id: &str,
        patch: PlayerPatch,
    ) -> CouchResult<()> {
        let doc_id = player_doc_id(competition_id, player_id);
        let Some(mut doc) = self.get_document::<CouchPlayerDocument>(&doc_id).await? else {
            return Err(CouchDaoError::MissingPlayer { doc_id });
        };

        patch.apply(&mut doc.player, OffsetDateTime::now_utc());
        self.put_document(&doc_id, &doc).await
    }
}

impl CompetitionStore for CouchCompetitionStore {
    fn upsert_competition(
        &self,
        competition: CompetitionEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .merge_competition(competition)
                .await
                .map_err(Into::into)
        })
    }

    fn add_player(
        &self,
        competition_id: &str,
        player: NewPlayerEntity,
    ) -> BoxFuture<'static, StorageResult<PlayerEntity>> {
        let store = self.clone();
        let competition_id = competition_id.to_string();
        Box::pin(async move {
            let entity = player.into_entity(
                Uuid::new_v4().simple().to_string(),
                OffsetDateTime::now_utc(),
            );
            let doc = CouchPlayerDocument::from_entity(&competition_id, entity.clone(), None);
            store.put_document(&doc.id, &doc).await?;
            Ok(entity)
        })
    }

    fn update_player(
        &self,
        competition_id: &str,
        player_id: &str,
        patch: PlayerPatch,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let competition_id = competition_id.to_string();
        let player_id = player_id.to_string();
        Box::pin(async move {
            store
                .patch_player(&competition_id, &player_id, patch)
                .await
                .map_err(Into::into)
        })
    }

    fn query_players(
        &self,
        competition_id: &str,
        query: PlayerQuery,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        let competition_id = competition_id.to_string();
        Box::pin(async move {
            store
                .find_players(&competition_id, &query)
                .await
                .map_err(Into::into)
        })
    }

    fn subscribe_players(&self, competition_id: &str, query: PlayerQuery) -> PlayerFeed {
        let store = self.clone();
        let competition_id = competition_id.to_string();

        // CouchDB has no push channel for Mango queries; poll and emit on change.
        Box::pin(stream! {
            let mut ticker = interval(store.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last: Option<Vec<PlayerEntity>> = None;

            loop {
                ticker.tick().await;
                match store.find_players(&competition_id, &query).await {
                    Ok(players) => {
                        if last.as_ref() != Some(&players) {
                            debug!(competition_id = %competition_id, count = players.len(), "live query changed");
                            last = Some(players.clone());
                            yield Ok(players);
                        }
                    }
                    Err(err) => {
                        yield Err(StorageError::from(err));
                        break;
                    }
                }
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .authorize(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }
}
