//! MongoDB database wrapper.

use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::{options::ClientOptions, Client, Collection};
use serde_json::Value;
use tracing::{debug, info};

use super::{BackendError, Query, QueryBackend, Row};
use crate::cache::GuildId;

/// MongoDB-backed [`QueryBackend`].
#[derive(Debug, Clone)]
pub struct Database {
    client: Client,
    db: mongodb::Database,
}

impl Database {
    /// Connect to MongoDB with the given URI and database name.
    ///
    /// # Errors
    /// Returns error if the URI is invalid or the server does not answer a ping.
    pub async fn connect(uri: &str, db_name: &str) -> anyhow::Result<Self> {
        let options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(options)?;

        // Ping the database to verify connection
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;

        info!("Successfully connected to MongoDB");

        let db = client.database(db_name);

        Ok(Self { client, db })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }

    async fn find(
        &self,
        collection: &'static str,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Vec<Row>, BackendError> {
        let coll = self.collection(collection);
        let mut find = coll.find(filter);
        if let Some(projection) = projection {
            find = find.projection(projection);
        }

        let mut cursor = find.await?;
        let mut rows = Vec::new();
        while let Some(mut document) = cursor.try_next().await? {
            document.remove("_id");
            rows.push(into_row(collection, document)?);
        }

        debug!("Fetched {} rows from {}", rows.len(), collection);
        Ok(rows)
    }
}

impl QueryBackend for Database {
    async fn fetch(&self, query: Query) -> Result<Vec<Row>, BackendError> {
        let collection = query.collection();
        match query {
            Query::Category(_) => self.find(collection, doc! {}, None).await,
            Query::CategoryForGuild(_, guild_id) => {
                self.find(collection, guild_filter(guild_id)?, None).await
            }
            Query::ConfiguredGuilds => {
                self.find(
                    collection,
                    doc! { "initialized": true },
                    Some(doc! { "guild_id": 1, "_id": 0 }),
                )
                .await
            }
        }
    }
}

/// Match `guild_id` stored either as an integer or as a numeric string.
fn guild_filter(guild_id: GuildId) -> Result<Document, BackendError> {
    let id = i64::try_from(guild_id.get()).map_err(|_| BackendError::InvalidGuildId(guild_id))?;
    Ok(doc! { "guild_id": { "$in": [id, id.to_string()] } })
}

fn into_row(collection: &'static str, document: Document) -> Result<Row, BackendError> {
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(row) => Ok(row),
        other => Err(BackendError::MalformedDocument {
            collection,
            reason: format!("expected an object, got {other}"),
        }),
    }
}
