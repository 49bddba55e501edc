//! MongoDB implementation of the storage boundary.

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions, IndexOptions, ReturnDocument},
};
use std::{sync::Arc, time::Duration};

use modelbind_core::{
    backend::{ConnectionTarget, Connector, DatabaseBackend, FindQuery},
    error::{ModelError, ModelResult},
    index::{IndexSpec, SortDirection},
};

/// The server error code for a violated uniqueness constraint.
const DUPLICATE_KEY_CODE: i32 = 11000;

/// [`DatabaseBackend`] over one MongoDB client and database.
#[derive(Debug)]
pub struct MongoBackend {
    client: Client,
    database: String,
}

impl MongoBackend {
    /// Wraps an already-connected client.
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    fn collection(&self, name: &str) -> MongoCollection<Document> {
        self.client.database(&self.database).collection(name)
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match &*err.kind {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY_CODE
        }
        // insert_many reports per-document failures through a bulk error
        // shape; match the server code in the rendered message instead of
        // the exact variant.
        _ => err.to_string().contains("E11000"),
    }
}

fn map_error(err: MongoError, collection: &str) -> ModelError {
    if is_duplicate_key(&err) {
        return ModelError::DuplicateKey {
            collection: collection.to_string(),
            message: err.to_string(),
        };
    }

    match &*err.kind {
        ErrorKind::ServerSelection { message, .. } if message.contains("timed out") => {
            ModelError::Timeout(message.clone())
        }
        ErrorKind::ServerSelection { message, .. } => {
            ModelError::StorageUnavailable(message.clone())
        }
        ErrorKind::Io(io) => ModelError::StorageUnavailable(io.to_string()),
        ErrorKind::Authentication { message, .. } => {
            ModelError::StorageUnavailable(message.clone())
        }
        _ => ModelError::Backend(err.to_string()),
    }
}

fn index_model_to_spec(model: IndexModel) -> Option<IndexSpec> {
    let mut keys = Vec::with_capacity(model.keys.len());
    for (field, value) in model.keys.iter() {
        let direction = match value {
            Bson::Int32(v) if *v > 0 => SortDirection::Asc,
            Bson::Int32(v) if *v < 0 => SortDirection::Desc,
            Bson::Int64(v) if *v > 0 => SortDirection::Asc,
            Bson::Int64(v) if *v < 0 => SortDirection::Desc,
            Bson::Double(v) if *v > 0.0 => SortDirection::Asc,
            Bson::Double(v) if *v < 0.0 => SortDirection::Desc,
            // Text and other specialized indexes have no representation
            // here; they never collide with declared specs.
            _ => return None,
        };
        keys.push((field.clone(), direction));
    }

    let (unique, name) = model
        .options
        .map(|options| (options.unique.unwrap_or(false), options.name))
        .unwrap_or((false, None));

    Some(IndexSpec { keys, unique, name })
}

fn spec_to_index_model(spec: &IndexSpec) -> IndexModel {
    let keys = Document::from_iter(
        spec.keys
            .iter()
            .map(|(field, direction)| (field.clone(), Bson::Int32(direction.as_i32()))),
    );

    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .unique(spec.unique)
                .name(spec.name.clone())
                .build(),
        )
        .build()
}

#[async_trait]
impl DatabaseBackend for MongoBackend {
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> ModelResult<()> {
        self.collection(collection)
            .insert_many(documents)
            .await
            .map_err(|e| map_error(e, collection))?;

        Ok(())
    }

    async fn find_one(&self, collection: &str, filter: Document) -> ModelResult<Option<Document>> {
        self.collection(collection)
            .find_one(filter)
            .await
            .map_err(|e| map_error(e, collection))
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        query: FindQuery,
    ) -> ModelResult<Vec<Document>> {
        let mut options = FindOptions::default();
        options.limit = query.limit.map(|limit| limit as i64);
        options.skip = query.skip;
        options.sort = query
            .sort
            .as_ref()
            .map(|sort| doc! { sort.field.clone(): sort.direction.as_i32() });

        self.collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(|e| map_error(e, collection))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| map_error(e, collection))
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> ModelResult<u64> {
        Ok(self
            .collection(collection)
            .replace_one(filter, replacement)
            .await
            .map_err(|e| map_error(e, collection))?
            .matched_count)
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> ModelResult<u64> {
        Ok(self
            .collection(collection)
            .delete_many(filter)
            .await
            .map_err(|e| map_error(e, collection))?
            .deleted_count)
    }

    async fn count(&self, collection: &str, filter: Document) -> ModelResult<u64> {
        self.collection(collection)
            .count_documents(filter)
            .await
            .map_err(|e| map_error(e, collection))
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Document,
    ) -> ModelResult<Vec<Bson>> {
        self.collection(collection)
            .distinct(field, filter)
            .await
            .map_err(|e| map_error(e, collection))
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> ModelResult<Vec<Document>> {
        self.collection(collection)
            .aggregate(pipeline)
            .await
            .map_err(|e| map_error(e, collection))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| map_error(e, collection))
    }

    async fn increment_counter(&self, collection: &str, key: &str) -> ModelResult<i64> {
        let updated = self
            .collection(collection)
            .find_one_and_update(doc! { "_id": key }, doc! { "$inc": { "seq": 1_i64 } })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| map_error(e, collection))?;

        let document = updated.ok_or_else(|| {
            ModelError::Backend(format!("counter upsert for {key} returned no document"))
        })?;

        match document.get("seq") {
            Some(Bson::Int64(value)) => Ok(*value),
            Some(Bson::Int32(value)) => Ok(i64::from(*value)),
            _ => Err(ModelError::Backend(format!(
                "malformed counter document for {key}"
            ))),
        }
    }

    async fn list_indexes(&self, collection: &str) -> ModelResult<Vec<IndexSpec>> {
        Ok(self
            .collection(collection)
            .list_indexes()
            .await
            .map_err(|e| map_error(e, collection))?
            .try_collect::<Vec<IndexModel>>()
            .await
            .map_err(|e| map_error(e, collection))?
            .into_iter()
            .filter_map(index_model_to_spec)
            .collect())
    }

    async fn create_index(&self, collection: &str, spec: IndexSpec) -> ModelResult<()> {
        self.collection(collection)
            .create_index(spec_to_index_model(&spec))
            .await
            .map_err(|e| map_error(e, collection))?;

        Ok(())
    }

    async fn close(&self) -> ModelResult<()> {
        self.client.clone().shutdown().await;

        Ok(())
    }
}

/// Connector building one [`MongoBackend`] per connection target.
///
/// The driver owns pooling within each client; deadline enforcement is
/// delegated to the driver through the configured timeout, which applies to
/// connect and server selection. Driver timeouts surface as
/// [`ModelError::Timeout`].
#[derive(Debug, Default, Clone)]
pub struct MongoConnector {
    timeout: Option<Duration>,
}

impl MongoConnector {
    /// A connector using the driver's default timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `timeout` to connect and server selection.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout) }
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self, target: &ConnectionTarget) -> ModelResult<Arc<dyn DatabaseBackend>> {
        let mut options = ClientOptions::parse(&target.uri)
            .await
            .map_err(|err| ModelError::Configuration(err.to_string()))?;

        if let Some(timeout) = self.timeout {
            options.connect_timeout = Some(timeout);
            options.server_selection_timeout = Some(timeout);
        }

        let client = Client::with_options(options)
            .map_err(|err| ModelError::Configuration(err.to_string()))?;
        tracing::debug!(database = %target.database, "mongodb client created");

        Ok(Arc::new(MongoBackend::new(client, target.database.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_models_round_trip_through_specs() {
        let spec = IndexSpec::compound(vec![
            ("author_id".to_string(), SortDirection::Asc),
            ("published".to_string(), SortDirection::Desc),
        ])
        .unique();

        let restored = index_model_to_spec(spec_to_index_model(&spec)).unwrap();
        assert_eq!(restored.key_pattern(), spec.key_pattern());
        assert!(restored.unique);
    }

    #[test]
    fn unsupported_index_shapes_are_skipped() {
        let model = IndexModel::builder()
            .keys(doc! { "content": "text" })
            .build();
        assert!(index_model_to_spec(model).is_none());
    }
}
