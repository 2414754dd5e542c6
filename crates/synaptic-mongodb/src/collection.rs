use async_trait::async_trait;
use bson::Document as Record;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use mongodb::options::{ClientOptions, DriverInfo};
use mongodb::{Client, IndexModel};
use synaptic_core::SynapticError;

/// Stream of records returned by [`DocCollection::find`].
pub type RecordStream = BoxStream<'static, Result<Record, SynapticError>>;

/// The subset of collection operations the MongoDB integrations rely on.
///
/// Implemented for the driver's `mongodb::Collection<bson::Document>` and for
/// [`InMemoryCollection`](crate::InMemoryCollection). Components that must
/// see the same data share one `Arc<dyn DocCollection>`.
#[async_trait]
pub trait DocCollection: Send + Sync {
    /// Collection name, used as the `from` of self-`$lookup` stages.
    fn name(&self) -> &str;

    /// Run a query. Results are streamed from the server cursor.
    async fn find(
        &self,
        filter: Record,
        projection: Option<Record>,
    ) -> Result<RecordStream, SynapticError>;

    /// Insert records in one request. Never overwrites: an existing `_id`
    /// fails that record. With `ordered = false` every other record is
    /// still inserted; with `ordered = true` insertion stops at the first
    /// failure.
    async fn insert_many(&self, records: Vec<Record>, ordered: bool)
        -> Result<(), SynapticError>;

    /// Delete every record matching `filter`; returns the number removed.
    async fn delete_many(&self, filter: Record) -> Result<u64, SynapticError>;

    /// Run an aggregation pipeline and collect its output.
    async fn aggregate(&self, pipeline: Vec<Record>) -> Result<Vec<Record>, SynapticError>;

    /// Create a secondary index with the given key specification.
    async fn create_index(&self, keys: Record) -> Result<(), SynapticError>;
}

#[async_trait]
impl DocCollection for mongodb::Collection<Record> {
    fn name(&self) -> &str {
        mongodb::Collection::<Record>::name(self)
    }

    async fn find(
        &self,
        filter: Record,
        projection: Option<Record>,
    ) -> Result<RecordStream, SynapticError> {
        let mut action = mongodb::Collection::<Record>::find(self, filter);
        if let Some(projection) = projection {
            action = action.projection(projection);
        }
        let cursor = action
            .await
            .map_err(|e| SynapticError::Store(format!("MongoDB find error: {e}")))?;

        Ok(cursor
            .map_err(|e| SynapticError::Store(format!("MongoDB cursor error: {e}")))
            .boxed())
    }

    async fn insert_many(
        &self,
        records: Vec<Record>,
        ordered: bool,
    ) -> Result<(), SynapticError> {
        mongodb::Collection::<Record>::insert_many(self, records)
            .ordered(ordered)
            .await
            .map_err(|e| SynapticError::Store(format!("MongoDB insert_many error: {e}")))?;
        Ok(())
    }

    async fn delete_many(&self, filter: Record) -> Result<u64, SynapticError> {
        let result = mongodb::Collection::<Record>::delete_many(self, filter)
            .await
            .map_err(|e| SynapticError::Store(format!("MongoDB delete_many error: {e}")))?;
        Ok(result.deleted_count)
    }

    async fn aggregate(&self, pipeline: Vec<Record>) -> Result<Vec<Record>, SynapticError> {
        mongodb::Collection::<Record>::aggregate(self, pipeline)
            .await
            .map_err(|e| SynapticError::Store(format!("MongoDB aggregate error: {e}")))?
            .try_collect()
            .await
            .map_err(|e| SynapticError::Store(format!("MongoDB cursor error: {e}")))
    }

    async fn create_index(&self, keys: Record) -> Result<(), SynapticError> {
        let model = IndexModel::builder().keys(keys).build();
        mongodb::Collection::<Record>::create_index(self, model)
            .await
            .map_err(|e| SynapticError::Store(format!("MongoDB create_index error: {e}")))?;
        Ok(())
    }
}

/// Connect to MongoDB, identifying this library in the driver handshake.
pub async fn connect(connection_string: &str) -> Result<Client, SynapticError> {
    let mut options = ClientOptions::parse(connection_string)
        .await
        .map_err(|e| SynapticError::Config(format!("invalid MongoDB connection string: {e}")))?;
    options.driver_info = Some(
        DriverInfo::builder()
            .name("synaptic")
            .version(env!("CARGO_PKG_VERSION").to_string())
            .build(),
    );

    Client::with_options(options)
        .map_err(|e| SynapticError::Store(format!("failed to create MongoDB client: {e}")))
}

/// Split a `"database.collection"` namespace on its first `.`.
pub fn parse_namespace(namespace: &str) -> Result<(&str, &str), SynapticError> {
    match namespace.split_once('.') {
        Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok((db, coll)),
        _ => Err(SynapticError::Config(format!(
            "invalid MongoDB namespace '{namespace}': expected \"database.collection\""
        ))),
    }
}
