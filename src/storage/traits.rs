use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Collection, CollectionItem};

/// Failure inside the on-device store.
///
/// The local store has no network dependency, so these are treated as
/// non-recoverable: they are propagated, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Corrupt row '{id}': {detail}")]
    Corruption { id: String, detail: String },
}

/// Durable, keyed, on-device cache of collections and their items.
///
/// Pure CRUD: no network awareness and no business rules. Both tables are
/// uniquely keyed by id; upserts overwrite.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn upsert_collection(&self, collection: &Collection) -> Result<(), StorageError>;
    async fn upsert_item(&self, item: &CollectionItem) -> Result<(), StorageError>;

    /// Upsert many items. Default implementation falls back to sequential upserts.
    async fn upsert_items(&self, items: &[CollectionItem]) -> Result<(), StorageError> {
        for item in items {
            self.upsert_item(item).await?;
        }
        Ok(())
    }

    /// All collections, pinned first, then most recently updated first.
    async fn fetch_collections(&self) -> Result<Vec<Collection>, StorageError>;

    /// All items, grouped by collection and ordered by `sort_order`.
    async fn fetch_items(&self) -> Result<Vec<CollectionItem>, StorageError>;

    async fn fetch_collection(&self, id: Uuid) -> Result<Option<Collection>, StorageError>;
    async fn fetch_item(&self, id: i64) -> Result<Option<CollectionItem>, StorageError>;

    async fn delete_collection(&self, id: Uuid) -> Result<(), StorageError>;
    async fn delete_item(&self, id: i64) -> Result<(), StorageError>;

    /// Delete every item belonging to a collection. Returns rows removed.
    async fn delete_items_by_collection(&self, collection_id: Uuid) -> Result<u64, StorageError>;
}
