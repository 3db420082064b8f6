use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::model::{Collection, CollectionItem};
use super::traits::{LocalStore, StorageError};

/// Non-durable local store, used when no database path is configured and in tests.
pub struct InMemoryLocalStore {
    collections: DashMap<Uuid, Collection>,
    items: DashMap<i64, CollectionItem>,
}

impl InMemoryLocalStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            items: DashMap::new(),
        }
    }

    /// Number of stored collections
    #[must_use]
    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    /// Number of stored items
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty() && self.items.is_empty()
    }
}

impl Default for InMemoryLocalStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Pinned first, then newest `updated_at` first.
pub(crate) fn sort_collections(collections: &mut [Collection]) {
    collections.sort_by(|a, b| {
        b.pinned
            .cmp(&a.pinned)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
}

#[async_trait]
impl LocalStore for InMemoryLocalStore {
    async fn upsert_collection(&self, collection: &Collection) -> Result<(), StorageError> {
        self.collections.insert(collection.id, collection.clone());
        Ok(())
    }

    async fn upsert_item(&self, item: &CollectionItem) -> Result<(), StorageError> {
        self.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn fetch_collections(&self) -> Result<Vec<Collection>, StorageError> {
        let mut all: Vec<Collection> = self.collections.iter().map(|r| r.value().clone()).collect();
        sort_collections(&mut all);
        Ok(all)
    }

    async fn fetch_items(&self) -> Result<Vec<CollectionItem>, StorageError> {
        let mut all: Vec<CollectionItem> = self.items.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| {
            a.collection_id
                .cmp(&b.collection_id)
                .then(a.sort_order.cmp(&b.sort_order))
                .then(a.id.cmp(&b.id))
        });
        Ok(all)
    }

    async fn fetch_collection(&self, id: Uuid) -> Result<Option<Collection>, StorageError> {
        Ok(self.collections.get(&id).map(|r| r.value().clone()))
    }

    async fn fetch_item(&self, id: i64) -> Result<Option<CollectionItem>, StorageError> {
        Ok(self.items.get(&id).map(|r| r.value().clone()))
    }

    async fn delete_collection(&self, id: Uuid) -> Result<(), StorageError> {
        self.collections.remove(&id);
        Ok(())
    }

    async fn delete_item(&self, id: i64) -> Result<(), StorageError> {
        self.items.remove(&id);
        Ok(())
    }

    async fn delete_items_by_collection(&self, collection_id: Uuid) -> Result<u64, StorageError> {
        let before = self.items.len();
        self.items.retain(|_, item| item.collection_id != collection_id);
        Ok((before - self.items.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn collection(name: &str, pinned: bool, age_secs: i64) -> Collection {
        let mut c = Collection::new(Uuid::nil(), name, None, false);
        c.pinned = pinned;
        c.updated_at = Utc::now() - Duration::seconds(age_secs);
        c
    }

    fn item(id: i64, collection_id: Uuid, sort_order: i32) -> CollectionItem {
        CollectionItem {
            id,
            collection_id,
            external_ref_id: id * 10,
            title: format!("Item {id}"),
            poster_ref: None,
            backdrop_ref: None,
            year: None,
            release_date: None,
            added_at: Utc::now(),
            sort_order,
        }
    }

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemoryLocalStore::new();
        assert!(store.is_empty());
        assert_eq!(store.collection_count(), 0);
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let store = InMemoryLocalStore::new();
        let mut c = collection("A", false, 0);
        store.upsert_collection(&c).await.unwrap();
        c.name = "B".into();
        store.upsert_collection(&c).await.unwrap();

        assert_eq!(store.collection_count(), 1);
        let fetched = store.fetch_collection(c.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "B");
    }

    #[tokio::test]
    async fn test_fetch_collections_orders_pinned_then_recent() {
        let store = InMemoryLocalStore::new();
        let old_pinned = collection("old pinned", true, 500);
        let fresh = collection("fresh", false, 1);
        let older = collection("older", false, 100);
        for c in [&older, &fresh, &old_pinned] {
            store.upsert_collection(c).await.unwrap();
        }

        let names: Vec<String> = store
            .fetch_collections()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["old pinned", "fresh", "older"]);
    }

    #[tokio::test]
    async fn test_delete_items_by_collection() {
        let store = InMemoryLocalStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.upsert_items(&[item(1, a, 1), item(2, a, 2), item(3, b, 1)]).await.unwrap();

        let removed = store.delete_items_by_collection(a).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.item_count(), 1);
        assert!(store.fetch_item(3).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let store = InMemoryLocalStore::new();
        assert!(store.delete_item(99).await.is_ok());
        assert!(store.delete_collection(Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn test_items_sorted_by_sort_order() {
        let store = InMemoryLocalStore::new();
        let a = Uuid::new_v4();
        store.upsert_items(&[item(1, a, 3), item(2, a, 1), item(3, a, 2)]).await.unwrap();
        let order: Vec<i64> = store.fetch_items().await.unwrap().iter().map(|i| i.id).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }
}
