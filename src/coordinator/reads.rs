//! Reads: canonical-state lookups and direct remote reads used as the
//! fallback path behind the edge cache.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::error::SyncError;
use crate::model::{Collection, CollectionItem, CollectionWithItems, Movie, Profile, UserStatistics};
use crate::remote::{codec, tables, Filter, Order};

use super::{CollectionsSnapshot, SyncCoordinator};

impl SyncCoordinator {
    // ═══════════════════════════════════════════════════════════════════════════
    // Canonical state
    // ═══════════════════════════════════════════════════════════════════════════

    /// Current published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CollectionsSnapshot> {
        Arc::clone(&self.snapshot.borrow())
    }

    /// Watch canonical state. Every write publishes a new snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<CollectionsSnapshot>> {
        self.snapshot.subscribe()
    }

    /// Real collections, pinned first then newest first.
    #[must_use]
    pub fn collections(&self) -> Vec<Collection> {
        self.snapshot.borrow().collections.clone()
    }

    #[must_use]
    pub fn collection(&self, id: Uuid) -> Option<Collection> {
        self.snapshot.borrow().collection(id).cloned()
    }

    /// Items of a collection in `sort_order`.
    #[must_use]
    pub fn items(&self, collection_id: Uuid) -> Vec<CollectionItem> {
        self.snapshot.borrow().items(collection_id).to_vec()
    }

    #[must_use]
    pub fn contains_external_ref(&self, collection_id: Uuid, external_ref_id: i64) -> bool {
        self.snapshot.borrow().contains_external_ref(collection_id, external_ref_id)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Remote reads
    // ═══════════════════════════════════════════════════════════════════════════

    /// The user's collections with their items, straight from the remote store.
    pub async fn fetch_remote_collections(&self, user_id: Uuid) -> Result<Vec<CollectionWithItems>, SyncError> {
        let _timer = crate::metrics::LatencyTimer::new("remote", "collections");
        let rows = self
            .remote
            .select(
                tables::COLLECTIONS,
                &[Filter::eq("owner_id", user_id.to_string())],
                Some(&Order::desc("updated_at")),
            )
            .await?;
        let collections: Vec<Collection> = codec::decode_rows(tables::COLLECTIONS, rows)?;

        let mut lists = Vec::with_capacity(collections.len());
        for collection in collections {
            let items = self.fetch_remote_items(collection.id).await?;
            lists.push(CollectionWithItems { collection, items: Some(items) });
        }
        debug!(collections = lists.len(), "fetched collections from remote");
        Ok(lists)
    }

    /// Items of one collection in `sort_order`, straight from the remote store.
    pub async fn fetch_remote_items(&self, collection_id: Uuid) -> Result<Vec<CollectionItem>, SyncError> {
        let rows = self
            .remote
            .select(
                tables::COLLECTION_ITEMS,
                &[Filter::eq("collection_id", collection_id.to_string())],
                Some(&Order::asc("sort_order")),
            )
            .await?;
        codec::decode_rows(tables::COLLECTION_ITEMS, rows)
    }

    /// Backing items of the synthetic collection, newest first.
    pub async fn fetch_movies_remote(&self) -> Result<Vec<Movie>, SyncError> {
        let user_id = self.require_user()?;
        let _timer = crate::metrics::LatencyTimer::new("remote", "movies");
        let rows = self
            .remote
            .select(
                tables::MOVIES,
                &[Filter::eq("user_id", user_id.to_string())],
                Some(&Order::desc("added_at")),
            )
            .await?;
        codec::decode_rows(tables::MOVIES, rows)
    }

    /// A user without a statistics row has all-zero statistics.
    pub async fn fetch_statistics_remote(&self) -> Result<UserStatistics, SyncError> {
        let user_id = self.require_user()?;
        let rows = self
            .remote
            .select(tables::STATISTICS, &[Filter::eq("user_id", user_id.to_string())], None)
            .await?;
        match rows.into_iter().next() {
            Some(row) => codec::decode_row(tables::STATISTICS, row),
            None => Ok(UserStatistics::default()),
        }
    }

    pub async fn fetch_profile_remote(&self) -> Result<Profile, SyncError> {
        let user_id = self.require_user()?;
        let rows = self
            .remote
            .select(tables::PROFILES, &[Filter::eq("id", user_id.to_string())], None)
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::DecodeError(format!("{}: no row for {user_id}", tables::PROFILES)))?;
        codec::decode_row(tables::PROFILES, row)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::remote::{MemoryRemoteStore, Row};
    use crate::session::StaticSession;
    use crate::storage::InMemoryLocalStore;

    use super::*;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn coordinator(user: Uuid, remote: Arc<MemoryRemoteStore>) -> SyncCoordinator {
        SyncCoordinator::new(
            Arc::new(InMemoryLocalStore::new()),
            remote,
            Arc::new(StaticSession::signed_in(user)),
        )
    }

    #[tokio::test]
    async fn test_movies_are_scoped_and_newest_first() {
        let user = Uuid::new_v4();
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.seed(tables::MOVIES, row(json!({"user_id": user, "external_ref_id": 1, "title": "old", "added_at": "2024-01-01T00:00:00Z"})));
        remote.seed(tables::MOVIES, row(json!({"user_id": user, "external_ref_id": 2, "title": "new", "added_at": "2024-06-01T00:00:00Z"})));
        remote.seed(tables::MOVIES, row(json!({"user_id": Uuid::new_v4(), "external_ref_id": 3, "title": "theirs"})));

        let movies = coordinator(user, remote).fetch_movies_remote().await.unwrap();
        let titles: Vec<_> = movies.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn test_missing_statistics_row_is_zero() {
        let stats = coordinator(Uuid::new_v4(), Arc::new(MemoryRemoteStore::new()))
            .fetch_statistics_remote()
            .await
            .unwrap();
        assert_eq!(stats, UserStatistics::default());
    }

    #[tokio::test]
    async fn test_profile_lookup() {
        let user = Uuid::new_v4();
        let remote = Arc::new(MemoryRemoteStore::new());
        let c = coordinator(user, remote.clone());
        assert!(matches!(c.fetch_profile_remote().await, Err(SyncError::DecodeError(_))));

        remote.seed(tables::PROFILES, row(json!({"id": user, "username": "reel"})));
        let profile = c.fetch_profile_remote().await.unwrap();
        assert_eq!(profile.username.as_deref(), Some("reel"));
    }

    #[tokio::test]
    async fn test_remote_reads_need_a_user() {
        let c = SyncCoordinator::new(
            Arc::new(InMemoryLocalStore::new()),
            Arc::new(MemoryRemoteStore::new()),
            Arc::new(StaticSession::signed_out()),
        );
        assert_eq!(c.fetch_movies_remote().await.unwrap_err(), SyncError::AuthenticationRequired);
    }
}
