//! Chaos Testing for Reel Sync
//!
//! This module tests failure scenarios using:
//! 1. **Failing wrappers** - precise error injection at specific call counts
//! 2. **Slow fakes** - overlapping refreshes under a paused clock
//! 3. **Recording fakes** - side effects that must happen even on failure
//!
//! # Running Chaos Tests
//! ```bash
//! cargo test --test chaos -- --nocapture
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use uuid::Uuid;

use reel_sync::edge::{CacheResource, EdgeCache};
use reel_sync::enrich::MetadataEnricher;
use reel_sync::remote::{tables, Filter, MemoryRemoteStore, Order, RemoteStore, Row};
use reel_sync::session::StaticSession;
use reel_sync::storage::{InMemoryLocalStore, LocalStore};
use reel_sync::{
    AggregationLayer, Collection, CollectionItem, CollectionWithItems, EdgeError, Movie, NewCollection,
    NewItem, Profile, RefreshOutcome, RefreshState, ReelSyncConfig, StorageError, SyncCoordinator,
    SyncError, UserStatistics,
};

// =============================================================================
// Failing Remote Wrapper - Precise Error Injection
// =============================================================================

/// Wraps a remote store and fails the Nth `update` call after arming.
struct FailingRemote {
    inner: MemoryRemoteStore,
    update_calls: AtomicU64,
    /// Absolute update call number to fail (0 = never)
    fail_update_at: AtomicU64,
}

impl FailingRemote {
    fn new() -> Self {
        Self {
            inner: MemoryRemoteStore::new(),
            update_calls: AtomicU64::new(0),
            fail_update_at: AtomicU64::new(0),
        }
    }

    /// Fail the `nth` update from now (1-indexed).
    fn fail_nth_update(&self, nth: u64) {
        let now = self.update_calls.load(Ordering::SeqCst);
        self.fail_update_at.store(now + nth, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteStore for FailingRemote {
    async fn select(&self, table: &str, filters: &[Filter], order: Option<&Order>) -> Result<Vec<Row>, SyncError> {
        self.inner.select(table, filters, order).await
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, SyncError> {
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> Result<u64, SyncError> {
        let call = self.update_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_update_at.load(Ordering::SeqCst) {
            return Err(SyncError::ServerError { status: 503, body: format!("injected on update #{call}") });
        }
        self.inner.update(table, patch, filters).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, SyncError> {
        self.inner.delete(table, filters).await
    }
}

// =============================================================================
// Gated Remote Wrapper - Holds a Collections Read Open
// =============================================================================

/// Once armed, the next collections `select` reads its rows and then waits
/// for `release` before returning them.
struct GatedRemote {
    inner: MemoryRemoteStore,
    armed: AtomicBool,
    parked: Notify,
    release: Notify,
    collection_selects: AtomicUsize,
}

impl GatedRemote {
    fn new() -> Self {
        Self {
            inner: MemoryRemoteStore::new(),
            armed: AtomicBool::new(false),
            parked: Notify::new(),
            release: Notify::new(),
            collection_selects: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RemoteStore for GatedRemote {
    async fn select(&self, table: &str, filters: &[Filter], order: Option<&Order>) -> Result<Vec<Row>, SyncError> {
        let rows = self.inner.select(table, filters, order).await?;
        if table == tables::COLLECTIONS {
            self.collection_selects.fetch_add(1, Ordering::SeqCst);
            if self.armed.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.release.notified().await;
            }
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, SyncError> {
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> Result<u64, SyncError> {
        self.inner.update(table, patch, filters).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, SyncError> {
        self.inner.delete(table, filters).await
    }
}

// =============================================================================
// Failing Local Wrapper
// =============================================================================

#[derive(Default)]
struct FailingLocal {
    inner: InMemoryLocalStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FailingLocal {
    fn check(&self, flag: &AtomicBool) -> Result<(), StorageError> {
        if flag.load(Ordering::SeqCst) {
            Err(StorageError::Backend("disk I/O error".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LocalStore for FailingLocal {
    async fn upsert_collection(&self, collection: &Collection) -> Result<(), StorageError> {
        self.check(&self.fail_writes)?;
        self.inner.upsert_collection(collection).await
    }
    async fn upsert_item(&self, item: &CollectionItem) -> Result<(), StorageError> {
        self.check(&self.fail_writes)?;
        self.inner.upsert_item(item).await
    }
    async fn fetch_collections(&self) -> Result<Vec<Collection>, StorageError> {
        self.check(&self.fail_reads)?;
        self.inner.fetch_collections().await
    }
    async fn fetch_items(&self) -> Result<Vec<CollectionItem>, StorageError> {
        self.check(&self.fail_reads)?;
        self.inner.fetch_items().await
    }
    async fn fetch_collection(&self, id: Uuid) -> Result<Option<Collection>, StorageError> {
        self.check(&self.fail_reads)?;
        self.inner.fetch_collection(id).await
    }
    async fn fetch_item(&self, id: i64) -> Result<Option<CollectionItem>, StorageError> {
        self.check(&self.fail_reads)?;
        self.inner.fetch_item(id).await
    }
    async fn delete_collection(&self, id: Uuid) -> Result<(), StorageError> {
        self.check(&self.fail_writes)?;
        self.inner.delete_collection(id).await
    }
    async fn delete_item(&self, id: i64) -> Result<(), StorageError> {
        self.check(&self.fail_writes)?;
        self.inner.delete_item(id).await
    }
    async fn delete_items_by_collection(&self, collection_id: Uuid) -> Result<u64, StorageError> {
        self.check(&self.fail_writes)?;
        self.inner.delete_items_by_collection(collection_id).await
    }
}

// =============================================================================
// Recording / Slow Edge Fakes
// =============================================================================

/// Records every invalidation; every read fails so callers fall back.
#[derive(Default)]
struct RecordingEdge {
    invalidated: Mutex<Vec<CacheResource>>,
}

#[async_trait]
impl EdgeCache for RecordingEdge {
    async fn movies(&self) -> Result<Vec<Movie>, EdgeError> {
        Err(EdgeError::Network("unused".into()))
    }
    async fn lists(&self, _user_id: Uuid) -> Result<Vec<CollectionWithItems>, EdgeError> {
        Err(EdgeError::Network("unused".into()))
    }
    async fn statistics(&self, _user_id: Uuid) -> Result<UserStatistics, EdgeError> {
        Err(EdgeError::Network("unused".into()))
    }
    async fn profile(&self, _user_id: Uuid) -> Result<Profile, EdgeError> {
        Err(EdgeError::Network("unused".into()))
    }
    async fn invalidate(&self, resource: &CacheResource) -> Result<(), EdgeError> {
        self.invalidated.lock().push(*resource);
        Err(EdgeError::Server { status: 500, body: "invalidation always fails here".into() })
    }
}

/// Serves movies after a per-call delay: the first call is slow, later ones fast.
struct SlowEdge {
    calls: AtomicUsize,
}

fn movie(id: i64) -> Movie {
    Movie {
        id,
        external_ref_id: id,
        title: format!("Movie {id}"),
        poster_ref: None,
        release_date: None,
        watched: false,
        added_at: None,
    }
}

#[async_trait]
impl EdgeCache for SlowEdge {
    async fn movies(&self) -> Result<Vec<Movie>, EdgeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(vec![movie(1), movie(2), movie(3)])
        } else {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(vec![movie(9)])
        }
    }
    async fn lists(&self, _user_id: Uuid) -> Result<Vec<CollectionWithItems>, EdgeError> {
        Err(EdgeError::Network("unused".into()))
    }
    async fn statistics(&self, _user_id: Uuid) -> Result<UserStatistics, EdgeError> {
        Err(EdgeError::Network("unused".into()))
    }
    async fn profile(&self, _user_id: Uuid) -> Result<Profile, EdgeError> {
        Err(EdgeError::Network("unused".into()))
    }
    async fn invalidate(&self, _resource: &CacheResource) -> Result<(), EdgeError> {
        Ok(())
    }
}

/// Serves an empty lists payload captured before the caller's writes; the
/// response is held until `release`.
#[derive(Default)]
struct StaleListsEdge {
    parked: Notify,
    release: Notify,
}

#[async_trait]
impl EdgeCache for StaleListsEdge {
    async fn movies(&self) -> Result<Vec<Movie>, EdgeError> {
        Err(EdgeError::Network("unused".into()))
    }
    async fn lists(&self, _user_id: Uuid) -> Result<Vec<CollectionWithItems>, EdgeError> {
        self.parked.notify_one();
        self.release.notified().await;
        Ok(vec![])
    }
    async fn statistics(&self, _user_id: Uuid) -> Result<UserStatistics, EdgeError> {
        Err(EdgeError::Network("unused".into()))
    }
    async fn profile(&self, _user_id: Uuid) -> Result<Profile, EdgeError> {
        Err(EdgeError::Network("unused".into()))
    }
    async fn invalidate(&self, _resource: &CacheResource) -> Result<(), EdgeError> {
        Ok(())
    }
}

struct BrokenEnricher;

#[async_trait]
impl MetadataEnricher for BrokenEnricher {
    async fn release_date(&self, _external_ref_id: i64) -> Result<Option<NaiveDate>, SyncError> {
        Err(SyncError::NetworkError("catalog unreachable".into()))
    }
}

struct FixedEnricher;

#[async_trait]
impl MetadataEnricher for FixedEnricher {
    async fn release_date(&self, _external_ref_id: i64) -> Result<Option<NaiveDate>, SyncError> {
        Ok(NaiveDate::from_ymd_opt(1949, 9, 1))
    }
}

async fn started(coordinator: SyncCoordinator) -> Arc<SyncCoordinator> {
    let coordinator = Arc::new(coordinator);
    coordinator.start().await.expect("start");
    coordinator
}

// =============================================================================
// Write-path chaos
// =============================================================================

#[tokio::test]
async fn chaos_reorder_partial_failure_reconciles_from_remote() {
    let user = Uuid::new_v4();
    let remote = Arc::new(FailingRemote::new());
    let coordinator = started(SyncCoordinator::new(
        Arc::new(InMemoryLocalStore::new()),
        remote.clone(),
        Arc::new(StaticSession::signed_in(user)),
    ))
    .await;

    let ranked = coordinator
        .create_collection(NewCollection { name: "Ranked".into(), ranked: true, ..Default::default() })
        .await
        .unwrap();
    let mut ids = Vec::new();
    for ext in 1..=3 {
        ids.push(coordinator.add_item(ranked.id, NewItem::new(ext, format!("F{ext}"))).await.unwrap().id);
    }

    remote.fail_nth_update(2);
    let reversed: Vec<i64> = ids.iter().rev().copied().collect();
    let result = coordinator.reorder_items(ranked.id, &reversed).await;
    assert!(matches!(result, Err(SyncError::ServerError { status: 503, .. })));

    // Local state mirrors whatever the remote store ended up with
    let remote_items = coordinator.fetch_remote_collections(user).await.unwrap()[0].items.clone().unwrap_or_default();
    let local: Vec<(i64, i32)> = coordinator.items(ranked.id).iter().map(|i| (i.id, i.sort_order)).collect();
    let mut expected: Vec<(i64, i32)> = remote_items.iter().map(|i| (i.id, i.sort_order)).collect();
    expected.sort_by_key(|(id, order)| (*order, *id));
    assert_eq!(local, expected);

    // Only the first update landed: the last item now also claims position 1
    let moved = remote_items.iter().find(|i| i.id == ids[2]).unwrap();
    assert_eq!(moved.sort_order, 1);
}

#[tokio::test]
async fn chaos_touch_failure_is_swallowed() {
    let remote = Arc::new(FailingRemote::new());
    let coordinator = started(SyncCoordinator::new(
        Arc::new(InMemoryLocalStore::new()),
        remote.clone(),
        Arc::new(StaticSession::signed_in(Uuid::new_v4())),
    ))
    .await;
    let list = coordinator.create_collection(NewCollection::named("Touchy")).await.unwrap();

    // The only update add_item issues is the parent touch
    remote.fail_nth_update(1);
    let item = coordinator.add_item(list.id, NewItem::new(1, "One")).await.unwrap();

    let parent = coordinator.collection(list.id).unwrap();
    assert_eq!(parent.item_count, 1);
    assert!(parent.updated_at >= item.added_at);
    assert!(parent.updated_at > list.updated_at);
}

#[tokio::test]
async fn chaos_invalidation_fires_even_when_write_fails() {
    let user = Uuid::new_v4();
    let remote = Arc::new(MemoryRemoteStore::new());
    let edge = Arc::new(RecordingEdge::default());
    let coordinator = started(
        SyncCoordinator::new(
            Arc::new(InMemoryLocalStore::new()),
            remote.clone(),
            Arc::new(StaticSession::signed_in(user)),
        )
        .with_edge_invalidation(edge.clone()),
    )
    .await;

    remote.set_offline(true);
    let result = coordinator.create_collection(NewCollection::named("Offline")).await;
    assert!(matches!(result, Err(SyncError::NetworkError(_))));

    tokio::time::timeout(Duration::from_secs(5), async {
        while edge.invalidated.lock().len() < 2 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("invalidations were issued");

    let mut seen = edge.invalidated.lock().clone();
    seen.sort_by_key(|r| r.name());
    assert_eq!(seen, vec![CacheResource::Lists(user), CacheResource::Statistics(user)]);
}

#[tokio::test]
async fn chaos_enrichment_failure_is_not_fatal() {
    let coordinator = started(
        SyncCoordinator::new(
            Arc::new(InMemoryLocalStore::new()),
            Arc::new(MemoryRemoteStore::new()),
            Arc::new(StaticSession::signed_in(Uuid::new_v4())),
        )
        .with_enricher(Arc::new(BrokenEnricher)),
    )
    .await;
    let list = coordinator.create_collection(NewCollection::named("Plain")).await.unwrap();
    let item = coordinator.add_item(list.id, NewItem::new(1, "Unknown")).await.unwrap();
    assert_eq!(item.release_date, None);
}

#[tokio::test]
async fn chaos_enrichment_fills_missing_release_date() {
    let coordinator = started(
        SyncCoordinator::new(
            Arc::new(InMemoryLocalStore::new()),
            Arc::new(MemoryRemoteStore::new()),
            Arc::new(StaticSession::signed_in(Uuid::new_v4())),
        )
        .with_enricher(Arc::new(FixedEnricher)),
    )
    .await;
    let list = coordinator.create_collection(NewCollection::named("Dated")).await.unwrap();
    let item = coordinator.add_item(list.id, NewItem::new(1, "The Third Man")).await.unwrap();
    assert_eq!(item.release_date, NaiveDate::from_ymd_opt(1949, 9, 1));
}

#[tokio::test]
async fn chaos_local_read_failure_aborts_start() {
    let local = Arc::new(FailingLocal::default());
    local.fail_reads.store(true, Ordering::SeqCst);
    let coordinator = SyncCoordinator::new(
        local,
        Arc::new(MemoryRemoteStore::new()),
        Arc::new(StaticSession::signed_in(Uuid::new_v4())),
    );
    let result = coordinator.start().await;
    assert!(matches!(result, Err(SyncError::LocalStorage(StorageError::Backend(_)))));
    assert!(!coordinator.is_ready());
}

#[tokio::test]
async fn chaos_local_write_failure_propagates() {
    let local = Arc::new(FailingLocal::default());
    let coordinator = started(SyncCoordinator::new(
        local.clone(),
        Arc::new(MemoryRemoteStore::new()),
        Arc::new(StaticSession::signed_in(Uuid::new_v4())),
    ))
    .await;

    local.fail_writes.store(true, Ordering::SeqCst);
    let result = coordinator.create_collection(NewCollection::named("Unsaved")).await;
    assert!(matches!(result, Err(SyncError::LocalStorage(_))));
    assert!(coordinator.collections().is_empty());
}

// =============================================================================
// Refresh chaos
// =============================================================================

#[tokio::test(start_paused = true)]
async fn chaos_superseded_refresh_applies_only_latest() {
    let coordinator = started(SyncCoordinator::new(
        Arc::new(InMemoryLocalStore::new()),
        Arc::new(MemoryRemoteStore::new()),
        Arc::new(StaticSession::signed_in(Uuid::new_v4())),
    ))
    .await;
    let edge = Arc::new(SlowEdge { calls: AtomicUsize::new(0) });
    let layer = Arc::new(AggregationLayer::new(coordinator, Some(edge as Arc<dyn EdgeCache>), &ReelSyncConfig::default()));

    let first = {
        let layer = layer.clone();
        tokio::spawn(async move { layer.refresh_synthetic().await })
    };
    while layer.refresh_state() == RefreshState::Idle {
        tokio::task::yield_now().await;
    }
    let second = layer.refresh_synthetic().await;
    let first = first.await.unwrap();

    assert_eq!(first, RefreshOutcome::Success);
    assert_eq!(second, RefreshOutcome::Success);
    let ids: Vec<i64> = layer.movies().iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![9]);
    assert_eq!(layer.collections()[0].item_count, 1);

    // The slow first fetch finishing later must not overwrite anything
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(layer.movies().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn chaos_shutdown_cancels_in_flight_refresh() {
    let coordinator = started(SyncCoordinator::new(
        Arc::new(InMemoryLocalStore::new()),
        Arc::new(MemoryRemoteStore::new()),
        Arc::new(StaticSession::signed_in(Uuid::new_v4())),
    ))
    .await;
    let edge = Arc::new(SlowEdge { calls: AtomicUsize::new(0) });
    let layer = Arc::new(AggregationLayer::new(coordinator, Some(edge as Arc<dyn EdgeCache>), &ReelSyncConfig::default()));

    let pending = {
        let layer = layer.clone();
        tokio::spawn(async move { layer.refresh_synthetic().await })
    };
    while layer.refresh_state() == RefreshState::Idle {
        tokio::task::yield_now().await;
    }
    layer.shutdown().await;

    assert_eq!(pending.await.unwrap(), RefreshOutcome::Cancelled);
    assert!(layer.movies().is_empty());
    assert!(layer.last_error().is_none());
}

// =============================================================================
// Refreshes racing writes
// =============================================================================

#[tokio::test]
async fn chaos_write_during_reconcile_fetch_survives() {
    let user = Uuid::new_v4();
    let remote = Arc::new(GatedRemote::new());
    let local = Arc::new(InMemoryLocalStore::new());
    let coordinator = started(SyncCoordinator::new(
        local.clone(),
        remote.clone(),
        Arc::new(StaticSession::signed_in(user)),
    ))
    .await;

    remote.armed.store(true, Ordering::SeqCst);
    let reconcile = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.reconcile().await }
    });
    remote.parked.notified().await;

    // Committed while the collections read is held open
    let fresh = coordinator.create_collection(NewCollection::named("Fresh")).await.unwrap();
    remote.release.notify_one();
    reconcile.await.unwrap().unwrap();

    let collections = coordinator.collections();
    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0].id, fresh.id);
    assert!(local.fetch_collection(fresh.id).await.unwrap().is_some());
    // start, the held read, and the refetch
    assert_eq!(remote.collection_selects.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn chaos_write_during_edge_lists_fetch_survives() {
    let user = Uuid::new_v4();
    let edge = Arc::new(StaleListsEdge::default());
    let local = Arc::new(InMemoryLocalStore::new());
    let coordinator = Arc::new(SyncCoordinator::new(
        local.clone(),
        Arc::new(MemoryRemoteStore::new()),
        Arc::new(StaticSession::signed_in(user)),
    ));
    let config = ReelSyncConfig::default();
    let layer = Arc::new(AggregationLayer::new(coordinator, Some(edge.clone() as Arc<dyn EdgeCache>), &config));
    let (_tx, rx) = watch::channel(config);
    layer.start(rx).await.unwrap();

    let load = tokio::spawn({
        let layer = Arc::clone(&layer);
        async move { layer.load_collections().await }
    });
    edge.parked.notified().await;

    let fresh = layer.coordinator().create_collection(NewCollection::named("Fresh")).await.unwrap();
    edge.release.notify_one();
    load.await.unwrap().unwrap();

    assert_eq!(layer.coordinator().collections().len(), 1);
    assert!(layer.collections().iter().any(|c| c.id == fresh.id));
    assert!(local.fetch_collection(fresh.id).await.unwrap().is_some());
    layer.shutdown().await;
}
