//! Coordinator lifecycle: local load, remote reconciliation, wholesale replace.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::model::CollectionWithItems;

use super::{CollectionsSnapshot, CoordinatorState, SyncCoordinator};

/// Fetches attempted before a reconcile gives up on writes racing it.
const RECONCILE_ATTEMPTS: usize = 3;

impl SyncCoordinator {
    /// Start the coordinator.
    ///
    /// 1. Load the on-device snapshot into canonical state (no network).
    /// 2. Fetch the user's collections and items from the remote store.
    /// 3. Replace canonical state wholesale and persist it locally.
    ///
    /// A failure in step 2 keeps the local snapshot and is only logged.
    /// Local storage failures are returned.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<(), SyncError> {
        let startup_start = Instant::now();
        self.load_local().await?;

        self.set_state(CoordinatorState::Reconciling);
        if let Err(e) = self.reconcile_remote().await {
            match e {
                SyncError::LocalStorage(_) => return Err(e),
                other => warn!(error = %other, "reconcile failed, serving local snapshot"),
            }
        }

        self.set_state(CoordinatorState::Ready);
        crate::metrics::record_startup_phase("total", startup_start.elapsed());
        info!(
            collections = self.snapshot.borrow().collections.len(),
            "coordinator ready"
        );
        Ok(())
    }

    /// Load the local snapshot into canonical state.
    pub async fn load_local(&self) -> Result<(), SyncError> {
        let phase_start = Instant::now();
        self.set_state(CoordinatorState::LoadingLocal);

        let collections = self.local.fetch_collections().await?;
        let items = self.local.fetch_items().await?;
        let snapshot = CollectionsSnapshot::from_parts(collections, items);
        info!(
            collections = snapshot.collections.len(),
            items = snapshot.total_items(),
            "local snapshot loaded"
        );

        let _guard = self.write_lock.lock().await;
        self.publish(snapshot);
        crate::metrics::record_startup_phase("load_local", phase_start.elapsed());
        Ok(())
    }

    /// Refresh canonical state from the remote store.
    ///
    /// Leaves canonical state untouched on any remote failure. The lifecycle
    /// state reads `Reconciling` for the duration and is restored afterwards.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<(), SyncError> {
        let previous = self.state();
        self.set_state(CoordinatorState::Reconciling);
        let result = self.reconcile_remote().await;
        if self.state() == CoordinatorState::Reconciling {
            self.set_state(previous);
        }
        result
    }

    /// Fetch and apply a full remote snapshot, refetching while local writes
    /// keep landing during the fetch.
    async fn reconcile_remote(&self) -> Result<(), SyncError> {
        let phase_start = Instant::now();
        let result = async {
            let user_id = self.require_user()?;
            for attempt in 1..=RECONCILE_ATTEMPTS {
                let generation = self.write_generation();
                let lists = self.fetch_remote_collections(user_id).await?;
                if self.apply_remote_snapshot(lists, generation).await? {
                    return Ok(());
                }
                crate::metrics::record_snapshot_superseded("remote");
                debug!(attempt, "remote snapshot superseded by a local write, refetching");
            }
            warn!(attempts = RECONCILE_ATTEMPTS, "writes kept racing reconcile, keeping current state");
            Ok(())
        }
        .await;

        crate::metrics::record_reconcile(result.is_ok());
        crate::metrics::record_startup_phase("reconcile", phase_start.elapsed());
        result
    }

    /// Replace canonical state with a full remote result and persist it.
    ///
    /// `observed_generation` is [`Self::write_generation`] as read before the
    /// lists were fetched. If a write has changed canonical state since, the
    /// lists may predate it: nothing is applied and `Ok(false)` is returned.
    ///
    /// Local rows absent from the new state are deleted. A list without
    /// items keeps the items canonical state already holds for it.
    /// `item_count` is set from the items actually present.
    pub async fn apply_remote_snapshot(
        &self,
        mut lists: Vec<CollectionWithItems>,
        observed_generation: u64,
    ) -> Result<bool, SyncError> {
        let _guard = self.write_lock.lock().await;
        if self.write_generation() != observed_generation {
            return Ok(false);
        }

        {
            let current = self.snapshot.borrow();
            for list in &mut lists {
                if list.items.is_none() {
                    list.items = Some(current.items(list.collection.id).to_vec());
                }
            }
        }
        let snapshot = CollectionsSnapshot::from_lists(lists);

        let keep_collections: HashSet<_> = snapshot.collections.iter().map(|c| c.id).collect();
        let keep_items: HashSet<_> = snapshot.items.values().flatten().map(|i| i.id).collect();

        for stale in self.local.fetch_collections().await? {
            if !keep_collections.contains(&stale.id) {
                self.local.delete_items_by_collection(stale.id).await?;
                self.local.delete_collection(stale.id).await?;
            }
        }
        for stale in self.local.fetch_items().await? {
            if !keep_items.contains(&stale.id) {
                self.local.delete_item(stale.id).await?;
            }
        }

        for collection in &snapshot.collections {
            self.local.upsert_collection(collection).await?;
        }
        let items: Vec<_> = snapshot.items.values().flatten().cloned().collect();
        self.local.upsert_items(&items).await?;

        info!(
            collections = snapshot.collections.len(),
            items = items.len(),
            "canonical state replaced from remote"
        );
        self.publish(snapshot);
        Ok(true)
    }
}
