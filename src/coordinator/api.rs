//! Write-through API.
//!
//! Every method follows the same shape:
//! 1. validate against canonical state
//! 2. remote write (error ⇒ return, nothing else touched)
//! 3. local write
//! 4. publish the new canonical state
//!
//! and always ends with a fire-and-forget edge invalidation, whether the
//! write succeeded or not.

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SyncError;
use crate::model::{Collection, CollectionItem, CollectionPatch, NewCollection, NewItem};
use crate::remote::{codec, tables, Filter};

use super::SyncCoordinator;

fn id_filter(id: Uuid) -> [Filter; 1] {
    [Filter::eq("id", id.to_string())]
}

impl SyncCoordinator {
    // ═══════════════════════════════════════════════════════════════════════════
    // Collections
    // ═══════════════════════════════════════════════════════════════════════════

    /// Create a collection owned by the signed-in user.
    ///
    /// The new collection is inserted at the head of canonical state before
    /// ordering is re-applied, so an unpinned new collection lands first among
    /// the unpinned ones.
    #[tracing::instrument(skip(self, new), fields(name = %new.name))]
    pub async fn create_collection(&self, new: NewCollection) -> Result<Collection, SyncError> {
        let owner = self.require_user()?;
        let _guard = self.write_lock.lock().await;

        let result = async {
            let mut collection = Collection::new(owner, new.name, new.description, new.ranked);
            collection.pinned = new.pinned;

            let row = self
                .remote
                .insert(tables::COLLECTIONS, codec::collection_row(&collection))
                .await?;
            let stored: Collection = codec::decode_row(tables::COLLECTIONS, row)?;

            self.local.upsert_collection(&stored).await?;
            self.mutate(|snap| snap.collections.insert(0, stored.clone()));
            info!(collection_id = %stored.id, "collection created");
            Ok(stored)
        }
        .await;

        self.finish_write("create_collection", owner, result)
    }

    /// Apply a partial update. Bumps `updated_at`.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_collection(&self, id: Uuid, patch: CollectionPatch) -> Result<Collection, SyncError> {
        let owner = self.require_user()?;
        let _guard = self.write_lock.lock().await;
        let result = self.update_locked(id, patch).await;
        self.finish_write("update_collection", owner, result)
    }

    pub async fn rename_collection(&self, id: Uuid, name: impl Into<String>) -> Result<Collection, SyncError> {
        let patch = CollectionPatch { name: Some(name.into()), ..Default::default() };
        self.update_collection(id, patch).await
    }

    /// `None` clears the description.
    pub async fn describe_collection(&self, id: Uuid, description: Option<String>) -> Result<Collection, SyncError> {
        let patch = CollectionPatch { description: Some(description), ..Default::default() };
        self.update_collection(id, patch).await
    }

    pub async fn set_pinned(&self, id: Uuid, pinned: bool) -> Result<Collection, SyncError> {
        let patch = CollectionPatch { pinned: Some(pinned), ..Default::default() };
        self.update_collection(id, patch).await
    }

    pub async fn set_ranked(&self, id: Uuid, ranked: bool) -> Result<Collection, SyncError> {
        let patch = CollectionPatch { ranked: Some(ranked), ..Default::default() };
        self.update_collection(id, patch).await
    }

    pub async fn toggle_pinned(&self, id: Uuid) -> Result<Collection, SyncError> {
        self.toggle(id, "toggle_pinned", |c| CollectionPatch { pinned: Some(!c.pinned), ..Default::default() })
            .await
    }

    pub async fn toggle_ranked(&self, id: Uuid) -> Result<Collection, SyncError> {
        self.toggle(id, "toggle_ranked", |c| CollectionPatch { ranked: Some(!c.ranked), ..Default::default() })
            .await
    }

    async fn toggle(
        &self,
        id: Uuid,
        operation: &'static str,
        patch_for: impl FnOnce(&Collection) -> CollectionPatch,
    ) -> Result<Collection, SyncError> {
        let owner = self.require_user()?;
        let _guard = self.write_lock.lock().await;
        // Read under the write lock so two toggles can't both see the old value.
        let result = match self.collection(id) {
            Some(current) => self.update_locked(id, patch_for(&current)).await,
            None => Err(SyncError::CollectionNotFound(id)),
        };
        self.finish_write(operation, owner, result)
    }

    /// Caller holds `write_lock`.
    async fn update_locked(&self, id: Uuid, patch: CollectionPatch) -> Result<Collection, SyncError> {
        let mut updated = self.collection(id).ok_or(SyncError::CollectionNotFound(id))?;
        if patch.is_empty() {
            return Ok(updated);
        }

        let now = Utc::now();
        let touched = self
            .remote
            .update(tables::COLLECTIONS, codec::collection_patch_row(&patch, &now), &id_filter(id))
            .await?;
        if touched == 0 {
            return Err(SyncError::CollectionNotFound(id));
        }

        patch.apply_to(&mut updated);
        updated.updated_at = now;
        self.local.upsert_collection(&updated).await?;

        let published = updated.clone();
        self.mutate(|snap| {
            if let Some(slot) = snap.collection_mut(id) {
                *slot = published;
            }
        });
        debug!(collection_id = %id, "collection updated");
        Ok(updated)
    }

    /// Delete a collection and, in every tier, its items.
    #[tracing::instrument(skip(self))]
    pub async fn delete_collection(&self, id: Uuid) -> Result<(), SyncError> {
        let owner = self.require_user()?;
        let _guard = self.write_lock.lock().await;

        let result = async {
            if self.collection(id).is_none() {
                return Err(SyncError::CollectionNotFound(id));
            }

            let items_removed = self
                .remote
                .delete(tables::COLLECTION_ITEMS, &[Filter::eq("collection_id", id.to_string())])
                .await?;
            let removed = self.remote.delete(tables::COLLECTIONS, &id_filter(id)).await?;
            if removed == 0 {
                // Already gone remotely (another device); still drop it here.
                debug!(collection_id = %id, "collection absent remotely");
            }

            self.local.delete_items_by_collection(id).await?;
            self.local.delete_collection(id).await?;
            self.mutate(|snap| snap.remove_collection(id));
            info!(collection_id = %id, items_removed, "collection deleted");
            Ok(())
        }
        .await;

        self.finish_write("delete_collection", owner, result)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Items
    // ═══════════════════════════════════════════════════════════════════════════

    /// Append an item to a collection.
    ///
    /// Rejects with `DuplicateItem` when the external ref is already present.
    /// The release date is enriched when missing; enrichment failures are
    /// ignored. After the insert the parent's `updated_at` is bumped: a remote
    /// failure there is swallowed, the local bump always happens.
    #[tracing::instrument(skip(self, new), fields(external_ref_id = new.external_ref_id))]
    pub async fn add_item(&self, collection_id: Uuid, new: NewItem) -> Result<CollectionItem, SyncError> {
        let owner = self.require_user()?;
        let _guard = self.write_lock.lock().await;
        let result = self.add_item_locked(collection_id, new).await;
        self.finish_write("add_item", owner, result)
    }

    async fn add_item_locked(&self, collection_id: Uuid, mut new: NewItem) -> Result<CollectionItem, SyncError> {
        let (mut parent, sort_order) = {
            let snap = self.snapshot.borrow();
            let parent = snap
                .collection(collection_id)
                .cloned()
                .ok_or(SyncError::CollectionNotFound(collection_id))?;
            if snap.contains_external_ref(collection_id, new.external_ref_id) {
                return Err(SyncError::DuplicateItem {
                    collection_id,
                    external_ref_id: new.external_ref_id,
                });
            }
            (parent, snap.next_sort_order(collection_id))
        };

        if new.release_date.is_none() {
            match self.enricher.release_date(new.external_ref_id).await {
                Ok(date) => new.release_date = date,
                Err(e) => warn!(external_ref_id = new.external_ref_id, error = %e, "enrichment failed"),
            }
        }

        let now = Utc::now();
        let row = self
            .remote
            .insert(
                tables::COLLECTION_ITEMS,
                codec::new_item_row(collection_id, &new, sort_order, &now),
            )
            .await?;
        let item: CollectionItem = codec::decode_row(tables::COLLECTION_ITEMS, row)?;
        self.local.upsert_item(&item).await?;

        self.touch_remote(collection_id, now).await;
        parent.updated_at = now;
        parent.item_count += 1;
        self.local.upsert_collection(&parent).await?;

        let added = item.clone();
        self.mutate(|snap| {
            snap.items.entry(collection_id).or_default().push(added);
            if let Some(slot) = snap.collection_mut(collection_id) {
                slot.updated_at = now;
            }
        });
        info!(collection_id = %collection_id, item_id = item.id, sort_order, "item added");
        Ok(item)
    }

    /// Best-effort remote `updated_at` bump. Failures are logged and dropped.
    async fn touch_remote(&self, collection_id: Uuid, now: chrono::DateTime<Utc>) {
        if let Err(e) = self
            .remote
            .update(tables::COLLECTIONS, codec::touch_row(&now), &id_filter(collection_id))
            .await
        {
            warn!(collection_id = %collection_id, error = %e, "touch updated_at failed");
            crate::metrics::record_error("remote", "touch", e.kind());
        }
    }

    /// Remove one item by id.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, item_id: i64) -> Result<(), SyncError> {
        let owner = self.require_user()?;
        let _guard = self.write_lock.lock().await;

        let result = async {
            let item = self
                .snapshot
                .borrow()
                .item(item_id)
                .cloned()
                .ok_or(SyncError::ItemNotFound(item_id))?;

            self.remote
                .delete(tables::COLLECTION_ITEMS, &[Filter::eq("id", item_id)])
                .await?;
            self.local.delete_item(item_id).await?;

            if let Some(mut parent) = self.collection(item.collection_id) {
                parent.item_count = parent.item_count.saturating_sub(1);
                self.local.upsert_collection(&parent).await?;
            }
            self.mutate(|snap| {
                if let Some(items) = snap.items.get_mut(&item.collection_id) {
                    items.retain(|i| i.id != item_id);
                }
            });
            info!(collection_id = %item.collection_id, item_id, "item removed");
            Ok(())
        }
        .await;

        self.finish_write("remove_item", owner, result)
    }

    /// Renumber a collection's items to `1..N` in the given order.
    ///
    /// `ordered_ids` must list every item of the collection exactly once.
    /// One remote update is issued per item; there is no multi-row
    /// transaction. If an update fails partway, the collection's items are
    /// re-fetched from the remote store and installed locally before the
    /// original error is returned, so local state matches whatever the
    /// remote store ended up with.
    #[tracing::instrument(skip(self, ordered_ids), fields(items = ordered_ids.len()))]
    pub async fn reorder_items(&self, collection_id: Uuid, ordered_ids: &[i64]) -> Result<(), SyncError> {
        let owner = self.require_user()?;
        let _guard = self.write_lock.lock().await;
        let result = self.reorder_locked(collection_id, ordered_ids).await;
        self.finish_write("reorder_items", owner, result)
    }

    async fn reorder_locked(&self, collection_id: Uuid, ordered_ids: &[i64]) -> Result<(), SyncError> {
        if self.collection(collection_id).is_none() {
            return Err(SyncError::CollectionNotFound(collection_id));
        }
        let current = self.items(collection_id);
        let mut reordered = Vec::with_capacity(ordered_ids.len());
        for (position, id) in ordered_ids.iter().enumerate() {
            let mut item = current
                .iter()
                .find(|i| i.id == *id)
                .cloned()
                .ok_or(SyncError::ItemNotFound(*id))?;
            if reordered.iter().any(|i: &CollectionItem| i.id == *id) {
                return Err(SyncError::UnsupportedOperation(format!("item {id} listed twice in reorder")));
            }
            item.sort_order = position as i32 + 1;
            reordered.push(item);
        }
        if reordered.len() != current.len() {
            return Err(SyncError::UnsupportedOperation(format!(
                "reorder lists {} of {} items",
                reordered.len(),
                current.len()
            )));
        }

        for (done, item) in reordered.iter().enumerate() {
            let update = self
                .remote
                .update(
                    tables::COLLECTION_ITEMS,
                    codec::sort_order_row(item.sort_order),
                    &[Filter::eq("id", item.id)],
                )
                .await;
            if let Err(e) = update {
                warn!(
                    collection_id = %collection_id,
                    updated = done,
                    total = reordered.len(),
                    error = %e,
                    "reorder failed partway, reconciling from remote"
                );
                self.reconcile_items(collection_id).await;
                return Err(e);
            }
        }

        self.local.upsert_items(&reordered).await?;
        self.mutate(|snap| snap.replace_items(collection_id, reordered));
        debug!(collection_id = %collection_id, "items reordered");
        Ok(())
    }

    /// Re-fetch one collection's items and install them locally and in state.
    /// Caller holds `write_lock`. Failures are logged; state is left as is.
    async fn reconcile_items(&self, collection_id: Uuid) {
        let items = match self.fetch_remote_items(collection_id).await {
            Ok(items) => items,
            Err(e) => {
                warn!(collection_id = %collection_id, error = %e, "item reconcile fetch failed");
                return;
            }
        };
        let installed = async {
            self.local.delete_items_by_collection(collection_id).await?;
            self.local.upsert_items(&items).await
        }
        .await;
        if let Err(e) = installed {
            warn!(collection_id = %collection_id, error = %e, "item reconcile could not persist");
            return;
        }
        let count = items.len();
        self.mutate(|snap| snap.replace_items(collection_id, items));
        info!(collection_id = %collection_id, items = count, "items reconciled from remote");
    }
}
