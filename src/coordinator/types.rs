//! Public types for the sync coordinator.

use std::collections::HashMap;

use uuid::Uuid;

use crate::model::{Collection, CollectionItem, CollectionWithItems};
use crate::storage::memory::sort_collections;

/// Coordinator lifecycle state.
///
/// Use [`super::SyncCoordinator::state()`] to check the current state or
/// [`super::SyncCoordinator::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Just created, nothing loaded
    Created,
    /// Reading the on-device snapshot
    LoadingLocal,
    /// Fetching the user's collections from the remote store
    Reconciling,
    /// Serving reads and writes
    Ready,
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::LoadingLocal => write!(f, "LoadingLocal"),
            Self::Reconciling => write!(f, "Reconciling"),
            Self::Ready => write!(f, "Ready"),
        }
    }
}

/// Immutable view of the canonical state, published after every change.
///
/// Collections are kept pinned-first then newest-first; each collection's
/// items are kept in `sort_order`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionsSnapshot {
    pub collections: Vec<Collection>,
    pub items: HashMap<Uuid, Vec<CollectionItem>>,
}

impl CollectionsSnapshot {
    /// Build from flat rows. `item_count` is recomputed from the items present.
    #[must_use]
    pub fn from_parts(collections: Vec<Collection>, items: Vec<CollectionItem>) -> Self {
        let mut grouped: HashMap<Uuid, Vec<CollectionItem>> = HashMap::new();
        for item in items {
            grouped.entry(item.collection_id).or_default().push(item);
        }
        // Orphans (items whose collection is gone) are dropped.
        grouped.retain(|id, _| collections.iter().any(|c| c.id == *id));

        let mut snapshot = Self { collections, items: grouped };
        snapshot.normalize();
        snapshot
    }

    /// Build from a lists payload (collection rows with embedded items).
    ///
    /// A list whose items are `None` contributes no items; callers resolve
    /// those before building.
    #[must_use]
    pub fn from_lists(lists: Vec<CollectionWithItems>) -> Self {
        let mut collections = Vec::with_capacity(lists.len());
        let mut items = Vec::new();
        for list in lists {
            // The synthetic collection is never persisted.
            if list.collection.is_synthetic() {
                continue;
            }
            collections.push(list.collection);
            items.extend(list.items.into_iter().flatten());
        }
        Self::from_parts(collections, items)
    }

    /// Re-sort and recount everything.
    pub fn normalize(&mut self) {
        for items in self.items.values_mut() {
            items.sort_by_key(|i| (i.sort_order, i.id));
        }
        for collection in &mut self.collections {
            collection.item_count = self.items.get(&collection.id).map_or(0, Vec::len);
        }
        sort_collections(&mut self.collections);
    }

    #[must_use]
    pub fn collection(&self, id: Uuid) -> Option<&Collection> {
        self.collections.iter().find(|c| c.id == id)
    }

    pub(super) fn collection_mut(&mut self, id: Uuid) -> Option<&mut Collection> {
        self.collections.iter_mut().find(|c| c.id == id)
    }

    /// Items of a collection in `sort_order`; empty for unknown ids.
    #[must_use]
    pub fn items(&self, collection_id: Uuid) -> &[CollectionItem] {
        self.items.get(&collection_id).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn item(&self, item_id: i64) -> Option<&CollectionItem> {
        self.items.values().flatten().find(|i| i.id == item_id)
    }

    #[must_use]
    pub fn contains_external_ref(&self, collection_id: Uuid, external_ref_id: i64) -> bool {
        self.items(collection_id)
            .iter()
            .any(|i| i.external_ref_id == external_ref_id)
    }

    /// Next `sort_order` for an append: `max + 1`, or 1 for an empty collection.
    #[must_use]
    pub fn next_sort_order(&self, collection_id: Uuid) -> i32 {
        self.items(collection_id)
            .iter()
            .map(|i| i.sort_order)
            .max()
            .map_or(1, |max| max + 1)
    }

    #[must_use]
    pub fn total_items(&self) -> usize {
        self.items.values().map(Vec::len).sum()
    }

    pub(super) fn remove_collection(&mut self, id: Uuid) {
        self.collections.retain(|c| c.id != id);
        self.items.remove(&id);
    }

    pub(super) fn replace_items(&mut self, collection_id: Uuid, items: Vec<CollectionItem>) {
        if items.is_empty() {
            self.items.remove(&collection_id);
        } else {
            self.items.insert(collection_id, items);
        }
    }
}
