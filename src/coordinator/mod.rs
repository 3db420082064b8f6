// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync coordinator.
//!
//! The [`SyncCoordinator`] is the single owner of the canonical collection
//! state. It mediates every write with a write-through policy:
//!
//! ```text
//! write ──▶ RemoteStore ──ok──▶ LocalStore ──▶ canonical state ──▶ Ok
//!               │
//!              err ──▶ nothing touched, error returned
//! ```
//!
//! Writes are serialized through one async lock; reads go through the
//! published [`CollectionsSnapshot`] and never wait on I/O.
//!
//! # Lifecycle
//!
//! ```text
//! Created → LoadingLocal → Reconciling → Ready
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use reel_sync::{SyncCoordinator, CoordinatorState};
//! use reel_sync::remote::MemoryRemoteStore;
//! use reel_sync::session::StaticSession;
//! use reel_sync::storage::InMemoryLocalStore;
//! use uuid::Uuid;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let coordinator = SyncCoordinator::new(
//!     Arc::new(InMemoryLocalStore::new()),
//!     Arc::new(MemoryRemoteStore::new()),
//!     Arc::new(StaticSession::signed_in(Uuid::new_v4())),
//! );
//! assert_eq!(coordinator.state(), CoordinatorState::Created);
//!
//! coordinator.start().await.unwrap();
//! assert!(coordinator.is_ready());
//! assert!(coordinator.collections().is_empty());
//! # }
//! ```

mod types;
mod api;
mod lifecycle;
mod reads;

pub use types::{CoordinatorState, CollectionsSnapshot};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::edge::{CacheResource, EdgeCache};
use crate::enrich::{MetadataEnricher, NoEnrichment};
use crate::error::SyncError;
use crate::remote::RemoteStore;
use crate::session::SessionProvider;
use crate::storage::LocalStore;

/// Canonical owner of real collections and their items.
///
/// # Thread Safety
///
/// `Send + Sync`; share it behind an `Arc`. Mutations are serialized,
/// snapshot reads are lock-free clones of an `Arc`.
pub struct SyncCoordinator {
    /// On-device cache (fatal on failure)
    pub(super) local: Arc<dyn LocalStore>,

    /// Authoritative store (first stop for every write)
    pub(super) remote: Arc<dyn RemoteStore>,

    pub(super) session: Arc<dyn SessionProvider>,

    /// Consulted once per item insert; failures are ignored
    pub(super) enricher: Arc<dyn MetadataEnricher>,

    /// Edge cache to invalidate after structural writes (optional)
    pub(super) edge: Option<Arc<dyn EdgeCache>>,

    /// Lifecycle state (broadcast to watchers)
    pub(super) state: watch::Sender<CoordinatorState>,

    /// Published canonical state
    pub(super) snapshot: watch::Sender<Arc<CollectionsSnapshot>>,

    /// Serializes every mutation of canonical state
    pub(super) write_lock: Mutex<()>,

    /// Bumped by every write that changes canonical state; a remote snapshot
    /// fetched under an older generation is stale
    pub(super) write_generation: AtomicU64,
}

impl SyncCoordinator {
    /// Create a coordinator in `Created` state with an empty snapshot.
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        session: Arc<dyn SessionProvider>,
    ) -> Self {
        let (state, _) = watch::channel(CoordinatorState::Created);
        let (snapshot, _) = watch::channel(Arc::new(CollectionsSnapshot::default()));
        Self {
            local,
            remote,
            session,
            enricher: Arc::new(NoEnrichment),
            edge: None,
            state,
            snapshot,
            write_lock: Mutex::new(()),
            write_generation: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_enricher(mut self, enricher: Arc<dyn MetadataEnricher>) -> Self {
        self.enricher = enricher;
        self
    }

    /// Invalidate entries on this edge cache after every structural write.
    #[must_use]
    pub fn with_edge_invalidation(mut self, edge: Arc<dyn EdgeCache>) -> Self {
        self.edge = Some(edge);
        self
    }

    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<CoordinatorState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == CoordinatorState::Ready
    }

    pub(super) fn set_state(&self, state: CoordinatorState) {
        self.state.send_replace(state);
        crate::metrics::set_coordinator_state(&state.to_string());
        debug!(%state, "coordinator state");
    }

    /// Generation of canonical state as changed by writes.
    ///
    /// Capture it before fetching a full snapshot and hand it to
    /// [`Self::apply_remote_snapshot`].
    #[must_use]
    pub fn write_generation(&self) -> u64 {
        self.write_generation.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn current_user_id(&self) -> Option<Uuid> {
        self.session.current_user_id()
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.session.is_logged_in()
    }

    /// The signed-in user, or `AuthenticationRequired`.
    pub(super) fn require_user(&self) -> Result<Uuid, SyncError> {
        self.session.current_user_id().ok_or(SyncError::AuthenticationRequired)
    }

    /// Replace the published snapshot wholesale.
    pub(super) fn publish(&self, snapshot: CollectionsSnapshot) {
        crate::metrics::set_collection_count(snapshot.collections.len());
        crate::metrics::set_item_count(snapshot.total_items());
        self.snapshot.send_replace(Arc::new(snapshot));
    }

    /// Mutate a copy of the published snapshot, re-normalize, publish.
    ///
    /// Caller holds `write_lock`. Advances the write generation.
    pub(super) fn mutate(&self, f: impl FnOnce(&mut CollectionsSnapshot)) {
        let mut next = CollectionsSnapshot::clone(&self.snapshot.borrow());
        f(&mut next);
        next.normalize();
        self.write_generation.fetch_add(1, Ordering::AcqRel);
        self.publish(next);
    }

    /// Fire-and-forget invalidation of the lists/statistics entries a
    /// structural write makes stale.
    pub(super) fn invalidate_after_write(&self, owner: Uuid) {
        let Some(edge) = &self.edge else { return };
        for resource in CacheResource::after_collection_write(owner) {
            let edge = Arc::clone(edge);
            tokio::spawn(async move {
                match edge.invalidate(&resource).await {
                    Ok(()) => crate::metrics::record_invalidation(resource.name(), true),
                    Err(e) => {
                        warn!(resource = %resource, error = %e, "edge invalidation failed");
                        crate::metrics::record_invalidation(resource.name(), false);
                    }
                }
            });
        }
    }

    /// Invalidate, count and log the outcome of a write; pass the result on.
    pub(super) fn finish_write<T>(
        &self,
        operation: &'static str,
        owner: Uuid,
        result: Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        self.invalidate_after_write(owner);
        match &result {
            Ok(_) => crate::metrics::record_write(operation, "success"),
            Err(e) if e.is_validation() => {
                debug!(operation, error = %e, "write rejected");
                crate::metrics::record_write(operation, e.kind());
            }
            Err(e) => {
                warn!(operation, error = %e, "write failed");
                crate::metrics::record_write(operation, e.kind());
            }
        }
        result
    }
}
