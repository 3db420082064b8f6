// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Aggregation layer.
//!
//! Presents one list of collections (real + synthetic) and drives refresh:
//!
//! ```text
//!  ┌────────────┐  lists/movies/statistics/profile   ┌─────────────┐
//!  │ EdgeCache  │ ──────── any classified failure ──▶│ RemoteStore │
//!  └─────┬──────┘                                    └──────┬──────┘
//!        │ ok                                               │ via SyncCoordinator
//!        ▼                                                  ▼
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │ canonical collections ─┐                                     │
//!  │                        ├─▶ merge ─▶ [synthetic, real...]     │
//!  │ synthetic items ───────┘   (recomputed on either change)     │
//!  └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The synthetic items are refreshed single-flight (see [`single_flight`]);
//! a background task repeats the read chain on a timer.

mod background;
pub mod merge;
pub mod single_flight;

pub use merge::{merge_collections, synthetic_collection};
pub use single_flight::{RefreshOutcome, RefreshState, SingleFlight};

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ReelSyncConfig;
use crate::coordinator::SyncCoordinator;
use crate::edge::{CacheResource, DiagnosticsReport, EdgeCache, HttpEdgeCache};
use crate::error::{EdgeError, SyncError};
use crate::model::{Collection, CollectionWithItems, Movie, Profile, UserStatistics};
use crate::remote::RestRemoteStore;
use crate::session::SessionProvider;
use crate::storage::{InMemoryLocalStore, LocalStore, SqliteLocalStore};

fn log_fallback(resource: &'static str, err: &EdgeError) {
    warn!(resource, reason = err.reason(), error = %err, "edge read failed, falling back to remote");
    crate::metrics::record_edge_fallback(resource, err.reason());
}

/// Composes the coordinator's collections with the synthetic collection.
///
/// Construct with [`AggregationLayer::new`] (or [`AggregationLayer::from_config`]),
/// then call [`start`](AggregationLayer::start) from inside a Tokio runtime.
pub struct AggregationLayer {
    coordinator: Arc<SyncCoordinator>,
    edge: Option<Arc<dyn EdgeCache>>,
    synthetic_name: String,
    diagnostics_resources: Vec<String>,

    /// Backing items of the synthetic collection
    movies: watch::Sender<Arc<Vec<Movie>>>,

    /// Published aggregated view
    merged: watch::Sender<Arc<Vec<Collection>>>,

    /// Serializes recompute-and-publish
    merge_lock: Mutex<()>,

    refresh: SingleFlight,
    last_error: RwLock<Option<SyncError>>,

    /// Last good reads, served when every tier fails
    statistics: RwLock<Option<UserStatistics>>,
    profile: RwLock<Option<Profile>>,

    active: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AggregationLayer {
    pub fn new(coordinator: Arc<SyncCoordinator>, edge: Option<Arc<dyn EdgeCache>>, config: &ReelSyncConfig) -> Self {
        let initial = merge_collections(
            &coordinator.collections(),
            &[],
            coordinator.current_user_id(),
            &config.synthetic_collection_name,
        );
        let (movies, _) = watch::channel(Arc::new(Vec::new()));
        let (merged, _) = watch::channel(Arc::new(initial));
        let (active, _) = watch::channel(true);
        let (shutdown, _) = watch::channel(false);
        Self {
            coordinator,
            edge,
            synthetic_name: config.synthetic_collection_name.clone(),
            diagnostics_resources: config.diagnostics_resources.clone(),
            movies,
            merged,
            merge_lock: Mutex::new(()),
            refresh: SingleFlight::new(),
            last_error: RwLock::new(None),
            statistics: RwLock::new(None),
            profile: RwLock::new(None),
            active,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Wire every tier from configuration.
    ///
    /// SQLite when `local_db_path` is set, in-memory otherwise; the edge tier
    /// only when `edge_url` is set. Writes invalidate the same edge.
    pub async fn from_config(
        config: &ReelSyncConfig,
        session: Arc<dyn SessionProvider>,
    ) -> Result<Arc<Self>, SyncError> {
        let local: Arc<dyn LocalStore> = match &config.local_db_path {
            Some(path) => Arc::new(SqliteLocalStore::open(path).await?),
            None => Arc::new(InMemoryLocalStore::new()),
        };
        let remote = Arc::new(RestRemoteStore::new(&config.remote_url, config.remote_api_key.as_deref())?);
        let edge: Option<Arc<dyn EdgeCache>> = match &config.edge_url {
            Some(url) => Some(Arc::new(HttpEdgeCache::new(
                url,
                config.remote_api_key.as_deref(),
                &config.cache_hit_header,
            )?)),
            None => None,
        };

        let mut coordinator = SyncCoordinator::new(local, remote, session);
        if let Some(edge) = &edge {
            coordinator = coordinator.with_edge_invalidation(Arc::clone(edge));
        }
        info!(
            edge = config.edge_url.is_some(),
            sqlite = config.local_db_path.is_some(),
            "aggregation layer configured"
        );
        Ok(Arc::new(Self::new(Arc::new(coordinator), edge, config)))
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════════

    /// Start the coordinator, the merge task and the background timer.
    #[tracing::instrument(skip(self, config_rx))]
    pub async fn start(self: &Arc<Self>, config_rx: watch::Receiver<ReelSyncConfig>) -> Result<(), SyncError> {
        self.coordinator.start().await?;
        self.recompute();
        self.spawn_merge_task();
        self.start_background(config_rx);
        Ok(())
    }

    /// Spawn the periodic refresh task (replacing any previous one).
    pub fn start_background(self: &Arc<Self>, config_rx: watch::Receiver<ReelSyncConfig>) {
        let handle = background::spawn(
            Arc::downgrade(self),
            config_rx,
            self.active.subscribe(),
            self.shutdown.subscribe(),
        );
        self.tasks.lock().push(handle);
    }

    fn spawn_merge_task(self: &Arc<Self>) {
        let layer = Arc::downgrade(self);
        let mut snapshots = self.coordinator.subscribe();
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    _ = shutdown.changed() => break,
                    changed = snapshots.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        match layer.upgrade() {
                            Some(layer) => layer.recompute(),
                            None => break,
                        }
                    }
                }
            }
            debug!("merge task stopped");
        });
        self.tasks.lock().push(handle);
    }

    /// Pause (`false`) or resume (`true`) the background timer.
    pub fn set_active(&self, active: bool) {
        self.active.send_replace(active);
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Stop background work and cancel any in-flight refresh.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.refresh.cancel();
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        info!("aggregation layer shut down");
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Aggregated view
    // ═══════════════════════════════════════════════════════════════════════════

    /// Synthetic collection first, then real collections pinned-first,
    /// newest-first. Computed from the current sources.
    #[must_use]
    pub fn collections(&self) -> Vec<Collection> {
        merge_collections(
            &self.coordinator.collections(),
            &self.movies.borrow(),
            self.coordinator.current_user_id(),
            &self.synthetic_name,
        )
    }

    /// Watch the aggregated view.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Collection>>> {
        self.merged.subscribe()
    }

    /// Backing items of the synthetic collection.
    #[must_use]
    pub fn movies(&self) -> Arc<Vec<Movie>> {
        Arc::clone(&self.movies.borrow())
    }

    fn recompute(&self) {
        let _guard = self.merge_lock.lock();
        let merged = self.collections();
        crate::metrics::set_synthetic_items(merged.first().map_or(0, |c| c.item_count));
        self.merged.send_replace(Arc::new(merged));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Refresh
    // ═══════════════════════════════════════════════════════════════════════════

    #[must_use]
    pub fn refresh_state(&self) -> RefreshState {
        self.refresh.state()
    }

    #[must_use]
    pub fn refresh_state_receiver(&self) -> watch::Receiver<RefreshState> {
        self.refresh.state_receiver()
    }

    /// Error of the latest failed refresh, cleared by the next success.
    #[must_use]
    pub fn last_error(&self) -> Option<SyncError> {
        self.last_error.read().clone()
    }

    /// Refresh the synthetic collection's items (edge, then remote).
    ///
    /// Single-flight: a call while another is running supersedes it, and
    /// both callers observe the newest call's outcome.
    pub async fn refresh_synthetic(&self) -> RefreshOutcome {
        let start = Instant::now();
        let outcome = self
            .refresh
            .run(self.fetch_movies(), |movies| {
                debug!(movies = movies.len(), "synthetic items refreshed");
                self.movies.send_replace(Arc::new(movies));
                self.recompute();
            })
            .await;

        match &outcome {
            RefreshOutcome::Success => *self.last_error.write() = None,
            RefreshOutcome::Cancelled => debug!("synthetic refresh cancelled"),
            RefreshOutcome::Failure(e) => {
                warn!(error = %e, "synthetic refresh failed, keeping previous items");
                *self.last_error.write() = Some(e.clone());
            }
        }
        crate::metrics::record_refresh(outcome.label());
        crate::metrics::record_refresh_duration(start.elapsed());
        outcome
    }

    async fn fetch_movies(&self) -> Result<Vec<Movie>, SyncError> {
        if let Some(edge) = &self.edge {
            match edge.movies().await {
                Ok(movies) => return Ok(movies),
                Err(e) => log_fallback("movies", &e),
            }
        }
        self.coordinator.fetch_movies_remote().await
    }

    /// Refresh real collections (edge lists, then remote reconcile).
    ///
    /// On total failure canonical state is left as it was and the remote
    /// error is returned.
    pub async fn load_collections(&self) -> Result<(), SyncError> {
        let user_id = self
            .coordinator
            .current_user_id()
            .ok_or(SyncError::AuthenticationRequired)?;

        if let Some(edge) = &self.edge {
            let generation = self.coordinator.write_generation();
            match edge.lists(user_id).await {
                Ok(mut lists) => {
                    self.resolve_missing_items(&mut lists).await;
                    if self.coordinator.apply_remote_snapshot(lists, generation).await? {
                        return Ok(());
                    }
                    crate::metrics::record_snapshot_superseded("edge");
                    debug!("edge lists predate a local write, reconciling from remote");
                }
                Err(e) => log_fallback("lists", &e),
            }
        }
        self.coordinator.reconcile().await.inspect_err(|e| {
            warn!(error = %e, "collections unavailable from every tier, keeping current state");
        })
    }

    /// Lists served without items get theirs from the remote store. When that
    /// fails they stay `None` and keep the items already held.
    async fn resolve_missing_items(&self, lists: &mut [CollectionWithItems]) {
        for list in lists.iter_mut().filter(|l| l.items.is_none()) {
            match self.coordinator.fetch_remote_items(list.collection.id).await {
                Ok(items) => list.items = Some(items),
                Err(e) => warn!(
                    collection_id = %list.collection.id,
                    error = %e,
                    "items missing from edge lists and unavailable remotely, keeping cached items"
                ),
            }
        }
    }

    /// Statistics from the edge, then remote, then the last good value.
    pub async fn load_statistics(&self) -> Result<UserStatistics, SyncError> {
        let user_id = self
            .coordinator
            .current_user_id()
            .ok_or(SyncError::AuthenticationRequired)?;

        if let Some(edge) = &self.edge {
            match edge.statistics(user_id).await {
                Ok(stats) => {
                    *self.statistics.write() = Some(stats.clone());
                    return Ok(stats);
                }
                Err(e) => log_fallback("statistics", &e),
            }
        }
        match self.coordinator.fetch_statistics_remote().await {
            Ok(stats) => {
                *self.statistics.write() = Some(stats.clone());
                Ok(stats)
            }
            Err(e) => match self.statistics.read().clone() {
                Some(stale) => {
                    warn!(error = %e, "statistics unavailable, serving last known");
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }

    /// Profile from the edge, then remote, then the last good value.
    pub async fn load_profile(&self) -> Result<Profile, SyncError> {
        let user_id = self
            .coordinator
            .current_user_id()
            .ok_or(SyncError::AuthenticationRequired)?;

        if let Some(edge) = &self.edge {
            match edge.profile(user_id).await {
                Ok(profile) => {
                    *self.profile.write() = Some(profile.clone());
                    return Ok(profile);
                }
                Err(e) => log_fallback("profile", &e),
            }
        }
        match self.coordinator.fetch_profile_remote().await {
            Ok(profile) => {
                *self.profile.write() = Some(profile.clone());
                Ok(profile)
            }
            Err(e) => match self.profile.read().clone() {
                Some(stale) => {
                    warn!(error = %e, "profile unavailable, serving last known");
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }

    /// One background tick: synthetic items, then collections, then
    /// statistics, strictly in sequence. Skipped while signed out.
    pub async fn background_tick(&self) {
        if !self.coordinator.is_logged_in() {
            debug!("background tick skipped, no signed-in user");
            crate::metrics::record_background_tick("skipped_unauthenticated");
            return;
        }
        crate::metrics::record_background_tick("ran");

        self.refresh_synthetic().await;
        if let Err(e) = self.load_collections().await {
            debug!(error = %e, "background collections refresh failed");
        }
        if let Err(e) = self.load_statistics().await {
            debug!(error = %e, "background statistics refresh failed");
        }
    }

    /// Edge health and per-resource timings. `None` without an edge tier
    /// or without a signed-in user.
    pub async fn diagnostics(&self) -> Option<DiagnosticsReport> {
        let edge = self.edge.as_ref()?;
        let user_id = self.coordinator.current_user_id()?;
        let resources: Vec<_> = self
            .diagnostics_resources
            .iter()
            .filter_map(|name| CacheResource::from_name(name, user_id))
            .collect();
        edge.diagnostics(&resources).await
    }
}
