//! # Reel Sync
//!
//! Tiered, offline-capable sync core for user-curated movie collections.
//!
//! ## Architecture
//!
//! Reads fan out through three tiers; writes go through the authoritative
//! tier first:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Aggregation Layer                        │
//! │  • Synthetic "Watchlist" + real collections, one list      │
//! │  • Single-flight refresh, periodic background ticks        │
//! └─────────────────────────────────────────────────────────────┘
//!            │ reads                          │ reads / writes
//!            ▼                                ▼
//! ┌───────────────────────────┐   ┌─────────────────────────────┐
//! │        Edge Cache         │   │       Sync Coordinator      │
//! │  • HTTP read-through      │   │  • Write-through, ordered   │
//! │  • Classified failures    │   │  • Canonical snapshot       │
//! │  • Invalidation on write  │   │  • Reconcile on start       │
//! └───────────────────────────┘   └─────────────────────────────┘
//!            │ fallback                   │               │
//!            ▼                            ▼               ▼
//! ┌─────────────────────────────────────────────┐ ┌───────────────┐
//! │                Remote Store                 │ │  Local Store  │
//! │  • Authoritative rows (REST or in-memory)   │ │  • SQLite     │
//! └─────────────────────────────────────────────┘ └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reel_sync::{AggregationLayer, ReelSyncConfig};
//! use reel_sync::model::{NewCollection, NewItem};
//! use reel_sync::session::StaticSession;
//! use tokio::sync::watch;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ReelSyncConfig {
//!         remote_url: "https://db.example.test".into(),
//!         edge_url: Some("https://edge.example.test".into()),
//!         local_db_path: Some("reel.db".into()),
//!         ..Default::default()
//!     };
//!     let session = Arc::new(StaticSession::signed_in(Uuid::new_v4()));
//!
//!     let layer = AggregationLayer::from_config(&config, session).await.expect("config");
//!     let (_tx, rx) = watch::channel(config);
//!     layer.start(rx).await.expect("start");
//!
//!     let noir = layer
//!         .coordinator()
//!         .create_collection(NewCollection::named("Noir"))
//!         .await
//!         .expect("create");
//!     layer
//!         .coordinator()
//!         .add_item(noir.id, NewItem::new(42, "The Third Man"))
//!         .await
//!         .expect("add");
//!
//!     for collection in layer.collections() {
//!         println!("{} ({} items)", collection.name, collection.item_count);
//!     }
//!
//!     layer.shutdown().await;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`SyncCoordinator`], owner of canonical collections
//! - [`aggregate`]: The [`AggregationLayer`] and its refresh machinery
//! - [`edge`]: Edge cache client, response classification, diagnostics
//! - [`remote`]: Remote row store (REST binding and in-memory double)
//! - [`storage`]: Local store (SQLite and in-memory)
//! - [`model`]: Collections, items, movies, statistics, profile

pub mod config;
pub mod error;
pub mod timestamp;
pub mod model;
pub mod session;
pub mod enrich;
pub mod storage;
pub mod remote;
pub mod edge;
pub mod coordinator;
pub mod aggregate;
pub mod metrics;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use config::ReelSyncConfig;
pub use coordinator::{SyncCoordinator, CoordinatorState, CollectionsSnapshot};
pub use aggregate::{AggregationLayer, RefreshOutcome, RefreshState};
pub use error::{SyncError, EdgeError, StorageError};
pub use model::{
    Collection, CollectionItem, CollectionPatch, CollectionWithItems, Movie, NewCollection, NewItem,
    Profile, UserStatistics, SYNTHETIC_COLLECTION_ID,
};
pub use metrics::LatencyTimer;
