//! On-device tier.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Local Store                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  traits.rs   - LocalStore contract + StorageError            │
//! │  sqlite.rs   - durable SQLite backend (sqlx)                 │
//! │  memory.rs   - DashMap backend (no path configured / tests)  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Loaded fully into memory once at startup; after that it only mirrors
//! writes that the remote store has already accepted.

pub mod traits;
pub mod memory;
pub mod sqlite;

pub use traits::{LocalStore, StorageError};
pub use memory::InMemoryLocalStore;
pub use sqlite::SqliteLocalStore;
