use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::SyncError;

/// One row as the backend returns it.
pub type Row = Map<String, Value>;

/// Table names on the authoritative store.
pub mod tables {
    pub const COLLECTIONS: &str = "collections";
    pub const COLLECTION_ITEMS: &str = "collection_items";
    pub const MOVIES: &str = "movies";
    pub const STATISTICS: &str = "user_statistics";
    pub const PROFILES: &str = "profiles";
}

/// Equality filter on a column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// True if the row's column equals the filter value.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.column).unwrap_or(&Value::Null) == &self.value
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self { column: column.into(), ascending: true }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self { column: column.into(), ascending: false }
    }
}

/// Row-oriented authoritative store.
///
/// Source of truth for every write. Each call is a single request; there is
/// no retry and no multi-row transaction.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select(&self, table: &str, filters: &[Filter], order: Option<&Order>) -> Result<Vec<Row>, SyncError>;

    /// Insert a row and return it as stored (server-assigned ids filled in).
    async fn insert(&self, table: &str, row: Row) -> Result<Row, SyncError>;

    /// Merge `patch` into every row matching all filters. Returns rows touched.
    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> Result<u64, SyncError>;

    /// Delete every row matching all filters. Returns rows removed.
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, SyncError>;
}
