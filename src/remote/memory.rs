//! In-process remote store.
//!
//! Behaves like the real backend for the operations the sync core uses:
//! integer ids are assigned on insert when absent, ordering compares numbers
//! numerically and everything else as strings. Can be switched offline to
//! exercise failure paths.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::SyncError;
use super::traits::{Filter, Order, RemoteStore, Row};

pub struct MemoryRemoteStore {
    tables: DashMap<String, Vec<Row>>,
    next_id: AtomicI64,
    offline: AtomicBool,
}

impl MemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            next_id: AtomicI64::new(1),
            offline: AtomicBool::new(false),
        }
    }

    /// While offline every call fails with `NetworkError`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Snapshot of a table's rows, in insertion order.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.get(table).map(|t| t.value().clone()).unwrap_or_default()
    }

    /// Seed a row directly, bypassing the offline switch.
    pub fn seed(&self, table: &str, row: Row) {
        let row = self.assign_id(row);
        self.tables.entry(table.to_string()).or_default().push(row);
    }

    fn check_online(&self) -> Result<(), SyncError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(SyncError::NetworkError("remote store offline".into()))
        } else {
            Ok(())
        }
    }

    fn assign_id(&self, mut row: Row) -> Row {
        match row.get("id") {
            Some(Value::Number(n)) => {
                if let Some(id) = n.as_i64() {
                    self.next_id.fetch_max(id + 1, Ordering::SeqCst);
                }
            }
            Some(v) if !v.is_null() => {}
            _ => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                row.insert("id".into(), Value::from(id));
            }
        }
        row
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => CmpOrdering::Equal,
        (None | Some(Value::Null), _) => CmpOrdering::Less,
        (_, None | Some(Value::Null)) => CmpOrdering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|f| f.matches(row))
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn select(&self, table: &str, filters: &[Filter], order: Option<&Order>) -> Result<Vec<Row>, SyncError> {
        self.check_online()?;
        let mut rows: Vec<Row> = self
            .tables
            .get(table)
            .map(|t| t.iter().filter(|r| matches_all(r, filters)).cloned().collect())
            .unwrap_or_default();

        if let Some(order) = order {
            rows.sort_by(|a, b| {
                let ord = compare(a.get(&order.column), b.get(&order.column));
                if order.ascending { ord } else { ord.reverse() }
            });
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, SyncError> {
        self.check_online()?;
        let row = self.assign_id(row);
        self.tables.entry(table.to_string()).or_default().push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> Result<u64, SyncError> {
        self.check_online()?;
        let mut touched = 0;
        if let Some(mut rows) = self.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|r| matches_all(r, filters)) {
                for (k, v) in &patch {
                    row.insert(k.clone(), v.clone());
                }
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64, SyncError> {
        self.check_online()?;
        let mut removed = 0;
        if let Some(mut rows) = self.tables.get_mut(table) {
            let before = rows.len();
            rows.retain(|r| !matches_all(r, filters));
            removed = (before - rows.len()) as u64;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_ids() {
        let store = MemoryRemoteStore::new();
        let a = store.insert("t", row(json!({"name": "a"}))).await.unwrap();
        let b = store.insert("t", row(json!({"name": "b"}))).await.unwrap();
        assert_eq!(a["id"], json!(1));
        assert_eq!(b["id"], json!(2));
    }

    #[tokio::test]
    async fn test_explicit_ids_advance_counter() {
        let store = MemoryRemoteStore::new();
        store.insert("t", row(json!({"id": 40}))).await.unwrap();
        let next = store.insert("t", row(json!({}))).await.unwrap();
        assert_eq!(next["id"], json!(41));
    }

    #[tokio::test]
    async fn test_uuid_ids_are_kept() {
        let store = MemoryRemoteStore::new();
        let inserted = store.insert("t", row(json!({"id": "abc"}))).await.unwrap();
        assert_eq!(inserted["id"], json!("abc"));
    }

    #[tokio::test]
    async fn test_select_filters_and_orders() {
        let store = MemoryRemoteStore::new();
        for (owner, rank) in [("x", 3), ("y", 1), ("x", 1), ("x", 2)] {
            store.seed("t", row(json!({"owner": owner, "rank": rank})));
        }
        let rows = store
            .select("t", &[Filter::eq("owner", "x")], Some(&Order::asc("rank")))
            .await
            .unwrap();
        let ranks: Vec<i64> = rows.iter().map(|r| r["rank"].as_i64().unwrap()).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_update_and_delete_report_counts() {
        let store = MemoryRemoteStore::new();
        store.seed("t", row(json!({"group": 1, "v": "a"})));
        store.seed("t", row(json!({"group": 1, "v": "b"})));
        store.seed("t", row(json!({"group": 2, "v": "c"})));

        let touched = store
            .update("t", row(json!({"v": "z"})), &[Filter::eq("group", 1)])
            .await
            .unwrap();
        assert_eq!(touched, 2);

        let removed = store.delete("t", &[Filter::eq("group", 1)]).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.rows("t").len(), 1);
    }

    #[tokio::test]
    async fn test_offline_fails_every_call() {
        let store = MemoryRemoteStore::new();
        store.set_offline(true);
        let err = store.select("t", &[], None).await.unwrap_err();
        assert!(matches!(err, SyncError::NetworkError(_)));
        assert!(store.insert("t", Row::new()).await.is_err());

        store.set_offline(false);
        assert!(store.select("t", &[], None).await.unwrap().is_empty());
    }
}
