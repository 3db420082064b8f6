// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite backend for the on-device tier.
//!
//! Two tables mirror the domain types, each uniquely keyed by id:
//! ```sql
//! CREATE TABLE collections (
//!   id TEXT PRIMARY KEY,          -- UUID
//!   owner_id TEXT NOT NULL,
//!   name TEXT NOT NULL,
//!   description TEXT,
//!   created_at TEXT NOT NULL,     -- RFC 3339, millis, Z
//!   updated_at TEXT NOT NULL,
//!   item_count INTEGER NOT NULL,
//!   pinned INTEGER NOT NULL,
//!   ranked INTEGER NOT NULL
//! );
//! CREATE TABLE collection_items (
//!   id INTEGER PRIMARY KEY,
//!   collection_id TEXT NOT NULL,
//!   external_ref_id INTEGER NOT NULL,
//!   ...
//!   sort_order INTEGER NOT NULL
//! );
//! ```
//!
//! Timestamps are always written in the canonical wire form, so the text
//! columns sort chronologically and `ORDER BY updated_at` is correct.
//! Rows that fail to decode are reported as [`StorageError::Corruption`].

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow, SqliteSynchronous,
};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::model::{Collection, CollectionItem};
use crate::timestamp::{format_timestamp, parse_timestamp};
use super::traits::{LocalStore, StorageError};

const RELEASE_DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteLocalStore {
    pool: SqlitePool,
}

fn backend(context: &str) -> impl FnOnce(sqlx::Error) -> StorageError + '_ {
    move |e| StorageError::Backend(format!("{context}: {e}"))
}

impl SqliteLocalStore {
    /// Open (creating if missing) a database file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening local store");

        // WAL journal: readers never block the single writer.
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(backend("open"))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Private in-memory database (single connection so it is never dropped).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(backend("options"))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(backend("open"))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                item_count INTEGER NOT NULL DEFAULT 0,
                pinned INTEGER NOT NULL DEFAULT 0,
                ranked INTEGER NOT NULL DEFAULT 0
            )
            "#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_collections_id ON collections(id)",
            r#"
            CREATE TABLE IF NOT EXISTS collection_items (
                id INTEGER NOT NULL,
                collection_id TEXT NOT NULL,
                external_ref_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                poster_ref TEXT,
                backdrop_ref TEXT,
                year INTEGER,
                release_date TEXT,
                added_at TEXT NOT NULL,
                sort_order INTEGER NOT NULL
            )
            "#,
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_collection_items_id ON collection_items(id)",
            "CREATE INDEX IF NOT EXISTS idx_collection_items_fk ON collection_items(collection_id)",
        ];

        for sql in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(backend("init schema"))?;
        }
        debug!("Local store schema ready");
        Ok(())
    }

    fn decode_collection(row: &SqliteRow) -> Result<Collection, StorageError> {
        let id: String = row.try_get("id").map_err(backend("collections.id"))?;
        let corrupt = |detail: String| StorageError::Corruption { id: id.clone(), detail };

        let owner_id: String = row.try_get("owner_id").map_err(backend("collections.owner_id"))?;
        let created_at: String = row.try_get("created_at").map_err(backend("collections.created_at"))?;
        let updated_at: String = row.try_get("updated_at").map_err(backend("collections.updated_at"))?;
        let item_count: i64 = row.try_get("item_count").map_err(backend("collections.item_count"))?;

        Ok(Collection {
            id: Uuid::parse_str(&id).map_err(|e| corrupt(e.to_string()))?,
            owner_id: Uuid::parse_str(&owner_id).map_err(|e| corrupt(e.to_string()))?,
            name: row.try_get("name").map_err(backend("collections.name"))?,
            description: row.try_get("description").map_err(backend("collections.description"))?,
            created_at: parse_timestamp(&created_at).map_err(|e| corrupt(e.to_string()))?,
            updated_at: parse_timestamp(&updated_at).map_err(|e| corrupt(e.to_string()))?,
            item_count: usize::try_from(item_count).map_err(|e| corrupt(e.to_string()))?,
            pinned: row.try_get("pinned").map_err(backend("collections.pinned"))?,
            ranked: row.try_get("ranked").map_err(backend("collections.ranked"))?,
        })
    }

    fn decode_item(row: &SqliteRow) -> Result<CollectionItem, StorageError> {
        let id: i64 = row.try_get("id").map_err(backend("collection_items.id"))?;
        let corrupt = |detail: String| StorageError::Corruption { id: id.to_string(), detail };

        let collection_id: String = row
            .try_get("collection_id")
            .map_err(backend("collection_items.collection_id"))?;
        let added_at: String = row.try_get("added_at").map_err(backend("collection_items.added_at"))?;
        let release_date: Option<String> = row
            .try_get("release_date")
            .map_err(backend("collection_items.release_date"))?;
        let release_date = release_date
            .map(|raw| NaiveDate::parse_from_str(&raw, RELEASE_DATE_FORMAT))
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;

        Ok(CollectionItem {
            id,
            collection_id: Uuid::parse_str(&collection_id).map_err(|e| corrupt(e.to_string()))?,
            external_ref_id: row
                .try_get("external_ref_id")
                .map_err(backend("collection_items.external_ref_id"))?,
            title: row.try_get("title").map_err(backend("collection_items.title"))?,
            poster_ref: row.try_get("poster_ref").map_err(backend("collection_items.poster_ref"))?,
            backdrop_ref: row
                .try_get("backdrop_ref")
                .map_err(backend("collection_items.backdrop_ref"))?,
            year: row.try_get("year").map_err(backend("collection_items.year"))?,
            release_date,
            added_at: parse_timestamp(&added_at).map_err(|e| corrupt(e.to_string()))?,
            sort_order: row.try_get("sort_order").map_err(backend("collection_items.sort_order"))?,
        })
    }
}

const UPSERT_ITEM: &str = r#"
    INSERT INTO collection_items
        (id, collection_id, external_ref_id, title, poster_ref, backdrop_ref,
         year, release_date, added_at, sort_order)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        collection_id = excluded.collection_id,
        external_ref_id = excluded.external_ref_id,
        title = excluded.title,
        poster_ref = excluded.poster_ref,
        backdrop_ref = excluded.backdrop_ref,
        year = excluded.year,
        release_date = excluded.release_date,
        added_at = excluded.added_at,
        sort_order = excluded.sort_order
"#;

/// Item upsert with every column bound, ready to run on a pool or a transaction.
fn upsert_item_query(item: &CollectionItem) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    sqlx::query(UPSERT_ITEM)
        .bind(item.id)
        .bind(item.collection_id.to_string())
        .bind(item.external_ref_id)
        .bind(&item.title)
        .bind(&item.poster_ref)
        .bind(&item.backdrop_ref)
        .bind(item.year)
        .bind(item.release_date.map(|d| d.format(RELEASE_DATE_FORMAT).to_string()))
        .bind(format_timestamp(&item.added_at))
        .bind(item.sort_order)
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn upsert_collection(&self, c: &Collection) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO collections
                (id, owner_id, name, description, created_at, updated_at, item_count, pinned, ranked)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                name = excluded.name,
                description = excluded.description,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                item_count = excluded.item_count,
                pinned = excluded.pinned,
                ranked = excluded.ranked
            "#,
        )
        .bind(c.id.to_string())
        .bind(c.owner_id.to_string())
        .bind(&c.name)
        .bind(&c.description)
        .bind(format_timestamp(&c.created_at))
        .bind(format_timestamp(&c.updated_at))
        .bind(c.item_count as i64)
        .bind(c.pinned)
        .bind(c.ranked)
        .execute(&self.pool)
        .await
        .map_err(backend("upsert collection"))?;
        Ok(())
    }

    async fn upsert_item(&self, item: &CollectionItem) -> Result<(), StorageError> {
        upsert_item_query(item)
            .execute(&self.pool)
            .await
            .map_err(backend("upsert item"))?;
        Ok(())
    }

    async fn upsert_items(&self, items: &[CollectionItem]) -> Result<(), StorageError> {
        // One transaction so a reorder lands as a unit locally.
        let mut tx = self.pool.begin().await.map_err(backend("begin"))?;
        for item in items {
            upsert_item_query(item)
                .execute(&mut *tx)
                .await
                .map_err(backend("upsert items"))?;
        }
        tx.commit().await.map_err(backend("commit"))?;
        Ok(())
    }

    async fn fetch_collections(&self) -> Result<Vec<Collection>, StorageError> {
        let rows = sqlx::query("SELECT * FROM collections ORDER BY pinned DESC, updated_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(backend("fetch collections"))?;
        rows.iter().map(Self::decode_collection).collect()
    }

    async fn fetch_items(&self) -> Result<Vec<CollectionItem>, StorageError> {
        let rows = sqlx::query("SELECT * FROM collection_items ORDER BY collection_id, sort_order, id")
            .fetch_all(&self.pool)
            .await
            .map_err(backend("fetch items"))?;
        rows.iter().map(Self::decode_item).collect()
    }

    async fn fetch_collection(&self, id: Uuid) -> Result<Option<Collection>, StorageError> {
        let row = sqlx::query("SELECT * FROM collections WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend("fetch collection"))?;
        row.as_ref().map(Self::decode_collection).transpose()
    }

    async fn fetch_item(&self, id: i64) -> Result<Option<CollectionItem>, StorageError> {
        let row = sqlx::query("SELECT * FROM collection_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend("fetch item"))?;
        row.as_ref().map(Self::decode_item).transpose()
    }

    async fn delete_collection(&self, id: Uuid) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM collections WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend("delete collection"))?;
        Ok(())
    }

    async fn delete_item(&self, id: i64) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM collection_items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend("delete item"))?;
        Ok(())
    }

    async fn delete_items_by_collection(&self, collection_id: Uuid) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM collection_items WHERE collection_id = ?")
            .bind(collection_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend("delete items by collection"))?;
        Ok(result.rows_affected())
    }
}
