//! Row ⇄ model conversions for the remote store.
//!
//! Decoding goes through serde, so an unparseable timestamp (or any other
//! shape mismatch) becomes a `DecodeError` instead of a silently patched row.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::SyncError;
use crate::model::{Collection, CollectionItem, CollectionPatch, NewItem};
use crate::timestamp::format_timestamp;
use super::traits::Row;

pub fn decode_row<T: DeserializeOwned>(table: &str, row: Row) -> Result<T, SyncError> {
    serde_json::from_value(Value::Object(row))
        .map_err(|e| SyncError::DecodeError(format!("{table}: {e}")))
}

pub fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<Row>) -> Result<Vec<T>, SyncError> {
    rows.into_iter().map(|row| decode_row(table, row)).collect()
}

fn object(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

/// Insert payload for a collection. `item_count` is derived, never stored.
pub fn collection_row(c: &Collection) -> Row {
    object(json!({
        "id": c.id,
        "owner_id": c.owner_id,
        "name": c.name,
        "description": c.description,
        "created_at": format_timestamp(&c.created_at),
        "updated_at": format_timestamp(&c.updated_at),
        "pinned": c.pinned,
        "ranked": c.ranked,
    }))
}

/// Update payload for a collection patch, stamped with the new `updated_at`.
pub fn collection_patch_row(patch: &CollectionPatch, updated_at: &DateTime<Utc>) -> Row {
    let mut row = Row::new();
    if let Some(name) = &patch.name {
        row.insert("name".into(), json!(name));
    }
    if let Some(description) = &patch.description {
        row.insert("description".into(), json!(description));
    }
    if let Some(pinned) = patch.pinned {
        row.insert("pinned".into(), json!(pinned));
    }
    if let Some(ranked) = patch.ranked {
        row.insert("ranked".into(), json!(ranked));
    }
    row.insert("updated_at".into(), json!(format_timestamp(updated_at)));
    row
}

pub fn touch_row(updated_at: &DateTime<Utc>) -> Row {
    object(json!({ "updated_at": format_timestamp(updated_at) }))
}

/// Insert payload for a new item. The id is left for the server to assign.
pub fn new_item_row(
    collection_id: uuid::Uuid,
    item: &NewItem,
    sort_order: i32,
    added_at: &DateTime<Utc>,
) -> Row {
    object(json!({
        "collection_id": collection_id,
        "external_ref_id": item.external_ref_id,
        "title": item.title,
        "poster_ref": item.poster_ref,
        "backdrop_ref": item.backdrop_ref,
        "year": item.year,
        "release_date": item.release_date,
        "added_at": format_timestamp(added_at),
        "sort_order": sort_order,
    }))
}

pub fn sort_order_row(sort_order: i32) -> Row {
    object(json!({ "sort_order": sort_order }))
}

/// Full item row (used when re-seeding or echoing).
pub fn item_row(item: &CollectionItem) -> Row {
    object(serde_json::to_value(item).unwrap_or(Value::Null))
}
