//! Domain types that flow through every tier.
//!
//! Field names double as wire/column names: the remote store, the edge cache
//! and the local store all speak the same snake_case shape.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed id of the synthetic (computed, never persisted) collection.
pub const SYNTHETIC_COLLECTION_ID: Uuid = Uuid::from_u128(0x5eed_0000_0000_4000_8000_0000_0000_0001);

/// A user-owned, named, ordered set of items.
///
/// # Example
///
/// ```
/// use reel_sync::model::Collection;
/// use uuid::Uuid;
///
/// let owner = Uuid::new_v4();
/// let c = Collection::new(owner, "Favorites", None, false);
/// assert_eq!(c.item_count, 0);
/// assert!(!c.pinned);
/// assert_eq!(c.created_at, c.updated_at);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(with = "crate::timestamp::iso")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::timestamp::iso")]
    pub updated_at: DateTime<Utc>,
    /// Derived from the items actually present; not stored remotely.
    #[serde(default)]
    pub item_count: usize,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub ranked: bool,
}

impl Collection {
    /// Build a fresh collection stamped with the current time.
    pub fn new(owner_id: Uuid, name: impl Into<String>, description: Option<String>, ranked: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            description,
            created_at: now,
            updated_at: now,
            item_count: 0,
            pinned: false,
            ranked,
        }
    }

    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.id == SYNTHETIC_COLLECTION_ID
    }
}

/// One entry in a collection, referencing an external catalog id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub id: i64,
    pub collection_id: Uuid,
    pub external_ref_id: i64,
    pub title: String,
    #[serde(default)]
    pub poster_ref: Option<String>,
    #[serde(default)]
    pub backdrop_ref: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    #[serde(with = "crate::timestamp::iso")]
    pub added_at: DateTime<Utc>,
    pub sort_order: i32,
}

/// Input for creating a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewCollection {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ranked: bool,
    #[serde(default)]
    pub pinned: bool,
}

impl NewCollection {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Input for adding an item. Id, collection and sort order are assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewItem {
    pub external_ref_id: i64,
    pub title: String,
    #[serde(default)]
    pub poster_ref: Option<String>,
    #[serde(default)]
    pub backdrop_ref: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
}

impl NewItem {
    pub fn new(external_ref_id: i64, title: impl Into<String>) -> Self {
        Self {
            external_ref_id,
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Partial update of a collection's user-editable fields.
///
/// `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub pinned: Option<bool>,
    pub ranked: Option<bool>,
}

impl CollectionPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.pinned.is_none() && self.ranked.is_none()
    }

    /// Apply to a collection in place (does not touch `updated_at`).
    pub fn apply_to(&self, collection: &mut Collection) {
        if let Some(name) = &self.name {
            collection.name = name.clone();
        }
        if let Some(description) = &self.description {
            collection.description = description.clone();
        }
        if let Some(pinned) = self.pinned {
            collection.pinned = pinned;
        }
        if let Some(ranked) = self.ranked {
            collection.ranked = ranked;
        }
    }
}

/// A collection together with its items, as served by the lists endpoint.
///
/// `items` is `None` when the payload omitted them, which is not the same
/// as an empty collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionWithItems {
    #[serde(flatten)]
    pub collection: Collection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<CollectionItem>>,
}

/// Entry of the synthetic collection's backing source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: i64,
    pub external_ref_id: i64,
    pub title: String,
    #[serde(default)]
    pub poster_ref: Option<String>,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub watched: bool,
    #[serde(default, with = "crate::timestamp::iso_option")]
    pub added_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatistics {
    #[serde(default)]
    pub total_movies: u64,
    #[serde(default)]
    pub watched_movies: u64,
    #[serde(default)]
    pub total_collections: u64,
    #[serde(default)]
    pub total_collection_items: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_ref: Option<String>,
}
