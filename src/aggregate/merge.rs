//! Merge of real collections with the synthetic one.

use uuid::Uuid;

use crate::model::{Collection, Movie, SYNTHETIC_COLLECTION_ID};
use crate::storage::memory::sort_collections;

/// Build the synthetic collection from its backing items.
///
/// It is pinned and stamped with the newest timestamp among its items and
/// every real collection, so index 0 also satisfies the pinned-first,
/// newest-first ordering.
#[must_use]
pub fn synthetic_collection(owner: Option<Uuid>, name: &str, movies: &[Movie], real: &[Collection]) -> Collection {
    let newest = movies
        .iter()
        .filter_map(|m| m.added_at)
        .chain(real.iter().map(|c| c.updated_at))
        .max()
        .unwrap_or_default();
    let oldest = movies.iter().filter_map(|m| m.added_at).min().unwrap_or(newest);

    Collection {
        id: SYNTHETIC_COLLECTION_ID,
        owner_id: owner.unwrap_or_else(Uuid::nil),
        name: name.to_string(),
        description: None,
        created_at: oldest,
        updated_at: newest,
        item_count: movies.len(),
        pinned: true,
        ranked: false,
    }
}

/// Aggregated sequence: real collections ordered pinned-first then
/// newest-first, with exactly one synthetic collection at index 0.
#[must_use]
pub fn merge_collections(real: &[Collection], movies: &[Movie], owner: Option<Uuid>, name: &str) -> Vec<Collection> {
    let mut merged: Vec<Collection> = real.iter().filter(|c| !c.is_synthetic()).cloned().collect();
    sort_collections(&mut merged);
    merged.insert(0, synthetic_collection(owner, name, movies, &merged));
    merged
}
