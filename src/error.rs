// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error taxonomy shared by every tier.
//!
//! Errors fall into three propagation classes:
//!
//! - **Edge-recoverable** (`ServerError`, `MalformedPayload`, `DecodeError`,
//!   `NetworkError` on edge reads): always recovered by falling back to the
//!   remote store, logged, never surfaced.
//! - **Validation** (`DuplicateItem`, `ItemNotFound`, `CollectionNotFound`):
//!   caller-correctable, returned synchronously, never retried.
//! - **Fatal local** (`LocalStorage`): the on-device store is process-private,
//!   so a failure there is a programmer/environment error, not a transient one.

use thiserror::Error;
use uuid::Uuid;

pub use crate::storage::traits::StorageError;

/// Classified failure from an edge cache read.
///
/// Every variant maps onto a [`SyncError`] and every variant triggers the
/// remote fallback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EdgeError {
    #[error("edge returned HTTP {status}")]
    Server { status: u16, body: String },
    #[error("edge returned a markup page instead of data")]
    Malformed { body: String },
    #[error("edge payload did not match the expected shape: {0}")]
    Decode(String),
    #[error("edge unreachable: {0}")]
    Network(String),
}

impl EdgeError {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Server { .. } => "server_error",
            Self::Malformed { .. } => "malformed_payload",
            Self::Decode(_) => "decode_error",
            Self::Network(_) => "network_error",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("malformed payload (markup body)")]
    MalformedPayload { body: String },

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("item {external_ref_id} already exists in collection {collection_id}")]
    DuplicateItem {
        collection_id: Uuid,
        external_ref_id: i64,
    },

    #[error("item {0} not found")]
    ItemNotFound(i64),

    #[error("collection {0} not found")]
    CollectionNotFound(Uuid),

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("local storage failure: {0}")]
    LocalStorage(#[from] StorageError),

    /// A superseded single-flight operation. Not a failure.
    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// True for the error classes the edge fallback absorbs.
    #[must_use]
    pub fn is_edge_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ServerError { .. }
                | Self::MalformedPayload { .. }
                | Self::DecodeError(_)
                | Self::NetworkError(_)
        )
    }

    /// True for caller-correctable validation failures.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::DuplicateItem { .. } | Self::ItemNotFound(_) | Self::CollectionNotFound(_)
        )
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServerError { .. } => "server_error",
            Self::MalformedPayload { .. } => "malformed_payload",
            Self::DecodeError(_) => "decode_error",
            Self::NetworkError(_) => "network_error",
            Self::DuplicateItem { .. } => "duplicate_item",
            Self::ItemNotFound(_) => "item_not_found",
            Self::CollectionNotFound(_) => "collection_not_found",
            Self::AuthenticationRequired => "authentication_required",
            Self::UnsupportedOperation(_) => "unsupported_operation",
            Self::LocalStorage(_) => "local_storage",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<EdgeError> for SyncError {
    fn from(err: EdgeError) -> Self {
        match err {
            EdgeError::Server { status, body } => Self::ServerError { status, body },
            EdgeError::Malformed { body } => Self::MalformedPayload { body },
            EdgeError::Decode(detail) => Self::DecodeError(detail),
            EdgeError::Network(detail) => Self::NetworkError(detail),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::DecodeError(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::DecodeError(err.to_string())
        } else {
            Self::NetworkError(err.to_string())
        }
    }
}
