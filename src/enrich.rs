//! Metadata enrichment seam.
//!
//! Consulted once per item insert. Failures are never fatal: the caller
//! logs and proceeds without enrichment.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::SyncError;

#[async_trait]
pub trait MetadataEnricher: Send + Sync {
    /// Canonical release date for an external catalog id.
    async fn release_date(&self, external_ref_id: i64) -> Result<Option<NaiveDate>, SyncError>;
}

/// Enricher that never adds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEnrichment;

#[async_trait]
impl MetadataEnricher for NoEnrichment {
    async fn release_date(&self, _external_ref_id: i64) -> Result<Option<NaiveDate>, SyncError> {
        Ok(None)
    }
}
