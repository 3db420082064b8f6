//! Edge cache tier.
//!
//! ```text
//! ┌──────────────┐  GET /movies, /lists/{u}, ...  ┌───────────┐
//! │ HttpEdgeCache│ ─────────────────────────────▶ │   edge    │
//! └──────┬───────┘                                └───────────┘
//!        │ status + body
//!        ▼
//! ┌──────────────┐   markup → Malformed
//! │   classify   │   !2xx   → Server
//! │              │   shape  → Decode
//! └──────────────┘
//! ```
//!
//! Invalidation: `DELETE /cache/*/<pattern>*`.

pub mod classify;
pub mod client;
pub mod diagnostics;

pub use client::{CacheResource, EdgeCache, EdgeResponse, HttpEdgeCache};
pub use diagnostics::{DiagnosticsReport, ResourceTiming};
