//! Authoritative tier.
//!
//! Every write lands here first. Rows are keyed by UUID (collections) or
//! 64-bit integer (items); timestamps travel as ISO-8601 strings.

pub mod traits;
pub mod codec;
pub mod memory;
pub mod rest;

pub use traits::{tables, Filter, Order, RemoteStore, Row};
pub use memory::MemoryRemoteStore;
pub use rest::RestRemoteStore;
