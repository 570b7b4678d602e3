//! Reference catalog: canonical entities and the cross-reference mapping table.
//!
//! The loader treats both tables as read-only. They are seeded and kept current by
//! [`sync::sync_catalog`], which normalizes incoming records ([`records`]), diffs them
//! against the database and applies the difference with idempotent upserts.

pub mod records;
pub mod repo;
pub mod sync;

pub use records::{CatalogMapping, EntityRecord, NormalizationReport};
