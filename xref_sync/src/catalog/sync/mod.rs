//! Catalog synchronization (entities and cross-reference mappings).
//!
//! ## What this does
//! - **Normalizes** incoming records (trim, case, prefix stripping, dedupe).
//! - Computes a **diff** between the records (desired) and the DB (current). Only new
//!   or changed rows are upserted, so a repeated sync is a no-op.
//! - Applies the diff with UPSERTs and optional **prune** deletes.
//!
//! ## Transactions & consistency
//! Read, diff and apply run inside a single **`BEGIN IMMEDIATE`** transaction via
//! `SqliteConnection::immediate_transaction`: the whole diff applies or none of it.
//!
//! ## Dry-run
//! With `SyncOptions::dry_run` the diff is returned and nothing is written.
//!
//! ## Prune
//! Mappings are deleted before entities. Entities still referenced by associations are
//! protected by `ON DELETE RESTRICT`; pruning one fails the sync and rolls it back.

mod apply;
mod diff;
mod read;
mod want;

use diesel::SqliteConnection;
use tracing::info;

pub use diff::CatalogDiff;

use crate::catalog::records::{
    EntityRecord, NormalizationReport, normalize_entities, normalize_mappings,
};
use crate::resolver::MappingRecord;

/// Options for catalog synchronization.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// If true, compute the diff only.
    pub dry_run: bool,
    /// If true, delete rows from the DB that are not present in the input.
    pub prune: bool,
}

/// Sync entities and mappings into SQLite and return what changed (or would change).
pub fn sync_catalog(
    conn: &mut SqliteConnection,
    mut entities: Vec<EntityRecord>,
    mappings: Vec<MappingRecord>,
    opt: SyncOptions,
) -> anyhow::Result<CatalogDiff> {
    let mut report = NormalizationReport::default();
    normalize_entities(&mut entities, &mut report)?;
    let mappings = normalize_mappings(mappings, &mut report)?;
    let wanted = want::wanted_from_records(&entities, &mappings);

    let diff = conn.immediate_transaction::<_, anyhow::Error, _>(|conn| {
        let current = read::read_current(conn)?;
        let diff = diff::make_diff(&wanted, &current, opt.prune);
        if !opt.dry_run && !diff.is_noop() {
            apply::apply_diff(conn, &diff)?;
        }
        Ok(diff)
    })?;

    info!(
        dry_run = opt.dry_run,
        prune = opt.prune,
        entities_upserted = diff.entities_upsert.len(),
        mappings_upserted = diff.mappings_upsert.len(),
        entities_deleted = diff.entities_delete.len(),
        mappings_deleted = diff.mappings_delete.len(),
        prefixes_stripped = report.prefixes_stripped,
        entities_deduped = report.entities_deduped,
        mappings_deduped = report.mappings_deduped,
        "catalog sync finished"
    );
    Ok(diff)
}
