use crate::catalog::repo::*;
use crate::catalog::sync::diff::CatalogDiff;
use diesel::prelude::*;

/// Apply the diff inside the current transaction.
/// Note: mappings are deleted before entities; entities in use stay protected by RESTRICT.
pub fn apply_diff(conn: &mut SqliteConnection, diff: &CatalogDiff) -> anyhow::Result<()> {
    for ((kind, code), (name, definition)) in &diff.entities_upsert {
        upsert_entity(conn, kind, code, name, definition.as_deref())?;
    }
    for ((ns, source, canonical), relation) in &diff.mappings_upsert {
        upsert_mapping(conn, ns, source, canonical, relation.as_deref())?;
    }

    for (ns, source, canonical) in &diff.mappings_delete {
        delete_mapping(conn, ns, source, canonical)?;
    }
    for (kind, code) in &diff.entities_delete {
        delete_entity(conn, kind, code)?;
    }

    Ok(())
}
