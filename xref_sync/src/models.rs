//! Diesel models mapping to the database schema.
//!
//! These types mirror the tables defined in the embedded migrations and in
//! [`crate::schema`] for use with Diesel’s Queryable/Insertable APIs:
//! - [`crate::schema::entity`]: canonical entities keyed by `(kind, code)`
//! - [`crate::schema::xref_mapping`]: alternate-namespace to canonical code facts
//! - [`crate::schema::association`]: persisted, fully resolved association edges
//! - [`crate::schema::load_run`]: audit trail of loader runs
//!
//! See migrations for constraints (unique association key, composite
//! `ON DELETE RESTRICT` foreign keys into `entity`).

use diesel::prelude::*;

use crate::schema::*;

/// A row in [`crate::schema::entity`]: one canonical disease, phenotype term, etc.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable)]
#[diesel(table_name = entity, check_for_backend(diesel::sqlite::Sqlite))]
pub struct Entity {
    /// Entity kind (e.g., "disease", "phenotype").
    pub kind: String,
    /// Canonical code without namespace prefix (e.g., "558").
    pub code: String,
    /// Display name.
    pub name: String,
    /// Optional free-text definition.
    pub definition: Option<String>,
}

/// Insertable form of [`Entity`], used by catalog sync upserts.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = entity)]
pub struct NewEntity<'a> {
    /// Entity kind.
    pub kind: &'a str,
    /// Canonical code.
    pub code: &'a str,
    /// Display name.
    pub name: &'a str,
    /// Optional definition.
    pub definition: Option<&'a str>,
}

/// A row in [`crate::schema::xref_mapping`].
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = xref_mapping, check_for_backend(diesel::sqlite::Sqlite))]
pub struct XrefMappingRow {
    /// Database primary key (rowid).
    pub id: Option<i32>,
    /// Alternate namespace prefix, uppercase (e.g., "OMIM").
    pub source_namespace: String,
    /// Code within the alternate namespace, prefix stripped.
    pub source_code: String,
    /// Canonical code the source code is equivalent to.
    pub canonical_code: String,
    /// Optional mapping relation / confidence tag (e.g., "E", "NTBT").
    pub relation: Option<String>,
}

/// Insertable form of [`XrefMappingRow`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = xref_mapping)]
pub struct NewXrefMapping<'a> {
    /// Alternate namespace prefix.
    pub source_namespace: &'a str,
    /// Code within the alternate namespace.
    pub source_code: &'a str,
    /// Canonical target code.
    pub canonical_code: &'a str,
    /// Optional relation tag.
    pub relation: Option<&'a str>,
}

/// A row in [`crate::schema::association`].
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = association, check_for_backend(diesel::sqlite::Sqlite))]
pub struct AssociationRow {
    /// Database primary key (rowid).
    pub id: Option<i32>,
    /// Left entity kind.
    pub left_kind: String,
    /// Left entity canonical code.
    pub left_code: String,
    /// Right entity kind.
    pub right_kind: String,
    /// Right entity canonical code.
    pub right_code: String,
    /// Edge kind; part of the idempotency key.
    pub edge_kind: String,
    /// Free-text evidence string from the source.
    pub evidence: Option<String>,
    /// Qualifier / frequency string from the source.
    pub frequency: Option<String>,
    /// How the left identifier was resolved ("canonical-direct" | "alternate-mapped").
    pub left_provenance: String,
    /// How the right identifier was resolved.
    pub right_provenance: String,
    /// Insertion timestamp in RFC3339 UTC (set by the database).
    pub loaded_at: String,
}

/// Insertable form of [`AssociationRow`]. `loaded_at` is filled by the column default.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = association)]
pub struct NewAssociationRow<'a> {
    /// Left entity kind.
    pub left_kind: &'a str,
    /// Left entity canonical code.
    pub left_code: &'a str,
    /// Right entity kind.
    pub right_kind: &'a str,
    /// Right entity canonical code.
    pub right_code: &'a str,
    /// Edge kind.
    pub edge_kind: &'a str,
    /// Evidence string.
    pub evidence: Option<&'a str>,
    /// Frequency / qualifier string.
    pub frequency: Option<&'a str>,
    /// Left provenance tag.
    pub left_provenance: &'a str,
    /// Right provenance tag.
    pub right_provenance: &'a str,
}

/// Insertable form of a [`crate::schema::load_run`] audit row.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = load_run)]
pub struct NewLoadRun<'a> {
    /// Edge kind the run loaded.
    pub edge_kind: &'a str,
    /// "completed" | "cancelled" | "failed".
    pub status: &'a str,
    /// Whether the run was a dry run (nothing written to `association`).
    pub dry_run: bool,
    /// Run start (RFC3339 UTC).
    pub started_at: &'a str,
    /// Run end (RFC3339 UTC), if the run reached a terminal state.
    pub finished_at: Option<&'a str>,
    /// Source rows seen.
    pub total_rows: i64,
    /// Rows newly inserted.
    pub inserted: i64,
    /// Resolved rows skipped because their key already existed.
    pub skipped: i64,
    /// Rows dropped as unresolved.
    pub dropped: i64,
    /// Full reconciliation report as JSON.
    pub report_json: &'a str,
}
