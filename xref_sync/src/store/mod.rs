//! Target store surface used by the loader.
//!
//! The loader never talks to a database directly: it receives a [`TargetStore`] for the
//! duration of one run. [`SqliteStore`] is the production implementation; tests plug in
//! in-memory or failing doubles.
//!
//! Contract:
//! - entities are read-only here (existence checks and a code snapshot per kind);
//! - `association` is append/skip-only: a batch inserts rows whose
//!   `(left, right, edge_kind)` key is new and silently skips the rest;
//! - a batch is atomic: it commits completely or not at all.

mod sqlite;

use std::{collections::HashSet, time::Duration};

use crate::{report::ReconciliationReport, resolver::Provenance};

pub use sqlite::SqliteStore;

/// Errors raised by a [`TargetStore`]. All of them are fatal to a load run.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database rejected a statement (constraint violation, busy, I/O, ...).
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// A batch took longer than the configured commit timeout and was rolled back.
    #[error("batch commit exceeded {limit_ms} ms (took {elapsed_ms} ms) and was rolled back")]
    CommitTimeout {
        /// Time spent before giving up.
        elapsed_ms: u64,
        /// Configured limit.
        limit_ms: u64,
    },

    /// The store cannot be reached at all.
    #[error("target store unavailable: {0}")]
    Unavailable(String),

    /// The run report could not be serialized for the audit table.
    #[error("failed to serialize run report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type used by [`TargetStore`] implementations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Natural key of a persisted association.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssociationKey {
    /// Left entity kind.
    pub left_kind: String,
    /// Left canonical code.
    pub left_code: String,
    /// Right entity kind.
    pub right_kind: String,
    /// Right canonical code.
    pub right_code: String,
    /// Edge kind.
    pub edge_kind: String,
}

/// A fully resolved association ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAssociation {
    /// Left entity kind.
    pub left_kind: String,
    /// Left canonical code.
    pub left_code: String,
    /// Right entity kind.
    pub right_kind: String,
    /// Right canonical code.
    pub right_code: String,
    /// Edge kind.
    pub edge_kind: String,
    /// Evidence string (blank in the source becomes `None`).
    pub evidence: Option<String>,
    /// Frequency / qualifier string.
    pub frequency: Option<String>,
    /// How the left identifier was resolved; never [`Provenance::Unresolved`].
    pub left_provenance: Provenance,
    /// How the right identifier was resolved; never [`Provenance::Unresolved`].
    pub right_provenance: Provenance,
}

impl NewAssociation {
    /// The idempotency key of this row.
    pub fn key(&self) -> AssociationKey {
        AssociationKey {
            left_kind: self.left_kind.clone(),
            left_code: self.left_code.clone(),
            right_kind: self.right_kind.clone(),
            right_code: self.right_code.clone(),
            edge_kind: self.edge_kind.clone(),
        }
    }
}

/// What one batch write did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rows whose key was new.
    pub inserted: u64,
    /// Rows whose key already existed (or repeated within the batch).
    pub skipped: u64,
}

/// Operations the reconciliation core needs from the target store.
pub trait TargetStore {
    /// Does entity `(kind, code)` exist?
    fn entity_exists(&mut self, kind: &str, code: &str) -> StoreResult<bool>;

    /// All canonical codes of `kind`; the resolver's existence snapshot.
    fn entity_codes(&mut self, kind: &str) -> StoreResult<HashSet<String>>;

    /// Insert `rows` atomically, skipping rows whose key exists. Must give up (and roll
    /// back) once `timeout` has elapsed.
    fn upsert_association_batch(
        &mut self,
        rows: &[NewAssociation],
        timeout: Duration,
    ) -> StoreResult<BatchOutcome>;

    /// Number of persisted associations of `edge_kind`.
    fn count_associations(&mut self, edge_kind: &str) -> StoreResult<u64>;

    /// Persist the final (or partial) report of a run. Stores without an audit trail
    /// may ignore it.
    fn record_run(&mut self, _report: &ReconciliationReport) -> StoreResult<()> {
        Ok(())
    }
}
