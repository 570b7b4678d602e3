//! Diesel/SQLite implementation of [`TargetStore`].

use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use diesel::{dsl::exists, insert_into, prelude::*, select};
use tracing::debug;

use crate::{
    catalog::repo::load_mapping_records,
    db::connection::connect_sqlite_with_busy_timeout,
    models::{NewAssociationRow, NewLoadRun},
    report::ReconciliationReport,
    resolver::MappingRecord,
    schema::{association, entity, load_run},
};

use super::{BatchOutcome, NewAssociation, StoreError, StoreResult, TargetStore};

/// [`TargetStore`] backed by one SQLite connection. The connection is closed when the
/// store is dropped, whatever way the run ends.
pub struct SqliteStore {
    conn: SqliteConnection,
}

impl SqliteStore {
    /// Open `database_url` with the usual PRAGMAs and the given busy timeout.
    pub fn open(database_url: &str, busy_timeout_ms: u64) -> anyhow::Result<Self> {
        Ok(Self {
            conn: connect_sqlite_with_busy_timeout(database_url, busy_timeout_ms)?,
        })
    }

    /// Wrap an already configured connection.
    pub fn from_connection(conn: SqliteConnection) -> Self {
        Self { conn }
    }

    /// Borrow the underlying connection (catalog sync, ad-hoc queries).
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    /// The persisted cross-reference mapping table.
    pub fn mapping_records(&mut self) -> StoreResult<Vec<MappingRecord>> {
        Ok(load_mapping_records(&mut self.conn)?)
    }
}

fn as_row(a: &NewAssociation) -> NewAssociationRow<'_> {
    NewAssociationRow {
        left_kind: &a.left_kind,
        left_code: &a.left_code,
        right_kind: &a.right_kind,
        right_code: &a.right_code,
        edge_kind: &a.edge_kind,
        evidence: a.evidence.as_deref(),
        frequency: a.frequency.as_deref(),
        left_provenance: a.left_provenance.as_str(),
        right_provenance: a.right_provenance.as_str(),
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl TargetStore for SqliteStore {
    fn entity_exists(&mut self, kind: &str, code: &str) -> StoreResult<bool> {
        let found = select(exists(
            entity::table.filter(entity::kind.eq(kind).and(entity::code.eq(code))),
        ))
        .get_result::<bool>(&mut self.conn)?;
        Ok(found)
    }

    fn entity_codes(&mut self, kind: &str) -> StoreResult<HashSet<String>> {
        let codes = entity::table
            .filter(entity::kind.eq(kind))
            .select(entity::code)
            .load::<String>(&mut self.conn)?;
        Ok(codes.into_iter().collect())
    }

    fn upsert_association_batch(
        &mut self,
        rows: &[NewAssociation],
        timeout: Duration,
    ) -> StoreResult<BatchOutcome> {
        let started = Instant::now();

        // BEGIN IMMEDIATE: take the write lock up front; any error rolls the batch back.
        let inserted = self
            .conn
            .immediate_transaction::<_, StoreError, _>(|conn| {
                let mut inserted = 0u64;
                for row in rows {
                    let n = insert_into(association::table)
                        .values(&as_row(row))
                        .on_conflict((
                            association::left_kind,
                            association::left_code,
                            association::right_kind,
                            association::right_code,
                            association::edge_kind,
                        ))
                        .do_nothing()
                        .execute(conn)?;
                    inserted += n as u64;

                    let elapsed = started.elapsed();
                    if elapsed > timeout {
                        return Err(StoreError::CommitTimeout {
                            elapsed_ms: millis(elapsed),
                            limit_ms: millis(timeout),
                        });
                    }
                }
                Ok(inserted)
            })?;

        let outcome = BatchOutcome {
            inserted,
            skipped: rows.len() as u64 - inserted,
        };
        debug!(
            rows = rows.len(),
            inserted = outcome.inserted,
            skipped = outcome.skipped,
            elapsed_ms = millis(started.elapsed()),
            "association batch committed"
        );
        Ok(outcome)
    }

    fn count_associations(&mut self, edge_kind: &str) -> StoreResult<u64> {
        let n = association::table
            .filter(association::edge_kind.eq(edge_kind))
            .count()
            .get_result::<i64>(&mut self.conn)?;
        Ok(n.max(0) as u64)
    }

    fn record_run(&mut self, report: &ReconciliationReport) -> StoreResult<()> {
        let json = serde_json::to_string(report)?;
        let started_at = report.started_at.to_rfc3339();
        let finished_at = report.finished_at.map(|t| t.to_rfc3339());
        let row = NewLoadRun {
            edge_kind: &report.edge_kind,
            status: report.status.as_str(),
            dry_run: report.dry_run,
            started_at: &started_at,
            finished_at: finished_at.as_deref(),
            total_rows: report.total_rows as i64,
            inserted: report.inserted as i64,
            skipped: report.skipped_existing as i64,
            dropped: report.dropped() as i64,
            report_json: &json,
        };
        insert_into(load_run::table)
            .values(&row)
            .execute(&mut self.conn)?;
        Ok(())
    }
}
