#![allow(dead_code)]

use std::{
    collections::{BTreeSet, HashSet},
    path::PathBuf,
    time::Duration,
};

use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Text};
use tempfile::TempDir;

use xref_sync::catalog::EntityRecord;
use xref_sync::catalog::sync::{SyncOptions, sync_catalog};
use xref_sync::config::{LoaderConfig, load_config_str};
use xref_sync::db::{connection, migrate};
use xref_sync::resolver::MappingRecord;
use xref_sync::store::{
    AssociationKey, BatchOutcome, NewAssociation, StoreError, StoreResult, TargetStore,
};

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}
#[derive(QueryableByName)]
struct Cnt {
    #[diesel(sql_type = BigInt)]
    n: i64,
}
#[derive(QueryableByName)]
struct FkViolation {
    #[diesel(sql_type = Text)]
    table: String,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/test.db
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let mut p = PathBuf::from(dir.path());
    p.push("test.db");
    let path = p.to_string_lossy().to_string();

    migrate::run_all(&path).expect("migrations");

    let conn = connection::connect_sqlite(&path).expect("connect");
    (TestDb { _dir: dir, path }, conn)
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection, busy_timeout_ms: i32) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal"); // WAL is persistent per DB file

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, busy_timeout_ms);
}

pub fn count(conn: &mut SqliteConnection, table: &str) -> i64 {
    let row: Cnt = diesel::sql_query(format!("SELECT COUNT(*) AS n FROM {table}"))
        .get_result(conn)
        .unwrap();
    row.n
}

pub fn fk_check_empty(conn: &mut SqliteConnection) {
    let rows: Vec<FkViolation> = diesel::sql_query("PRAGMA foreign_key_check;")
        .load(conn)
        .unwrap();
    assert!(
        rows.is_empty(),
        "foreign key violations in {:?}",
        rows.iter().map(|r| r.table.as_str()).collect::<Vec<_>>()
    );
}

pub const DISEASE_PHENOTYPE_TOML: &str = r#"
edge_kind = "has_phenotype"
batch_size = 100

[left]
kind = "disease"
primary = "ORPHA"
alt_a = "OMIM"
alt_b = "MONDO"

[right]
kind = "phenotype"
primary = "HP"
"#;

pub fn disease_phenotype_config() -> LoaderConfig {
    load_config_str(DISEASE_PHENOTYPE_TOML).expect("config")
}

pub fn hp(code: u32) -> String {
    format!("{code:07}")
}

/// Seed diseases `ORPHA:<d>` and phenotypes `HP:<p>` plus mappings through catalog sync.
pub fn seed(
    conn: &mut SqliteConnection,
    diseases: &[&str],
    phenotypes: &[&str],
    mappings: Vec<MappingRecord>,
) {
    let mut entities: Vec<EntityRecord> = diseases
        .iter()
        .map(|c| EntityRecord::new("disease", c, &format!("Disease {c}")))
        .collect();
    entities.extend(
        phenotypes
            .iter()
            .map(|c| EntityRecord::new("phenotype", c, &format!("Phenotype {c}"))),
    );
    sync_catalog(conn, entities, mappings, SyncOptions::default()).expect("seed catalog");
}

/// In-memory [`TargetStore`] with the same skip-on-duplicate semantics as SQLite.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub entities: HashSet<(String, String)>,
    pub rows: Vec<NewAssociation>,
    keys: BTreeSet<AssociationKey>,
    pub batches: usize,
    /// Fail the n-th batch (1-based) with `Unavailable`.
    pub fail_on_batch: Option<usize>,
    pub runs: Vec<String>,
}

impl MemoryStore {
    pub fn with_entities(kind: &str, codes: impl IntoIterator<Item = String>) -> Self {
        let mut s = Self::default();
        s.add_entities(kind, codes);
        s
    }

    pub fn add_entities(&mut self, kind: &str, codes: impl IntoIterator<Item = String>) {
        self.entities
            .extend(codes.into_iter().map(|c| (kind.to_string(), c)));
    }
}

impl TargetStore for MemoryStore {
    fn entity_exists(&mut self, kind: &str, code: &str) -> StoreResult<bool> {
        Ok(self.entities.contains(&(kind.to_string(), code.to_string())))
    }

    fn entity_codes(&mut self, kind: &str) -> StoreResult<HashSet<String>> {
        Ok(self
            .entities
            .iter()
            .filter(|(k, _)| k == kind)
            .map(|(_, c)| c.clone())
            .collect())
    }

    fn upsert_association_batch(
        &mut self,
        rows: &[NewAssociation],
        _timeout: Duration,
    ) -> StoreResult<BatchOutcome> {
        self.batches += 1;
        if self.fail_on_batch == Some(self.batches) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        let mut out = BatchOutcome::default();
        for row in rows {
            if self.keys.insert(row.key()) {
                self.rows.push(row.clone());
                out.inserted += 1;
            } else {
                out.skipped += 1;
            }
        }
        Ok(out)
    }

    fn count_associations(&mut self, edge_kind: &str) -> StoreResult<u64> {
        Ok(self.rows.iter().filter(|r| r.edge_kind == edge_kind).count() as u64)
    }

    fn record_run(&mut self, report: &xref_sync::report::ReconciliationReport) -> StoreResult<()> {
        self.runs.push(report.status.as_str().to_string());
        Ok(())
    }
}
