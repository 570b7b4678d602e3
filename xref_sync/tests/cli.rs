use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::str;

use diesel::prelude::*;
use tempfile::TempDir;
use xref_sync::db::connection::connect_sqlite;
use xref_sync::schema::association;

mod common;
use common::DISEASE_PHENOTYPE_TOML;

const ENTITIES: &str = "\
kind,code,name
disease,ORPHA:558,Marfan syndrome
disease,ORPHA:586,Cystic fibrosis
phenotype,HP:0001166,Arachnodactyly
phenotype,HP:0000975,Hyperhidrosis
";

const MAPPINGS: &str = "\
source_namespace,source_code,canonical_code,relation
OMIM,154700,586,E
";

const DUMP: &str = "\
CREATE TABLE `phenotype_annotation` (
  `id` int(11) NOT NULL AUTO_INCREMENT,
  `disease_id` varchar(32) NOT NULL,
  `hpo_id` varchar(32) NOT NULL,
  `evidence` varchar(8) DEFAULT NULL,
  `frequency` varchar(32) DEFAULT NULL,
  PRIMARY KEY (`id`)
) ENGINE=InnoDB;
INSERT INTO `phenotype_annotation` VALUES
  (1,'ORPHA:558','HP:0001166','TAS','HP:0040281'),
  (2,'OMIM:154700','HP:0000975','IEA',NULL),
  (3,'OMIM:1','HP:0000975',NULL,NULL);
";

struct Workspace {
    dir: TempDir,
    db: String,
}

impl Workspace {
    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn xref(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_xref-sync"));
        cmd.env("RUST_LOG", "warn")
            .env_remove("XREF_BATCH_SIZE")
            .args(["--database", &self.db]);
        cmd
    }
}

fn run(cmd: &mut Command) -> Output {
    let output = cmd.output().expect("spawn xref-sync");
    if !output.status.success() {
        eprintln!("stderr: {}", str::from_utf8(&output.stderr).unwrap_or_default());
    }
    output
}

fn arg(p: &Path) -> &str {
    p.to_str().expect("utf-8 temp path")
}

/// Migrated database with the reference catalog loaded through the binary itself.
fn workspace() -> Workspace {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("xref.db").to_string_lossy().to_string();
    let ws = Workspace { dir, db };

    std::fs::write(ws.path("loader.toml"), DISEASE_PHENOTYPE_TOML).unwrap();
    std::fs::write(ws.path("entities.csv"), ENTITIES).unwrap();
    std::fs::write(ws.path("mappings.csv"), MAPPINGS).unwrap();
    std::fs::write(ws.path("dump.sql"), DUMP).unwrap();

    assert!(run(ws.xref().arg("migrate")).status.success());
    let entities = ws.path("entities.csv");
    let mappings = ws.path("mappings.csv");
    let synced = run(ws.xref().args([
        "catalog",
        "sync",
        "--entities",
        arg(&entities),
        "--mappings",
        arg(&mappings),
    ]));
    assert!(synced.status.success(), "catalog sync failed");
    ws
}

fn load_dump(ws: &Workspace, extra: &[&str]) -> Command {
    let config = ws.path("loader.toml");
    let dump = ws.path("dump.sql");
    let mut cmd = ws.xref();
    cmd.args([
        "load",
        "--config",
        arg(&config),
        "--input",
        arg(&dump),
        "--format",
        "sql-dump",
        "--table",
        "phenotype_annotation",
        "--left-column",
        "disease_id",
        "--right-column",
        "hpo_id",
    ])
    .args(extra);
    cmd
}

#[test]
fn sql_dump_load_keeps_evidence_and_frequency() {
    let ws = workspace();
    let output = run(&mut load_dump(
        &ws,
        &["--evidence-column", "evidence", "--frequency-column", "frequency", "--json"],
    ));
    assert!(output.status.success(), "load did not exit successfully");

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "completed");
    assert_eq!(report["inserted"], 2);
    assert_eq!(report["unresolved_rows"], 1);

    let mut conn = connect_sqlite(&ws.db).unwrap();
    let stored: Vec<(String, Option<String>, Option<String>)> = association::table
        .order(association::id.asc())
        .select((association::left_code, association::evidence, association::frequency))
        .load(&mut conn)
        .unwrap();
    assert_eq!(
        stored,
        vec![
            ("558".to_string(), Some("TAS".to_string()), Some("HP:0040281".to_string())),
            ("586".to_string(), Some("IEA".to_string()), None),
        ]
    );
}

#[test]
fn table_columns_cover_dumps_without_ddl() {
    let ws = workspace();
    std::fs::write(
        ws.path("bare.sql"),
        "INSERT INTO phenotype_annotation VALUES (1,'ORPHA:558','HP:0001166');\n",
    )
    .unwrap();
    let config = ws.path("loader.toml");
    let bare = ws.path("bare.sql");

    let output = run(ws.xref().args([
        "load",
        "--config",
        arg(&config),
        "--input",
        arg(&bare),
        "--format",
        "sql-dump",
        "--table",
        "phenotype_annotation",
        "--left-column",
        "disease_id",
        "--right-column",
        "hpo_id",
        "--table-columns",
        "id,disease_id,hpo_id",
        "--json",
    ]));
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["inserted"], 1);
}

#[test]
fn min_resolution_rate_fails_the_command() {
    let ws = workspace();
    let output = run(&mut load_dump(&ws, &["--dry-run", "--min-resolution-rate", "0.9"]));
    assert!(!output.status.success());
    let stderr = str::from_utf8(&output.stderr).unwrap();
    assert!(stderr.contains("resolution rate 0.667 is below the required 0.900"), "{stderr}");

    // the report is still printed before the threshold check
    let stdout = str::from_utf8(&output.stdout).unwrap();
    assert!(stdout.starts_with("Reconciliation: has_phenotype (completed, dry run)"));

    let passing = run(&mut load_dump(&ws, &["--dry-run", "--min-resolution-rate", "0.5"]));
    assert!(passing.status.success());
}

#[test]
fn batch_size_override_is_bounds_checked() {
    let ws = workspace();
    let output = run(load_dump(&ws, &[]).env("XREF_BATCH_SIZE", "0"));
    assert!(!output.status.success());
    let stderr = str::from_utf8(&output.stderr).unwrap();
    assert!(stderr.contains("XREF_BATCH_SIZE must be within"), "{stderr}");

    let output = run(load_dump(&ws, &[]).env("XREF_BATCH_SIZE", "lots"));
    assert!(!output.status.success());

    let output = run(load_dump(&ws, &["--json"]).env("XREF_BATCH_SIZE", "1"));
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["batches_committed"], 2);
}

#[test]
fn resolve_explains_the_outcome() {
    let ws = workspace();
    let config = ws.path("loader.toml");

    let output = run(ws.xref().args(["resolve", "--config", arg(&config), "--side", "left", "omim:154700"]));
    assert!(output.status.success());
    let stdout = str::from_utf8(&output.stdout).unwrap();
    assert!(stdout.contains("namespace  alt-a"), "{stdout}");
    assert!(stdout.contains("resolved   disease:586 (alternate-mapped)"), "{stdout}");

    let output = run(ws.xref().args(["resolve", "--config", arg(&config), "--side", "left", "OMIM:1"]));
    assert!(output.status.success());
    let stdout = str::from_utf8(&output.stdout).unwrap();
    assert!(stdout.contains("unresolved no mapping found"), "{stdout}");
}
