mod common;
use common::{count, disease_phenotype_config, seed, setup_db};

use std::fs;

use tempfile::TempDir;
use xref_sync::loader::{LoadOptions, load_associations};
use xref_sync::resolver::MappingRecord;
use xref_sync::source::{
    CsvAssociationSource, CsvOptions, DumpColumns, SqlDumpSource, read_entity_csv_path,
    read_mapping_csv_path,
};
use xref_sync::store::SqliteStore;

const DUMP: &str = "\
DROP TABLE IF EXISTS `phenotype_annotation`;
CREATE TABLE `phenotype_annotation` (
  `id` int(11) NOT NULL AUTO_INCREMENT,
  `disease_id` varchar(32) NOT NULL,
  `hpo_id` varchar(32) NOT NULL,
  `frequency` varchar(32) DEFAULT NULL,
  PRIMARY KEY (`id`),
  KEY `idx_disease` (`disease_id`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;
LOCK TABLES `phenotype_annotation` WRITE;
INSERT INTO `phenotype_annotation` VALUES
  (1,'ORPHA:558','HP:0001166','HP:0040281'),
  (2,'OMIM:154700','HP:0000975',NULL),
  (3,'ORPHA:558','HP:0001166','HP:0040281'),
  (4,'OMIM:1','HP:0000975',NULL);
UNLOCK TABLES;
";

#[test]
fn tsv_file_loads_into_sqlite() {
    let (db, mut conn) = setup_db();
    seed(
        &mut conn,
        &["558", "586"],
        &["0001166", "0000975"],
        vec![MappingRecord::new("MONDO", "0007947", "586")],
    );

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("annotations.tsv");
    fs::write(
        &path,
        "# exported annotations\n\
         disease_id\thpo_id\tevidence\tfrequency\n\
         ORPHA:558\tHP:0001166\tTAS\t\n\
         MONDO:0007947\tHP:0000975\tIEA\tHP:0040283\n\
         orpha:558\thp:0000975\t\t\n\
         \tHP:0000975\t\t\n",
    )
    .unwrap();

    let cfg = disease_phenotype_config();
    let mut store = SqliteStore::open(&db.path, 5000).unwrap();
    let mappings = store.mapping_records().unwrap();
    let source = CsvAssociationSource::from_path(&path, CsvOptions::tsv()).unwrap();

    let report = load_associations(
        &mut store,
        &cfg,
        mappings,
        source,
        LoadOptions::from_config(&cfg),
        None,
    )
    .unwrap();

    assert_eq!(report.total_rows, 4);
    assert_eq!(report.inserted, 3);
    assert_eq!(report.unresolved_rows, 1);
    assert!(report.invariant_violations().is_empty());
    assert_eq!(count(&mut conn, "association"), 3);
}

#[test]
fn sql_dump_file_loads_into_sqlite() {
    let (db, mut conn) = setup_db();
    seed(
        &mut conn,
        &["558", "586"],
        &["0001166", "0000975"],
        vec![MappingRecord::new("OMIM", "154700", "586")],
    );

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dump.sql");
    fs::write(&path, DUMP).unwrap();

    let cols = DumpColumns {
        frequency: Some("frequency".into()),
        ..DumpColumns::new("disease_id", "hpo_id")
    };
    let source = SqlDumpSource::from_path(&path, "phenotype_annotation", &cols).unwrap();
    assert_eq!(source.len(), 4);

    let cfg = disease_phenotype_config();
    let mut store = SqliteStore::open(&db.path, 5000).unwrap();
    let mappings = store.mapping_records().unwrap();
    let report = load_associations(
        &mut store,
        &cfg,
        mappings,
        source,
        LoadOptions::from_config(&cfg),
        None,
    )
    .unwrap();

    assert_eq!(report.total_rows, 4);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.skipped_existing, 1);
    assert_eq!(report.unresolved_rows, 1);
    assert!(report.left.unresolved_codes.values().any(|c| c.contains("1")));
    assert_eq!(count(&mut conn, "association"), 2);
}

#[test]
fn reference_files_are_read_from_disk() {
    let dir = TempDir::new().unwrap();
    let entities = dir.path().join("entities.csv");
    let mappings = dir.path().join("mappings.tsv");
    fs::write(&entities, "kind,code,name\ndisease,ORPHA:558,Marfan syndrome\n").unwrap();
    fs::write(
        &mappings,
        "source_namespace\tsource_code\tcanonical_code\nOMIM\t154700\t558\n",
    )
    .unwrap();

    let e = read_entity_csv_path(&entities, CsvOptions::csv()).unwrap();
    assert_eq!(e.len(), 1);
    assert_eq!(e[0].definition, None);

    let m = read_mapping_csv_path(&mappings, CsvOptions::tsv()).unwrap();
    assert_eq!(m, vec![MappingRecord::new("OMIM", "154700", "558")]);

    assert!(read_entity_csv_path(dir.path().join("missing.csv"), CsvOptions::csv()).is_err());
}
