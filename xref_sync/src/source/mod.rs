//! Association and reference-data sources.
//!
//! A load consumes any `Iterator<Item = Result<RawAssociation, SourceError>>`. Item-level
//! `Err` is reserved for failures of the source itself (I/O); a row that merely lacks a
//! column is yielded as a [`RawAssociation`] with `None` in that column and reported as
//! malformed by the loader.
//!
//! Provided readers:
//! - [`CsvAssociationSource`]: CSV/TSV association exports;
//! - [`SqlDumpSource`]: `INSERT` statements of a MySQL-style dump;
//! - [`read_mapping_csv`] / [`read_entity_csv`]: reference tables for catalog sync.
//!   Unlike association rows, any undecodable reference row is fatal.

mod delimited;
mod sqldump;

pub use delimited::{
    CsvAssociationSource, CsvOptions, read_entity_csv, read_entity_csv_path, read_mapping_csv,
    read_mapping_csv_path,
};
pub use sqldump::{DumpColumns, SqlDumpSource};

/// One association row as read from a source, before any resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAssociation {
    /// Left identifier; `None` when the column is absent, null or blank.
    pub left_id: Option<String>,
    /// Right identifier; `None` when the column is absent, null or blank.
    pub right_id: Option<String>,
    /// Evidence string.
    pub evidence: Option<String>,
    /// Frequency / qualifier string.
    pub frequency: Option<String>,
    /// 1-based line (CSV) or row ordinal (SQL dump), for diagnostics.
    pub line: Option<u64>,
}

impl RawAssociation {
    /// Row with both identifiers present.
    pub fn new(left_id: &str, right_id: &str) -> Self {
        Self {
            left_id: non_blank(Some(left_id.to_string())),
            right_id: non_blank(Some(right_id.to_string())),
            ..Self::default()
        }
    }

    /// Builder-style evidence setter.
    pub fn with_evidence(mut self, evidence: &str) -> Self {
        self.evidence = non_blank(Some(evidence.to_string()));
        self
    }

    /// Builder-style frequency setter.
    pub fn with_frequency(mut self, frequency: &str) -> Self {
        self.frequency = non_blank(Some(frequency.to_string()));
        self
    }

    /// A row whose columns could not be decoded at all.
    pub fn malformed(line: Option<u64>) -> Self {
        Self {
            line,
            ..Self::default()
        }
    }
}

/// Failures of a source as a whole.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Reading the underlying file failed.
    #[error("I/O error reading source: {0}")]
    Io(#[from] std::io::Error),

    /// The CSV reader failed (I/O, or an undecodable reference row).
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The SQL dump could not be tokenized or parsed, or its layout is unusable.
    #[error("SQL dump error: {0}")]
    SqlDump(String),
}

/// `None` for null, empty or whitespace-only values; trimmed otherwise.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}
