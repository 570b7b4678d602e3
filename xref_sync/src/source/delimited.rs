//! CSV / TSV readers.

use std::{fs::File, io::Read, path::Path};

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter, Trim};
use serde::Deserialize;
use tracing::warn;

use super::{RawAssociation, SourceError, non_blank};
use crate::{catalog::EntityRecord, resolver::MappingRecord};

/// Layout of a delimited file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    /// Field delimiter.
    pub delimiter: u8,
    /// First non-comment line names the columns.
    pub has_headers: bool,
}

impl CsvOptions {
    /// Comma separated, with headers.
    pub fn csv() -> Self {
        Self {
            delimiter: b',',
            has_headers: true,
        }
    }

    /// Tab separated, with headers.
    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            has_headers: true,
        }
    }

    fn reader<R: Read>(self, rdr: R) -> csv::Reader<R> {
        ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.has_headers)
            .flexible(true)
            .trim(Trim::All)
            .comment(Some(b'#'))
            .from_reader(rdr)
    }
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self::csv()
    }
}

// Positional order without headers: left, right, evidence, frequency.
#[derive(Debug, Deserialize)]
struct AssociationCsvRow {
    #[serde(default, alias = "disease_id", alias = "left")]
    left_id: Option<String>,
    #[serde(default, alias = "hpo_id", alias = "right")]
    right_id: Option<String>,
    #[serde(default)]
    evidence: Option<String>,
    #[serde(default)]
    frequency: Option<String>,
}

impl AssociationCsvRow {
    fn into_raw(self, line: Option<u64>) -> RawAssociation {
        RawAssociation {
            left_id: non_blank(self.left_id),
            right_id: non_blank(self.right_id),
            evidence: non_blank(self.evidence),
            frequency: non_blank(self.frequency),
            line,
        }
    }
}

/// Streaming association reader over CSV/TSV input.
///
/// Rows that cannot be decoded (bad UTF-8, unexpected shapes) are yielded as malformed
/// rows so the run keeps going; only I/O failures end the stream with an `Err`.
pub struct CsvAssociationSource<R> {
    records: StringRecordsIntoIter<R>,
    headers: Option<StringRecord>,
}

impl<R: Read> CsvAssociationSource<R> {
    /// Wrap a reader. Reads the header line immediately when `opts.has_headers`.
    pub fn new(rdr: R, opts: CsvOptions) -> Result<Self, SourceError> {
        let mut rdr = opts.reader(rdr);
        let headers = if opts.has_headers {
            Some(rdr.headers()?.clone())
        } else {
            None
        };
        Ok(Self {
            records: rdr.into_records(),
            headers,
        })
    }
}

impl CsvAssociationSource<File> {
    /// Open a file.
    pub fn from_path(path: impl AsRef<Path>, opts: CsvOptions) -> Result<Self, SourceError> {
        Self::new(File::open(path)?, opts)
    }
}

impl<R: Read> Iterator for CsvAssociationSource<R> {
    type Item = Result<RawAssociation, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = match self.records.next()? {
            Ok(record) => {
                let line = record.position().map(|p| p.line());
                match record.deserialize::<AssociationCsvRow>(self.headers.as_ref()) {
                    Ok(row) => Ok(row.into_raw(line)),
                    Err(e) => {
                        warn!(?line, error = %e, "undecodable association row");
                        Ok(RawAssociation::malformed(line))
                    }
                }
            }
            Err(e) if e.is_io_error() => Err(SourceError::Csv(e)),
            Err(e) => {
                let line = e.position().map(|p| p.line());
                warn!(?line, error = %e, "unreadable association row");
                Ok(RawAssociation::malformed(line))
            }
        };
        Some(item)
    }
}

#[derive(Debug, Deserialize)]
struct MappingCsvRow {
    #[serde(default, alias = "namespace")]
    source_namespace: Option<String>,
    #[serde(default)]
    source_code: Option<String>,
    #[serde(default)]
    canonical_code: Option<String>,
    #[serde(default)]
    relation: Option<String>,
}

/// Read a whole mapping table (`source_namespace, source_code, canonical_code[, relation]`).
///
/// Null columns are kept as `None`; the resolver or catalog sync rejects them.
pub fn read_mapping_csv<R: Read>(
    rdr: R,
    opts: CsvOptions,
) -> Result<Vec<MappingRecord>, SourceError> {
    let mut out = Vec::new();
    for row in opts.reader(rdr).into_deserialize::<MappingCsvRow>() {
        let row = row?;
        out.push(MappingRecord {
            source_namespace: row.source_namespace,
            source_code: row.source_code,
            canonical_code: row.canonical_code,
            relation: row.relation,
        });
    }
    Ok(out)
}

/// [`read_mapping_csv`] from a file.
pub fn read_mapping_csv_path(
    path: impl AsRef<Path>,
    opts: CsvOptions,
) -> Result<Vec<MappingRecord>, SourceError> {
    read_mapping_csv(File::open(path)?, opts)
}

/// Read a whole entity table (`kind, code, name[, definition]`).
pub fn read_entity_csv<R: Read>(
    rdr: R,
    opts: CsvOptions,
) -> Result<Vec<EntityRecord>, SourceError> {
    let rows = opts
        .reader(rdr)
        .into_deserialize::<EntityRecord>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// [`read_entity_csv`] from a file.
pub fn read_entity_csv_path(
    path: impl AsRef<Path>,
    opts: CsvOptions,
) -> Result<Vec<EntityRecord>, SourceError> {
    read_entity_csv(File::open(path)?, opts)
}
