//! Entity and mapping records: parsing shapes and normalization.
//!
//! Normalization rules:
//! - every field is trimmed; entity kinds are lowercased;
//! - namespace labels and relation tags are uppercased;
//! - a namespace prefix repeated inside a code (`OMIM:154700`, `ORPHA:558`) is stripped;
//! - blank required fields are errors;
//! - duplicates are removed, keeping the first occurrence.

use std::collections::HashSet;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::resolver::MappingRecord;

/// One canonical entity as delivered by a reference file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EntityRecord {
    /// Entity kind (e.g., "disease").
    pub kind: String,
    /// Canonical code; a `PREFIX:` is tolerated and stripped.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Optional definition.
    #[serde(default)]
    pub definition: Option<String>,
}

impl EntityRecord {
    /// Record without definition.
    pub fn new(kind: &str, code: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            code: code.to_string(),
            name: name.to_string(),
            definition: None,
        }
    }
}

/// A validated mapping row, ready for the `xref_mapping` table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CatalogMapping {
    /// Uppercase namespace label.
    pub source_namespace: String,
    /// Code within the namespace, prefix stripped.
    pub source_code: String,
    /// Canonical code, prefix stripped.
    pub canonical_code: String,
    /// Uppercase relation tag.
    pub relation: Option<String>,
}

/// What normalization changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NormalizationReport {
    /// Codes that carried a namespace prefix.
    pub prefixes_stripped: usize,
    /// Entity rows repeating an earlier `(kind, code)`.
    pub entities_deduped: usize,
    /// Mapping rows repeating an earlier `(namespace, source, canonical)` triple.
    pub mappings_deduped: usize,
}

fn strip_prefix(code: &str, report: &mut NormalizationReport) -> String {
    match code.split_once(':') {
        Some((_, rest)) => {
            report.prefixes_stripped += 1;
            rest.trim().to_string()
        }
        None => code.to_string(),
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Normalize entity records in place.
///
/// Errors on a blank kind, code or name (rows are numbered from 1).
pub fn normalize_entities(
    list: &mut Vec<EntityRecord>,
    report: &mut NormalizationReport,
) -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(list.len());

    for (i, mut e) in std::mem::take(list).into_iter().enumerate() {
        let row = i + 1;
        e.kind = e.kind.trim().to_lowercase();
        if e.kind.is_empty() {
            bail!("entity row {row}: kind cannot be empty after trimming");
        }
        e.code = strip_prefix(e.code.trim(), report);
        if e.code.is_empty() {
            bail!("entity row {row}: code cannot be empty after trimming");
        }
        e.name = e.name.trim().to_string();
        if e.name.is_empty() {
            bail!("entity row {row}: name cannot be empty after trimming");
        }
        e.definition = optional(e.definition);

        if seen.insert((e.kind.clone(), e.code.clone())) {
            out.push(e);
        } else {
            report.entities_deduped += 1;
        }
    }

    *list = out;
    Ok(())
}

/// Validate and normalize mapping records.
///
/// Errors on a blank namespace, source code or canonical code (rows are numbered from 1).
pub fn normalize_mappings(
    list: Vec<MappingRecord>,
    report: &mut NormalizationReport,
) -> anyhow::Result<Vec<CatalogMapping>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(list.len());

    for (i, m) in list.into_iter().enumerate() {
        let row = i + 1;
        let Some(ns) = optional(m.source_namespace) else {
            bail!("mapping row {row}: source_namespace cannot be empty");
        };
        let ns = ns.trim_end_matches(':').to_uppercase();
        let Some(source) = optional(m.source_code) else {
            bail!("mapping row {row}: source_code cannot be empty");
        };
        let Some(canonical) = optional(m.canonical_code) else {
            bail!("mapping row {row}: canonical_code cannot be empty");
        };

        let source_code = strip_prefix(&source, report);
        let canonical_code = strip_prefix(&canonical, report);
        if source_code.is_empty() || canonical_code.is_empty() {
            bail!("mapping row {row}: code is empty after removing its prefix");
        }

        let mapping = CatalogMapping {
            source_namespace: ns,
            source_code,
            canonical_code,
            relation: optional(m.relation).map(|r| r.to_uppercase()),
        };
        let key = (
            mapping.source_namespace.clone(),
            mapping.source_code.clone(),
            mapping.canonical_code.clone(),
        );
        if seen.insert(key) {
            out.push(mapping);
        } else {
            report.mappings_deduped += 1;
        }
    }
    Ok(out)
}

impl From<CatalogMapping> for MappingRecord {
    fn from(m: CatalogMapping) -> Self {
        MappingRecord {
            source_namespace: Some(m.source_namespace),
            source_code: Some(m.source_code),
            canonical_code: Some(m.canonical_code),
            relation: m.relation,
        }
    }
}
