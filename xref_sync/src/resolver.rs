//! Cross-reference resolution.
//!
//! A [`CrossReferenceResolver`] is built once per run from:
//! - the endpoint's [`IdentifierScheme`],
//! - the full cross-reference mapping table (alternate code → canonical code),
//! - a snapshot of canonical codes that exist in the target store.
//!
//! After construction it is an immutable lookup structure; [`CrossReferenceResolver::resolve`]
//! never fails and never touches the store.
//!
//! ## Construction rules
//! - Rows whose namespace is not one of the scheme's alternate prefixes are counted as
//!   *foreign* and ignored (a shared mapping table usually serves several endpoints).
//! - With `accepted_relations` set, rows with another (or no) relation are *filtered*.
//! - A row with a blank namespace aborts construction
//!   ([`ResolverError::MalformedMapping`]), and so does a row of one of the scheme's
//!   namespaces with a blank source or canonical code, or with a canonical code that is
//!   not a code of the canonical namespace. Foreign rows are never checked further.
//! - Identical repeated rows are harmless duplicates. A source key with two or more
//!   distinct canonical targets is a [`MappingConflict`]: reported once, and every
//!   lookup of that key is unresolved.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt,
};

use serde::Serialize;
use tracing::{debug, warn};

use crate::identifier::{IdentifierScheme, Namespace, RawIdentifier};

/// One row of the cross-reference mapping source. Fields are optional so that null
/// columns reach the resolver and are rejected there instead of being skipped silently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingRecord {
    /// Alternate namespace prefix (e.g., "OMIM").
    pub source_namespace: Option<String>,
    /// Code within that namespace; a repeated prefix (`OMIM:154700`) is tolerated.
    pub source_code: Option<String>,
    /// Canonical code (`586` or `ORPHA:586`).
    pub canonical_code: Option<String>,
    /// Optional relation / confidence tag.
    pub relation: Option<String>,
}

impl MappingRecord {
    /// Convenience constructor for a fully populated row without relation.
    pub fn new(namespace: &str, source_code: &str, canonical_code: &str) -> Self {
        Self {
            source_namespace: Some(namespace.to_string()),
            source_code: Some(source_code.to_string()),
            canonical_code: Some(canonical_code.to_string()),
            relation: None,
        }
    }

    /// Builder-style relation setter.
    pub fn with_relation(mut self, relation: &str) -> Self {
        self.relation = Some(relation.to_string());
        self
    }
}

/// Fatal resolver construction errors.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    /// A mapping row is unusable; the table is considered corrupt.
    #[error("malformed mapping row {row}: {reason}")]
    MalformedMapping {
        /// 1-based position of the row in the mapping source.
        row: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// A configured prefix could not be compiled into a matcher.
    #[error("invalid identifier scheme: {0}")]
    Scheme(#[from] regex::Error),
}

/// A source key mapped to more than one canonical code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MappingConflict {
    /// Prefix label of the alternate namespace (e.g., "OMIM").
    pub namespace: String,
    /// Conflicting source code.
    pub source_code: String,
    /// All canonical codes the key was mapped to.
    pub targets: BTreeSet<String>,
}

/// Counters gathered while indexing the mapping table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingIndexStats {
    /// Mapping rows read.
    pub rows_read: u64,
    /// Usable `(namespace, code)` keys in the index.
    pub indexed_keys: u64,
    /// Rows repeating an already seen `(namespace, code, canonical)` triple.
    pub duplicate_rows: u64,
    /// Rows of namespaces this endpoint does not use.
    pub foreign_rows: u64,
    /// Rows dropped by the relation filter.
    pub filtered_rows: u64,
    /// Keys excluded because of conflicting targets.
    pub conflicting_keys: u64,
}

/// How an identifier was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// The identifier already was a canonical code.
    CanonicalDirect,
    /// The identifier was translated through the mapping table.
    AlternateMapped,
    /// No canonical entity could be determined.
    Unresolved,
}

impl Provenance {
    /// Stable kebab-case label, identical to the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::CanonicalDirect => "canonical-direct",
            Provenance::AlternateMapped => "alternate-mapped",
            Provenance::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an identifier did not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnresolvedReason {
    /// The source row lacked the column entirely.
    Malformed,
    /// The string matched no known namespace.
    Unrecognized,
    /// Alternate code absent from the mapping table.
    NoMapping,
    /// Alternate code mapped to several canonical codes.
    MappingConflict,
    /// Canonical code (direct, mapped or bare) not present in the target store.
    EntityNotFound,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnresolvedReason::Malformed => "malformed source row",
            UnresolvedReason::Unrecognized => "unrecognized identifier",
            UnresolvedReason::NoMapping => "no mapping found",
            UnresolvedReason::MappingConflict => "conflicting mapping",
            UnresolvedReason::EntityNotFound => "canonical code not found in target store",
        })
    }
}

/// Result of resolving one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Resolved to an existing canonical entity.
    Resolved {
        /// Canonical code of the entity.
        code: String,
        /// How it was found.
        provenance: Provenance,
    },
    /// Not resolvable.
    Unresolved(UnresolvedReason),
}

/// An identifier together with its resolution outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The classified input.
    pub identifier: RawIdentifier,
    /// What resolution produced.
    pub outcome: Outcome,
}

impl Resolution {
    /// Resolution of a missing source column.
    pub fn malformed() -> Self {
        Self {
            identifier: RawIdentifier {
                original: String::new(),
                namespace: Namespace::Unrecognized,
                code: String::new(),
            },
            outcome: Outcome::Unresolved(UnresolvedReason::Malformed),
        }
    }

    /// Provenance tag; [`Provenance::Unresolved`] for every unresolved outcome.
    pub fn provenance(&self) -> Provenance {
        match self.outcome {
            Outcome::Resolved { provenance, .. } => provenance,
            Outcome::Unresolved(_) => Provenance::Unresolved,
        }
    }

    /// Canonical code when resolved.
    pub fn canonical_code(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Resolved { code, .. } => Some(code),
            Outcome::Unresolved(_) => None,
        }
    }

    /// Reason when unresolved.
    pub fn unresolved_reason(&self) -> Option<UnresolvedReason> {
        match self.outcome {
            Outcome::Resolved { .. } => None,
            Outcome::Unresolved(r) => Some(r),
        }
    }
}

/// Immutable resolver for one association endpoint.
#[derive(Debug, Clone)]
pub struct CrossReferenceResolver {
    scheme: IdentifierScheme,
    index: HashMap<(Namespace, String), String>,
    conflicted: HashSet<(Namespace, String)>,
    conflicts: Vec<MappingConflict>,
    known: HashSet<String>,
    stats: MappingIndexStats,
}

fn required<'a>(value: Option<&'a str>, row: usize, column: &str) -> Result<&'a str, ResolverError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ResolverError::MalformedMapping {
            row,
            reason: format!("{column} is null or blank"),
        }),
    }
}

impl CrossReferenceResolver {
    /// Index `mappings` for `scheme` against the `known_codes` entity snapshot.
    ///
    /// `accepted_relations` compares case-insensitively; `None` accepts every row.
    pub fn build<I>(
        scheme: IdentifierScheme,
        mappings: I,
        known_codes: HashSet<String>,
        accepted_relations: Option<&[String]>,
    ) -> Result<Self, ResolverError>
    where
        I: IntoIterator<Item = MappingRecord>,
    {
        let mut stats = MappingIndexStats::default();
        let mut targets: HashMap<(Namespace, String), BTreeSet<String>> = HashMap::new();

        for (i, rec) in mappings.into_iter().enumerate() {
            let row = i + 1;
            stats.rows_read += 1;

            let ns_label = required(rec.source_namespace.as_deref(), row, "source_namespace")?;
            // rows of other endpoints are skipped before their codes are checked
            let ns = match scheme.namespace_of_prefix(ns_label) {
                Some(ns @ (Namespace::AltA | Namespace::AltB)) => ns,
                _ => {
                    stats.foreign_rows += 1;
                    continue;
                }
            };
            let source = required(rec.source_code.as_deref(), row, "source_code")?;
            let canonical_raw = required(rec.canonical_code.as_deref(), row, "canonical_code")?;

            if let Some(accepted) = accepted_relations {
                let ok = rec
                    .relation
                    .as_deref()
                    .map(str::trim)
                    .is_some_and(|r| accepted.iter().any(|a| a.eq_ignore_ascii_case(r)));
                if !ok {
                    stats.filtered_rows += 1;
                    continue;
                }
            }

            let canonical = canonical_code(&scheme, canonical_raw).ok_or_else(|| {
                ResolverError::MalformedMapping {
                    row,
                    reason: format!(
                        "canonical code '{canonical_raw}' is not a {} code",
                        scheme.prefix(Namespace::Primary).unwrap_or_default()
                    ),
                }
            })?;

            let parsed = scheme.normalize(source);
            let source_code = if parsed.namespace == ns {
                parsed.code
            } else {
                source.to_string()
            };

            if !targets.entry((ns, source_code)).or_default().insert(canonical) {
                stats.duplicate_rows += 1;
            }
        }

        let mut index = HashMap::with_capacity(targets.len());
        let mut conflicted = HashSet::new();
        let mut conflicts = Vec::new();
        for ((ns, code), set) in targets {
            if set.len() > 1 {
                conflicts.push(MappingConflict {
                    namespace: scheme.prefix(ns).unwrap_or(ns.as_str()).to_string(),
                    source_code: code.clone(),
                    targets: set,
                });
                conflicted.insert((ns, code));
            } else if let Some(target) = set.into_iter().next() {
                index.insert((ns, code), target);
            }
        }
        conflicts.sort();

        stats.indexed_keys = index.len() as u64;
        stats.conflicting_keys = conflicts.len() as u64;

        for c in &conflicts {
            warn!(
                kind = scheme.kind(),
                namespace = %c.namespace,
                source_code = %c.source_code,
                targets = ?c.targets,
                "conflicting cross-reference mapping excluded"
            );
        }
        debug!(
            kind = scheme.kind(),
            rows = stats.rows_read,
            indexed = stats.indexed_keys,
            foreign = stats.foreign_rows,
            filtered = stats.filtered_rows,
            duplicates = stats.duplicate_rows,
            known_entities = known_codes.len(),
            "cross-reference index built"
        );

        Ok(Self {
            scheme,
            index,
            conflicted,
            conflicts,
            known: known_codes,
            stats,
        })
    }

    /// Resolve a classified identifier.
    pub fn resolve(&self, id: &RawIdentifier) -> Resolution {
        let outcome = match id.namespace {
            Namespace::Primary => self.existing(&id.code, Provenance::CanonicalDirect),
            // Unprefixed digits are only ever checked against the canonical codes.
            Namespace::BareNumeric => self.existing(&id.code, Provenance::CanonicalDirect),
            Namespace::AltA | Namespace::AltB => {
                let key = (id.namespace, id.code.clone());
                if self.conflicted.contains(&key) {
                    Outcome::Unresolved(UnresolvedReason::MappingConflict)
                } else {
                    match self.index.get(&key) {
                        Some(canonical) => self.existing(canonical, Provenance::AlternateMapped),
                        None => Outcome::Unresolved(UnresolvedReason::NoMapping),
                    }
                }
            }
            Namespace::Unrecognized => Outcome::Unresolved(UnresolvedReason::Unrecognized),
        };
        Resolution {
            identifier: id.clone(),
            outcome,
        }
    }

    /// Normalize with this resolver's scheme, then [`Self::resolve`].
    pub fn resolve_str(&self, raw: &str) -> Resolution {
        self.resolve(&self.scheme.normalize(raw))
    }

    fn existing(&self, code: &str, provenance: Provenance) -> Outcome {
        if self.known.contains(code) {
            Outcome::Resolved {
                code: code.to_string(),
                provenance,
            }
        } else {
            Outcome::Unresolved(UnresolvedReason::EntityNotFound)
        }
    }

    /// The scheme used to classify identifiers for this endpoint.
    pub fn scheme(&self) -> &IdentifierScheme {
        &self.scheme
    }

    /// Conflicting mapping keys, sorted, one entry per key.
    pub fn conflicts(&self) -> &[MappingConflict] {
        &self.conflicts
    }

    /// Index construction counters.
    pub fn stats(&self) -> &MappingIndexStats {
        &self.stats
    }

    /// Number of canonical entities in the snapshot.
    pub fn known_entities(&self) -> usize {
        self.known.len()
    }
}

fn canonical_code(scheme: &IdentifierScheme, raw: &str) -> Option<String> {
    let id = scheme.normalize(raw);
    match id.namespace {
        Namespace::Primary | Namespace::BareNumeric => Some(id.code),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scheme() -> IdentifierScheme {
        IdentifierScheme::new("disease", "ORPHA", Some("OMIM"), Some("MONDO")).unwrap()
    }

    fn known(codes: &[&str]) -> HashSet<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn canonical_direct_requires_existing_entity() {
        let r = CrossReferenceResolver::build(scheme(), vec![], known(&["558"]), None).unwrap();

        let res = r.resolve_str("ORPHA:558");
        assert_eq!(res.provenance(), Provenance::CanonicalDirect);
        assert_eq!(res.canonical_code(), Some("558"));

        let res = r.resolve_str("ORPHA:559");
        assert_eq!(res.provenance(), Provenance::Unresolved);
        assert_eq!(res.unresolved_reason(), Some(UnresolvedReason::EntityNotFound));
    }

    #[test]
    fn alternate_code_is_mapped() {
        let r = CrossReferenceResolver::build(
            scheme(),
            vec![MappingRecord::new("OMIM", "154700", "586")],
            known(&["586"]),
            None,
        )
        .unwrap();

        let res = r.resolve_str("OMIM:154700");
        assert_eq!(
            res.outcome,
            Outcome::Resolved {
                code: "586".into(),
                provenance: Provenance::AlternateMapped
            }
        );
        assert_eq!(
            r.resolve_str("OMIM:999999").unresolved_reason(),
            Some(UnresolvedReason::NoMapping)
        );
    }

    #[test]
    fn mapped_code_missing_from_store_is_distinct_from_no_mapping() {
        let r = CrossReferenceResolver::build(
            scheme(),
            vec![MappingRecord::new("MONDO", "0007947", "ORPHA:558")],
            known(&[]),
            None,
        )
        .unwrap();
        assert_eq!(
            r.resolve_str("MONDO:0007947").unresolved_reason(),
            Some(UnresolvedReason::EntityNotFound)
        );
    }

    #[test]
    fn bare_numeric_is_only_an_existence_check() {
        // 154700 is an OMIM code in the mapping table, but bare digits are never mapped.
        let r = CrossReferenceResolver::build(
            scheme(),
            vec![MappingRecord::new("OMIM", "154700", "586")],
            known(&["558", "586"]),
            None,
        )
        .unwrap();
        assert_eq!(r.resolve_str("558").provenance(), Provenance::CanonicalDirect);
        assert_eq!(
            r.resolve_str("154700").unresolved_reason(),
            Some(UnresolvedReason::EntityNotFound)
        );
    }

    #[test]
    fn unrecognized_never_resolves() {
        let r = CrossReferenceResolver::build(scheme(), vec![], known(&["558"]), None).unwrap();
        let res = r.resolve_str("Marfan syndrome");
        assert_eq!(res.unresolved_reason(), Some(UnresolvedReason::Unrecognized));
    }

    #[test]
    fn conflicting_key_is_excluded_and_reported_once() {
        let r = CrossReferenceResolver::build(
            scheme(),
            vec![
                MappingRecord::new("OMIM", "100", "1"),
                MappingRecord::new("OMIM", "100", "2"),
                MappingRecord::new("OMIM", "100", "2"),
                MappingRecord::new("OMIM", "200", "2"),
            ],
            known(&["1", "2"]),
            None,
        )
        .unwrap();

        assert_eq!(r.conflicts().len(), 1);
        let c = &r.conflicts()[0];
        assert_eq!(c.namespace, "OMIM");
        assert_eq!(c.source_code, "100");
        assert_eq!(c.targets, BTreeSet::from(["1".to_string(), "2".to_string()]));

        assert_eq!(
            r.resolve_str("OMIM:100").unresolved_reason(),
            Some(UnresolvedReason::MappingConflict)
        );
        assert_eq!(r.resolve_str("OMIM:200").canonical_code(), Some("2"));

        let s = r.stats();
        assert_eq!(s.rows_read, 4);
        assert_eq!(s.duplicate_rows, 1);
        assert_eq!(s.indexed_keys, 1);
        assert_eq!(s.conflicting_keys, 1);
    }

    #[test]
    fn foreign_namespaces_and_prefixed_codes() {
        let r = CrossReferenceResolver::build(
            scheme(),
            vec![
                MappingRecord::new("icd10", "Q87.4", "558"),
                MappingRecord::new("omim", "OMIM:154700", "ORPHA:558"),
            ],
            known(&["558"]),
            None,
        )
        .unwrap();
        assert_eq!(r.stats().foreign_rows, 1);
        assert_eq!(r.resolve_str("omim:154700").canonical_code(), Some("558"));
    }

    #[test]
    fn relation_filter() {
        let accepted = vec!["E".to_string()];
        let r = CrossReferenceResolver::build(
            scheme(),
            vec![
                MappingRecord::new("OMIM", "100", "1").with_relation("e"),
                MappingRecord::new("OMIM", "100", "2").with_relation("NTBT"),
                MappingRecord::new("OMIM", "300", "2"),
            ],
            known(&["1", "2"]),
            Some(&accepted),
        )
        .unwrap();
        // The NTBT row is filtered before conflict detection.
        assert!(r.conflicts().is_empty());
        assert_eq!(r.resolve_str("OMIM:100").canonical_code(), Some("1"));
        assert_eq!(r.stats().filtered_rows, 2);
        assert_eq!(
            r.resolve_str("OMIM:300").unresolved_reason(),
            Some(UnresolvedReason::NoMapping)
        );
    }

    #[test]
    fn null_canonical_code_is_fatal() {
        let rec = MappingRecord {
            canonical_code: None,
            ..MappingRecord::new("OMIM", "100", "x")
        };
        let err = CrossReferenceResolver::build(
            scheme(),
            vec![MappingRecord::new("OMIM", "1", "1"), rec],
            known(&[]),
            None,
        )
        .unwrap_err();
        match err {
            ResolverError::MalformedMapping { row, reason } => {
                assert_eq!(row, 2);
                assert!(reason.contains("canonical_code"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_foreign_rows_are_skipped_but_blank_namespace_is_fatal() {
        let blank_foreign = MappingRecord {
            source_code: Some("  ".into()),
            canonical_code: None,
            ..MappingRecord::new("HP", "x", "x")
        };
        let r = CrossReferenceResolver::build(
            scheme(),
            vec![blank_foreign, MappingRecord::new("OMIM", "100", "1")],
            known(&["1"]),
            None,
        )
        .unwrap();
        assert_eq!(r.stats().foreign_rows, 1);
        assert_eq!(r.resolve_str("OMIM:100").canonical_code(), Some("1"));

        let no_namespace = MappingRecord {
            source_namespace: None,
            ..MappingRecord::new("OMIM", "100", "1")
        };
        let err = CrossReferenceResolver::build(scheme(), vec![no_namespace], known(&[]), None)
            .unwrap_err();
        assert!(err.to_string().contains("source_namespace"));
    }

    #[test]
    fn non_canonical_target_is_fatal() {
        let err = CrossReferenceResolver::build(
            scheme(),
            vec![MappingRecord::new("OMIM", "100", "MONDO:0000001")],
            known(&[]),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not a ORPHA code"));
    }

    proptest! {
        #[test]
        fn conflicts_always_unresolved(
            code in "[0-9]{1,6}",
            a in "[0-9]{1,4}",
            b in "[0-9]{1,4}",
        ) {
            prop_assume!(a != b);
            let r = CrossReferenceResolver::build(
                scheme(),
                vec![
                    MappingRecord::new("OMIM", &code, &a),
                    MappingRecord::new("OMIM", &code, &b),
                ],
                known(&[a.as_str(), b.as_str()]),
                None,
            ).unwrap();
            prop_assert_eq!(r.conflicts().len(), 1);
            prop_assert_eq!(r.resolve_str(&format!("OMIM:{code}")).provenance(), Provenance::Unresolved);
        }

        #[test]
        fn namespace_round_trip(code in "[0-9]{1,9}") {
            let r = CrossReferenceResolver::build(
                scheme(), vec![], known(&[code.as_str()]), None,
            ).unwrap();
            let res = r.resolve_str(&format!("ORPHA:{code}"));
            prop_assert_eq!(res.identifier.namespace, Namespace::Primary);
            prop_assert_eq!(res.provenance(), Provenance::CanonicalDirect);
            prop_assert_eq!(res.canonical_code(), Some(code.as_str()));
        }
    }
}
