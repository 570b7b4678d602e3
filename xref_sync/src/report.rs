//! Reconciliation report.
//!
//! One [`ReconciliationReport`] is produced per load run. It accounts for every source
//! row exactly once:
//!
//! ```text
//! total_rows      = resolved_rows + unresolved_rows
//! resolved_rows   = inserted + skipped_existing + uncommitted
//! unresolved_rows = Σ dropped_by_provenance
//! ```
//!
//! `uncommitted` holds resolved rows that never reached the store: dry runs, and the
//! rolled-back batch of a failed run. [`ReconciliationReport::invariant_violations`]
//! checks the identities above.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::{
    identifier::Namespace,
    resolver::{
        CrossReferenceResolver, MappingConflict, MappingIndexStats, Provenance, Resolution,
        UnresolvedReason,
    },
};

/// Terminal state of a load run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    /// Still consuming rows.
    Running,
    /// The source was exhausted and every batch committed.
    Completed,
    /// Stopped at a batch boundary on request.
    Cancelled,
    /// Aborted by a store or source error.
    Failed,
}

impl RunStatus {
    /// Label stored in `load_run.status`.
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distinct unresolved codes of one namespace, in first-seen order.
///
/// Serializes as `{"distinct": n, "sample": [...]}` with at most `sample_limit` codes.
#[derive(Debug, Clone, Default)]
pub struct UnresolvedCodes {
    codes: IndexSet<String>,
    sample_limit: usize,
}

impl UnresolvedCodes {
    fn new(sample_limit: usize) -> Self {
        Self {
            codes: IndexSet::new(),
            sample_limit,
        }
    }

    /// Number of distinct codes.
    pub fn distinct(&self) -> usize {
        self.codes.len()
    }

    /// First `sample_limit` distinct codes.
    pub fn sample(&self) -> impl Iterator<Item = &str> {
        self.codes.iter().take(self.sample_limit).map(String::as_str)
    }

    /// Was `code` seen?
    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(code)
    }
}

impl Serialize for UnresolvedCodes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("distinct", &self.codes.len())?;
        map.serialize_entry("sample", &self.sample().collect::<Vec<_>>())?;
        map.end()
    }
}

/// Per-endpoint resolution counters.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStats {
    /// Entity kind of the endpoint.
    pub kind: String,
    /// Configured prefix per namespace, for readable output.
    pub prefixes: BTreeMap<Namespace, String>,
    /// Resolved identifiers per namespace they arrived in.
    pub resolved: BTreeMap<Namespace, u64>,
    /// Unresolved identifiers per reason.
    pub unresolved: BTreeMap<UnresolvedReason, u64>,
    /// Distinct unresolved codes per namespace (malformed rows carry no code).
    pub unresolved_codes: BTreeMap<Namespace, UnresolvedCodes>,
    /// Mapping index counters of the endpoint's resolver.
    pub mapping: MappingIndexStats,
    /// Canonical entities in the resolver snapshot.
    pub known_entities: usize,
    #[serde(skip)]
    sample_limit: usize,
}

impl EndpointStats {
    fn new(resolver: &CrossReferenceResolver, sample_limit: usize) -> Self {
        let scheme = resolver.scheme();
        let prefixes = [Namespace::Primary, Namespace::AltA, Namespace::AltB]
            .into_iter()
            .filter_map(|ns| scheme.prefix(ns).map(|p| (ns, p.to_string())))
            .collect();
        Self {
            kind: scheme.kind().to_string(),
            prefixes,
            resolved: BTreeMap::new(),
            unresolved: BTreeMap::new(),
            unresolved_codes: BTreeMap::new(),
            mapping: resolver.stats().clone(),
            known_entities: resolver.known_entities(),
            sample_limit,
        }
    }

    fn record(&mut self, res: &Resolution) {
        match res.unresolved_reason() {
            None => *self.resolved.entry(res.identifier.namespace).or_default() += 1,
            Some(reason) => {
                *self.unresolved.entry(reason).or_default() += 1;
                if reason != UnresolvedReason::Malformed {
                    let limit = self.sample_limit;
                    self.unresolved_codes
                        .entry(res.identifier.namespace)
                        .or_insert_with(|| UnresolvedCodes::new(limit))
                        .codes
                        .insert(res.identifier.code.clone());
                }
            }
        }
    }

    /// Identifiers of this endpoint that resolved.
    pub fn resolved_total(&self) -> u64 {
        self.resolved.values().sum()
    }

    /// Identifiers of this endpoint that did not resolve.
    pub fn unresolved_total(&self) -> u64 {
        self.unresolved.values().sum()
    }

    fn label(&self, ns: Namespace) -> String {
        match self.prefixes.get(&ns) {
            Some(p) => format!("{ns} ({p})"),
            None => ns.to_string(),
        }
    }
}

/// Outcome summary of one load run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    /// Edge kind loaded.
    pub edge_kind: String,
    /// Where the run ended.
    pub status: RunStatus,
    /// Nothing was written to the association table.
    pub dry_run: bool,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Set once the run reaches a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Source rows consumed.
    pub total_rows: u64,
    /// Rows whose both endpoints resolved.
    pub resolved_rows: u64,
    /// Rows dropped because at least one endpoint did not resolve.
    pub unresolved_rows: u64,
    /// Resolved rows newly persisted.
    pub inserted: u64,
    /// Resolved rows whose key already existed.
    pub skipped_existing: u64,
    /// Resolved rows never committed (dry run, or the batch of a failed commit).
    pub uncommitted: u64,
    /// Batches committed to the store.
    pub batches_committed: u64,
    /// Dropped rows by `(left provenance, right provenance)`, serialized as `"left/right"`.
    #[serde(serialize_with = "serialize_pairs")]
    pub dropped_by_provenance: BTreeMap<(Provenance, Provenance), u64>,
    /// Left endpoint counters.
    pub left: EndpointStats,
    /// Right endpoint counters.
    pub right: EndpointStats,
    /// Mapping conflicts of both endpoints, sorted and de-duplicated.
    pub conflicts: Vec<MappingConflict>,
    /// Associations of this edge kind before the run, when known.
    pub associations_before: Option<u64>,
    /// Associations of this edge kind after the run, when known.
    pub associations_after: Option<u64>,
}

fn serialize_pairs<S: Serializer>(
    pairs: &BTreeMap<(Provenance, Provenance), u64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(pairs.len()))?;
    for ((l, r), n) in pairs {
        map.serialize_entry(&format!("{l}/{r}"), n)?;
    }
    map.end()
}

impl ReconciliationReport {
    /// Empty report for a run over the two endpoint resolvers.
    pub fn new(
        edge_kind: &str,
        left: &CrossReferenceResolver,
        right: &CrossReferenceResolver,
        sample_limit: usize,
        dry_run: bool,
    ) -> Self {
        let mut conflicts: Vec<MappingConflict> = left
            .conflicts()
            .iter()
            .chain(right.conflicts())
            .cloned()
            .collect();
        conflicts.sort();
        conflicts.dedup();

        Self {
            edge_kind: edge_kind.to_string(),
            status: RunStatus::Running,
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            total_rows: 0,
            resolved_rows: 0,
            unresolved_rows: 0,
            inserted: 0,
            skipped_existing: 0,
            uncommitted: 0,
            batches_committed: 0,
            dropped_by_provenance: BTreeMap::new(),
            left: EndpointStats::new(left, sample_limit),
            right: EndpointStats::new(right, sample_limit),
            conflicts,
            associations_before: None,
            associations_after: None,
        }
    }

    /// Account for one source row. Returns whether both endpoints resolved.
    pub fn record_row(&mut self, left: &Resolution, right: &Resolution) -> bool {
        self.total_rows += 1;
        self.left.record(left);
        self.right.record(right);

        let pair = (left.provenance(), right.provenance());
        if pair.0 == Provenance::Unresolved || pair.1 == Provenance::Unresolved {
            self.unresolved_rows += 1;
            *self.dropped_by_provenance.entry(pair).or_default() += 1;
            false
        } else {
            self.resolved_rows += 1;
            true
        }
    }

    /// Mark the run terminal.
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Rows persisted by this run.
    pub fn persisted(&self) -> u64 {
        self.inserted
    }

    /// Rows dropped as unresolved.
    pub fn dropped(&self) -> u64 {
        self.dropped_by_provenance.values().sum()
    }

    /// Dropped rows for one provenance pair.
    pub fn dropped_for(&self, left: Provenance, right: Provenance) -> u64 {
        self.dropped_by_provenance
            .get(&(left, right))
            .copied()
            .unwrap_or(0)
    }

    /// Share of rows that resolved; 1.0 for an empty run.
    pub fn resolution_rate(&self) -> f64 {
        if self.total_rows == 0 {
            1.0
        } else {
            self.resolved_rows as f64 / self.total_rows as f64
        }
    }

    /// Accounting identities that do not hold; empty for a consistent report.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.resolved_rows + self.unresolved_rows != self.total_rows {
            out.push(format!(
                "resolved ({}) + unresolved ({}) != total ({})",
                self.resolved_rows, self.unresolved_rows, self.total_rows
            ));
        }
        if self.dropped() != self.unresolved_rows {
            out.push(format!(
                "dropped by provenance ({}) != unresolved ({})",
                self.dropped(),
                self.unresolved_rows
            ));
        }
        // A running report may still hold resolved rows in an open batch.
        if self.status != RunStatus::Running {
            let accounted = self.inserted + self.skipped_existing + self.uncommitted;
            if accounted != self.resolved_rows {
                out.push(format!(
                    "inserted + skipped + uncommitted ({accounted}) != resolved ({})",
                    self.resolved_rows
                ));
            }
        }
        for side in [&self.left, &self.right] {
            let seen = side.resolved_total() + side.unresolved_total();
            if seen != self.total_rows {
                out.push(format!(
                    "{} endpoint saw {seen} identifiers for {} rows",
                    side.kind, self.total_rows
                ));
            }
        }
        out
    }
}

impl fmt::Display for ReconciliationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = format!(
            "Reconciliation: {} ({}{})",
            self.edge_kind,
            self.status,
            if self.dry_run { ", dry run" } else { "" }
        );
        writeln!(f, "{title}")?;
        writeln!(f, "{}", "=".repeat(title.chars().count()))?;
        writeln!(f, "rows            {}", self.total_rows)?;
        writeln!(
            f,
            "resolved        {} ({:.1}%)",
            self.resolved_rows,
            self.resolution_rate() * 100.0
        )?;
        writeln!(f, "  inserted      {}", self.inserted)?;
        writeln!(f, "  existing      {}", self.skipped_existing)?;
        writeln!(f, "  uncommitted   {}", self.uncommitted)?;
        writeln!(f, "dropped         {}", self.unresolved_rows)?;
        writeln!(f, "batches         {}", self.batches_committed)?;
        if let (Some(before), Some(after)) = (self.associations_before, self.associations_after) {
            writeln!(f, "associations    {before} -> {after}")?;
        }

        let mut section = |title: &str,
                           body: &mut dyn FnMut(&mut fmt::Formatter<'_>) -> fmt::Result|
         -> fmt::Result {
            writeln!(f)?;
            writeln!(f, "{title}")?;
            writeln!(f, "{}", "-".repeat(title.chars().count()))?;
            body(f)
        };

        if !self.dropped_by_provenance.is_empty() {
            section("Dropped (left/right)", &mut |f| {
                for ((l, r), n) in &self.dropped_by_provenance {
                    writeln!(f, "{l}/{r}  {n}")?;
                }
                Ok(())
            })?;
        }

        for (side, stats) in [("Left", &self.left), ("Right", &self.right)] {
            let title = format!("{side}: {}", stats.kind);
            section(&title, &mut |f| {
                for (ns, n) in &stats.resolved {
                    writeln!(f, "+ {}  {n}", stats.label(*ns))?;
                }
                for (reason, n) in &stats.unresolved {
                    writeln!(f, "- {reason}  {n}")?;
                }
                for (ns, codes) in &stats.unresolved_codes {
                    let sample: Vec<&str> = codes.sample().collect();
                    writeln!(
                        f,
                        "? {}  {} distinct: {}",
                        stats.label(*ns),
                        codes.distinct(),
                        sample.join(", ")
                    )?;
                }
                Ok(())
            })?;
        }

        if !self.conflicts.is_empty() {
            section("Mapping conflicts", &mut |f| {
                for c in &self.conflicts {
                    let targets: Vec<&str> = c.targets.iter().map(String::as_str).collect();
                    writeln!(f, "! {}:{} -> {}", c.namespace, c.source_code, targets.join(", "))?;
                }
                Ok(())
            })?;
        }
        Ok(())
    }
}
