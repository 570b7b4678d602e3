//! Association loading.
//!
//! An [`AssociationLoader`] consumes raw association rows, resolves both endpoints with
//! two prebuilt [`CrossReferenceResolver`]s and writes fully resolved rows to a
//! [`TargetStore`] in batches.
//!
//! - A row is persisted only if **both** endpoints resolve; everything else is dropped
//!   and accounted for in the [`ReconciliationReport`].
//! - Batches are atomic and idempotent: re-running a load inserts nothing new.
//! - Cancellation is checked before every row. Pending rows are committed as a short
//!   batch first, so the report covers exactly the rows of the committed batches.
//! - A failed commit or an unreadable source aborts the run. The error carries the
//!   partial report; batches committed before the failure stay committed.

mod control;

use std::time::Duration;

use tracing::{debug, error, info, warn};

pub use control::{CancelFlag, LoadProgress};

use crate::{
    config::{EndpointCfg, LoaderConfig},
    identifier::IdentifierScheme,
    report::{ReconciliationReport, RunStatus},
    resolver::{CrossReferenceResolver, MappingRecord, Outcome, Resolution, ResolverError},
    source::{RawAssociation, SourceError, non_blank},
    store::{NewAssociation, StoreError, TargetStore},
};

/// Errors that end a load run.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// A resolver could not be built (corrupt mapping table, bad prefix).
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    /// The store failed outside of a batch commit (snapshot, counts).
    #[error("target store error: {0}")]
    Store(#[source] StoreError),

    /// A batch could not be committed. Earlier batches stay committed.
    #[error("batch commit failed: {source}")]
    Commit {
        /// Store error.
        source: StoreError,
        /// Report up to and including the rolled-back batch.
        partial: Box<ReconciliationReport>,
    },

    /// The source itself failed (I/O).
    #[error("association source failed: {source}")]
    Source {
        /// Source error.
        source: SourceError,
        /// Report up to the failure.
        partial: Box<ReconciliationReport>,
    },
}

impl LoadError {
    /// The partial report of a run that started consuming rows.
    pub fn partial_report(&self) -> Option<&ReconciliationReport> {
        match self {
            LoadError::Commit { partial, .. } | LoadError::Source { partial, .. } => {
                Some(&**partial)
            }
            LoadError::Resolver(_) | LoadError::Store(_) => None,
        }
    }

    fn partial_report_mut(&mut self) -> Option<&mut ReconciliationReport> {
        match self {
            LoadError::Commit { partial, .. } | LoadError::Source { partial, .. } => {
                Some(&mut **partial)
            }
            LoadError::Resolver(_) | LoadError::Store(_) => None,
        }
    }
}

/// Run tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Resolved rows per commit.
    pub batch_size: usize,
    /// Upper bound for one batch commit.
    pub commit_timeout: Duration,
    /// Distinct unresolved codes listed per namespace in the report.
    pub sample_limit: usize,
    /// Resolve and report, but write nothing.
    pub dry_run: bool,
    /// Stop (as cancelled) once this many batches are committed. Dry runs commit nothing
    /// and ignore it.
    pub max_batches: Option<u64>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            commit_timeout: Duration::from_secs(30),
            sample_limit: 20,
            dry_run: false,
            max_batches: None,
        }
    }
}

impl LoadOptions {
    /// Options of a normalized [`LoaderConfig`].
    pub fn from_config(cfg: &LoaderConfig) -> Self {
        Self {
            batch_size: cfg.batch_size,
            commit_timeout: cfg.commit_timeout(),
            sample_limit: cfg.sample_limit,
            dry_run: false,
            max_batches: None,
        }
    }

    /// Builder-style dry-run toggle.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

type ProgressFn<'a> = Box<dyn FnMut(&LoadProgress) + 'a>;

/// Batch loader for one edge kind.
pub struct AssociationLoader<'a, S: TargetStore + ?Sized> {
    store: &'a mut S,
    left: &'a CrossReferenceResolver,
    right: &'a CrossReferenceResolver,
    edge_kind: String,
    options: LoadOptions,
    cancel: Option<CancelFlag>,
    progress: Option<ProgressFn<'a>>,
}

impl<'a, S: TargetStore + ?Sized> AssociationLoader<'a, S> {
    /// Loader writing `edge_kind` rows between the `left` and `right` endpoints.
    pub fn new(
        store: &'a mut S,
        left: &'a CrossReferenceResolver,
        right: &'a CrossReferenceResolver,
        edge_kind: &str,
        options: LoadOptions,
    ) -> Self {
        Self {
            store,
            left,
            right,
            edge_kind: edge_kind.to_string(),
            options: LoadOptions {
                batch_size: options.batch_size.max(1),
                ..options
            },
            cancel: None,
            progress: None,
        }
    }

    /// Stop before the next row once `flag` is set, committing pending rows first.
    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Call `f` after every committed batch.
    pub fn with_progress(mut self, f: impl FnMut(&LoadProgress) + 'a) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    /// Consume `rows` to completion, cancellation or the first fatal error.
    pub fn run<I>(mut self, rows: I) -> Result<ReconciliationReport, LoadError>
    where
        I: IntoIterator<Item = Result<RawAssociation, SourceError>>,
    {
        let mut rows = rows.into_iter();
        let total = match rows.size_hint() {
            (lo, Some(hi)) if lo == hi => Some(hi as u64),
            _ => None,
        };
        let mut report = ReconciliationReport::new(
            &self.edge_kind,
            self.left,
            self.right,
            self.options.sample_limit,
            self.options.dry_run,
        );
        let mut batch: Vec<NewAssociation> = Vec::with_capacity(self.options.batch_size);

        info!(
            edge_kind = %self.edge_kind,
            batch_size = self.options.batch_size,
            dry_run = self.options.dry_run,
            total_rows = ?total,
            "association load started"
        );

        loop {
            if self.should_stop(&report) {
                // pending rows still go out as one short atomic batch
                if !batch.is_empty() {
                    self.flush(&mut batch, &mut report, total)?;
                }
                report.finish(RunStatus::Cancelled);
                info!(
                    edge_kind = %self.edge_kind,
                    rows = report.total_rows,
                    batches = report.batches_committed,
                    "association load cancelled"
                );
                return Ok(report);
            }

            let Some(item) = rows.next() else { break };
            let raw = match item {
                Ok(raw) => raw,
                Err(source) => {
                    report.uncommitted += batch.len() as u64;
                    report.finish(RunStatus::Failed);
                    error!(edge_kind = %self.edge_kind, error = %source, "association source failed");
                    return Err(LoadError::Source {
                        source,
                        partial: Box::new(report),
                    });
                }
            };

            if let Some(row) = self.reconcile(raw, &mut report) {
                batch.push(row);
            }
            if batch.len() >= self.options.batch_size {
                self.flush(&mut batch, &mut report, total)?;
            }
        }

        if !batch.is_empty() {
            self.flush(&mut batch, &mut report, total)?;
        }
        report.finish(RunStatus::Completed);

        info!(
            edge_kind = %self.edge_kind,
            rows = report.total_rows,
            resolved = report.resolved_rows,
            inserted = report.inserted,
            skipped = report.skipped_existing,
            dropped = report.unresolved_rows,
            "association load finished"
        );
        Ok(report)
    }

    fn should_stop(&self, report: &ReconciliationReport) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
            || self
                .options
                .max_batches
                .is_some_and(|max| report.batches_committed >= max)
    }

    fn reconcile(
        &self,
        raw: RawAssociation,
        report: &mut ReconciliationReport,
    ) -> Option<NewAssociation> {
        let (left, right) = match (raw.left_id.as_deref(), raw.right_id.as_deref()) {
            (Some(l), Some(r)) => (self.left.resolve_str(l), self.right.resolve_str(r)),
            _ => {
                debug!(line = ?raw.line, "association row lacks an identifier");
                (Resolution::malformed(), Resolution::malformed())
            }
        };
        if !report.record_row(&left, &right) {
            return None;
        }

        match (left.outcome, right.outcome) {
            (
                Outcome::Resolved {
                    code: left_code,
                    provenance: left_provenance,
                },
                Outcome::Resolved {
                    code: right_code,
                    provenance: right_provenance,
                },
            ) => Some(NewAssociation {
                left_kind: self.left.scheme().kind().to_string(),
                left_code,
                right_kind: self.right.scheme().kind().to_string(),
                right_code,
                edge_kind: self.edge_kind.clone(),
                evidence: non_blank(raw.evidence),
                frequency: non_blank(raw.frequency),
                left_provenance,
                right_provenance,
            }),
            _ => None,
        }
    }

    fn flush(
        &mut self,
        batch: &mut Vec<NewAssociation>,
        report: &mut ReconciliationReport,
        total: Option<u64>,
    ) -> Result<(), LoadError> {
        if self.options.dry_run {
            report.uncommitted += batch.len() as u64;
            batch.clear();
            return Ok(());
        }

        match self
            .store
            .upsert_association_batch(batch, self.options.commit_timeout)
        {
            Ok(outcome) => {
                report.inserted += outcome.inserted;
                report.skipped_existing += outcome.skipped;
                report.batches_committed += 1;
                batch.clear();

                let progress = LoadProgress {
                    batches_committed: report.batches_committed,
                    rows_processed: report.total_rows,
                    total_rows: total,
                    inserted: report.inserted,
                    skipped: report.skipped_existing,
                };
                info!(
                    edge_kind = %self.edge_kind,
                    batch = progress.batches_committed,
                    rows = progress.rows_processed,
                    total = ?progress.total_rows,
                    inserted = progress.inserted,
                    skipped = progress.skipped,
                    "batch committed"
                );
                if let Some(cb) = self.progress.as_mut() {
                    cb(&progress);
                }
                Ok(())
            }
            Err(source) => {
                report.uncommitted += batch.len() as u64;
                batch.clear();
                report.finish(RunStatus::Failed);
                error!(
                    edge_kind = %self.edge_kind,
                    committed_batches = report.batches_committed,
                    error = %source,
                    "batch commit failed"
                );
                Err(LoadError::Commit {
                    source,
                    partial: Box::new(report.clone()),
                })
            }
        }
    }
}

fn build_resolver<S: TargetStore + ?Sized>(
    store: &mut S,
    endpoint: &EndpointCfg,
    mappings: &[MappingRecord],
    accepted_relations: Option<&[String]>,
) -> Result<CrossReferenceResolver, LoadError> {
    let scheme = IdentifierScheme::from_endpoint(endpoint).map_err(ResolverError::from)?;
    let known = store.entity_codes(&endpoint.kind).map_err(LoadError::Store)?;
    debug!(kind = %endpoint.kind, entities = known.len(), "entity snapshot taken");
    Ok(CrossReferenceResolver::build(
        scheme,
        mappings.iter().cloned(),
        known,
        accepted_relations,
    )?)
}

/// Build both resolvers from `cfg`, run the load and record the run in the store.
///
/// The report carries the association count of the edge kind before and after the run.
/// Failing to write the audit row is logged and does not fail the load.
pub fn load_associations<S, M, I>(
    store: &mut S,
    cfg: &LoaderConfig,
    mappings: M,
    rows: I,
    options: LoadOptions,
    cancel: Option<CancelFlag>,
) -> Result<ReconciliationReport, LoadError>
where
    S: TargetStore + ?Sized,
    M: IntoIterator<Item = MappingRecord>,
    I: IntoIterator<Item = Result<RawAssociation, SourceError>>,
{
    let mappings: Vec<MappingRecord> = mappings.into_iter().collect();
    let accepted = cfg.mapping.accepted_relations.as_deref();
    let left = build_resolver(store, &cfg.left, &mappings, accepted)?;
    let right = build_resolver(store, &cfg.right, &mappings, accepted)?;
    let before = store
        .count_associations(&cfg.edge_kind)
        .map_err(LoadError::Store)?;

    let mut loader = AssociationLoader::new(&mut *store, &left, &right, &cfg.edge_kind, options);
    if let Some(flag) = cancel {
        loader = loader.with_cancel(flag);
    }
    let outcome = loader.run(rows);

    match outcome {
        Ok(mut report) => {
            report.associations_before = Some(before);
            report.associations_after = Some(
                store
                    .count_associations(&cfg.edge_kind)
                    .map_err(LoadError::Store)?,
            );
            if let Err(e) = store.record_run(&report) {
                warn!(error = %e, "could not record load run");
            }
            Ok(report)
        }
        Err(mut err) => {
            if let Some(partial) = err.partial_report_mut() {
                partial.associations_before = Some(before);
                partial.associations_after = store.count_associations(&cfg.edge_kind).ok();
                if let Err(e) = store.record_run(partial) {
                    warn!(error = %e, "could not record failed load run");
                }
            }
            Err(err)
        }
    }
}
