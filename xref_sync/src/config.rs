//! Loader configuration: parsing, normalization, and loading.
//!
//! A TOML file describes one association feed:
//! - the edge kind written into the `association` table
//! - the identifier scheme of each endpoint (canonical prefix + optional alternates)
//! - batching and commit-timeout knobs
//! - which mapping relations are trusted
//!
//! ```toml
//! edge_kind = "has_phenotype"
//! batch_size = 1000
//!
//! [left]
//! kind = "disease"
//! primary = "ORPHA"
//! alt_a = "OMIM"
//! alt_b = "MONDO"
//!
//! [right]
//! kind = "phenotype"
//! primary = "HP"
//! ```
//!
//! Key behaviors:
//! - Normalization lowercases kinds / edge kind, uppercases prefixes, strips a
//!   trailing `:` from prefixes, and rejects empty or clashing prefixes.
//! - `accepted_relations` is uppercased and de-duplicated while preserving order.
//!
//! Entrypoints:
//! - Parse + normalize from a TOML string: [`load_config_str`]
//! - Parse + normalize from a file path: [`load_config_path`]

use std::{collections::HashSet, mem, time::Duration};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use toml::from_str;

/// Smallest accepted batch size.
pub const MIN_BATCH_SIZE: usize = 1;
/// Largest accepted batch size; bounds the size of one write transaction.
pub const MAX_BATCH_SIZE: usize = 50_000;

fn default_batch_size() -> usize {
    1000
}

fn default_commit_timeout_ms() -> u64 {
    30_000
}

fn default_sample_limit() -> usize {
    20
}

/// Top-level loader configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    /// Edge kind stored with every association (part of the idempotency key).
    pub edge_kind: String,
    /// Resolved rows per write transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Upper bound for one batch commit, in milliseconds.
    #[serde(default = "default_commit_timeout_ms")]
    pub commit_timeout_ms: u64,
    /// How many unresolved codes per namespace the report keeps as samples.
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,
    /// Scheme of the left endpoint (source column `left_id`).
    pub left: EndpointCfg,
    /// Scheme of the right endpoint (source column `right_id`).
    pub right: EndpointCfg,
    /// Mapping table options.
    #[serde(default)]
    pub mapping: MappingCfg,
}

impl LoaderConfig {
    /// Commit timeout as a [`Duration`].
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }
}

/// Identifier scheme for one endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointCfg {
    /// Entity kind in the target store (e.g., "disease").
    pub kind: String,
    /// Canonical namespace prefix (e.g., "ORPHA").
    pub primary: String,
    /// First alternate namespace prefix (e.g., "OMIM").
    pub alt_a: Option<String>,
    /// Second alternate namespace prefix (e.g., "MONDO").
    pub alt_b: Option<String>,
}

/// Mapping table options.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MappingCfg {
    /// If set, only mapping rows whose relation is listed are indexed
    /// (e.g., `["E"]` for exact matches). Rows without a relation are then ignored.
    pub accepted_relations: Option<Vec<String>>,
}

/// Summary of changes performed during normalization.
#[derive(Debug, Default)]
pub struct NormalizationReport {
    /// Prefixes rewritten by trimming, uppercasing or dropping a trailing `:`.
    pub prefixes_rewritten: usize,
    /// Duplicate accepted relations removed.
    pub relations_deduped: usize,
}

fn normalize_prefix(raw: &mut String, what: &str, report: &mut NormalizationReport) -> anyhow::Result<()> {
    let norm = raw.trim().trim_end_matches(':').trim().to_uppercase();
    if norm.is_empty() {
        bail!("{what} prefix cannot be empty after trimming");
    }
    if norm.contains(char::is_whitespace) {
        bail!("{what} prefix '{norm}' must not contain whitespace");
    }
    if norm != *raw {
        report.prefixes_rewritten += 1;
    }
    *raw = norm;
    Ok(())
}

fn normalize_endpoint(
    ep: &mut EndpointCfg,
    side: &str,
    report: &mut NormalizationReport,
) -> anyhow::Result<()> {
    ep.kind = ep.kind.trim().to_lowercase();
    if ep.kind.is_empty() {
        bail!("{side}.kind cannot be empty after trimming");
    }

    normalize_prefix(&mut ep.primary, &format!("{side}.primary"), report)?;
    if let Some(p) = ep.alt_a.as_mut() {
        normalize_prefix(p, &format!("{side}.alt_a"), report)?;
    }
    if let Some(p) = ep.alt_b.as_mut() {
        normalize_prefix(p, &format!("{side}.alt_b"), report)?;
    }

    let mut seen = HashSet::new();
    for p in std::iter::once(&ep.primary)
        .chain(ep.alt_a.as_ref())
        .chain(ep.alt_b.as_ref())
    {
        if !seen.insert(p.as_str()) {
            bail!("{side}: prefix '{p}' is configured for more than one namespace");
        }
    }
    Ok(())
}

/// Normalize a configuration in-place.
///
/// What normalization does:
/// - Trim + lowercase `edge_kind` and endpoint kinds
/// - Trim + uppercase prefixes, drop a trailing `:`
/// - Deduplicate and uppercase `mapping.accepted_relations`, preserving first occurrence order
///
/// Errors:
/// - Empty edge kind, kinds or prefixes after trimming
/// - The same prefix configured twice within one endpoint
/// - `batch_size` outside `MIN_BATCH_SIZE..=MAX_BATCH_SIZE`, zero `commit_timeout_ms`
pub fn normalize_config(cfg: &mut LoaderConfig) -> anyhow::Result<NormalizationReport> {
    let mut report = NormalizationReport::default();

    cfg.edge_kind = cfg.edge_kind.trim().to_lowercase();
    if cfg.edge_kind.is_empty() {
        bail!("edge_kind cannot be empty after trimming");
    }
    if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&cfg.batch_size) {
        bail!(
            "batch_size must be within {MIN_BATCH_SIZE}..={MAX_BATCH_SIZE}, got {}",
            cfg.batch_size
        );
    }
    if cfg.commit_timeout_ms == 0 {
        bail!("commit_timeout_ms must be greater than zero");
    }

    normalize_endpoint(&mut cfg.left, "left", &mut report)?;
    normalize_endpoint(&mut cfg.right, "right", &mut report)?;

    if let Some(list) = cfg.mapping.accepted_relations.as_mut() {
        let before_len = list.len();
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(before_len);
        for rel in mem::take(list) {
            let rel = rel.trim().to_uppercase();
            if rel.is_empty() {
                bail!("mapping.accepted_relations entries cannot be empty");
            }
            if seen.insert(rel.clone()) {
                out.push(rel);
            }
        }
        report.relations_deduped += before_len.saturating_sub(out.len());
        *list = out;
    }

    Ok(report)
}

/// Parse and normalize a configuration from a TOML string.
///
/// Errors:
/// - TOML parse failures (including unknown fields)
/// - Normalization errors (see [`normalize_config`])
pub fn load_config_str(toml_str: &str) -> anyhow::Result<LoaderConfig> {
    let mut cfg: LoaderConfig = from_str(toml_str).context("failed to parse loader config TOML")?;
    let report = normalize_config(&mut cfg).context("normalize_config failed")?;
    tracing::debug!(
        prefixes_rewritten = report.prefixes_rewritten,
        relations_deduped = report.relations_deduped,
        "loader config normalized"
    );
    Ok(cfg)
}

/// Read a configuration TOML file from disk, parse, and normalize it.
pub fn load_config_path(path: impl AsRef<std::path::Path>) -> anyhow::Result<LoaderConfig> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read loader config {}", path.as_ref().display()))?;
    load_config_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSY: &str = r#"
        edge_kind = " Has_Phenotype "
        batch_size = 500

        [left]
        kind = " Disease"
        primary = "orpha:"
        alt_a = " omim "
        alt_b = "Mondo"

        [right]
        kind = "phenotype"
        primary = "HP"

        [mapping]
        accepted_relations = ["e", "E", " ntbt "]
    "#;

    #[test]
    fn normalizes_prefixes_kinds_and_relations() {
        let mut cfg: LoaderConfig = toml::from_str(MESSY).unwrap();
        let rep = normalize_config(&mut cfg).unwrap();

        assert_eq!(cfg.edge_kind, "has_phenotype");
        assert_eq!(cfg.left.kind, "disease");
        assert_eq!(cfg.left.primary, "ORPHA");
        assert_eq!(cfg.left.alt_a.as_deref(), Some("OMIM"));
        assert_eq!(cfg.left.alt_b.as_deref(), Some("MONDO"));
        assert_eq!(rep.prefixes_rewritten, 3);
        assert_eq!(
            cfg.mapping.accepted_relations,
            Some(vec!["E".to_string(), "NTBT".to_string()])
        );
        assert_eq!(rep.relations_deduped, 1);
    }

    #[test]
    fn defaults_apply() {
        let cfg = load_config_str(
            r#"
            edge_kind = "has_phenotype"
            [left]
            kind = "disease"
            primary = "ORPHA"
            [right]
            kind = "phenotype"
            primary = "HP"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.batch_size, 1000);
        assert_eq!(cfg.commit_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.sample_limit, 20);
        assert!(cfg.mapping.accepted_relations.is_none());
    }

    #[test]
    fn duplicate_prefix_within_endpoint_errors() {
        let err = load_config_str(
            r#"
            edge_kind = "x"
            [left]
            kind = "disease"
            primary = "ORPHA"
            alt_a = "orpha"
            [right]
            kind = "phenotype"
            primary = "HP"
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("more than one namespace"));
    }

    #[test]
    fn batch_size_bounds_are_enforced() {
        let err = load_config_str(
            r#"
            edge_kind = "x"
            batch_size = 0
            [left]
            kind = "disease"
            primary = "ORPHA"
            [right]
            kind = "phenotype"
            primary = "HP"
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("batch_size"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = load_config_str(
            r#"
            edge_kind = "x"
            batchsize = 10
            [left]
            kind = "disease"
            primary = "ORPHA"
            [right]
            kind = "phenotype"
            primary = "HP"
            "#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse"));
    }

    #[test]
    fn snapshot_normalized_config() {
        let mut cfg: LoaderConfig = toml::from_str(MESSY).unwrap();
        let _ = normalize_config(&mut cfg).unwrap();

        insta::assert_json_snapshot!("normalized_config", &cfg);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prefixes_uppercased_without_colon(
            prefix in "[A-Za-z][A-Za-z0-9_]{0,7}",
            colon in proptest::bool::ANY,
        ) {
            let raw = if colon { format!(" {prefix}: ") } else { prefix.clone() };
            let mut cfg = LoaderConfig {
                edge_kind: "e".into(),
                batch_size: 10,
                commit_timeout_ms: 10,
                sample_limit: 1,
                left: EndpointCfg { kind: "d".into(), primary: raw, alt_a: None, alt_b: None },
                right: EndpointCfg { kind: "p".into(), primary: "HP".into(), alt_a: None, alt_b: None },
                mapping: MappingCfg::default(),
            };
            normalize_config(&mut cfg).unwrap();
            prop_assert_eq!(cfg.left.primary, prefix.to_uppercase());
        }
    }
}
