//! Identifier normalization.
//!
//! Source rows carry disease / phenotype identifiers in several shapes:
//! `ORPHA:558`, `orpha:558`, `OMIM:154700`, `MONDO:0007947`, a bare `558`, or
//! free text. An [`IdentifierScheme`] describes one endpoint's namespaces (the
//! canonical prefix plus up to two alternate prefixes) and classifies a raw string
//! into a [`RawIdentifier`] `(namespace, code)`.
//!
//! Classification is total: every input, including empty or garbage strings,
//! yields a value. Rules are tried in order, first match wins, after trimming:
//! 1. `PRIMARY:<ascii digits>` (case-insensitive prefix) → [`Namespace::Primary`]
//! 2. `ALT_A:<word>` → [`Namespace::AltA`]
//! 3. `ALT_B:<word>` → [`Namespace::AltB`]
//! 4. `<ascii digits>` → [`Namespace::BareNumeric`]
//! 5. anything else → [`Namespace::Unrecognized`], code = the input unchanged

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::EndpointCfg;

static BARE_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+$").expect("bare numeric pattern is valid"));

/// Which identifier scheme a raw string was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Namespace {
    /// The canonical namespace of the endpoint (e.g., `ORPHA`).
    Primary,
    /// First alternate namespace (e.g., `OMIM`); needs a mapping.
    AltA,
    /// Second alternate namespace (e.g., `MONDO`); needs a mapping.
    AltB,
    /// Digits without a prefix; only ever checked against canonical codes.
    BareNumeric,
    /// Nothing matched.
    Unrecognized,
}

impl Namespace {
    /// Stable kebab-case label, identical to the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Primary => "primary",
            Namespace::AltA => "alt-a",
            Namespace::AltB => "alt-b",
            Namespace::BareNumeric => "bare-numeric",
            Namespace::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified, not yet resolved identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawIdentifier {
    /// The string exactly as it came from the source (empty for null).
    pub original: String,
    /// Inferred namespace.
    pub namespace: Namespace,
    /// Code with the namespace prefix stripped; the original string when unrecognized.
    pub code: String,
}

impl RawIdentifier {
    fn unrecognized(original: &str) -> Self {
        Self {
            original: original.to_string(),
            namespace: Namespace::Unrecognized,
            code: original.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Prefix {
    label: String,
    pattern: Regex,
}

impl Prefix {
    fn new(label: &str, body: &str) -> Result<Self, regex::Error> {
        let label = label.trim().trim_end_matches(':').to_uppercase();
        let pattern = Regex::new(&format!("(?i)^{}:({body})$", regex::escape(&label)))?;
        Ok(Self { label, pattern })
    }

    fn capture<'s>(&self, s: &'s str) -> Option<&'s str> {
        self.pattern
            .captures(s)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

/// Namespaces recognized for one association endpoint (one entity kind).
#[derive(Debug, Clone)]
pub struct IdentifierScheme {
    kind: String,
    primary: Prefix,
    alt_a: Option<Prefix>,
    alt_b: Option<Prefix>,
}

impl IdentifierScheme {
    /// Compile a scheme. Prefixes are matched case-insensitively; a trailing `:` is ignored.
    pub fn new(
        kind: impl Into<String>,
        primary: &str,
        alt_a: Option<&str>,
        alt_b: Option<&str>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            kind: kind.into(),
            primary: Prefix::new(primary, "[0-9]+")?,
            alt_a: alt_a.map(|p| Prefix::new(p, r"\w+")).transpose()?,
            alt_b: alt_b.map(|p| Prefix::new(p, r"\w+")).transpose()?,
        })
    }

    /// Compile the scheme described by a normalized endpoint configuration.
    pub fn from_endpoint(cfg: &EndpointCfg) -> Result<Self, regex::Error> {
        Self::new(
            cfg.kind.clone(),
            &cfg.primary,
            cfg.alt_a.as_deref(),
            cfg.alt_b.as_deref(),
        )
    }

    /// Entity kind the canonical namespace belongs to (e.g., "disease").
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Uppercase prefix label configured for `ns`, if any.
    pub fn prefix(&self, ns: Namespace) -> Option<&str> {
        match ns {
            Namespace::Primary => Some(self.primary.label.as_str()),
            Namespace::AltA => self.alt_a.as_ref().map(|p| p.label.as_str()),
            Namespace::AltB => self.alt_b.as_ref().map(|p| p.label.as_str()),
            Namespace::BareNumeric | Namespace::Unrecognized => None,
        }
    }

    /// Reverse lookup of a prefix label such as `"omim"` → [`Namespace::AltA`].
    pub fn namespace_of_prefix(&self, label: &str) -> Option<Namespace> {
        let label = label.trim().trim_end_matches(':');
        [Namespace::Primary, Namespace::AltA, Namespace::AltB]
            .into_iter()
            .find(|ns| {
                self.prefix(*ns)
                    .is_some_and(|p| p.eq_ignore_ascii_case(label))
            })
    }

    /// Classify a raw identifier. Never fails.
    pub fn normalize(&self, raw: &str) -> RawIdentifier {
        let s = raw.trim();
        if s.is_empty() {
            return RawIdentifier::unrecognized(raw);
        }

        let candidates = [
            (Namespace::Primary, Some(&self.primary)),
            (Namespace::AltA, self.alt_a.as_ref()),
            (Namespace::AltB, self.alt_b.as_ref()),
        ];
        for (ns, prefix) in candidates {
            if let Some(code) = prefix.and_then(|p| p.capture(s)) {
                return RawIdentifier {
                    original: raw.to_string(),
                    namespace: ns,
                    code: code.to_string(),
                };
            }
        }

        if BARE_NUMERIC.is_match(s) {
            return RawIdentifier {
                original: raw.to_string(),
                namespace: Namespace::BareNumeric,
                code: s.to_string(),
            };
        }

        RawIdentifier::unrecognized(raw)
    }

    /// [`Self::normalize`] for nullable columns; `None` is unrecognized with an empty code.
    pub fn normalize_opt(&self, raw: Option<&str>) -> RawIdentifier {
        self.normalize(raw.unwrap_or_default())
    }
}
