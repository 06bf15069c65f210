//! Identifier normalization and lookup routing.
//!
//! Raw identifiers arrive as DOIs, PubMed IDs, PubMed Central IDs or OpenAlex
//! work IDs, optionally wrapped in resolver or service URLs. [`route`] strips
//! the wrapping and builds the OpenAlex lookup path for the identifier.

use crate::error::{HarvestError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// OpenAlex URL prefixes; the identifier is the last path segment.
const OPENALEX_PREFIXES: &[&str] = &[
    "https://api.openalex.org/works/",
    "https://api.openalex.org/",
    "https://openalex.org/works/",
    "https://openalex.org/",
];

/// DOI resolver prefixes, matched case-insensitively.
const DOI_PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

#[allow(clippy::expect_used)]
static DOI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^10\.\d+(?:\.\d+)*/\S+$").expect("DOI regex is valid")
});

#[allow(clippy::expect_used)]
static PMCID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i:pmc)\d+$").expect("PMCID regex is valid"));

#[allow(clippy::expect_used)]
static OPENALEX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^W\d+$").expect("OpenAlex ID regex is valid"));

/// Identifier scheme recognized by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Doi,
    Pmid,
    Pmcid,
    OpenAlex,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Doi => "DOI",
            Self::Pmid => "PMID",
            Self::Pmcid => "PMCID",
            Self::OpenAlex => "OpenAlex ID",
        };
        f.write_str(name)
    }
}

/// A routed identifier ready for an OpenAlex works lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTarget {
    /// Normalized identifier, used as the work uid and cache key
    pub uid: String,
    /// Detected scheme
    pub kind: IdentifierKind,
    /// Path segment appended to `{api_base}/works/`
    pub path: String,
}

impl LookupTarget {
    /// Full lookup URL against the given API base (no trailing slash needed).
    pub fn url(&self, api_base: &str) -> String {
        format!("{}/works/{}", api_base.trim_end_matches('/'), self.path)
    }
}

/// Strip service and resolver prefixes from a raw identifier.
pub fn normalize(raw: &str) -> String {
    let mut id = raw.trim();

    for prefix in OPENALEX_PREFIXES {
        if id.starts_with(prefix) {
            id = id.rsplit('/').next().unwrap_or(id);
            break;
        }
    }

    let lower = id.to_ascii_lowercase();
    for prefix in DOI_PREFIXES {
        if lower.starts_with(prefix) {
            id = id[prefix.len()..].trim_start();
            break;
        }
    }

    id.to_string()
}

/// Classify a raw identifier and build its lookup target.
///
/// Classification order: DOI, PMID (all digits), PMCID, OpenAlex work ID.
///
/// # Errors
///
/// Returns [`HarvestError::InvalidIdentifier`] when no scheme matches.
pub fn route(raw: &str) -> Result<LookupTarget> {
    let id = normalize(raw);

    let (uid, kind, path) = if DOI_PATTERN.is_match(&id) {
        // '#' and '?' would otherwise end the URL path
        let path = format!("https://doi.org/{}", id.replace('#', "%23").replace('?', "%3F"));
        (id, IdentifierKind::Doi, path)
    } else if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        let path = format!("pmid:{}", id);
        (id, IdentifierKind::Pmid, path)
    } else if PMCID_PATTERN.is_match(&id) {
        let uid = id.to_ascii_uppercase();
        let path = format!("pmcid:{}", uid);
        (uid, IdentifierKind::Pmcid, path)
    } else if OPENALEX_PATTERN.is_match(&id) {
        (id.clone(), IdentifierKind::OpenAlex, id)
    } else {
        return Err(HarvestError::InvalidIdentifier(raw.trim().to_string()));
    };

    Ok(LookupTarget { uid, kind, path })
}
