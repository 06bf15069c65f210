//! Work records and typed access to OpenAlex metadata.
//!
//! The OpenAlex document is kept as raw JSON ([`WorkMetadata`]); every field
//! the pipeline reads goes through an accessor returning `Option`, since any
//! of them may be missing or null.

use crate::error::{ErrorKind, HarvestError};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// PubMed URL prefix used by OpenAlex in `ids.pmid`
const PUBMED_PREFIX: &str = "https://pubmed.ncbi.nlm.nih.gov/";

/// Role under which a work was retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryType {
    #[serde(alias = "primary entry")]
    Primary,
    #[serde(alias = "reference of primary entry")]
    ReferenceOfPrimary,
    #[serde(alias = "citing primary entry")]
    CitingPrimary,
    #[serde(alias = "related to primary entry")]
    RelatedToPrimary,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Primary => "primary",
            Self::ReferenceOfPrimary => "reference-of-primary",
            Self::CitingPrimary => "citing-primary",
            Self::RelatedToPrimary => "related-to-primary",
        };
        f.write_str(name)
    }
}

/// A timestamped entry in a work's audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub timestamp: NaiveDateTime,
    pub message: String,
}

impl StatusMessage {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().naive_local(),
            message: message.into(),
        }
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.timestamp.format("%Y-%m-%d %H:%M:%S"), self.message)
    }
}

/// Raw OpenAlex work document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkMetadata(pub Value);

impl WorkMetadata {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    fn str_at(&self, pointer: &str) -> Option<&str> {
        self.0
            .pointer(pointer)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Full OpenAlex ID, e.g. `https://openalex.org/W2741809807`
    pub fn id(&self) -> Option<&str> {
        self.str_at("/id")
    }

    /// Canonical ID without the URL prefix, e.g. `W2741809807`
    pub fn short_id(&self) -> Option<&str> {
        self.id().and_then(|id| id.rsplit('/').next())
    }

    /// DOI without the resolver prefix.
    pub fn doi(&self) -> Option<&str> {
        self.str_at("/ids/doi")
            .or_else(|| self.str_at("/doi"))
            .map(strip_doi_prefix)
    }

    /// PubMed ID (digits only).
    pub fn pmid(&self) -> Option<&str> {
        self.str_at("/ids/pmid").map(|pmid| {
            pmid.strip_prefix(PUBMED_PREFIX)
                .unwrap_or(pmid)
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or(pmid)
        })
    }

    /// PubMed Central ID, always `PMC`-prefixed.
    pub fn pmcid(&self) -> Option<String> {
        let raw = self.str_at("/ids/pmcid")?;
        let last = raw.trim_end_matches('/').rsplit('/').next()?;
        if last.is_empty() {
            return None;
        }
        match last.get(..3) {
            Some(prefix) if prefix.eq_ignore_ascii_case("pmc") => Some(format!("PMC{}", &last[3..])),
            _ => Some(format!("PMC{}", last)),
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.str_at("/title").or_else(|| self.str_at("/display_name"))
    }

    /// `best_oa_location` when present and not null.
    pub fn best_oa_location(&self) -> Option<&Value> {
        self.0.get("best_oa_location").filter(|v| v.is_object())
    }

    pub fn pdf_url(&self) -> Option<&str> {
        self.str_at("/best_oa_location/pdf_url")
    }

    pub fn landing_page_url(&self) -> Option<&str> {
        self.str_at("/best_oa_location/landing_page_url")
    }

    /// Open-access status. Either flag reporting `false` wins; with neither
    /// present the work is treated as closed.
    pub fn is_open_access(&self) -> bool {
        let work_flag = self.0.pointer("/open_access/is_oa").and_then(Value::as_bool);
        let location_flag = self
            .best_oa_location()
            .and_then(|loc| loc.get("is_oa"))
            .and_then(Value::as_bool);

        match (work_flag, location_flag) {
            (Some(false), _) | (_, Some(false)) | (None, None) => false,
            _ => true,
        }
    }

    pub fn cited_by_count(&self) -> Option<u64> {
        self.0.get("cited_by_count").and_then(Value::as_u64)
    }

    pub fn cited_by_api_url(&self) -> Option<&str> {
        self.str_at("/cited_by_api_url")
    }
}

fn strip_doi_prefix(doi: &str) -> &str {
    ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/"]
        .iter()
        .find_map(|prefix| doi.strip_prefix(prefix))
        .unwrap_or(doi)
}

/// A scholarly work as retrieved and tracked by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub uid: String,
    pub entry_types: BTreeSet<EntryType>,
    pub metadata: WorkMetadata,
    pub pdf_path: Option<PathBuf>,
    #[serde(default)]
    pub status_messages: Vec<StatusMessage>,
    pub persist_datetime: Option<NaiveDateTime>,
}

impl Work {
    pub fn new(uid: impl Into<String>, entry_type: EntryType, metadata: WorkMetadata) -> Self {
        Self {
            uid: uid.into(),
            entry_types: BTreeSet::from([entry_type]),
            metadata,
            pdf_path: None,
            status_messages: Vec::new(),
            persist_datetime: None,
        }
    }

    /// Append a timestamped status message.
    pub fn note(&mut self, message: impl Into<String>) {
        self.status_messages.push(StatusMessage::now(message));
    }

    /// Deterministic file stem: `{pmid|?}_{doi with '/' as '#'|?}_{canonical-id}`.
    pub fn file_stem(&self) -> String {
        let pmid = self.metadata.pmid().unwrap_or("?");
        let doi = self
            .metadata
            .doi()
            .map(|d| d.replace('/', "#"))
            .unwrap_or_else(|| "?".to_string());
        let canonical = self.metadata.short_id().unwrap_or(&self.uid);
        format!("{}_{}_{}", pmid, doi, canonical)
    }

    /// Whether `uid` names this work, by uid or by one of its secondary identifiers.
    pub fn matches(&self, uid: &str) -> bool {
        self.uid == uid
            || self.metadata.short_id() == Some(uid)
            || self.metadata.pmid() == Some(uid)
            || self.metadata.pmcid().is_some_and(|pmcid| pmcid.eq_ignore_ascii_case(uid))
            || self
                .metadata
                .doi()
                .is_some_and(|doi| doi.eq_ignore_ascii_case(uid))
    }

    /// Clear `pdf_path` if the file has disappeared since it was recorded.
    pub fn verify_pdf_path(&mut self) {
        if let Some(path) = &self.pdf_path {
            if !path.is_file() {
                let message = format!("PDF {} no longer exists; cleared path", path.display());
                self.pdf_path = None;
                self.note(message);
            }
        }
    }
}

/// An identifier that could not be resolved to a work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedCall {
    pub uid: String,
    pub error: ErrorKind,
    pub detail: String,
}

impl FailedCall {
    pub fn new(uid: impl Into<String>, error: &HarvestError) -> Self {
        Self {
            uid: uid.into(),
            error: error.kind(),
            detail: error.to_string(),
        }
    }
}

/// Canonical IDs of the open-access works in `works`.
pub fn open_access_ids(works: &[Work]) -> Vec<String> {
    works
        .iter()
        .filter(|w| w.metadata.is_open_access())
        .filter_map(|w| w.metadata.id().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_metadata() -> WorkMetadata {
        WorkMetadata::new(json!({
            "id": "https://openalex.org/W000000000",
            "title": "A sample work",
            "ids": {
                "doi": "https://doi.org/10.1111/00000000",
                "pmid": "https://pubmed.ncbi.nlm.nih.gov/1234567",
                "pmcid": "https://www.ncbi.nlm.nih.gov/pmc/articles/6341984"
            },
            "open_access": { "is_oa": true },
            "best_oa_location": {
                "is_oa": true,
                "pdf_url": "https://onlinelibrary.wiley.com/doi/pdfdirect/000/000"
            },
            "cited_by_count": 450,
            "cited_by_api_url": "https://api.openalex.org/works?filter=cites:W000000000"
        }))
    }

    #[test]
    fn test_metadata_accessors() {
        let meta = sample_metadata();
        assert_eq!(meta.short_id(), Some("W000000000"));
        assert_eq!(meta.doi(), Some("10.1111/00000000"));
        assert_eq!(meta.pmid(), Some("1234567"));
        assert_eq!(meta.pmcid().as_deref(), Some("PMC6341984"));
        assert!(meta.is_open_access());
        assert_eq!(meta.cited_by_count(), Some(450));
        assert!(meta.pdf_url().is_some());
    }

    #[test]
    fn test_missing_fields_are_none() {
        let meta = WorkMetadata::new(json!({ "id": "https://openalex.org/W1", "best_oa_location": null }));
        assert_eq!(meta.doi(), None);
        assert_eq!(meta.pmid(), None);
        assert_eq!(meta.pmcid(), None);
        assert!(meta.best_oa_location().is_none());
        assert!(meta.pdf_url().is_none());
        assert!(!meta.is_open_access());
        assert_eq!(meta.cited_by_count(), None);
    }

    #[test]
    fn test_closed_access_flag_wins() {
        let meta = WorkMetadata::new(json!({
            "open_access": { "is_oa": false },
            "best_oa_location": { "is_oa": true, "pdf_url": "https://example.com/a.pdf" }
        }));
        assert!(!meta.is_open_access());
    }

    #[test]
    fn test_file_stem() {
        let work = Work::new("1234567", EntryType::Primary, sample_metadata());
        assert_eq!(work.file_stem(), "1234567_10.1111#00000000_W000000000");

        let bare = Work::new(
            "W9",
            EntryType::Primary,
            WorkMetadata::new(json!({ "id": "https://openalex.org/W9" })),
        );
        assert_eq!(bare.file_stem(), "?_?_W9");
    }

    #[test]
    fn test_matches_secondary_ids() {
        let work = Work::new("W000000000", EntryType::Primary, sample_metadata());
        assert!(work.matches("W000000000"));
        assert!(work.matches("1234567"));
        assert!(work.matches("10.1111/00000000"));
        assert!(work.matches("PMC6341984"));
        assert!(!work.matches("PMC1"));
        assert!(!work.matches("7654321"));
    }

    #[test]
    fn test_entry_type_accepts_legacy_names() -> Result<(), serde_json::Error> {
        let legacy: EntryType = serde_json::from_str("\"citing primary entry\"")?;
        assert_eq!(legacy, EntryType::CitingPrimary);
        assert_eq!(serde_json::to_string(&EntryType::ReferenceOfPrimary)?, "\"reference-of-primary\"");
        Ok(())
    }

    #[test]
    fn test_open_access_ids() {
        let open = Work::new("W000000000", EntryType::Primary, sample_metadata());
        let closed = Work::new(
            "W2",
            EntryType::Primary,
            WorkMetadata::new(json!({ "id": "https://openalex.org/W2", "open_access": { "is_oa": false } })),
        );
        assert_eq!(open_access_ids(&[open, closed]), vec!["https://openalex.org/W000000000"]);
    }
}
