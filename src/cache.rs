//! Disk cache of retrieved work records.
//!
//! Each work is stored as one pretty-printed JSON file named from its
//! identifiers (see [`Work::file_stem`]). Records younger than the TTL are
//! served as-is; older ones are refetched with their audit log carried over.
//! The directory is assumed to have a single writer.

use crate::error::{HarvestError, Result};
use crate::work::{EntryType, StatusMessage, Work, WorkMetadata};
use chrono::{Local, NaiveDateTime, TimeDelta};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Freshness window for cached records
pub const DEFAULT_TTL_DAYS: i64 = 30;

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    /// Younger than the TTL; use as-is
    Fresh(Work),
    /// Older than the TTL; refetch
    Stale(Work),
}

/// On-disk shape, tolerant of partially written or foreign records.
#[derive(Debug, Deserialize)]
struct StoredWork {
    uid: Option<String>,
    #[serde(default)]
    entry_types: BTreeSet<EntryType>,
    metadata: Option<WorkMetadata>,
    pdf_path: Option<PathBuf>,
    #[serde(default)]
    status_messages: Vec<StatusMessage>,
    persist_datetime: Option<NaiveDateTime>,
}

impl StoredWork {
    fn into_work(self) -> Option<Work> {
        Some(Work {
            uid: self.uid?,
            entry_types: self.entry_types,
            metadata: self.metadata?,
            pdf_path: self.pdf_path,
            status_messages: self.status_messages,
            persist_datetime: Some(self.persist_datetime?),
        })
    }
}

/// Platform cache location, e.g. `~/.cache/scholarfetch`.
pub fn default_cache_dir() -> Result<PathBuf> {
    dirs::cache_dir()
        .map(|p| p.join("scholarfetch"))
        .ok_or_else(|| HarvestError::Config("Cannot determine cache directory".to_string()))
}

#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
    ttl: TimeDelta,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ttl: TimeDelta::days(DEFAULT_TTL_DAYS),
        }
    }

    pub fn with_ttl(mut self, ttl: TimeDelta) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// Path a work is (or would be) persisted at.
    pub fn record_path(&self, work: &Work) -> PathBuf {
        self.dir.join(format!("{}.json", work.file_stem()))
    }

    /// Load every valid record in the cache directory.
    ///
    /// Unreadable files and records missing `uid`, `metadata` or
    /// `persist_datetime` are skipped.
    pub fn load(&self) -> Vec<Work> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.dir.display(), error = %e, "Cache directory not readable");
                return Vec::new();
            }
        };

        let mut works = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read cache file");
                    continue;
                }
            };

            match serde_json::from_str::<StoredWork>(&content) {
                Ok(stored) => match stored.into_work() {
                    Some(work) => works.push(work),
                    None => debug!(path = %path.display(), "Skipping incomplete cache record"),
                },
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unparseable cache file"),
            }
        }

        debug!(dir = %self.dir.display(), count = works.len(), "Loaded cached works");
        works
    }

    /// Find a record for `uid` by its uid, canonical ID, DOI or PMID.
    pub fn lookup(&self, uid: &str) -> Option<CacheEntry> {
        let work = self.load().into_iter().find(|w| w.matches(uid))?;
        let persisted = work.persist_datetime?;
        let age = Local::now().naive_local() - persisted;

        if age < self.ttl {
            debug!(uid = %uid, age_days = age.num_days(), "Fresh cache hit");
            Some(CacheEntry::Fresh(work))
        } else {
            info!(uid = %uid, age_days = age.num_days(), "Stale cache entry");
            Some(CacheEntry::Stale(work))
        }
    }

    /// Write `work` to the cache, stamping `persist_datetime`.
    ///
    /// A record already stored under the same name is merged in first: its
    /// roles join the work's and its status messages go ahead of the new ones.
    /// Returns the file path on success; on failure the previous
    /// `persist_datetime` is restored.
    pub fn try_persist(&self, work: &mut Work) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| HarvestError::filesystem(&self.dir, e))?;

        let path = self.record_path(work);
        merge_stored(&path, work);

        let previous = work.persist_datetime;
        work.persist_datetime = Some(Local::now().naive_local());

        let written = serde_json::to_string_pretty(&*work)
            .map_err(HarvestError::from)
            .and_then(|json| std::fs::write(&path, json).map_err(|e| HarvestError::filesystem(&path, e)));

        match written {
            Ok(()) => Ok(path),
            Err(e) => {
                work.persist_datetime = previous;
                Err(e)
            }
        }
    }

    /// Delete the record file at `path` if it exists.
    pub fn discard(&self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed superseded cache record"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove cache record"),
        }
    }

    /// Persist `work`, logging instead of propagating failures.
    pub fn persist(&self, work: &mut Work) -> bool {
        match self.try_persist(work) {
            Ok(path) => {
                debug!(uid = %work.uid, path = %path.display(), "Persisted work");
                true
            }
            Err(e) => {
                warn!(uid = %work.uid, error = %e, "Failed to persist work");
                false
            }
        }
    }
}

/// Fold the record at `path`, if any, into `work`.
fn merge_stored(path: &Path, work: &mut Work) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    let stored = match serde_json::from_str::<StoredWork>(&content) {
        Ok(stored) => stored,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Overwriting unparseable cache record");
            return;
        }
    };

    work.entry_types.extend(stored.entry_types);

    let mut messages = stored.status_messages;
    for message in work.status_messages.drain(..) {
        if !messages.contains(&message) {
            messages.push(message);
        }
    }
    work.status_messages = messages;

    if work.pdf_path.is_none() {
        work.pdf_path = stored.pdf_path.filter(|p| p.is_file());
    }
}
