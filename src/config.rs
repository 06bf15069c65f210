//! Harvest options.

use crate::cache::DEFAULT_TTL_DAYS;
use crate::citations::DEFAULT_PER_PAGE;
use crate::error::{HarvestError, Result};
use crate::openalex::{DEFAULT_SELECT_FIELDS, MAX_PER_PAGE, OPENALEX_API_BASE};
use crate::pdf::browser::DEFAULT_TIMEOUT;
use crate::work::EntryType;
use chrono::TimeDelta;
use std::path::PathBuf;
use std::time::Duration;

/// Options for a [`Harvester`](crate::pipeline::Harvester) run.
#[derive(Debug, Clone)]
pub struct HarvestOptions {
    /// Contact email sent as `mailto` (required by the polite pool)
    pub contact: String,
    /// Where to save PDFs; `None` disables PDF acquisition
    pub pdf_output_dir: Option<PathBuf>,
    /// Where to cache work records; `None` disables caching
    pub cache_dir: Option<PathBuf>,
    /// Role recorded on works fetched by `get_works`
    pub entry_type: EntryType,
    /// Fall back to a browser when a publisher refuses direct transfer
    pub enable_browser: bool,
    /// Run the browser without a window
    pub headless: bool,
    /// Show a progress bar (turns `verbose` off)
    pub show_progress: bool,
    pub verbose: bool,
    /// Citation page size, 1..=200
    pub per_page: u32,
    pub api_base: String,
    pub select_fields: Vec<String>,
    /// Browser executable; `None` searches the usual Chrome/Chromium names
    pub browser_path: Option<PathBuf>,
    pub browser_timeout: Duration,
    pub cache_ttl: TimeDelta,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            contact: String::new(),
            pdf_output_dir: None,
            cache_dir: None,
            entry_type: EntryType::Primary,
            enable_browser: false,
            headless: true,
            show_progress: false,
            verbose: false,
            per_page: DEFAULT_PER_PAGE,
            api_base: OPENALEX_API_BASE.to_string(),
            select_fields: DEFAULT_SELECT_FIELDS.iter().map(|s| s.to_string()).collect(),
            browser_path: None,
            browser_timeout: DEFAULT_TIMEOUT,
            cache_ttl: TimeDelta::days(DEFAULT_TTL_DAYS),
        }
    }
}

impl HarvestOptions {
    pub fn new(contact: impl Into<String>) -> Self {
        Self {
            contact: contact.into(),
            ..Self::default()
        }
    }

    /// Check the options and resolve the progress/verbose conflict.
    pub fn validate(mut self) -> Result<Self> {
        self.contact = self.contact.trim().to_string();
        if self.contact.is_empty() {
            return Err(HarvestError::Config(
                "A contact email is required (set --email or OPENALEX_EMAIL)".to_string(),
            ));
        }

        if !(1..=MAX_PER_PAGE).contains(&self.per_page) {
            return Err(HarvestError::Config(format!(
                "per_page must be between 1 and {}, got {}",
                MAX_PER_PAGE, self.per_page
            )));
        }

        if self.api_base.trim().is_empty() {
            return Err(HarvestError::Config("API base URL is empty".to_string()));
        }

        if self.cache_ttl <= TimeDelta::zero() {
            return Err(HarvestError::Config("Cache TTL must be positive".to_string()));
        }

        if self.show_progress {
            self.verbose = false;
        }

        Ok(self)
    }
}
