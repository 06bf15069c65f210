//! Open-access PDF acquisition.
//!
//! Two tiers share the [`PdfSource`] contract: [`DirectTransfer`] streams the
//! PDF over HTTP, and [`BrowserDownload`] drives a real browser when the
//! publisher answers the direct request with 403. The browser tier runs only
//! when the caller opted in.
//!
//! A missing PDF is a normal outcome. [`PdfAcquirer::acquire`] never fails;
//! it reports a [`PdfOutcome`] and always appends a status message to the work.

pub mod browser;
pub mod direct;

pub use browser::BrowserDownload;
pub use direct::DirectTransfer;

use crate::error::{HarvestError, Result};
use crate::work::Work;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// PubMed Central article URL template; `{}` is the `PMC…` identifier
const PMC_PDF_URL: &str = "https://www.ncbi.nlm.nih.gov/pmc/articles/{}/pdf/";

/// A way of fetching a PDF from `url` into `target`.
///
/// Returns the path the file was saved at, which may differ from `target`
/// when that path was already taken.
#[async_trait]
pub trait PdfSource: Send + Sync {
    async fn fetch(&self, url: &str, target: &Path) -> Result<PathBuf>;
}

/// What happened when a PDF was requested for a work.
#[derive(Debug)]
pub enum PdfOutcome {
    /// File written
    Saved(PathBuf),
    /// Preconditions not met; nothing was requested
    Skipped(String),
    /// A request was made and did not produce a file
    Failed(HarvestError),
}

impl PdfOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Saved(path) => Some(path),
            _ => None,
        }
    }
}

/// PMC article PDF URL for a `PMC…` identifier.
pub fn pmc_pdf_url(pmcid: &str) -> String {
    PMC_PDF_URL.replace("{}", pmcid)
}

/// First free path among `target`, `stem(1).ext`, `stem(2).ext`, …
pub fn unique_target_path(target: &Path) -> PathBuf {
    if !target.exists() {
        return target.to_path_buf();
    }

    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1u32;
    loop {
        let candidate = target.with_file_name(format!("{}({}){}", stem, counter, ext));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Tiered PDF retrieval for works.
pub struct PdfAcquirer {
    direct: Box<dyn PdfSource>,
    browser: Option<Box<dyn PdfSource>>,
}

impl PdfAcquirer {
    /// `browser` is the fallback tier; `None` disables it.
    pub fn new(direct: Box<dyn PdfSource>, browser: Option<Box<dyn PdfSource>>) -> Self {
        Self { direct, browser }
    }

    pub fn browser_enabled(&self) -> bool {
        self.browser.is_some()
    }

    /// Try to save the work's open-access PDF into `output_dir`.
    ///
    /// Sets `work.pdf_path` on success and appends a status message in every case.
    pub async fn acquire(&self, work: &mut Work, output_dir: &Path) -> PdfOutcome {
        let outcome = self.resolve(work, output_dir).await;

        match &outcome {
            PdfOutcome::Saved(path) => {
                info!(uid = %work.uid, path = %path.display(), "PDF saved");
                work.pdf_path = Some(path.clone());
                work.note(format!("PDF saved to {}", path.display()));
            }
            PdfOutcome::Skipped(reason) => {
                debug!(uid = %work.uid, reason = %reason, "PDF skipped");
                work.note(format!("Skipped PDF download: {}", reason));
            }
            PdfOutcome::Failed(e @ HarvestError::AccessDenied { .. }) if !self.browser_enabled() => {
                warn!(uid = %work.uid, error = %e, "PDF download refused and browser automation disabled");
                work.note(format!("PDF download failed: {}; browser automation disabled", e));
            }
            PdfOutcome::Failed(e) => {
                warn!(uid = %work.uid, error = %e, "PDF download failed");
                work.note(format!("PDF download failed: {}", e));
            }
        }

        outcome
    }

    async fn resolve(&self, work: &Work, output_dir: &Path) -> PdfOutcome {
        let meta = &work.metadata;
        if !meta.is_open_access() {
            return PdfOutcome::Skipped(format!("work {} is not open access", work.uid));
        }
        let Some(pdf_url) = meta.pdf_url() else {
            return PdfOutcome::Skipped("no PDF URL in best_oa_location".to_string());
        };

        let target = output_dir.join(format!("{}.pdf", work.file_stem()));
        debug!(uid = %work.uid, url = %pdf_url, "Trying direct PDF transfer");

        let denied = match self.direct.fetch(pdf_url, &target).await {
            Ok(path) => return PdfOutcome::Saved(path),
            Err(e @ HarvestError::AccessDenied { .. }) => e,
            Err(e) => return PdfOutcome::Failed(e),
        };

        let Some(browser) = &self.browser else {
            return PdfOutcome::Failed(denied);
        };

        let mut urls = Vec::with_capacity(2);
        if let Some(pmcid) = meta.pmcid() {
            urls.push(pmc_pdf_url(&pmcid));
        }
        urls.push(pdf_url.to_string());

        let mut last_error = denied;
        for url in urls {
            info!(uid = %work.uid, url = %url, "Direct transfer denied, trying browser download");
            match browser.fetch(&url, &target).await {
                Ok(path) => return PdfOutcome::Saved(path),
                Err(e) => {
                    warn!(uid = %work.uid, url = %url, error = %e, "Browser download failed");
                    last_error = e;
                }
            }
        }

        PdfOutcome::Failed(last_error)
    }
}
