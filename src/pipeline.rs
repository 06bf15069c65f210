//! Batch retrieval pipeline.
//!
//! [`Harvester::get_works`] resolves a list of raw identifiers in input order:
//! route, consult the cache, fetch on a miss or stale entry, acquire the PDF,
//! persist. Every identifier ends up either in `works` or in `failed_calls`.
//! [`Harvester::get_citations`] walks the citation lists of resolved works
//! through the same client, PDF engine and cache.

use crate::cache::{CacheEntry, DiskCache};
use crate::citations::fetch_citing_works;
use crate::config::HarvestOptions;
use crate::error::Result;
use crate::identifier::{route, LookupTarget};
use crate::openalex::{build_http_client, OpenAlexClient};
use crate::pdf::{BrowserDownload, DirectTransfer, PdfAcquirer, PdfSource};
use crate::rate_limit::RateLimiter;
use crate::work::{EntryType, FailedCall, Work, WorkMetadata};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Outcome of a `get_works` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Harvest {
    pub works: Vec<Work>,
    pub failed_calls: Vec<FailedCall>,
}

pub struct Harvester {
    options: HarvestOptions,
    client: OpenAlexClient,
    cache: Option<DiskCache>,
    pdf: PdfAcquirer,
}

impl Harvester {
    /// Build a harvester; the browser tier is a local Chrome/Chromium when enabled.
    pub fn new(options: HarvestOptions) -> Result<Self> {
        let browser: Option<Box<dyn PdfSource>> = if options.enable_browser {
            Some(Box::new(
                BrowserDownload::new(options.headless)
                    .with_executable(options.browser_path.clone())
                    .with_timeout(options.browser_timeout),
            ))
        } else {
            None
        };
        Self::build(options, browser)
    }

    /// Build a harvester with a custom browser tier. `enable_browser` is ignored.
    pub fn with_browser(options: HarvestOptions, browser: Box<dyn PdfSource>) -> Result<Self> {
        Self::build(options, Some(browser))
    }

    fn build(options: HarvestOptions, browser: Option<Box<dyn PdfSource>>) -> Result<Self> {
        let options = options.validate()?;
        let http = build_http_client(&options.contact)?;

        let client = OpenAlexClient::new(
            http.clone(),
            &options.api_base,
            &options.contact,
            &options.select_fields,
        );
        let direct = DirectTransfer::new(http, &options.contact);
        let cache = options
            .cache_dir
            .as_ref()
            .map(|dir| DiskCache::new(dir).with_ttl(options.cache_ttl));

        Ok(Self {
            client,
            cache,
            pdf: PdfAcquirer::new(Box::new(direct), browser),
            options,
        })
    }

    /// Replace the API rate limiter.
    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.client = self.client.with_limiter(limiter);
        self
    }

    pub fn options(&self) -> &HarvestOptions {
        &self.options
    }

    pub fn cache(&self) -> Option<&DiskCache> {
        self.cache.as_ref()
    }

    /// Resolve every identifier in `ids`, in order.
    pub async fn get_works<S: AsRef<str>>(&mut self, ids: &[S]) -> Harvest {
        if let Some(dir) = &self.options.pdf_output_dir {
            info!(
                dir = %dir.display(),
                browser = self.pdf.browser_enabled(),
                "Open-access PDFs will be saved; some publishers refuse automated downloads"
            );
        }

        let role = self.options.entry_type;
        let progress = self.progress_bar(ids.len() as u64, "works");
        let mut harvest = Harvest::default();

        for raw in ids {
            let raw = raw.as_ref();
            progress.set_message(raw.trim().to_string());

            match route(raw) {
                Ok(target) => match self.resolve(&target, role).await {
                    Ok(work) => {
                        self.report(&work);
                        harvest.works.push(work);
                    }
                    Err(e) => {
                        warn!(uid = %target.uid, error = %e, "Work lookup failed");
                        harvest.failed_calls.push(FailedCall::new(target.uid, &e));
                    }
                },
                Err(e) => {
                    warn!(raw = %raw, error = %e, "Unroutable identifier");
                    harvest.failed_calls.push(FailedCall::new(raw.trim(), &e));
                }
            }

            progress.inc(1);
        }

        progress.finish_and_clear();
        info!(
            works = harvest.works.len(),
            failed = harvest.failed_calls.len(),
            "Work retrieval finished"
        );
        harvest
    }

    /// Retrieve the works citing `works`, tagged `citing-primary`.
    pub async fn get_citations(&mut self, works: &[Work]) -> Vec<Work> {
        let per_page = self.options.per_page;
        let mut citing = fetch_citing_works(&mut self.client, works, per_page).await;

        let progress = self.progress_bar(citing.len() as u64, "citations");
        for work in &mut citing {
            progress.set_message(work.uid.clone());
            work.note("Retrieved as citing work");
            self.finish(work).await;
            self.report(work);
            progress.inc(1);
        }
        progress.finish_and_clear();

        info!(count = citing.len(), "Citation retrieval finished");
        citing
    }

    async fn resolve(&mut self, target: &LookupTarget, role: EntryType) -> Result<Work> {
        let mut prior = None;

        if let Some(cache) = &self.cache {
            match cache.lookup(&target.uid) {
                Some(CacheEntry::Fresh(mut work)) => {
                    debug!(uid = %target.uid, "Using cached work");
                    work.entry_types.insert(role);
                    work.verify_pdf_path();
                    work.note("Loaded from cache");
                    return Ok(work);
                }
                Some(CacheEntry::Stale(work)) => prior = Some(work),
                None => {}
            }
        }

        let doc = self.client.fetch_work(target).await?;
        let mut work = Work::new(target.uid.clone(), role, WorkMetadata::new(doc));
        let mut superseded = None;

        match prior {
            Some(prior) => {
                superseded = self.cache.as_ref().map(|cache| cache.record_path(&prior));
                work.entry_types.extend(prior.entry_types);
                work.status_messages = prior.status_messages;
                work.pdf_path = prior.pdf_path;
                work.verify_pdf_path();
                work.note("Refreshed stale cache entry from OpenAlex");
            }
            None => work.note(format!("Retrieved from OpenAlex by {}", target.kind)),
        }

        self.finish(&mut work).await;

        // Refreshed metadata can change the file stem; drop the old record
        if let (Some(cache), Some(old_path)) = (&self.cache, superseded) {
            if work.persist_datetime.is_some() && cache.record_path(&work) != old_path {
                cache.discard(&old_path);
            }
        }
        Ok(work)
    }

    /// PDF acquisition and persistence for a freshly fetched work.
    async fn finish(&self, work: &mut Work) {
        if let Some(dir) = &self.options.pdf_output_dir {
            if work.pdf_path.is_none() {
                self.pdf.acquire(work, dir).await;
            }
        }
        if let Some(cache) = &self.cache {
            cache.persist(work);
        }
    }

    /// Per-work summary; promoted to `info` in verbose mode.
    fn report(&self, work: &Work) {
        let roles = work.entry_types.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
        let pdf = work.pdf_path.as_ref().map(|p| p.display().to_string()).unwrap_or_default();
        let cached = work.persist_datetime.is_some();
        if self.options.verbose {
            info!(uid = %work.uid, roles = %roles, pdf = %pdf, cached = cached, "Work resolved");
        } else {
            debug!(uid = %work.uid, roles = %roles, pdf = %pdf, cached = cached, "Work resolved");
        }
    }

    fn progress_bar(&self, len: u64, unit: &str) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        bar.set_style(
            ProgressStyle::with_template(&format!("{{bar:40}} {{pos}}/{{len}} {} {{msg}}", unit))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    }
}
