//! Citation traversal.
//!
//! For each resolved work, pages through its `cited_by_api_url` and turns every
//! citing document into a new [`Work`] tagged [`EntryType::CitingPrimary`].

use crate::identifier::normalize;
use crate::openalex::{OpenAlexClient, MAX_PER_PAGE};
use crate::work::{EntryType, Work, WorkMetadata};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Default citation page size
pub const DEFAULT_PER_PAGE: u32 = MAX_PER_PAGE;

/// Pages needed to cover `cited_by_count` results.
pub fn page_count(cited_by_count: u64, per_page: u32) -> u32 {
    let per_page = u64::from(per_page.clamp(1, MAX_PER_PAGE));
    u32::try_from(cited_by_count.div_ceil(per_page)).unwrap_or(u32::MAX)
}

/// Wrap a citing document as a work, or `None` when it has no `id`.
pub fn citation_work(doc: Value) -> Option<Work> {
    let metadata = WorkMetadata::new(doc);
    let uid = normalize(metadata.short_id()?);
    Some(Work::new(uid, EntryType::CitingPrimary, metadata))
}

/// Fetch every citing document of `works`, in input order and page order.
///
/// Works without a citation count, with zero citations or without a
/// `cited_by_api_url` are skipped. Failed pages are logged and omitted.
pub async fn fetch_citing_works(client: &mut OpenAlexClient, works: &[Work], per_page: u32) -> Vec<Work> {
    let per_page = per_page.clamp(1, MAX_PER_PAGE);
    let mut citing = Vec::new();

    for work in works {
        let count = match work.metadata.cited_by_count() {
            Some(count) if count > 0 => count,
            _ => {
                debug!(uid = %work.uid, "No citations to retrieve");
                continue;
            }
        };
        let Some(url) = work.metadata.cited_by_api_url() else {
            debug!(uid = %work.uid, "No cited_by_api_url");
            continue;
        };

        let pages = page_count(count, per_page);
        info!(uid = %work.uid, citations = count, pages = pages, "Retrieving citations");

        for page in 1..=pages {
            match client.fetch_citation_page(url, per_page, page).await {
                Ok(docs) => {
                    let before = citing.len();
                    citing.extend(docs.into_iter().filter_map(citation_work));
                    debug!(uid = %work.uid, page = page, added = citing.len() - before, "Citation page retrieved");
                }
                Err(e) => {
                    warn!(uid = %work.uid, page = page, error = %e, "Citation page failed, skipping");
                }
            }
        }
    }

    citing
}
