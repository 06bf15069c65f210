//! # scholarfetch
//!
//! OpenAlex work retrieval with a disk cache, citation traversal and
//! best-effort open-access PDF acquisition.
//!
//! ## Modules
//!
//! - [`identifier`] - DOI / PMID / PMCID / OpenAlex ID normalization and routing
//! - [`openalex`] - Rate-limited OpenAlex works client
//! - [`cache`] - JSON-per-work disk cache with a freshness window
//! - [`pdf`] - Direct and browser-driven PDF download
//! - [`citations`] - Paginated citing-work retrieval
//! - [`pipeline`] - Batch `get_works` / `get_citations`
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use scholarfetch::{HarvestOptions, Harvester};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let options = HarvestOptions::new("me@example.com");
//!     let mut harvester = Harvester::new(options)?;
//!     let harvest = harvester.get_works(&["10.1186/s12967-023-04576-8", "38857748"]).await;
//!     println!("{} works, {} failed", harvest.works.len(), harvest.failed_calls.len());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod citations;
pub mod config;
pub mod error;
pub mod identifier;
pub mod openalex;
pub mod pdf;
pub mod pipeline;
pub mod rate_limit;
pub mod work;

pub use config::HarvestOptions;
pub use error::{ErrorKind, HarvestError, Result};
pub use pipeline::{Harvest, Harvester};
pub use work::{open_access_ids, EntryType, FailedCall, Work, WorkMetadata};
