//! scholarfetch - OpenAlex work and PDF harvester
//!
//! ## Usage
//!
//! ```bash
//! scholarfetch --email me@example.com works 10.1186/s12967-023-04576-8 38857748 --pdf-dir ./pdfs
//! scholarfetch --email me@example.com citations W2741809807 --per-page 200
//! scholarfetch cache list
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use scholarfetch::cache::{default_cache_dir, DiskCache};
use scholarfetch::{open_access_ids, EntryType, Harvest, HarvestOptions, Harvester, Work};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Retrieve scholarly works from OpenAlex, with caching and open-access PDFs
#[derive(Parser)]
#[command(name = "scholarfetch")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Show a progress bar (overrides --verbose)
    #[arg(long, global = true)]
    progress: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch works by DOI, PMID, PMCID or OpenAlex ID
    Works {
        #[command(flatten)]
        fetch: FetchArgs,

        /// Role recorded on the fetched works
        #[arg(long, value_enum, default_value = "primary")]
        entry_type: Role,

        /// Also retrieve the works citing each result
        #[arg(long)]
        citations: bool,
    },

    /// Fetch works, then return only the works citing them
    Citations {
        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// Inspect the work cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,

        /// Cache directory (default: platform cache dir)
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

#[derive(Args)]
struct FetchArgs {
    /// Identifiers (DOI, PMID, PMCID or OpenAlex work ID)
    ids: Vec<String>,

    /// Read additional identifiers from a file, one per line
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Contact email for the OpenAlex polite pool
    #[arg(long, env = "OPENALEX_EMAIL")]
    email: String,

    /// Directory for open-access PDFs (enables PDF download)
    #[arg(long)]
    pdf_dir: Option<PathBuf>,

    /// Cache directory (default: platform cache dir)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Disable the work cache
    #[arg(long)]
    no_cache: bool,

    /// Fall back to Chrome/Chromium when a publisher blocks direct download
    #[arg(long)]
    browser: bool,

    /// Show the browser window instead of running headless
    #[arg(long)]
    visible: bool,

    /// Browser executable
    #[arg(long)]
    browser_path: Option<PathBuf>,

    /// Seconds to wait for a browser download
    #[arg(long, default_value = "30")]
    browser_timeout: u64,

    /// Citation page size (1-200)
    #[arg(long, default_value = "200")]
    per_page: u32,

    /// OpenAlex API base URL
    #[arg(long, default_value = scholarfetch::openalex::OPENALEX_API_BASE)]
    api_base: String,

    /// Write JSON results here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write a CSV summary
    #[arg(long)]
    csv: Option<PathBuf>,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Role {
    Primary,
    Reference,
    Citing,
    Related,
}

impl From<Role> for EntryType {
    fn from(role: Role) -> Self {
        match role {
            Role::Primary => EntryType::Primary,
            Role::Reference => EntryType::ReferenceOfPrimary,
            Role::Citing => EntryType::CitingPrimary,
            Role::Related => EntryType::RelatedToPrimary,
        }
    }
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached works
    List,
    /// Print the cache directory
    Path,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    match cli.command {
        Commands::Works {
            fetch,
            entry_type,
            citations,
        } => {
            let ids = collect_ids(&fetch)?;
            let options = build_options(&fetch, entry_type.into(), cli.verbose, cli.progress)?;
            let mut harvester = Harvester::new(options)?;

            let mut harvest = harvester.get_works(&ids).await;
            if citations {
                let citing = harvester.get_citations(&harvest.works).await;
                harvest.works.extend(citing);
            }

            info!(open_access = open_access_ids(&harvest.works).len(), "Open-access works");
            write_results(&harvest, &fetch)?;
        }
        Commands::Citations { fetch } => {
            let ids = collect_ids(&fetch)?;
            let options = build_options(&fetch, EntryType::Primary, cli.verbose, cli.progress)?;
            let mut harvester = Harvester::new(options)?;

            let primary = harvester.get_works(&ids).await;
            let harvest = Harvest {
                works: harvester.get_citations(&primary.works).await,
                failed_calls: primary.failed_calls,
            };
            write_results(&harvest, &fetch)?;
        }
        Commands::Cache { action, cache_dir } => {
            let dir = match cache_dir {
                Some(dir) => dir,
                None => default_cache_dir()?,
            };
            match action {
                CacheAction::Path => println!("{}", dir.display()),
                CacheAction::List => list_cache(&DiskCache::new(dir)),
            }
        }
    }

    Ok(())
}

fn init_logging(cli: &Cli) {
    // Progress bars and debug output fight over the terminal
    let level = if cli.progress {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_options(fetch: &FetchArgs, entry_type: EntryType, verbose: bool, progress: bool) -> Result<HarvestOptions> {
    let cache_dir = if fetch.no_cache {
        None
    } else {
        match &fetch.cache_dir {
            Some(dir) => Some(dir.clone()),
            None => Some(default_cache_dir()?),
        }
    };

    let options = HarvestOptions {
        pdf_output_dir: fetch.pdf_dir.clone(),
        cache_dir,
        entry_type,
        enable_browser: fetch.browser,
        headless: !fetch.visible,
        show_progress: progress,
        verbose,
        per_page: fetch.per_page,
        api_base: fetch.api_base.clone(),
        browser_path: fetch.browser_path.clone(),
        browser_timeout: Duration::from_secs(fetch.browser_timeout),
        ..HarvestOptions::new(fetch.email.as_str())
    };

    options.validate().context("Invalid options")
}

fn collect_ids(fetch: &FetchArgs) -> Result<Vec<String>> {
    let mut ids = fetch.ids.clone();

    if let Some(path) = &fetch.input {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read identifiers from {}", path.display()))?;
        ids.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }

    if ids.is_empty() {
        anyhow::bail!("No identifiers given (pass IDs or --input FILE)");
    }
    Ok(ids)
}

// ============================================================================
// Output
// ============================================================================

fn write_results(harvest: &Harvest, fetch: &FetchArgs) -> Result<()> {
    let json = serde_json::to_string_pretty(harvest).context("Failed to serialize results")?;

    match &fetch.output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Saved: {}", path.display());
        }
        None => println!("{}", json),
    }

    if let Some(path) = &fetch.csv {
        save_csv(path, &harvest.works)?;
    }
    Ok(())
}

/// One CSV row per work
#[derive(Serialize)]
struct WorkRow<'a> {
    uid: &'a str,
    openalex_id: &'a str,
    doi: &'a str,
    pmid: &'a str,
    title: &'a str,
    entry_types: String,
    open_access: bool,
    cited_by_count: Option<u64>,
    pdf_path: String,
}

impl<'a> From<&'a Work> for WorkRow<'a> {
    fn from(work: &'a Work) -> Self {
        let meta = &work.metadata;
        Self {
            uid: &work.uid,
            openalex_id: meta.short_id().unwrap_or_default(),
            doi: meta.doi().unwrap_or_default(),
            pmid: meta.pmid().unwrap_or_default(),
            title: meta.title().unwrap_or_default(),
            entry_types: work
                .entry_types
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(";"),
            open_access: meta.is_open_access(),
            cited_by_count: meta.cited_by_count(),
            pdf_path: work
                .pdf_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }
}

fn save_csv(path: &Path, works: &[Work]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .context("Failed to create CSV writer")?;

    for work in works {
        wtr.serialize(WorkRow::from(work)).context("Failed to write CSV record")?;
    }

    wtr.flush().context("Failed to flush CSV")?;
    eprintln!("Saved: {}", path.display());
    Ok(())
}

fn list_cache(cache: &DiskCache) {
    let works = cache.load();
    if works.is_empty() {
        println!("No cached works in {}", cache.dir().display());
        return;
    }

    for work in &works {
        let persisted = work
            .persist_datetime
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{:<16} {:<17} {}",
            work.uid,
            persisted,
            work.metadata.title().unwrap_or("(untitled)")
        );
    }
    println!("{} cached works in {}", works.len(), cache.dir().display());
}
