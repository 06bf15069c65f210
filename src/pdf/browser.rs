//! Tier 2: PDF download through a real Chrome/Chromium process.
//!
//! Each attempt gets its own throwaway profile whose preferences send every
//! download to a private staging directory without prompting, and open PDFs
//! as downloads instead of in the viewer. The staging directory is polled
//! until a finished file shows up, which is then moved to the target path.

use super::{unique_target_path, PdfSource};
use crate::error::{HarvestError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Executables tried in order when none is configured
pub const CHROME_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// How long to wait for a download to finish
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Gap between staging directory scans
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Chrome's in-progress download suffix
const PARTIAL_SUFFIX: &str = ".crdownload";

/// Filesystem timestamps can lag the wall clock slightly
const MTIME_SLACK: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct BrowserDownload {
    executable: Option<PathBuf>,
    headless: bool,
    timeout: Duration,
    poll_interval: Duration,
}

impl BrowserDownload {
    pub fn new(headless: bool) -> Self {
        Self {
            executable: None,
            headless,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Use this executable instead of searching [`CHROME_CANDIDATES`].
    pub fn with_executable(mut self, executable: Option<PathBuf>) -> Self {
        self.executable = executable;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn candidates(&self) -> Vec<PathBuf> {
        match &self.executable {
            Some(path) => vec![path.clone()],
            None => CHROME_CANDIDATES.iter().map(PathBuf::from).collect(),
        }
    }
}

#[async_trait]
impl PdfSource for BrowserDownload {
    async fn fetch(&self, url: &str, target: &Path) -> Result<PathBuf> {
        let parsed = url::Url::parse(url)
            .map_err(|e| HarvestError::AutomationFailure(format!("invalid URL {}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(HarvestError::AutomationFailure(format!(
                "unsupported URL scheme '{}' in {}",
                parsed.scheme(),
                url
            )));
        }

        let output_dir = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(output_dir).map_err(|e| HarvestError::filesystem(output_dir, e))?;

        let staging = tempfile::Builder::new()
            .prefix(".scholarfetch-download-")
            .tempdir_in(output_dir)
            .map_err(|e| HarvestError::filesystem(output_dir, e))?;

        let started = SystemTime::now();
        let session = ChromeSession::launch(&self.candidates(), staging.path(), self.headless, url)?;
        info!(url = %url, headless = self.headless, "Browser launched for PDF download");

        let waited = wait_for_download(staging.path(), started, self.timeout, self.poll_interval).await;
        session.shutdown().await;
        let downloaded = waited?;

        let destination = unique_target_path(target);
        tokio::fs::rename(&downloaded, &destination)
            .await
            .map_err(|e| HarvestError::filesystem(&destination, e))?;

        debug!(from = %downloaded.display(), to = %destination.display(), "Moved browser download");
        Ok(destination)
    }
}

/// A running browser with its private profile.
///
/// Call [`ChromeSession::shutdown`]; dropping only signals the process.
struct ChromeSession {
    child: Child,
    _profile: TempDir,
}

impl ChromeSession {
    fn launch(candidates: &[PathBuf], download_dir: &Path, headless: bool, url: &str) -> Result<Self> {
        let profile = TempDir::new().map_err(|e| HarvestError::filesystem("browser profile", e))?;
        write_preferences(profile.path(), download_dir)?;

        let mut last_error = None;
        for executable in candidates {
            let mut command = Command::new(executable);
            command
                .arg(format!("--user-data-dir={}", profile.path().display()))
                .args(["--no-first-run", "--no-default-browser-check", "--disable-popup-blocking"]);
            if headless {
                command.arg("--headless=new");
            }
            command
                .arg(url)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true);

            match command.spawn() {
                Ok(child) => {
                    debug!(executable = %executable.display(), "Spawned browser");
                    return Ok(Self {
                        child,
                        _profile: profile,
                    });
                }
                Err(e) => {
                    debug!(executable = %executable.display(), error = %e, "Browser executable unavailable");
                    last_error = Some(e);
                }
            }
        }

        Err(HarvestError::AutomationFailure(match last_error {
            Some(e) => format!("could not launch Chrome/Chromium: {}", e),
            None => "no browser executable configured".to_string(),
        }))
    }

    /// Kill the browser and wait for it to exit before the profile is removed.
    async fn shutdown(mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "Browser process already gone");
        }
        if let Err(e) = self.child.wait().await {
            warn!(error = %e, "Failed to reap browser process");
        }
    }
}

/// Fallback for early returns and cancellation; the process is not reaped here.
impl Drop for ChromeSession {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            if let Err(e) = self.child.start_kill() {
                debug!(error = %e, "Failed to signal browser process");
            }
        }
    }
}

/// Profile preferences: downloads go to `download_dir` silently and PDFs are
/// saved rather than rendered.
fn write_preferences(profile: &Path, download_dir: &Path) -> Result<()> {
    let default_dir = profile.join("Default");
    std::fs::create_dir_all(&default_dir).map_err(|e| HarvestError::filesystem(&default_dir, e))?;

    let dir = download_dir.to_string_lossy();
    let prefs = json!({
        "download": {
            "default_directory": dir,
            "prompt_for_download": false,
            "directory_upgrade": true
        },
        "savefile": { "default_directory": dir },
        "plugins": { "always_open_pdf_externally": true }
    });

    let path = default_dir.join("Preferences");
    let body = serde_json::to_string(&prefs)?;
    std::fs::write(&path, body).map_err(|e| HarvestError::filesystem(&path, e))
}

/// Poll `dir` until a completed download created after `started` appears.
///
/// Leftover `.crdownload` markers are removed once a finished file is found.
pub async fn wait_for_download(
    dir: &Path,
    started: SystemTime,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<PathBuf> {
    let deadline = Instant::now() + timeout;
    let threshold = started.checked_sub(MTIME_SLACK).unwrap_or(started);

    loop {
        let scan = scan_downloads(dir, threshold);
        if let Some(finished) = scan.finished {
            for marker in scan.partial {
                if let Err(e) = std::fs::remove_file(&marker) {
                    warn!(path = %marker.display(), error = %e, "Failed to remove stale download marker");
                }
            }
            return Ok(finished);
        }

        if Instant::now() >= deadline {
            return Err(HarvestError::AutomationTimeout {
                seconds: timeout.as_secs(),
            });
        }

        debug!(dir = %dir.display(), in_progress = scan.partial.len(), "Waiting for browser download");
        tokio::time::sleep(poll_interval).await;
    }
}

#[derive(Debug, Default)]
struct DownloadScan {
    finished: Option<PathBuf>,
    partial: Vec<PathBuf>,
}

fn scan_downloads(dir: &Path, threshold: SystemTime) -> DownloadScan {
    let mut scan = DownloadScan::default();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return scan;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        if name.ends_with(PARTIAL_SUFFIX) {
            scan.partial.push(path);
            continue;
        }

        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        let fresh = meta.modified().map(|m| m >= threshold).unwrap_or(true);
        if fresh && scan.finished.is_none() {
            scan.finished = Some(path);
        }
    }

    scan
}
