//! Tier 1: plain HTTP transfer of a PDF.

use super::PdfSource;
use crate::error::{HarvestError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

/// Write buffer size for streamed bodies
const CHUNK_SIZE: usize = 8 * 1024;

/// Streams a PDF straight to disk with a single GET.
#[derive(Debug, Clone)]
pub struct DirectTransfer {
    client: Client,
    mailto: String,
}

impl DirectTransfer {
    pub fn new(client: Client, mailto: &str) -> Self {
        Self {
            client,
            mailto: mailto.to_string(),
        }
    }
}

#[async_trait]
impl PdfSource for DirectTransfer {
    /// Overwrites `target`. 403 maps to [`HarvestError::AccessDenied`] so the
    /// caller can fall back to the browser tier.
    async fn fetch(&self, url: &str, target: &Path) -> Result<PathBuf> {
        let response = self
            .client
            .get(url)
            .query(&[("mailto", self.mailto.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(HarvestError::AccessDenied { url: url.to_string() });
        }
        if status != StatusCode::OK {
            return Err(HarvestError::Http {
                status: status.as_u16(),
                message: format!("PDF request to {} returned {}", url, status),
            });
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HarvestError::filesystem(parent, e))?;
        }

        let mut file = File::create(target)
            .await
            .map_err(|e| HarvestError::filesystem(target, e))?;

        match stream_to_file(&mut file, response, target).await {
            Ok(bytes) => {
                debug!(url = %url, path = %target.display(), bytes = bytes, "PDF transferred");
                Ok(target.to_path_buf())
            }
            Err(e) => {
                debug!(path = %target.display(), "Removing partial PDF after error");
                let _ = tokio::fs::remove_file(target).await;
                Err(e)
            }
        }
    }
}

/// Copy the response body to `file`, returning bytes written.
async fn stream_to_file(file: &mut File, response: reqwest::Response, path: &Path) -> Result<u64> {
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| HarvestError::filesystem(path, e))?;
        written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| HarvestError::filesystem(path, e))?;
    Ok(written)
}
