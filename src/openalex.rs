//! OpenAlex API Client
//!
//! Single-work lookups and citation-list pages against the OpenAlex works API.
//!
//! API Best Practices (per OpenAlex docs):
//! - Use `mailto:email` parameter for polite pool (10 req/s vs 1 req/s)
//! - Use `per_page=200` for maximum results per page
//! - Ask only for the fields you need with `select`

use crate::error::{HarvestError, Result};
use crate::identifier::LookupTarget;
use crate::rate_limit::RateLimiter;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// OpenAlex API base URL
pub const OPENALEX_API_BASE: &str = "https://api.openalex.org";

/// Maximum results per page (OpenAlex limit)
pub const MAX_PER_PAGE: u32 = 200;

/// Root-level fields requested for every work lookup
pub const DEFAULT_SELECT_FIELDS: &[&str] = &[
    "id",
    "doi",
    "title",
    "authorships",
    "publication_year",
    "publication_date",
    "ids",
    "primary_location",
    "type",
    "open_access",
    "has_fulltext",
    "cited_by_count",
    "biblio",
    "primary_topic",
    "topics",
    "keywords",
    "concepts",
    "mesh",
    "best_oa_location",
    "referenced_works",
    "related_works",
    "cited_by_api_url",
    "counts_by_year",
    "updated_date",
    "created_date",
];

/// Citation list response; only `results` is read.
#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    results: Vec<Value>,
}

/// Error body OpenAlex returns alongside non-2xx statuses
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Build the shared HTTP client.
pub fn build_http_client(mailto: &str) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(format!("scholarfetch/{} (mailto:{})", env!("CARGO_PKG_VERSION"), mailto))
        .build()
        .map_err(|e| HarvestError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// OpenAlex client with a fixed-window rate limiter shared by all API calls.
#[derive(Debug)]
pub struct OpenAlexClient {
    client: Client,
    api_base: String,
    mailto: String,
    select: String,
    limiter: RateLimiter,
}

impl OpenAlexClient {
    pub fn new(client: Client, api_base: &str, mailto: &str, select_fields: &[String]) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            mailto: mailto.to_string(),
            select: select_fields.join(","),
            limiter: RateLimiter::default(),
        }
    }

    /// Replace the default limiter (10 requests per second).
    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Fetch a single work document.
    pub async fn fetch_work(&mut self, target: &LookupTarget) -> Result<Value> {
        let url = target.url(&self.api_base);
        self.limiter.acquire().await;

        debug!(uid = %target.uid, kind = %target.kind, url = %url, "Fetching OpenAlex work");

        let response = self
            .client
            .get(&url)
            .query(&[("mailto", self.mailto.as_str()), ("select", self.select.as_str())])
            .send()
            .await?;

        read_json(response, &url).await
    }

    /// Fetch one page of a work's citing documents from its `cited_by_api_url`.
    pub async fn fetch_citation_page(
        &mut self,
        cited_by_api_url: &str,
        per_page: u32,
        page: u32,
    ) -> Result<Vec<Value>> {
        self.limiter.acquire().await;

        debug!(url = %cited_by_api_url, page = page, per_page = per_page, "Fetching citation page");

        let per_page = per_page.clamp(1, MAX_PER_PAGE).to_string();
        let page = page.to_string();
        let response = self
            .client
            .get(cited_by_api_url)
            .query(&[
                ("mailto", self.mailto.as_str()),
                ("per_page", per_page.as_str()),
                ("page", page.as_str()),
            ])
            .send()
            .await?;

        let body = read_json(response, cited_by_api_url).await?;
        let list: ListResponse = serde_json::from_value(body)?;
        Ok(list.results)
    }
}

/// Turn a response into JSON or a typed failure.
async fn read_json(response: reqwest::Response, url: &str) -> Result<Value> {
    let status = response.status();
    let text = response.text().await?;

    if status == StatusCode::FORBIDDEN {
        return Err(HarvestError::AccessDenied { url: url.to_string() });
    }

    if !status.is_success() {
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .ok()
            .and_then(|body| match (body.error, body.message) {
                (Some(error), Some(message)) => Some(format!("{}: {}", error, message)),
                (error, message) => error.or(message),
            })
            .unwrap_or_else(|| format!("OpenAlex API error: {}", status));
        warn!(url = %url, status = status.as_u16(), message = %message, "OpenAlex request failed");
        return Err(HarvestError::Http {
            status: status.as_u16(),
            message,
        });
    }

    Ok(serde_json::from_str(&text)?)
}
