//! Integration tests for the harvest pipeline.
//!
//! Each test runs a `Harvester` against a wiremock server standing in for both
//! the OpenAlex API and the publisher hosting the PDFs.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Local, TimeDelta};
use scholarfetch::pdf::PdfSource;
use scholarfetch::work::StatusMessage;
use scholarfetch::{EntryType, ErrorKind, HarvestError, HarvestOptions, Harvester, Work, WorkMetadata};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn options(server: &MockServer, cache: Option<&Path>, pdf_dir: Option<&Path>) -> HarvestOptions {
    HarvestOptions {
        api_base: server.uri(),
        cache_dir: cache.map(Path::to_path_buf),
        pdf_output_dir: pdf_dir.map(Path::to_path_buf),
        ..HarvestOptions::new("test@example.com")
    }
}

fn work_doc(server: &MockServer, id: &str, open_access: bool) -> Value {
    json!({
        "id": format!("https://openalex.org/{}", id),
        "title": format!("Work {}", id),
        "ids": {
            "doi": format!("https://doi.org/10.1234/{}", id.to_lowercase()),
            "pmcid": "https://www.ncbi.nlm.nih.gov/pmc/articles/6341984"
        },
        "open_access": { "is_oa": open_access },
        "best_oa_location": {
            "is_oa": open_access,
            "pdf_url": format!("{}/pdf/{}.pdf", server.uri(), id)
        }
    })
}

async fn mount_work(server: &MockServer, id: &str, body: Value, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/works/{}", id)))
        .and(query_param("mailto", "test@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Browser stand-in that records every URL it is asked for and never succeeds.
#[derive(Clone, Default)]
struct RecordingBrowser {
    urls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl PdfSource for RecordingBrowser {
    async fn fetch(&self, url: &str, _target: &Path) -> scholarfetch::Result<PathBuf> {
        self.urls.lock().expect("lock").push(url.to_string());
        Err(HarvestError::AutomationTimeout { seconds: 30 })
    }
}

#[tokio::test]
async fn test_every_identifier_is_accounted_for() {
    let server = MockServer::start().await;
    mount_work(&server, "W1", work_doc(&server, "W1", false), 1).await;
    Mock::given(method("GET"))
        .and(path("/works/W404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "Not Found",
            "message": "No such work"
        })))
        .mount(&server)
        .await;

    let mut harvester = Harvester::new(options(&server, None, None)).expect("harvester");
    let harvest = harvester.get_works(&["W1", "not-an-id!", "W404"]).await;

    assert_eq!(harvest.works.len() + harvest.failed_calls.len(), 3);
    assert_eq!(harvest.works[0].uid, "W1");
    assert!(harvest.works[0].entry_types.contains(&EntryType::Primary));

    assert_eq!(harvest.failed_calls[0].uid, "not-an-id!");
    assert_eq!(harvest.failed_calls[0].error, ErrorKind::InvalidIdentifier);
    assert_eq!(harvest.failed_calls[1].uid, "W404");
    assert_eq!(harvest.failed_calls[1].error, ErrorKind::HttpError { status: 404 });
}

#[tokio::test]
async fn test_fresh_cache_hit_makes_no_remote_call() {
    let server = MockServer::start().await;
    let cache_dir = TempDir::new().expect("failed to create temp dir");
    mount_work(&server, "W7", work_doc(&server, "W7", false), 1).await;

    let first = {
        let mut harvester = Harvester::new(options(&server, Some(cache_dir.path()), None)).expect("harvester");
        harvester.get_works(&["W7"]).await
    };
    assert_eq!(first.works.len(), 1);
    assert!(first.works[0].persist_datetime.is_some());

    let mut opts = options(&server, Some(cache_dir.path()), None);
    opts.entry_type = EntryType::RelatedToPrimary;
    let mut harvester = Harvester::new(opts).expect("harvester");
    let second = harvester.get_works(&["https://openalex.org/W7"]).await;

    assert_eq!(second.works.len(), 1);
    assert_eq!(second.works[0].metadata, first.works[0].metadata);
    assert!(second.works[0].entry_types.contains(&EntryType::Primary));
    assert!(second.works[0].entry_types.contains(&EntryType::RelatedToPrimary));
    // The mock's expect(1) verifies on drop that the second run stayed local
}

#[tokio::test]
async fn test_stale_cache_entry_is_refetched_with_history() {
    let server = MockServer::start().await;
    let cache_dir = TempDir::new().expect("failed to create temp dir");
    mount_work(&server, "W8", work_doc(&server, "W8", false), 1).await;

    let mut old = Work::new(
        "W8",
        EntryType::ReferenceOfPrimary,
        WorkMetadata::new(json!({ "id": "https://openalex.org/W8", "title": "Old title" })),
    );
    old.status_messages.push(StatusMessage::now("old note"));
    old.persist_datetime = Some(Local::now().naive_local() - TimeDelta::days(31));
    std::fs::write(
        cache_dir.path().join("?_?_W8.json"),
        serde_json::to_string(&old).expect("serialize"),
    )
    .expect("write stale record");

    let mut harvester = Harvester::new(options(&server, Some(cache_dir.path()), None)).expect("harvester");
    let harvest = harvester.get_works(&["W8"]).await;
    let work = &harvest.works[0];

    assert_eq!(work.metadata.title(), Some("Work W8"));
    assert_eq!(work.status_messages[0].message, "old note");
    assert!(work.status_messages.len() > 1);
    assert!(work.entry_types.contains(&EntryType::ReferenceOfPrimary));
    assert!(work.entry_types.contains(&EntryType::Primary));

    // The refreshed record gained a DOI, so it lives under a new name
    assert!(!cache_dir.path().join("?_?_W8.json").exists());
    assert!(cache_dir.path().join("?_10.1234#w8_W8.json").exists());
}

#[tokio::test]
async fn test_closed_access_work_never_requests_pdf() {
    let server = MockServer::start().await;
    let pdf_dir = TempDir::new().expect("failed to create temp dir");
    mount_work(&server, "W9", work_doc(&server, "W9", false), 1).await;
    Mock::given(method("GET"))
        .and(path("/pdf/W9.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let mut harvester = Harvester::new(options(&server, None, Some(pdf_dir.path()))).expect("harvester");
    let harvest = harvester.get_works(&["W9"]).await;

    assert!(harvest.works[0].pdf_path.is_none());
}

#[tokio::test]
async fn test_open_access_pdf_is_saved() {
    let server = MockServer::start().await;
    let pdf_dir = TempDir::new().expect("failed to create temp dir");
    mount_work(&server, "W10", work_doc(&server, "W10", true), 1).await;
    Mock::given(method("GET"))
        .and(path("/pdf/W10.pdf"))
        .and(query_param("mailto", "test@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 body".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let mut harvester = Harvester::new(options(&server, None, Some(pdf_dir.path()))).expect("harvester");
    let harvest = harvester.get_works(&["W10"]).await;

    let saved = harvest.works[0].pdf_path.clone().expect("PDF path should be set");
    assert_eq!(saved, pdf_dir.path().join("?_10.1234#w10_W10.pdf"));
    assert_eq!(std::fs::read(&saved).expect("read pdf"), b"%PDF-1.7 body");
}

#[tokio::test]
async fn test_forbidden_pdf_without_browser_is_not_saved() {
    let server = MockServer::start().await;
    let pdf_dir = TempDir::new().expect("failed to create temp dir");
    mount_work(&server, "W11", work_doc(&server, "W11", true), 1).await;
    Mock::given(method("GET"))
        .and(path("/pdf/W11.pdf"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let mut harvester = Harvester::new(options(&server, None, Some(pdf_dir.path()))).expect("harvester");
    let harvest = harvester.get_works(&["W11"]).await;

    assert_eq!(harvest.works.len(), 1);
    assert!(harvest.works[0].pdf_path.is_none());
    assert!(harvest.failed_calls.is_empty());
    assert_eq!(std::fs::read_dir(pdf_dir.path()).expect("read dir").count(), 0);
}

#[tokio::test]
async fn test_forbidden_pdf_with_browser_tries_pmc_then_publisher() {
    let server = MockServer::start().await;
    let pdf_dir = TempDir::new().expect("failed to create temp dir");
    mount_work(&server, "W12", work_doc(&server, "W12", true), 1).await;
    Mock::given(method("GET"))
        .and(path("/pdf/W12.pdf"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let browser = RecordingBrowser::default();
    let mut harvester = Harvester::with_browser(
        options(&server, None, Some(pdf_dir.path())),
        Box::new(browser.clone()),
    )
    .expect("harvester");
    let harvest = harvester.get_works(&["W12"]).await;

    assert!(harvest.works[0].pdf_path.is_none());
    let urls = browser.urls.lock().expect("lock").clone();
    assert_eq!(
        urls,
        vec![
            "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC6341984/pdf/".to_string(),
            format!("{}/pdf/W12.pdf", server.uri()),
        ]
    );
}

#[tokio::test]
async fn test_citations_are_paged_and_tagged() {
    let server = MockServer::start().await;
    let mut doc = work_doc(&server, "W13", false);
    doc["cited_by_count"] = json!(450);
    doc["cited_by_api_url"] = json!(format!("{}/citing/W13", server.uri()));
    mount_work(&server, "W13", doc, 1).await;

    for page in 1..=3 {
        Mock::given(method("GET"))
            .and(path("/citing/W13"))
            .and(query_param("page", page.to_string()))
            .and(query_param("per_page", "200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "id": format!("https://openalex.org/W13{}", page) }]
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let cache_dir = TempDir::new().expect("failed to create temp dir");
    let mut harvester = Harvester::new(options(&server, Some(cache_dir.path()), None)).expect("harvester");
    let primary = harvester.get_works(&["W13"]).await;
    let citing = harvester.get_citations(&primary.works).await;

    let uids: Vec<&str> = citing.iter().map(|w| w.uid.as_str()).collect();
    assert_eq!(uids, vec!["W131", "W132", "W133"]);
    assert!(citing
        .iter()
        .all(|w| w.entry_types.contains(&EntryType::CitingPrimary) && w.persist_datetime.is_some()));
    assert!(cache_dir.path().join("?_?_W132.json").exists());
}

fn stored_record(dir: &Path, stem: &str) -> Work {
    let body = std::fs::read_to_string(dir.join(format!("{}.json", stem))).expect("read record");
    serde_json::from_str(&body).expect("parse record")
}

#[tokio::test]
async fn test_citation_of_cached_work_keeps_its_history() {
    let server = MockServer::start().await;
    let cache_dir = TempDir::new().expect("failed to create temp dir");

    let w2 = work_doc(&server, "W2", false);
    let mut w1 = work_doc(&server, "W1", false);
    w1["cited_by_count"] = json!(1);
    w1["cited_by_api_url"] = json!(format!("{}/citing/W1", server.uri()));
    mount_work(&server, "W2", w2.clone(), 1).await;
    mount_work(&server, "W1", w1, 1).await;
    Mock::given(method("GET"))
        .and(path("/citing/W1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [w2] })))
        .expect(1)
        .mount(&server)
        .await;

    let mut harvester = Harvester::new(options(&server, Some(cache_dir.path()), None)).expect("harvester");
    let primary = harvester.get_works(&["W2", "W1"]).await;
    let before = stored_record(cache_dir.path(), "?_10.1234#w2_W2");
    assert_eq!(before.entry_types.len(), 1);

    let citing_w1: Vec<Work> = primary.works.iter().filter(|w| w.uid == "W1").cloned().collect();
    let citing = harvester.get_citations(&citing_w1).await;
    assert_eq!(citing.len(), 1);

    let after = stored_record(cache_dir.path(), "?_10.1234#w2_W2");
    assert!(after.entry_types.contains(&EntryType::Primary));
    assert!(after.entry_types.contains(&EntryType::CitingPrimary));
    assert_eq!(after.status_messages[..before.status_messages.len()], before.status_messages[..]);
    assert!(after.status_messages.len() > before.status_messages.len());
    assert_eq!(citing[0].entry_types, after.entry_types);
}

#[tokio::test]
async fn test_cached_work_is_found_by_pmcid() {
    let server = MockServer::start().await;
    let cache_dir = TempDir::new().expect("failed to create temp dir");
    mount_work(&server, "W5", work_doc(&server, "W5", false), 1).await;
    Mock::given(method("GET"))
        .and(path("/works/pmcid:PMC6341984"))
        .respond_with(ResponseTemplate::new(200).set_body_json(work_doc(&server, "W5", false)))
        .expect(0)
        .mount(&server)
        .await;

    let mut harvester = Harvester::new(options(&server, Some(cache_dir.path()), None)).expect("harvester");
    harvester.get_works(&["W5"]).await;

    let mut opts = options(&server, Some(cache_dir.path()), None);
    opts.entry_type = EntryType::ReferenceOfPrimary;
    let mut harvester = Harvester::new(opts).expect("harvester");
    let harvest = harvester.get_works(&["pmc6341984"]).await;

    assert_eq!(harvest.works.len(), 1);
    assert!(harvest.works[0].entry_types.contains(&EntryType::Primary));
    assert!(harvest.works[0].entry_types.contains(&EntryType::ReferenceOfPrimary));
    let stored = stored_record(cache_dir.path(), "?_10.1234#w5_W5");
    assert!(stored.entry_types.contains(&EntryType::Primary));
}

#[tokio::test]
async fn test_invalid_options_are_rejected() {
    let server = MockServer::start().await;
    let mut opts = options(&server, None, None);
    opts.contact = String::new();
    assert!(Harvester::new(opts).is_err());
}
