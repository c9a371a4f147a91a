//! Integration tests for batch runs through the service facade.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nfe_core::{
    FailedKey, NfeKey, NfeService, ProcessingStatus, ResolveError, ResolvedUrl, Resolver,
    RetryPolicy, ServiceConfig,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

const GOOD: &str = "51240228517882000186550010000090161000270486";
const BAD: &str = "51240228517882000186550010000090221000270661";

/// Resolves `GOOD` to the mock server and rejects every other key.
struct SplitResolver {
    base: String,
    calls: AtomicUsize,
}

#[async_trait]
impl Resolver for SplitResolver {
    async fn resolve(&self, key: &NfeKey, token: Option<&str>) -> Result<ResolvedUrl, ResolveError> {
        assert!(token.is_none(), "batch runs resolve without a token");
        self.calls.fetch_add(1, Ordering::SeqCst);
        if key.as_str() == GOOD {
            Ok(ResolvedUrl::new(format!("{}/doc/{key}", self.base)))
        } else {
            Err(ResolveError::rejected("NF-e não encontrada"))
        }
    }
}

fn fast_config(dir: &TempDir) -> ServiceConfig {
    ServiceConfig {
        interactive_policy: RetryPolicy::new(1, Duration::ZERO),
        batch_policy: RetryPolicy::new(3, Duration::from_millis(5)),
        ..ServiceConfig::with_data_dir(dir.path())
    }
}

#[tokio::test]
async fn test_batch_with_one_failing_key_writes_one_report() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path(format!("/doc/{GOOD}")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/xml")
                .set_body_string("<nfeProc/>"),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let resolver = Arc::new(SplitResolver {
        base: server.uri(),
        calls: AtomicUsize::new(0),
    });
    let service = NfeService::with_resolver(fast_config(&dir), Arc::clone(&resolver) as Arc<dyn Resolver>);
    let bulk = service.add_keys_bulk([GOOD, BAD]);
    assert_eq!(bulk.added_count, 2);

    let mut seen = Vec::new();
    let report = service
        .run_batch_with_progress(|progress| seen.push((progress.position, progress.success)))
        .await;

    assert_eq!(report.total, 2);
    assert_eq!(report.successful_count, 1);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(seen, vec![(1, true), (2, false)]);
    // One call for GOOD, three for BAD.
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 4);

    let failed = &report.failed[0];
    assert_eq!(failed.key.as_str(), BAD);
    assert_eq!(failed.attempts_api, 3);
    assert_eq!(failed.attempts_download, 0);
    assert!(failed.error.contains("NF-e não encontrada"), "{}", failed.error);

    let reports: Vec<_> = std::fs::read_dir(dir.path().join("logs"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(reports.len(), 1);
    assert_eq!(report.report_path.as_ref(), Some(&reports[0]));
    let written: Vec<FailedKey> =
        serde_json::from_str(&std::fs::read_to_string(&reports[0]).unwrap()).unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].key.as_str(), BAD);

    assert!(dir.path().join("downloads").join(format!("NFE_{GOOD}.xml")).is_file());
    let statuses = service.get_status_all();
    assert!(!statuses.contains_key(&NfeKey::parse(GOOD).unwrap()));
    assert_eq!(
        statuses[&NfeKey::parse(BAD).unwrap()].status,
        ProcessingStatus::Error
    );
}

#[tokio::test]
async fn test_batch_download_failures_count_download_attempts() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let resolver = Arc::new(SplitResolver {
        base: server.uri(),
        calls: AtomicUsize::new(0),
    });
    let service = NfeService::with_resolver(fast_config(&dir), resolver);
    service.add_key(GOOD).unwrap();

    let report = service.run_batch().await;

    assert_eq!(report.successful_count, 0);
    let failed = &report.failed[0];
    assert_eq!(failed.attempts_api, 3);
    assert_eq!(failed.attempts_download, 3);
    assert!(failed.error.starts_with("download failed"), "{}", failed.error);
    assert!(!dir.path().join("downloads").join(format!("NFE_{GOOD}.xml")).exists());
}

#[tokio::test]
async fn test_batch_on_empty_registry_writes_no_report() {
    let dir = TempDir::new().unwrap();
    let resolver = Arc::new(SplitResolver {
        base: "http://127.0.0.1:9".to_string(),
        calls: AtomicUsize::new(0),
    });
    let service = NfeService::with_resolver(fast_config(&dir), resolver);

    let report = service.run_batch().await;

    assert_eq!(report.total, 0);
    assert!(report.report_path.is_none());
    assert!(!dir.path().join("logs").exists());
}
