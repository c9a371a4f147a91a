//! Integration tests for the service facade over on-disk stores.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use nfe_core::{
    NfeKey, NfeService, ProcessingStatus, ResolveError, ResolvedUrl, Resolver, ServiceConfig,
    StatusChange,
};
use tempfile::TempDir;

const K1: &str = "51240228517882000186550010000090161000270486";
const K2_INVALID: &str = "5124022851788200018655001000009016100027048";
const K3: &str = "51240228517882000186550010000090231000270693";

#[derive(Default)]
struct CountingResolver {
    calls: AtomicUsize,
}

#[async_trait]
impl Resolver for CountingResolver {
    async fn resolve(&self, key: &NfeKey, _token: Option<&str>) -> Result<ResolvedUrl, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ResolvedUrl::new(format!("https://nfe.example/{key}")))
    }
}

fn open(dir: &TempDir) -> (NfeService, Arc<CountingResolver>) {
    let resolver = Arc::new(CountingResolver::default());
    let service = NfeService::with_resolver(
        ServiceConfig::with_data_dir(dir.path()),
        Arc::clone(&resolver) as Arc<dyn Resolver>,
    );
    (service, resolver)
}

fn key(raw: &str) -> NfeKey {
    NfeKey::parse(raw).unwrap()
}

#[test]
fn test_add_many_counts_added_invalid_and_existing() {
    let dir = TempDir::new().unwrap();
    let (service, _) = open(&dir);

    let outcome = service.add_keys_bulk([K1, K2_INVALID, K1]);

    assert_eq!(outcome.added_count, 1);
    assert_eq!(outcome.invalid_count, 1);
    assert_eq!(outcome.existing_count, 1);
    assert_eq!(outcome.invalid_keys, vec![K2_INVALID.to_string()]);
    assert_eq!(service.list_keys(), vec![key(K1)]);
}

#[test]
fn test_add_key_twice_reports_existing() {
    let dir = TempDir::new().unwrap();
    let (service, _) = open(&dir);

    assert!(!service.add_key(K1).unwrap().already_exists);
    assert!(service.add_key(K1).unwrap().already_exists);
    assert_eq!(service.list_keys().len(), 1);
}

#[test]
fn test_add_key_rejects_malformed_input_without_change() {
    let dir = TempDir::new().unwrap();
    let (service, _) = open(&dir);

    let padded = format!(" {K1}\t");
    for bad in [
        "",
        K2_INVALID,
        "5124022851788200018655001000009016100027048a",
        "５１",
        padded.as_str(),
    ] {
        let err = service.add_key(bad).unwrap_err();
        assert_eq!(err.kind(), "validation_error", "{bad:?}");
    }
    assert!(service.list_keys().is_empty());
}

#[test]
fn test_import_keys_extracts_from_text() {
    let dir = TempDir::new().unwrap();
    let (service, _) = open(&dir);

    let text = format!("Chave: {K1}\nOutra chave {K3}; repetida {K1}\n");
    let outcome = service.import_keys(&text);

    assert_eq!(outcome.added_count, 2);
    assert_eq!(outcome.existing_count, 1);
    assert_eq!(service.list_keys(), vec![key(K1), key(K3)]);
}

#[tokio::test]
async fn test_remove_key_evicts_cached_url() {
    let dir = TempDir::new().unwrap();
    let (service, _) = open(&dir);
    service.add_key(K1).unwrap();
    service.resolve_url(K1, Some("token")).await.unwrap();
    assert!(service.get_url_cache().contains_key(&key(K1)));

    service.remove_key(K1).unwrap();

    assert!(!service.get_url_cache().contains_key(&key(K1)));
    assert!(service.list_keys().is_empty());
}

#[tokio::test]
async fn test_cached_resolution_makes_no_external_call() {
    let dir = TempDir::new().unwrap();
    let (service, resolver) = open(&dir);
    service.seed_url_cache([(K1, "https://seeded.example/nfe")]);

    let resolution = service.resolve_url(K1, None).await.unwrap();

    assert!(resolution.from_cache);
    assert_eq!(resolution.url, "https://seeded.example/nfe");
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_uncached_resolution_without_token_is_credential_required() {
    let dir = TempDir::new().unwrap();
    let (service, resolver) = open(&dir);

    let err = service.resolve_url(K1, None).await.unwrap_err();
    assert_eq!(err.kind(), "credential_required");
    let err = service.resolve_url(K1, Some("   ")).await.unwrap_err();
    assert_eq!(err.kind(), "credential_required");
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_set_status_done_removes_and_other_upserts() {
    let dir = TempDir::new().unwrap();
    let (service, _) = open(&dir);

    let StatusChange::Upserted(first) = service.set_status(K1, "processing", "attempt 1/3").unwrap()
    else {
        panic!("expected upsert");
    };
    let StatusChange::Upserted(second) = service.set_status(K1, "retry", "HTTP 503").unwrap() else {
        panic!("expected upsert");
    };
    assert_eq!(second.status, ProcessingStatus::Retry);
    assert!(second.updated_at > first.updated_at);

    assert_eq!(
        service.set_status(K1, "done", "").unwrap(),
        StatusChange::Removed { existed: true }
    );
    assert!(service.get_status_all().is_empty());
}

#[tokio::test]
async fn test_clear_caches_forget_every_entry() {
    let dir = TempDir::new().unwrap();
    let (service, _) = open(&dir);
    service.resolve_url(K1, Some("t")).await.unwrap();
    service.resolve_url(K3, Some("t")).await.unwrap();
    service.set_status(K1, "error", "boom").unwrap();

    assert_eq!(service.clear_url_cache(), 2);
    assert_eq!(service.clear_status_cache(), 1);

    assert!(service.get_url_cache().is_empty());
    assert!(service.get_status_all().is_empty());
    assert_eq!(service.get_details(K1).unwrap_err().kind(), "not_found");
}

#[tokio::test]
async fn test_state_reloads_from_disk() {
    let dir = TempDir::new().unwrap();
    {
        let (service, _) = open(&dir);
        service.add_keys_bulk([K1, K3]);
        service.resolve_url(K1, Some("t")).await.unwrap();
        service.set_status(K3, "error", "timeout").unwrap();
    }

    let (reopened, resolver) = open(&dir);
    assert_eq!(reopened.list_keys(), vec![key(K1), key(K3)]);
    assert_eq!(
        reopened.get_url_cache()[&key(K1)].url,
        format!("https://nfe.example/{K1}")
    );
    let details = reopened.get_details(K3).unwrap();
    assert!(details.registered);
    assert_eq!(details.status.unwrap().message, "timeout");

    // Cached entries survive the restart, so no new resolver call is needed.
    assert!(reopened.resolve_url(K1, None).await.unwrap().from_cache);
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_corrupt_cache_file_loads_empty() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("url_cache.json"), "{ not json").unwrap();
    std::fs::write(dir.path().join("status_cache.json"), "[1, 2").unwrap();

    let (service, _) = open(&dir);

    assert!(service.get_url_cache().is_empty());
    assert!(service.get_status_all().is_empty());
    service.seed_url_cache([(K1, "https://seeded.example")]);
    assert_eq!(service.get_url_cache().len(), 1);
}

#[test]
fn test_registry_file_is_newline_delimited() {
    let dir = TempDir::new().unwrap();
    let (service, _) = open(&dir);
    service.add_keys_bulk([K1, K3]);

    let raw = std::fs::read_to_string(dir.path().join("nfe_keys.txt")).unwrap();
    assert_eq!(raw.lines().collect::<Vec<_>>(), vec![K1, K3]);
}
