use govsync_store::{DocumentCache, StoreError, SyncConfig};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

#[tokio::test]
async fn get_or_compute_runs_once_per_key() {
    let tmp = TempDir::new().expect("tempdir");
    let cache = DocumentCache::new(&SyncConfig::with_home(tmp.path()));
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        let value: String = cache
            .get_or_compute("USA/Econ", "ZTMProposal:v1:1", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StoreError>("summary".to_string())
            })
            .await
            .expect("compute");
        assert_eq!(value, "summary");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Survives a restart.
    let reopened = DocumentCache::new(&SyncConfig::with_home(tmp.path()));
    assert_eq!(
        reopened
            .get::<String>("USA/Econ", "ZTMProposal:v1:1")
            .await
            .expect("get"),
        Some("summary".to_string())
    );
}

#[tokio::test]
async fn failed_compute_is_not_cached() {
    let tmp = TempDir::new().expect("tempdir");
    let cache = DocumentCache::new(&SyncConfig::with_home(tmp.path()));

    let err = cache
        .get_or_compute::<String, StoreError, _, _>("ns", "k", || async {
            Err(StoreError::Other("ledger down".into()))
        })
        .await
        .expect_err("compute fails");
    assert!(matches!(err, StoreError::Other(_)));
    assert_eq!(cache.get::<String>("ns", "k").await.expect("get"), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_puts_to_one_namespace_keep_every_entry() {
    let tmp = TempDir::new().expect("tempdir");
    let cache = DocumentCache::new(&SyncConfig::with_home(tmp.path()));
    let body = "y".repeat(200 * 1024);

    for round in 0..5 {
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..8 {
            let cache = cache.clone();
            let body = body.clone();
            tasks.spawn(async move {
                cache
                    .put("USA/Econ", &format!("p{round}-{i}"), &body)
                    .await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.expect("put task").expect("put");
        }
    }

    let entries: std::collections::BTreeMap<String, String> =
        cache.entries("USA/Econ").await.expect("entries");
    assert_eq!(entries.len(), 40);
    assert!(entries.values().all(|value| value.len() == body.len()));
}
