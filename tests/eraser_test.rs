//! Integration tests for BulkEraser and StorageService.

use aws_bulk::config::BulkConfig;
use aws_bulk::error::BulkError;
use aws_bulk::mocks::{InMemoryObjectStore, StoreOp};
use aws_bulk::services::{BulkEraser, StorageService};
use std::sync::Arc;
use test_case::test_case;

fn create_storage(store: Arc<InMemoryObjectStore>) -> StorageService {
    StorageService::new(Arc::new(BulkConfig::default()), store)
}

fn create_eraser(store: Arc<InMemoryObjectStore>) -> BulkEraser {
    BulkEraser::new(create_storage(store))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_empty_versioned_container() {
    init_tracing();
    let store = Arc::new(InMemoryObjectStore::new());
    store.create_container("versioned", true);
    store.insert_object("versioned", "a", "a1");
    store.insert_object("versioned", "a", "a2");
    store.insert_object("versioned", "b", "b1");
    store.insert_object("versioned", "c", "c1");
    assert_eq!(store.version_count("versioned"), 4);

    let report = create_eraser(store.clone())
        .empty_container("versioned")
        .await
        .unwrap();

    assert_eq!(store.object_count("versioned"), 0);
    assert_eq!(store.version_count("versioned"), 0);
    assert_eq!(report.objects_deleted, 3);
    // four versions plus the three delete markers left by the first phase
    assert_eq!(report.versions_deleted, 7);
    assert!(store.container_exists("versioned"));
}

#[tokio::test]
async fn test_empty_container_with_existing_delete_markers() {
    let store = Arc::new(InMemoryObjectStore::new());
    store.create_container("b", true);
    store.insert_object("b", "gone", "x");
    store.insert_delete_marker("b", "gone");
    assert_eq!(store.object_count("b"), 0);

    let report = create_eraser(store.clone()).empty_container("b").await.unwrap();

    assert_eq!(report.objects_deleted, 0);
    assert_eq!(report.versions_deleted, 2);
    assert_eq!(store.version_count("b"), 0);
}

#[tokio::test]
async fn test_empty_unversioned_container_across_pages() {
    let store = Arc::new(InMemoryObjectStore::new().with_page_size(2));
    store.create_container("plain", false);
    for key in ["a", "b", "c", "d"] {
        store.insert_object("plain", key, "data");
    }

    let report = create_eraser(store.clone()).empty_container("plain").await.unwrap();

    assert_eq!(report.objects_deleted, 4);
    assert_eq!(report.versions_deleted, 0);
    assert_eq!(store.calls(StoreOp::ListObjects), 2);
    assert_eq!(store.calls(StoreOp::ListVersions), 1);
    assert_eq!(report.pages_listed, 3);
    assert_eq!(store.calls(StoreOp::DeleteObject), 4);
}

#[tokio::test]
async fn test_empty_container_that_is_already_empty() {
    let store = Arc::new(InMemoryObjectStore::new());
    store.create_container("empty", true);

    let report = create_eraser(store.clone()).empty_container("empty").await.unwrap();

    assert_eq!(report.objects_deleted, 0);
    assert_eq!(report.versions_deleted, 0);
    assert_eq!(report.pages_listed, 2);
    assert_eq!(store.calls(StoreOp::DeleteObject), 0);
    assert_eq!(store.calls(StoreOp::DeleteVersion), 0);
}

#[tokio::test]
async fn test_first_delete_failure_aborts_and_rerun_finishes() {
    let store = Arc::new(InMemoryObjectStore::new());
    store.create_container("bucket", false);
    for key in ["a", "b", "c"] {
        store.insert_object("bucket", key, "data");
    }
    store.fail(StoreOp::DeleteObject, Some("b"), "AccessDenied", 403);
    let eraser = create_eraser(store.clone());

    let result = eraser.empty_container("bucket").await;
    match result {
        Err(BulkError::Service(e)) => {
            assert_eq!(e.code, "AccessDenied");
            assert_eq!(e.resource.as_deref(), Some("bucket/b"));
        }
        other => panic!("Expected ServiceError, got {:?}", other),
    }
    assert!(store.object("bucket", "a").is_none());
    assert!(store.object("bucket", "b").is_some());
    assert!(store.object("bucket", "c").is_some());

    store.clear_failures();
    let report = eraser.empty_container("bucket").await.unwrap();
    assert_eq!(report.objects_deleted, 2);
    assert_eq!(store.object_count("bucket"), 0);
}

#[tokio::test]
async fn test_version_delete_failure_carries_version_context() {
    let store = Arc::new(InMemoryObjectStore::new());
    store.create_container("bucket", true);
    store.insert_object("bucket", "k", "data");
    store.fail(StoreOp::DeleteVersion, Some("k"), "AccessDenied", 403);

    let err = create_eraser(store)
        .empty_container("bucket")
        .await
        .unwrap_err();
    match err {
        BulkError::Service(e) => {
            assert_eq!(e.operation, "DeleteObject");
            assert!(e.resource.unwrap().starts_with("bucket/k"));
        }
        other => panic!("Expected ServiceError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_list_failure_propagates() {
    let store = Arc::new(InMemoryObjectStore::new());
    store.create_container("bucket", false);
    store.fail(StoreOp::ListObjects, None, "InternalError", 500);

    let err = create_eraser(store).empty_container("bucket").await.unwrap_err();
    assert_eq!(err.code(), Some("InternalError"));
    assert_eq!(err.status_code(), Some(500));
}

#[test_case(StoreOp::ListObjects; "objects")]
#[test_case(StoreOp::ListVersions; "versions")]
#[tokio::test]
async fn test_list_failure_names_the_container(op: StoreOp) {
    let store = Arc::new(InMemoryObjectStore::new());
    store.create_container("bucket", true);
    store.insert_object("bucket", "k", "data");
    store.fail(op, None, "SlowDown", 503);

    let err = create_eraser(store).empty_container("bucket").await.unwrap_err();
    match err {
        BulkError::Service(e) => {
            assert_eq!(e.code, "SlowDown");
            assert_eq!(e.resource.as_deref(), Some("bucket"));
        }
        other => panic!("Expected ServiceError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_list_keys_failure_names_the_container() {
    let store = Arc::new(InMemoryObjectStore::new());
    store.create_container("bucket", false);
    store.fail(StoreOp::ListObjects, None, "AccessDenied", 403);

    let err = create_storage(store).list_keys("bucket", None).await.unwrap_err();
    match err {
        BulkError::Service(e) => assert_eq!(e.resource.as_deref(), Some("bucket")),
        other => panic!("Expected ServiceError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_delete_container() {
    let store = Arc::new(InMemoryObjectStore::new().with_page_size(3));
    store.create_container("doomed", true);
    for i in 0..10 {
        store.insert_object("doomed", &format!("key-{i}"), "data");
    }

    let report = create_eraser(store.clone())
        .delete_container("doomed")
        .await
        .unwrap();

    assert_eq!(report.objects_deleted, 10);
    assert!(!store.container_exists("doomed"));
}

#[tokio::test]
async fn test_delete_missing_container_fails() {
    let store = Arc::new(InMemoryObjectStore::new());

    let err = create_eraser(store).delete_container("ghost").await.unwrap_err();
    assert_eq!(err.code(), Some("NoSuchBucket"));
}

#[tokio::test]
async fn test_list_keys_with_prefix() {
    let store = Arc::new(InMemoryObjectStore::new().with_page_size(2));
    store.create_container("bucket", false);
    for key in ["logs/1", "logs/2", "logs/3", "data/1", "logs/4"] {
        store.insert_object("bucket", key, "x");
    }

    let keys = create_storage(store)
        .list_keys("bucket", Some("logs/"))
        .await
        .unwrap();

    assert_eq!(keys, vec!["logs/1", "logs/2", "logs/3", "logs/4"]);
}

#[tokio::test]
async fn test_list_keys_uses_configured_page_size() {
    let store = Arc::new(InMemoryObjectStore::new());
    store.create_container("bucket", false);
    for i in 0..7 {
        store.insert_object("bucket", &format!("k{i}"), "x");
    }
    let config = BulkConfig {
        list_page_size: Some(3),
        ..Default::default()
    };
    let storage = StorageService::new(Arc::new(config), store.clone());

    let keys = storage.list_keys("bucket", None).await.unwrap();

    assert_eq!(keys.len(), 7);
    assert_eq!(store.calls(StoreOp::ListObjects), 3);
}

#[tokio::test]
async fn test_exists() {
    let store = Arc::new(InMemoryObjectStore::new());
    store.create_container("bucket", false);
    store.insert_object("bucket", "present", "x");
    let storage = create_storage(store);

    assert!(storage.exists("bucket", "present").await.unwrap());
    assert!(!storage.exists("bucket", "absent").await.unwrap());
}

#[tokio::test]
async fn test_exists_propagates_access_denied() {
    let store = Arc::new(InMemoryObjectStore::new());
    store.create_container("bucket", false);
    store.fail(StoreOp::HeadObject, None, "AccessDenied", 403);

    let result = create_storage(store).exists("bucket", "key").await;
    match result {
        Err(BulkError::Service(e)) => assert_eq!(e.status, Some(403)),
        other => panic!("Expected ServiceError, got {:?}", other),
    }
}
