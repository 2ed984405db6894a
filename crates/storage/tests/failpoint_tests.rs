#![allow(clippy::expect_used, clippy::panic)]
//! Integration tests for fail-point injection.
//!
//! These tests require the `failpoints` and `testutil` features:
//! ```bash
//! cargo test -p carebase-common-storage --features failpoints,testutil --test failpoint_tests
//! ```

use carebase_common_storage::{
    StorageError,
    auth::{FileKeySetStore, KeySetStore},
    testutil::make_key_set,
};
use chrono::{Duration, Utc};
use tempfile::TempDir;

#[tokio::test]
async fn interrupted_write_keeps_previous_record() {
    let scenario = fail::FailScenario::setup();
    let tmp = TempDir::new().expect("tempdir");
    let store = FileKeySetStore::new(tmp.path());
    let previous = make_key_set("v1_aa", Utc::now(), Duration::days(7));
    store.persist_current(&previous).await.expect("initial write");

    fail::cfg("file-store-before-rename", "return").expect("failed to configure fail point");
    let result = store.persist_current(&make_key_set("v2_bb", Utc::now(), Duration::days(7))).await;

    assert!(matches!(result, Err(StorageError::Io { .. })), "write should fail: {result:?}");
    assert_eq!(store.load_current().await.expect("load"), Some(previous));
    assert!(
        !store.current_path().with_extension("json.tmp").exists(),
        "temporary file with secrets must not be left behind"
    );

    scenario.teardown();
}

#[tokio::test]
async fn write_succeeds_after_fail_point_removed() {
    let scenario = fail::FailScenario::setup();
    let tmp = TempDir::new().expect("tempdir");
    let store = FileKeySetStore::new(tmp.path());

    fail::cfg("file-store-before-rename", "return").expect("failed to configure fail point");
    let key_set = make_key_set("v1_aa", Utc::now(), Duration::days(7));
    assert!(store.persist_retired(std::slice::from_ref(&key_set)).await.is_err());
    assert!(!store.retired_path().with_extension("json.tmp").exists());
    assert!(store.persist_current(&key_set).await.is_err());
    assert!(store.load_current().await.expect("load").is_none(), "no partial record");

    fail::remove("file-store-before-rename");
    store.persist_current(&key_set).await.expect("write after removal");
    assert_eq!(store.load_current().await.expect("load"), Some(key_set));

    scenario.teardown();
}
