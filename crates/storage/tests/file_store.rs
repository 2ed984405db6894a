//! File-backed key store behavior across process restarts.
#![allow(clippy::expect_used, clippy::panic)]

use carebase_common_storage::{
    StorageError,
    auth::{CURRENT_KEYS_FILE, FileKeySetStore, KeySetStore, RETIRED_KEYS_FILE},
    testutil::make_key_set,
};
use chrono::{Duration, Utc};
use rstest::rstest;
use tempfile::TempDir;

#[tokio::test]
async fn records_survive_a_new_store_instance() {
    let tmp = TempDir::new().expect("tempdir");
    let now = Utc::now();
    let current = make_key_set("v2_bb", now, Duration::days(7));
    let retired = vec![make_key_set("v1_aa", now - Duration::days(1), Duration::days(7))];

    {
        let store = FileKeySetStore::new(tmp.path());
        store.persist_current(&current).await.expect("persist current");
        store.persist_retired(&retired).await.expect("persist retired");
    }

    let reopened = FileKeySetStore::new(tmp.path());
    assert_eq!(reopened.load_current().await.expect("load"), Some(current));
    assert_eq!(reopened.load_retired().await.expect("load"), retired);
}

#[tokio::test]
async fn files_use_documented_names_and_camel_case() {
    let tmp = TempDir::new().expect("tempdir");
    let store = FileKeySetStore::new(tmp.path());
    let key_set = make_key_set("v1_aa", Utc::now(), Duration::days(7));

    store.persist_current(&key_set).await.expect("persist");
    store.persist_retired(&[]).await.expect("persist");

    let raw = std::fs::read_to_string(tmp.path().join(CURRENT_KEYS_FILE)).expect("read");
    let json: serde_json::Value = serde_json::from_str(&raw).expect("json");
    for field in ["version", "accessSecret", "refreshSecret", "createdAt", "expiresAt"] {
        assert!(json.get(field).is_some(), "missing {field} in {raw}");
    }
    assert!(tmp.path().join(RETIRED_KEYS_FILE).exists());
}

#[rstest]
#[case::truncated(b"{\"version\": \"v1".as_slice())]
#[case::wrong_shape(b"[1, 2, 3]".as_slice())]
#[case::empty(b"".as_slice())]
#[tokio::test]
async fn unreadable_record_is_recoverable(#[case] contents: &[u8]) {
    let tmp = TempDir::new().expect("tempdir");
    std::fs::write(tmp.path().join(CURRENT_KEYS_FILE), contents).expect("write");
    let store = FileKeySetStore::new(tmp.path());

    let err = store.load_current().await.expect_err("corrupt record");
    assert!(matches!(err, StorageError::Serialization { .. }));
    assert!(err.is_recoverable_by_regeneration());

    // A fresh write replaces the corrupt record.
    let key_set = make_key_set("v1_aa", Utc::now(), Duration::days(7));
    store.persist_current(&key_set).await.expect("overwrite");
    assert_eq!(store.load_current().await.expect("load"), Some(key_set));
}

#[tokio::test]
async fn stale_temp_file_is_ignored() {
    let tmp = TempDir::new().expect("tempdir");
    let store = FileKeySetStore::new(tmp.path());
    let key_set = make_key_set("v1_aa", Utc::now(), Duration::days(7));
    store.persist_current(&key_set).await.expect("persist");

    std::fs::write(store.current_path().with_extension("json.tmp"), b"garbage").expect("write");

    assert_eq!(store.load_current().await.expect("load"), Some(key_set.clone()));
    store.persist_current(&key_set).await.expect("persist over stale temp file");
}

#[tokio::test]
async fn unreadable_directory_is_not_recoverable() {
    let tmp = TempDir::new().expect("tempdir");
    // A directory where the record file should be cannot be read as a file.
    std::fs::create_dir(tmp.path().join(CURRENT_KEYS_FILE)).expect("mkdir");
    let store = FileKeySetStore::new(tmp.path());

    let err = store.load_current().await.expect_err("directory in place of file");
    assert!(matches!(err, StorageError::Io { .. }));
    assert!(!err.is_recoverable_by_regeneration());
}

#[tokio::test]
async fn failed_rename_removes_temporary_file() {
    let tmp = TempDir::new().expect("tempdir");
    // A directory in place of the record makes the final rename fail.
    std::fs::create_dir(tmp.path().join(CURRENT_KEYS_FILE)).expect("mkdir");
    let store = FileKeySetStore::new(tmp.path());

    let err = store
        .persist_current(&make_key_set("v1_aa", Utc::now(), Duration::days(7)))
        .await
        .expect_err("rename over a directory");

    assert!(matches!(err, StorageError::Io { .. }));
    assert!(!store.current_path().with_extension("json.tmp").exists());
}
