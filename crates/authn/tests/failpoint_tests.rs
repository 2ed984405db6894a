#![allow(clippy::expect_used, clippy::panic)]
//! Integration tests for fail-point injection in the authn crate.
//!
//! These tests require both `failpoints` and `testutil` features:
//! ```bash
//! cargo test -p carebase-common-authn --features failpoints,testutil --test failpoint_tests
//! ```

use std::sync::Arc;

use carebase_common_authn::{
    KeyRotationService, assert_auth_error,
    testutil::{TestAuth, test_rotation_config},
};
use carebase_common_storage::auth::MemoryKeySetStore;
use serde_json::json;

#[tokio::test]
async fn entropy_failure_aborts_rotation_and_keeps_current_key() {
    let scenario = fail::FailScenario::setup();
    let auth = TestAuth::new().await;
    let v1 = auth.service.current_key_version().expect("current");
    let token = auth.issuer.issue_access_token(&json!({"id": "usr_1"})).expect("issue");

    // Enable fail point — secret generation should fail
    fail::cfg("secret-before-generate", "return").expect("failed to configure fail point");

    let result = auth.service.force_rotation().await;
    assert_auth_error!(result, Entropy, "rotation should fail when the random source fails");
    assert_eq!(auth.service.current_key_version().expect("current"), v1);
    assert!(auth.verifier.verify_access_token(&token).is_ok());
    assert_eq!(auth.service.metrics().rotation_failures_total, 1);

    fail::remove("secret-before-generate");
    assert!(auth.service.force_rotation().await.expect("rotate").is_rotated());

    auth.service.shutdown().await;
    scenario.teardown();
}

#[tokio::test]
async fn entropy_failure_at_startup_is_fatal_and_retryable() {
    let scenario = fail::FailScenario::setup();
    let store = MemoryKeySetStore::new();
    let service = Arc::new(KeyRotationService::new(Arc::new(store.clone()), test_rotation_config()));

    fail::cfg("secret-before-generate", "return").expect("failed to configure fail point");
    let result = service.initialize().await;
    assert_auth_error!(result, Entropy);
    assert!(!service.is_scheduler_running());
    assert!(!service.health().healthy);

    fail::remove("secret-before-generate");
    service.initialize().await.expect("retry after entropy recovers");
    assert!(service.health().healthy);

    service.shutdown().await;
    scenario.teardown();
}

#[tokio::test]
async fn rotation_without_failpoint_succeeds() {
    let scenario = fail::FailScenario::setup();
    let auth = TestAuth::new().await;

    // No fail point configured — rotation should succeed normally
    let outcome = auth.service.force_rotation().await.expect("rotate");
    assert!(outcome.is_rotated());

    auth.service.shutdown().await;
    scenario.teardown();
}
