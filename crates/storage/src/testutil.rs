//! Shared test utilities for key-set storage testing.
//!
//! This module provides fixture key sets and a fault-injecting store
//! wrapper. It is feature-gated behind `testutil` to prevent leaking into
//! production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! carebase-common-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use carebase_common_storage::testutil::{FailingKeySetStore, make_key_set};
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{
    auth::{KeySet, KeySetStore, MemoryKeySetStore},
    error::{StorageError, StorageResult},
};

/// Create a valid key set with deterministic, distinct secrets.
///
/// The secrets are derived from `version` so two fixtures with different
/// versions never share material. Passes [`KeySet::validate`].
#[must_use]
pub fn make_key_set(version: &str, created_at: DateTime<Utc>, retention: chrono::Duration) -> KeySet {
    let tag: u32 = version.bytes().fold(17u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
    KeySet::builder()
        .version(version)
        .access_secret(format!("{:08x}", tag).repeat(16))
        .refresh_secret(format!("{:08x}", !tag).repeat(16))
        .created_at(created_at)
        .expires_at(created_at + retention)
        .build()
}

/// A [`KeySetStore`] wrapper that fails or stalls on demand.
///
/// Delegates to an inner store (in-memory by default). Each operation
/// can be switched to fail with [`StorageError::Io`] at runtime, and
/// `persist_current` can be delayed to widen race windows in concurrency
/// tests.
///
/// Clones share switches, counters, and the inner store.
#[derive(Clone)]
pub struct FailingKeySetStore {
    inner: Arc<dyn KeySetStore>,
    fail_load: Arc<AtomicBool>,
    fail_persist_current: Arc<AtomicBool>,
    fail_persist_retired: Arc<AtomicBool>,
    persist_delay: Arc<Mutex<Option<Duration>>>,
    persist_current_calls: Arc<AtomicU64>,
}

impl FailingKeySetStore {
    /// Wraps a fresh [`MemoryKeySetStore`].
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(Arc::new(MemoryKeySetStore::new()))
    }

    /// Wraps an existing store.
    #[must_use]
    pub fn wrap(inner: Arc<dyn KeySetStore>) -> Self {
        Self {
            inner,
            fail_load: Arc::new(AtomicBool::new(false)),
            fail_persist_current: Arc::new(AtomicBool::new(false)),
            fail_persist_retired: Arc::new(AtomicBool::new(false)),
            persist_delay: Arc::new(Mutex::new(None)),
            persist_current_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Makes `load_current` and `load_retired` fail.
    pub fn set_fail_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    /// Makes `persist_current` fail.
    pub fn set_fail_persist_current(&self, fail: bool) {
        self.fail_persist_current.store(fail, Ordering::SeqCst);
    }

    /// Makes `persist_retired` fail.
    pub fn set_fail_persist_retired(&self, fail: bool) {
        self.fail_persist_retired.store(fail, Ordering::SeqCst);
    }

    /// Delays every `persist_current` call by `delay`.
    pub fn set_persist_delay(&self, delay: Option<Duration>) {
        *self.persist_delay.lock() = delay;
    }

    /// Number of `persist_current` calls that reached the inner store.
    #[must_use]
    pub fn persist_current_calls(&self) -> u64 {
        self.persist_current_calls.load(Ordering::SeqCst)
    }
}

impl Default for FailingKeySetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeySetStore for FailingKeySetStore {
    async fn load_current(&self) -> StorageResult<Option<KeySet>> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(StorageError::io("injected load failure"));
        }
        self.inner.load_current().await
    }

    async fn persist_current(&self, key_set: &KeySet) -> StorageResult<()> {
        let delay = *self.persist_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_persist_current.load(Ordering::SeqCst) {
            return Err(StorageError::io("injected persist failure"));
        }
        self.persist_current_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.persist_current(key_set).await
    }

    async fn load_retired(&self) -> StorageResult<Vec<KeySet>> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(StorageError::io("injected load failure"));
        }
        self.inner.load_retired().await
    }

    async fn persist_retired(&self, key_sets: &[KeySet]) -> StorageResult<()> {
        if self.fail_persist_retired.load(Ordering::SeqCst) {
            return Err(StorageError::io("injected persist failure"));
        }
        self.inner.persist_retired(key_sets).await
    }
}

/// Assert that a [`StorageResult`] is an `Err` matching the given [`StorageError`] variant.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use carebase_common_storage::{StorageError, StorageResult, assert_storage_error};
///
/// let result: StorageResult<()> = Err(StorageError::io("disk full"));
/// assert_storage_error!(result, Io);
/// ```
#[macro_export]
macro_rules! assert_storage_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::$variant { .. })),
            "expected StorageError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_make_key_set_is_valid_and_distinct() {
        let now = Utc::now();
        let a = make_key_set("v1_aa", now, chrono::Duration::days(7));
        let b = make_key_set("v2_bb", now, chrono::Duration::days(7));

        a.validate().expect("fixture must validate");
        b.validate().expect("fixture must validate");
        assert_ne!(*a.access_secret, *b.access_secret);
        assert_eq!(a.expires_at, now + chrono::Duration::days(7));
    }

    #[tokio::test]
    async fn test_failing_store_switches() {
        let store = FailingKeySetStore::new();
        let key_set = make_key_set("v1_aa", Utc::now(), chrono::Duration::days(7));

        store.set_fail_persist_current(true);
        assert_storage_error!(store.persist_current(&key_set).await, Io);
        assert_eq!(store.persist_current_calls(), 0);

        store.set_fail_persist_current(false);
        store.persist_current(&key_set).await.expect("persist");
        assert_eq!(store.persist_current_calls(), 1);

        store.set_fail_load(true);
        assert_storage_error!(store.load_current().await, Io);
    }
}
