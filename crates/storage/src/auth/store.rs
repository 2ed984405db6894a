//! Storage trait for the durable key-set record.
//!
//! This module provides the [`KeySetStore`] trait that abstracts persistence
//! of the current [`KeySet`] (and, optionally, the retained history window).
//! Implementations can use different backends: a directory of JSON files for
//! production ([`FileKeySetStore`](crate::auth::FileKeySetStore)), in-memory
//! for testing.
//!
//! # Record Lifecycle
//!
//! ```text
//! startup ──► load_current ──► valid? ──yes──► seed history
//!                                │
//!                                no (missing / corrupt / invalid)
//!                                ▼
//!                       generate ──► persist_current
//!
//! rotation ──► generate ──► persist_retired ──► persist_current ──► promote
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use carebase_common_storage::auth::{KeySet, KeySetStore};
//! use carebase_common_storage::StorageError;
//!
//! async fn replace_current<S: KeySetStore>(
//!     store: &S,
//!     key_set: &KeySet,
//! ) -> Result<(), StorageError> {
//!     store.persist_current(key_set).await
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{auth::KeySet, error::StorageResult};

/// Persistence layer for the signing key-set record.
///
/// The durable record always describes exactly one *current* key set.
/// Writes are whole-record overwrites; there are no partial updates.
///
/// # Retained History
///
/// [`load_retired`](Self::load_retired) and
/// [`persist_retired`](Self::persist_retired) store the key sets that were
/// current before the latest rotation and are still inside their retention
/// window, so tokens signed with them stay verifiable across a restart.
/// Backends that cannot store history keep the default implementations,
/// which report an empty history and discard writes.
///
/// # Error Handling
///
/// `load_current` returns `Ok(None)` when no record exists yet. A record that
/// exists but cannot be decoded must be reported as
/// [`StorageError::Serialization`](crate::StorageError::Serialization) so the
/// caller can regenerate. A backend that cannot be read at all reports
/// [`StorageError::Io`](crate::StorageError::Io), which aborts startup.
#[async_trait]
pub trait KeySetStore: Send + Sync {
    /// Reads the current key-set record.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(key_set))` if a record exists and decodes
    /// - `Ok(None)` if no record exists
    /// - `Err(...)` on storage or decoding errors
    async fn load_current(&self) -> StorageResult<Option<KeySet>>;

    /// Replaces the current key-set record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable or the write fails.
    /// On error the previously stored record must remain readable.
    async fn persist_current(&self, key_set: &KeySet) -> StorageResult<()>;

    /// Reads the retained (previously current) key sets.
    ///
    /// The default implementation reports no history.
    async fn load_retired(&self) -> StorageResult<Vec<KeySet>> {
        Ok(Vec::new())
    }

    /// Replaces the retained key-set record.
    ///
    /// The rotation service writes this before the new current record, so
    /// `key_sets` can include the version that is still current.
    ///
    /// The default implementation discards the write.
    async fn persist_retired(&self, _key_sets: &[KeySet]) -> StorageResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<S: KeySetStore + ?Sized> KeySetStore for Arc<S> {
    async fn load_current(&self) -> StorageResult<Option<KeySet>> {
        (**self).load_current().await
    }

    async fn persist_current(&self, key_set: &KeySet) -> StorageResult<()> {
        (**self).persist_current(key_set).await
    }

    async fn load_retired(&self) -> StorageResult<Vec<KeySet>> {
        (**self).load_retired().await
    }

    async fn persist_retired(&self, key_sets: &[KeySet]) -> StorageResult<()> {
        (**self).persist_retired(key_sets).await
    }
}

/// In-memory implementation of [`KeySetStore`] for testing.
///
/// Does not survive process restarts; clones share the same state, which
/// lets tests simulate a restart by building a second service over a clone.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, Utc};
/// use carebase_common_storage::auth::{KeySet, KeySetStore, MemoryKeySetStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryKeySetStore::new();
///     assert!(store.load_current().await?.is_none());
///
///     let now = Utc::now();
///     let key_set = KeySet::builder()
///         .version("v1_0a1b2c3d")
///         .access_secret("a".repeat(128))
///         .refresh_secret("b".repeat(128))
///         .expires_at(now + Duration::days(7))
///         .build();
///
///     store.persist_current(&key_set).await?;
///     assert_eq!(store.load_current().await?, Some(key_set));
///     Ok(())
/// }
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryKeySetStore {
    current: Arc<RwLock<Option<KeySet>>>,
    retired: Arc<RwLock<Vec<KeySet>>>,
}

impl MemoryKeySetStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with a current record.
    #[must_use]
    pub fn with_current(key_set: KeySet) -> Self {
        let store = Self::default();
        *store.current.write() = Some(key_set);
        store
    }
}

#[async_trait]
impl KeySetStore for MemoryKeySetStore {
    #[tracing::instrument(skip(self))]
    async fn load_current(&self) -> StorageResult<Option<KeySet>> {
        Ok(self.current.read().clone())
    }

    #[tracing::instrument(skip(self, key_set), fields(key_version = %key_set.version))]
    async fn persist_current(&self, key_set: &KeySet) -> StorageResult<()> {
        *self.current.write() = Some(key_set.clone());
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn load_retired(&self) -> StorageResult<Vec<KeySet>> {
        Ok(self.retired.read().clone())
    }

    #[tracing::instrument(skip(self, key_sets), fields(count = key_sets.len()))]
    async fn persist_retired(&self, key_sets: &[KeySet]) -> StorageResult<()> {
        *self.retired.write() = key_sets.to_vec();
        Ok(())
    }
}
