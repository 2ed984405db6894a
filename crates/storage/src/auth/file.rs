//! Directory-backed [`KeySetStore`].
//!
//! Layout inside the key directory:
//!
//! ```text
//! keys/
//! ├── current-keys.json   # the current KeySet
//! └── retired-keys.json   # JSON array of retained KeySets
//! ```
//!
//! Every write goes to a temporary file in the same directory, is flushed to
//! disk, and is then renamed over the target; on Unix the directory is
//! synced after the rename. A crash mid-write therefore leaves either the
//! old or the new record, never a truncated one. A failed write removes
//! its temporary file.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use fail::fail_point;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::{
    auth::{KeySet, KeySetStore},
    error::{StorageError, StorageResult},
};

/// Default directory for key files, relative to the working directory.
pub const DEFAULT_KEYS_DIR: &str = "keys";

/// File name of the current key-set record.
pub const CURRENT_KEYS_FILE: &str = "current-keys.json";

/// File name of the retained key-set record.
pub const RETIRED_KEYS_FILE: &str = "retired-keys.json";

/// [`KeySetStore`] that keeps records as JSON files in a directory.
///
/// The directory is created on first write. On Unix, files are created with
/// mode `0600` since they hold raw signing secrets.
///
/// # Examples
///
/// ```no_run
/// use carebase_common_storage::auth::{FileKeySetStore, KeySetStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = FileKeySetStore::new("/var/lib/carebase/keys");
/// if let Some(current) = store.load_current().await? {
///     println!("current key version: {}", current.version);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileKeySetStore {
    dir: PathBuf,
}

impl FileKeySetStore {
    /// Creates a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the key directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the current key-set file.
    #[must_use]
    pub fn current_path(&self) -> PathBuf {
        self.dir.join(CURRENT_KEYS_FILE)
    }

    /// Returns the path of the retained key-set file.
    #[must_use]
    pub fn retired_path(&self) -> PathBuf {
        self.dir.join(RETIRED_KEYS_FILE)
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StorageError::io_with_source(
                    format!("failed to read {}", path.display()),
                    err,
                ));
            },
        };

        serde_json::from_slice(&bytes).map(Some).map_err(|err| {
            StorageError::serialization_with_source(
                format!("failed to decode {}", path.display()),
                err,
            )
        })
    }

    async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|err| {
            StorageError::serialization_with_source("failed to encode key record", err)
        })?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|err| {
            StorageError::io_with_source(
                format!("failed to create key directory {}", self.dir.display()),
                err,
            )
        })?;

        let tmp_path = path.with_extension("json.tmp");
        if let Err(err) = Self::replace_via(&tmp_path, path, &bytes).await {
            // The temp file holds raw secrets.
            match tokio::fs::remove_file(&tmp_path).await {
                Ok(()) => {},
                Err(cleanup) if cleanup.kind() == ErrorKind::NotFound => {},
                Err(cleanup) => tracing::warn!(
                    path = %tmp_path.display(),
                    error = %cleanup,
                    "failed to remove temporary key file"
                ),
            }
            return Err(err);
        }

        self.sync_dir().await
    }

    async fn replace_via(tmp_path: &Path, path: &Path, bytes: &[u8]) -> StorageResult<()> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(tmp_path).await.map_err(|err| {
            StorageError::io_with_source(format!("failed to open {}", tmp_path.display()), err)
        })?;
        file.write_all(bytes).await.map_err(|err| {
            StorageError::io_with_source(format!("failed to write {}", tmp_path.display()), err)
        })?;
        file.sync_all().await.map_err(|err| {
            StorageError::io_with_source(format!("failed to sync {}", tmp_path.display()), err)
        })?;
        drop(file);

        fail_point!("file-store-before-rename", |_| {
            Err(StorageError::io("injected failure before rename"))
        });

        tokio::fs::rename(tmp_path, path).await.map_err(|err| {
            StorageError::io_with_source(
                format!("failed to move {} into place", tmp_path.display()),
                err,
            )
        })
    }

    /// Flushes the directory entry so a completed rename survives a crash.
    #[cfg(unix)]
    async fn sync_dir(&self) -> StorageResult<()> {
        let dir = tokio::fs::File::open(&self.dir).await.map_err(|err| {
            StorageError::io_with_source(format!("failed to open {}", self.dir.display()), err)
        })?;
        dir.sync_all().await.map_err(|err| {
            StorageError::io_with_source(format!("failed to sync {}", self.dir.display()), err)
        })
    }

    #[cfg(not(unix))]
    async fn sync_dir(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl Default for FileKeySetStore {
    fn default() -> Self {
        Self::new(DEFAULT_KEYS_DIR)
    }
}

#[async_trait]
impl KeySetStore for FileKeySetStore {
    #[tracing::instrument(skip(self), fields(path = %self.current_path().display()))]
    async fn load_current(&self) -> StorageResult<Option<KeySet>> {
        Self::read_json(&self.current_path()).await
    }

    #[tracing::instrument(skip(self, key_set), fields(key_version = %key_set.version))]
    async fn persist_current(&self, key_set: &KeySet) -> StorageResult<()> {
        self.write_json(&self.current_path(), key_set).await
    }

    #[tracing::instrument(skip(self), fields(path = %self.retired_path().display()))]
    async fn load_retired(&self) -> StorageResult<Vec<KeySet>> {
        Ok(Self::read_json(&self.retired_path()).await?.unwrap_or_default())
    }

    #[tracing::instrument(skip(self, key_sets), fields(count = key_sets.len()))]
    async fn persist_retired(&self, key_sets: &[KeySet]) -> StorageResult<()> {
        self.write_json(&self.retired_path(), key_sets).await
    }
}
