//! Storage error types and result alias.
//!
//! Every [`KeySetStore`](crate::auth::KeySetStore) implementation maps its
//! backend failures onto these variants so the rotation service can decide
//! between "regenerate" (corrupt record) and "fail startup" (store
//! unreadable).
//!
//! # Error Types
//!
//! - [`StorageError::Io`] - Filesystem or device failure
//! - [`StorageError::Serialization`] - Record could not be encoded or decoded
//!
//! # Example
//!
//! ```
//! use carebase_common_storage::{StorageError, StorageResult};
//!
//! fn read(path: &str) -> StorageResult<Vec<u8>> {
//!     std::fs::read(path).map_err(|err| StorageError::io_with_source(format!("failed to read {path}"), err))
//! }
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during key-set storage operations.
///
/// Errors preserve their source chain via the `#[source]` attribute, enabling
/// debugging tools to display the full error context.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Filesystem or device error.
    ///
    /// Raised when the backing directory cannot be created, read, or
    /// written (permissions, full disk, read-only mount).
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O failure.
        message: String,
        /// The underlying error that caused this failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Serialization or deserialization error.
    ///
    /// A stored record that fails to decode is treated as corrupt.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused serialization to fail.
        #[source]
        source: Option<BoxError>,
    },
}

impl StorageError {
    /// Creates a new `Io` error with the given message.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io { message: message.into(), source: None }
    }

    /// Creates a new `Io` error with a message and source error.
    #[must_use]
    pub fn io_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Io { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Returns `true` if the stored record is unusable but the backend
    /// itself answered (undecodable record).
    ///
    /// The rotation service regenerates key material for these errors
    /// instead of failing startup.
    #[must_use]
    pub fn is_recoverable_by_regeneration(&self) -> bool {
        matches!(self, Self::Serialization { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(StorageError::io("disk full").to_string(), "I/O error: disk full");
        assert_eq!(
            StorageError::serialization("missing field `version`").to_string(),
            "Serialization error: missing field `version`"
        );
    }

    #[test]
    fn test_io_error_preserves_source_chain() {
        let inner = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = StorageError::io_with_source("cannot write key file", inner);

        let source = err.source().expect("source exists");
        assert_eq!(source.to_string(), "denied");
    }

    #[test]
    fn test_recoverable_by_regeneration() {
        assert!(StorageError::serialization("bad json").is_recoverable_by_regeneration());
        assert!(!StorageError::io("read-only fs").is_recoverable_by_regeneration());
    }
}
