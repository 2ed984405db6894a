//! Versioned signing-secret pair used for token issuance.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    error::{StorageError, StorageResult},
    types::KeyVersion,
};

/// Number of random bytes in each generated secret (512 bits).
pub const SECRET_BYTES: usize = 64;

/// Minimum accepted secret length in hex characters (256 bits).
///
/// Records loaded from storage with shorter secrets are rejected by
/// [`KeySet::validate`] and replaced with fresh material.
pub const MIN_SECRET_HEX_LEN: usize = 64;

/// Maximum accepted length of a key version string.
pub const MAX_VERSION_LEN: usize = 128;

/// A versioned pair of HMAC signing secrets with a validity window.
///
/// Access and refresh tokens are signed with separate secrets so that a
/// compromise of one token type does not extend to the other.
///
/// A `KeySet` is immutable once created. Rotation supersedes the current
/// set with a new one; it never edits secrets in place.
///
/// # Storage
///
/// Serialized as a single JSON document with camelCase fields:
///
/// ```json
/// {
///   "version": "v1718000000000_0a1b2c3d",
///   "accessSecret": "<128 hex chars>",
///   "refreshSecret": "<128 hex chars>",
///   "createdAt": "2024-06-10T06:13:20Z",
///   "expiresAt": "2024-06-17T06:13:20Z"
/// }
/// ```
///
/// # Example
///
/// ```
/// use chrono::{Duration, Utc};
/// use carebase_common_storage::auth::KeySet;
///
/// let now = Utc::now();
/// let key_set = KeySet::builder()
///     .version("v1718000000000_0a1b2c3d")
///     .access_secret("a".repeat(128))
///     .refresh_secret("b".repeat(128))
///     .created_at(now)
///     .expires_at(now + Duration::days(7))
///     .build();
///
/// assert!(key_set.validate().is_ok());
/// assert!(!key_set.is_expired_at(now));
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize, bon::Builder)]
#[serde(rename_all = "camelCase")]
pub struct KeySet {
    /// Unique identifier embedded in every token signed with this set.
    #[builder(into)]
    pub version: KeyVersion,

    /// Hex-encoded secret for access tokens.
    ///
    /// Wrapped in [`Zeroizing`] so the secret is scrubbed from memory when
    /// the last copy is dropped.
    #[builder(into)]
    pub access_secret: Zeroizing<String>,

    /// Hex-encoded secret for refresh tokens.
    #[builder(into)]
    pub refresh_secret: Zeroizing<String>,

    /// When the set was generated.
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,

    /// When the set stops being retained for verification.
    ///
    /// After this instant the set may be pruned from history, and tokens
    /// signed with it can no longer be verified.
    pub expires_at: DateTime<Utc>,
}

impl KeySet {
    /// Checks that the record has usable shapes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if:
    /// - The version is empty, longer than [`MAX_VERSION_LEN`], or contains whitespace or control
    ///   characters
    /// - Either secret is not hex or shorter than [`MIN_SECRET_HEX_LEN`]
    /// - The access and refresh secrets are identical
    /// - `expires_at` is not after `created_at`
    pub fn validate(&self) -> StorageResult<()> {
        let version = self.version.as_str();
        if version.is_empty() {
            return Err(StorageError::serialization("invalid key set: empty version"));
        }
        if version.len() > MAX_VERSION_LEN {
            return Err(StorageError::serialization(format!(
                "invalid key set: version exceeds {MAX_VERSION_LEN} bytes"
            )));
        }
        if version.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(StorageError::serialization(
                "invalid key set: version contains whitespace or control characters",
            ));
        }

        validate_secret("accessSecret", &self.access_secret)?;
        validate_secret("refreshSecret", &self.refresh_secret)?;

        if *self.access_secret == *self.refresh_secret {
            return Err(StorageError::serialization(
                "invalid key set: access and refresh secrets must differ",
            ));
        }

        if self.expires_at <= self.created_at {
            return Err(StorageError::serialization(
                "invalid key set: expiresAt must be after createdAt",
            ));
        }

        Ok(())
    }

    /// Returns `true` once `now` has reached `expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

fn validate_secret(field: &str, secret: &str) -> StorageResult<()> {
    if secret.len() < MIN_SECRET_HEX_LEN {
        return Err(StorageError::serialization(format!(
            "invalid key set: {field} shorter than {MIN_SECRET_HEX_LEN} hex characters"
        )));
    }
    if !secret.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(StorageError::serialization(format!(
            "invalid key set: {field} is not hex encoded"
        )));
    }
    Ok(())
}

// Secrets must never reach logs.
impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySet")
            .field("version", &self.version)
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
