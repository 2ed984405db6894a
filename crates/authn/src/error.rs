//! Authentication error types.
//!
//! This module defines errors that can occur while issuing and verifying
//! tokens and while managing the signing-key lifecycle.

use thiserror::Error;

use crate::config::ConfigError;

/// Client-facing code for an expired token.
pub const CODE_TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";

/// Client-facing code for a malformed, forged, or mis-scoped token.
pub const CODE_INVALID_TOKEN: &str = "INVALID_TOKEN";

/// Client-facing code for any other verification failure.
pub const CODE_TOKEN_VERIFICATION_FAILED: &str = "TOKEN_VERIFICATION_FAILED";

/// Authentication and key-lifecycle errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`: new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Malformed JWT - cannot be decoded.
    #[error("Invalid token format: {0}")]
    InvalidTokenFormat(String),

    /// Token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// Signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Unknown or invalid issuer.
    #[error("Invalid issuer: {0}")]
    InvalidIssuer(String),

    /// Audience doesn't match expected value.
    #[error("Invalid audience: {0}")]
    InvalidAudience(String),

    /// Required claim is missing.
    #[error("Missing claim: {0}")]
    MissingClaim(String),

    /// Algorithm not in allowed list.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The token names a key version that is not retained.
    ///
    /// Only returned under
    /// [`UnknownKeyVersionPolicy::Reject`](crate::config::UnknownKeyVersionPolicy::Reject).
    #[error("Unknown key version: {version}")]
    UnknownKeyVersion {
        /// The version carried by the token (empty when absent).
        version: String,
    },

    /// The subject could not be turned into a token.
    #[error("Token generation failed: {0}")]
    TokenGeneration(String),

    /// The rotation service has not been initialized.
    #[error("Key rotation service not initialized")]
    NotInitialized,

    /// The operating system random source failed.
    #[error("Entropy source unavailable: {0}")]
    Entropy(String),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Storage backend error while loading or persisting key sets.
    ///
    /// Wraps the original [`StorageError`] to preserve the full error source
    /// chain for debugging and structured logging.
    ///
    /// [`StorageError`]: carebase_common_storage::StorageError
    #[error("Key storage error: {0}")]
    KeyStorageError(
        /// The underlying storage error.
        #[source]
        carebase_common_storage::StorageError,
    ),
}

impl AuthError {
    /// Creates an [`InvalidTokenFormat`](Self::InvalidTokenFormat) error.
    #[must_use]
    pub fn invalid_token_format(message: impl Into<String>) -> Self {
        Self::InvalidTokenFormat(message.into())
    }

    /// Creates a [`TokenExpired`](Self::TokenExpired) error.
    #[must_use]
    pub fn token_expired() -> Self {
        Self::TokenExpired
    }

    /// Creates an [`InvalidSignature`](Self::InvalidSignature) error.
    #[must_use]
    pub fn invalid_signature() -> Self {
        Self::InvalidSignature
    }

    /// Creates an [`InvalidIssuer`](Self::InvalidIssuer) error.
    #[must_use]
    pub fn invalid_issuer(message: impl Into<String>) -> Self {
        Self::InvalidIssuer(message.into())
    }

    /// Creates an [`InvalidAudience`](Self::InvalidAudience) error.
    #[must_use]
    pub fn invalid_audience(message: impl Into<String>) -> Self {
        Self::InvalidAudience(message.into())
    }

    /// Creates a [`MissingClaim`](Self::MissingClaim) error.
    #[must_use]
    pub fn missing_claim(claim: impl Into<String>) -> Self {
        Self::MissingClaim(claim.into())
    }

    /// Creates an [`UnsupportedAlgorithm`](Self::UnsupportedAlgorithm) error.
    #[must_use]
    pub fn unsupported_algorithm(message: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm(message.into())
    }

    /// Creates an [`UnknownKeyVersion`](Self::UnknownKeyVersion) error.
    #[must_use]
    pub fn unknown_key_version(version: impl Into<String>) -> Self {
        Self::UnknownKeyVersion { version: version.into() }
    }

    /// Creates a [`TokenGeneration`](Self::TokenGeneration) error.
    #[must_use]
    pub fn token_generation(message: impl Into<String>) -> Self {
        Self::TokenGeneration(message.into())
    }

    /// Creates an [`Entropy`](Self::Entropy) error.
    #[must_use]
    pub fn entropy(message: impl Into<String>) -> Self {
        Self::Entropy(message.into())
    }

    /// Returns `true` for errors caused by the presented token rather than
    /// by the service.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTokenFormat(_)
                | Self::TokenExpired
                | Self::InvalidSignature
                | Self::InvalidIssuer(_)
                | Self::InvalidAudience(_)
                | Self::MissingClaim(_)
                | Self::UnsupportedAlgorithm(_)
                | Self::UnknownKeyVersion { .. }
        )
    }

    /// Stable client-facing error code.
    ///
    /// | Error | Code |
    /// |-------|------|
    /// | `TokenExpired` | `TOKEN_EXPIRED` |
    /// | malformed, forged, wrong issuer/audience, unknown version | `INVALID_TOKEN` |
    /// | anything else | `TOKEN_VERIFICATION_FAILED` |
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::TokenExpired => CODE_TOKEN_EXPIRED,
            err if err.is_token_error() => CODE_INVALID_TOKEN,
            _ => CODE_TOKEN_VERIFICATION_FAILED,
        }
    }

    /// HTTP status an API layer should answer with.
    ///
    /// Token errors are `401 Unauthorized`; service faults are `500`.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        if self.is_token_error() { 401 } else { 500 }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidToken => {
                AuthError::InvalidTokenFormat("Invalid JWT structure".into())
            },
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidAudience => {
                AuthError::InvalidAudience("Audience validation failed".into())
            },
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer("Issuer validation failed".into()),
            ErrorKind::InvalidAlgorithm => {
                AuthError::UnsupportedAlgorithm("Algorithm not supported".into())
            },
            ErrorKind::MissingRequiredClaim(claim) => AuthError::MissingClaim(claim.clone()),
            _ => AuthError::InvalidTokenFormat(format!("JWT error: {}", err)),
        }
    }
}

impl From<carebase_common_storage::StorageError> for AuthError {
    fn from(err: carebase_common_storage::StorageError) -> Self {
        AuthError::KeyStorageError(err)
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
