//! Shared test utilities for authentication testing.
//!
//! This module provides helpers for building an initialized rotation
//! service, crafting raw JWT strings (for attack testing), re-signing
//! arbitrary claims with a known secret, and recording audit events. It is
//! feature-gated behind `testutil` to prevent leaking into production
//! builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! carebase-common-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use carebase_common_authn::testutil::{craft_raw_jwt, test_token_config};
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use carebase_common_storage::auth::{
    KeySetStore, MemoryKeySetStore,
    audit::{AuditAction, AuditEvent, AuditLogger},
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_lot::Mutex;

use crate::{
    config::{KeyRotationConfig, TokenConfig},
    issuer::TokenIssuer,
    rotation::KeyRotationService,
    verifier::TokenVerifier,
};

/// Issuer used by [`test_token_config`].
pub const TEST_ISSUER: &str = "carebase-api";

/// Audience used by [`test_token_config`].
pub const TEST_AUDIENCE: &str = "carebase-clients";

/// Token settings with the default lifetimes and no leeway.
///
/// # Panics
///
/// Panics if the default configuration fails validation.
pub fn test_token_config() -> TokenConfig {
    TokenConfig::builder()
        .issuer(TEST_ISSUER)
        .audience(TEST_AUDIENCE)
        .build()
        .expect("valid token config")
}

/// Rotation settings with the defaults.
pub fn test_rotation_config() -> KeyRotationConfig {
    KeyRotationConfig::default()
}

/// An initialized rotation service with an issuer and verifier sharing it.
pub struct TestAuth {
    /// The rotation service.
    pub service: Arc<KeyRotationService>,
    /// Issuer using [`test_token_config`].
    pub issuer: TokenIssuer,
    /// Verifier using [`test_token_config`].
    pub verifier: TokenVerifier,
    /// Audit events recorded by the service.
    pub audit: Arc<RecordingAuditLogger>,
}

impl TestAuth {
    /// Builds and initializes a service over a fresh [`MemoryKeySetStore`].
    ///
    /// # Panics
    ///
    /// Panics if initialization fails.
    pub async fn new() -> Self {
        Self::with_store(Arc::new(MemoryKeySetStore::new()), test_rotation_config()).await
    }

    /// Builds and initializes a service over `store` with `config`.
    ///
    /// # Panics
    ///
    /// Panics if initialization fails.
    pub async fn with_store(store: Arc<dyn KeySetStore>, config: KeyRotationConfig) -> Self {
        let audit = Arc::new(RecordingAuditLogger::default());
        let service = Arc::new(
            KeyRotationService::new(store, config)
                .with_audit_logger(Arc::clone(&audit) as Arc<dyn AuditLogger>),
        );
        service.initialize().await.expect("initialize rotation service");

        let token_config = test_token_config();
        Self {
            issuer: TokenIssuer::new(Arc::clone(&service), token_config.clone()),
            verifier: TokenVerifier::new(Arc::clone(&service), token_config),
            service,
            audit,
        }
    }
}

/// Audit logger that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingAuditLogger {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditLogger {
    /// Returns a copy of the recorded events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Returns the actions of the recorded events, in order.
    pub fn actions(&self) -> Vec<AuditAction> {
        self.events.lock().iter().map(|event| event.action).collect()
    }
}

#[async_trait]
impl AuditLogger for RecordingAuditLogger {
    async fn log(&self, event: &AuditEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Creates a raw JWT string from arbitrary header and payload JSON.
///
/// The resulting JWT has the structure `{header_b64}.{payload_b64}.`
/// with an empty signature. This is useful for testing rejection of
/// malformed or attack JWTs (e.g., `alg: "none"`, algorithm confusion).
///
/// # Panics
///
/// Panics if JSON serialization fails.
pub fn craft_raw_jwt(header_json: &serde_json::Value, payload_json: &serde_json::Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

/// Signs arbitrary claims with `secret` using `algorithm`.
///
/// Used to forge tokens that a legitimate issuer would never produce,
/// such as tokens with a wrong issuer or a missing claim.
///
/// # Panics
///
/// Panics if JWT encoding fails.
pub fn sign_raw_claims(algorithm: Algorithm, secret: &str, claims: &serde_json::Value) -> String {
    jsonwebtoken::encode(&Header::new(algorithm), claims, &EncodingKey::from_secret(secret.as_bytes()))
        .expect("Failed to encode test JWT")
}

/// Decodes the payload segment of a JWT without verification.
///
/// # Panics
///
/// Panics if the token has no payload segment or it is not JSON.
pub fn decode_payload(token: &str) -> serde_json::Value {
    let payload = token.split('.').nth(1).expect("payload segment");
    serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).expect("base64 payload"))
        .expect("json payload")
}

/// Asserts that a [`Result<T, AuthError>`] is an `Err` matching the given [`AuthError`] variant.
///
/// Works with any `AuthError` variant. On failure, prints the expected variant
/// and the actual result for debugging.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use carebase_common_authn::assert_auth_error;
/// use carebase_common_authn::error::AuthError;
///
/// let result: Result<(), AuthError> = Err(AuthError::token_expired());
/// assert_auth_error!(result, TokenExpired);
/// ```
///
/// [`AuthError`]: crate::error::AuthError
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "expected AuthError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "{}: expected AuthError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            $result,
        );
    };
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_craft_raw_jwt_format() {
        let header = json!({"alg": "none", "typ": "JWT"});
        let payload = json!({"id": "usr_1"});
        let jwt = craft_raw_jwt(&header, &payload);
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[2].is_empty(), "signature should be empty for raw JWTs");
        assert_eq!(decode_payload(&jwt), payload);
    }

    #[test]
    fn test_sign_raw_claims_produces_signature() {
        let jwt = sign_raw_claims(Algorithm::HS256, "secret", &json!({"id": 1}));
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3, "JWT should have header.payload.signature");
        assert!(!parts[2].is_empty(), "signature should not be empty");
    }

    #[tokio::test]
    async fn test_auth_records_startup_audit() {
        let auth = TestAuth::new().await;
        assert_eq!(auth.audit.actions(), vec![AuditAction::GenerateKeySet]);
        auth.service.shutdown().await;
    }

    #[test]
    fn test_assert_auth_error_token_expired() {
        use crate::error::AuthError;
        let result: Result<(), AuthError> = Err(AuthError::token_expired());
        assert_auth_error!(result, TokenExpired);
    }

    #[test]
    fn test_assert_auth_error_struct_variant() {
        use crate::error::AuthError;
        let result: Result<(), AuthError> = Err(AuthError::unknown_key_version("v1"));
        assert_auth_error!(result, UnknownKeyVersion, "struct variants match too");
    }
}
