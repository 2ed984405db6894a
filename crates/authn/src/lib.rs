//! # Carebase Common Authentication
//!
//! Signing-key rotation and JWT issuance/verification for Carebase
//! services.
//!
//! This crate provides:
//! - **Key rotation**: Versioned HMAC key sets, rotated on a schedule and on demand
//! - **Key history**: Retired key sets kept verifiable until their retention window closes
//! - **Token issuance**: Whitelisted access and refresh claims signed with the current keys
//! - **Token verification**: Version-aware signature, issuer, audience, and expiry checks
//!
//! ## Features
//!
//! - Only HS256 is accepted; `none` and asymmetric algorithms are rejected
//! - Tokens carry the `keyVersion` of the key set that signed them
//! - Rotation never leaves a moment without a current key, and concurrent triggers collapse
//!   into one rotation
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use carebase_common_authn::{
//!     KeyRotationConfig, KeyRotationService, TokenConfig, TokenIssuer, TokenVerifier,
//! };
//! use carebase_common_storage::auth::FileKeySetStore;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let rotation = KeyRotationConfig::default();
//! let tokens = TokenConfig::builder().issuer("carebase-api").audience("carebase-clients").build()?;
//! tokens.validate_against(&rotation)?;
//!
//! let service = Arc::new(KeyRotationService::new(Arc::new(FileKeySetStore::default()), rotation));
//! service.initialize().await?;
//!
//! let issuer = TokenIssuer::new(Arc::clone(&service), tokens.clone());
//! let verifier = TokenVerifier::new(Arc::clone(&service), tokens);
//!
//! let token = issuer.issue_access_token(&json!({ "id": "usr_123", "email": "ada@example.com" }))?;
//! let claims = verifier.verify_access_token(&token)?;
//! println!("Verified for subject: {}", claims.payload.id);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Token and rotation configuration.
pub mod config;
/// Authentication error types.
pub mod error;
/// Current and retired key sets.
pub mod history;
/// Token issuance.
pub mod issuer;
/// JWT claims and unverified inspection.
pub mod jwt;
/// Key lifecycle and rotation scheduling.
pub mod rotation;
/// Random key material.
pub mod secret;
/// Shared test utilities.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
/// Algorithm and key-version validation.
pub mod validation;
/// Token verification.
pub mod verifier;

// Re-export key types for convenience
pub use config::{ConfigError, KeyRotationConfig, TokenConfig, UnknownKeyVersionPolicy};
pub use error::{AuthError, Result};
pub use history::KeyHistory;
pub use issuer::TokenIssuer;
pub use jwt::{AccessClaims, AccessPayload, RefreshClaims, RefreshPayload, SubjectId, TokenClaims};
pub use rotation::{
    KeyRotatedEvent, KeyRotationHealth, KeyRotationService, KeyRotationStats, RotationMetricsSnapshot,
    RotationOutcome, RotationTrigger,
};
pub use validation::{ACCEPTED_ALGORITHMS, FORBIDDEN_ALGORITHMS, validate_algorithm};
pub use verifier::TokenVerifier;
