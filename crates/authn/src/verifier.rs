//! Token verification against the current and retained key sets.
//!
//! # Verification Steps
//!
//! 1. Read the header `alg` and require HS256.
//! 2. Read the unverified `keyVersion` claim and check its shape.
//! 3. Resolve the signing key set through the key history, under the
//!    configured [`UnknownKeyVersionPolicy`](crate::config::UnknownKeyVersionPolicy).
//! 4. Verify the signature, issuer, audience, and required claims.
//! 5. Compare `exp` against the verification time.
//!
//! Nothing read in steps 1 and 2 is trusted; it only selects which secret
//! the signature must match.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use crate::{
    config::TokenConfig,
    error::AuthError,
    jwt::{AccessClaims, RefreshClaims, TokenClaims, TokenPayload, peek_algorithm, peek_key_version},
    rotation::KeyRotationService,
    validation::{validate_algorithm, validate_key_version},
};

/// Claims that must be present on every token.
const REQUIRED_CLAIMS: &[&str] = &["exp", "iss", "aud"];

/// Verifies tokens signed by any retained key set.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    service: Arc<KeyRotationService>,
    config: TokenConfig,
    validation: Validation,
}

impl TokenVerifier {
    /// Creates a verifier backed by `service`.
    #[must_use]
    pub fn new(service: Arc<KeyRotationService>, config: TokenConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against an explicit verification time below.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_required_spec_claims(REQUIRED_CLAIMS);

        Self { service, config, validation }
    }

    /// Returns the token configuration.
    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Verifies an access token.
    ///
    /// # Errors
    ///
    /// - [`AuthError::UnsupportedAlgorithm`] unless the header says HS256
    /// - [`AuthError::InvalidTokenFormat`] if the token is malformed or its claims have the wrong
    ///   shape
    /// - [`AuthError::UnknownKeyVersion`] under the reject policy when the key version is not
    ///   retained
    /// - [`AuthError::InvalidSignature`] if no retained secret matches, including a refresh token
    ///   presented as an access token
    /// - [`AuthError::InvalidIssuer`], [`AuthError::InvalidAudience`], or
    ///   [`AuthError::MissingClaim`] if the registered claims do not match
    /// - [`AuthError::TokenExpired`] if `exp` has passed
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.verify_access_token_at(token, Utc::now())
    }

    /// Verifies an access token as of `now`.
    ///
    /// # Errors
    ///
    /// See [`verify_access_token`](Self::verify_access_token).
    pub fn verify_access_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessClaims, AuthError> {
        self.verify(token, now)
    }

    /// Verifies a refresh token.
    ///
    /// # Errors
    ///
    /// See [`verify_access_token`](Self::verify_access_token).
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        self.verify_refresh_token_at(token, Utc::now())
    }

    /// Verifies a refresh token as of `now`.
    ///
    /// # Errors
    ///
    /// See [`verify_access_token`](Self::verify_access_token).
    pub fn verify_refresh_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshClaims, AuthError> {
        self.verify(token, now)
    }

    #[tracing::instrument(skip(self, token, now), fields(kind = %P::KIND))]
    fn verify<P: TokenPayload>(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims<P>, AuthError> {
        let result = self.verify_inner(token, now);
        if let Err(ref err) = result {
            tracing::debug!(error = %err, code = err.code(), "token verification failed");
        }
        result
    }

    fn verify_inner<P: TokenPayload>(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims<P>, AuthError> {
        // 1. Algorithm, read raw so "none" is reported as such
        let alg = peek_algorithm(token)?;
        validate_algorithm(&alg)?;

        // 2. Unverified key version
        let version = peek_key_version(token)?;
        if let Some(version) = version.as_deref()
            && !version.is_empty()
        {
            validate_key_version(version)?;
        }

        // 3. Signing key set
        let key_set = self
            .service
            .history()?
            .resolve(version.as_deref(), self.service.config().unknown_version_policy)?;

        // 4. Signature and registered claims
        let decoding_key = DecodingKey::from_secret(P::KIND.secret(&key_set).as_bytes());
        let claims = jsonwebtoken::decode::<TokenClaims<P>>(token, &decoding_key, &self.validation)?.claims;

        // 5. Expiry
        if now.timestamp() >= claims.exp.saturating_add(self.config.leeway_secs()) {
            return Err(AuthError::token_expired());
        }

        tracing::debug!(key_version = %key_set.version, "token verified");
        Ok(claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use carebase_common_storage::auth::MemoryKeySetStore;
    use serde_json::json;

    use super::*;
    use crate::{config::KeyRotationConfig, issuer::TokenIssuer, jwt::SubjectId};

    async fn setup(config: TokenConfig) -> (Arc<KeyRotationService>, TokenIssuer, TokenVerifier) {
        let service = Arc::new(KeyRotationService::new(
            Arc::new(MemoryKeySetStore::new()),
            KeyRotationConfig::default(),
        ));
        service.initialize().await.unwrap();
        let issuer = TokenIssuer::new(Arc::clone(&service), config.clone());
        let verifier = TokenVerifier::new(Arc::clone(&service), config);
        (service, issuer, verifier)
    }

    fn token_config() -> TokenConfig {
        TokenConfig::builder().issuer("carebase-api").audience("carebase-clients").build().unwrap()
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (service, issuer, verifier) = setup(token_config()).await;

        let token = issuer.issue_access_token(&json!({"id": "usr_1", "lastName": "Lovelace"})).unwrap();
        let claims = verifier.verify_access_token(&token).unwrap();

        assert_eq!(claims.payload.id, SubjectId::from("usr_1"));
        assert_eq!(claims.payload.last_name.as_deref(), Some("Lovelace"));
        assert_eq!(claims.key_version, Some(service.current_key_version().unwrap()));
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let (service, issuer, verifier) = setup(token_config()).await;
        let now = Utc::now();
        let token = issuer.issue_access_token_at(&json!({"id": 1}), now).unwrap();
        let exp = now + chrono::Duration::minutes(15);

        assert!(verifier.verify_access_token_at(&token, exp - chrono::Duration::seconds(1)).is_ok());
        assert!(matches!(verifier.verify_access_token_at(&token, exp), Err(AuthError::TokenExpired)));
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_leeway_extends_expiry() {
        let config = TokenConfig::builder()
            .issuer("carebase-api")
            .audience("carebase-clients")
            .leeway(Duration::from_secs(30))
            .build()
            .unwrap();
        let (service, issuer, verifier) = setup(config).await;
        let now = Utc::now();
        let token = issuer.issue_access_token_at(&json!({"id": 1}), now).unwrap();
        let exp = now + chrono::Duration::minutes(15);

        assert!(verifier.verify_access_token_at(&token, exp + chrono::Duration::seconds(29)).is_ok());
        assert!(matches!(
            verifier.verify_access_token_at(&token, exp + chrono::Duration::seconds(30)),
            Err(AuthError::TokenExpired)
        ));
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let (service, issuer, verifier) = setup(token_config()).await;

        let refresh = issuer.issue_refresh_token(&json!({"id": 1})).unwrap();

        assert!(verifier.verify_refresh_token(&refresh).is_ok());
        assert!(matches!(verifier.verify_access_token(&refresh), Err(AuthError::InvalidSignature)));
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_token() {
        let (service, _, verifier) = setup(token_config()).await;

        assert!(matches!(verifier.verify_access_token("not-a-jwt"), Err(AuthError::InvalidTokenFormat(_))));
        assert!(matches!(verifier.verify_access_token(""), Err(AuthError::InvalidTokenFormat(_))));
        service.shutdown().await;
    }
}
