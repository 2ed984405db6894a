//! Token issuance.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use carebase_common_authn::{KeyRotationConfig, KeyRotationService, TokenConfig, TokenIssuer};
//! use carebase_common_storage::auth::MemoryKeySetStore;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = Arc::new(KeyRotationService::new(
//!     Arc::new(MemoryKeySetStore::new()),
//!     KeyRotationConfig::default(),
//! ));
//! service.initialize().await?;
//!
//! let config = TokenConfig::builder().issuer("carebase-api").audience("carebase-clients").build()?;
//! let issuer = TokenIssuer::new(Arc::clone(&service), config);
//!
//! let user = json!({ "id": "usr_123", "email": "ada@example.com", "role": "admin" });
//! let access = issuer.issue_access_token(&user)?;
//! let refresh = issuer.issue_refresh_token(&user)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;

use crate::{
    config::TokenConfig,
    error::AuthError,
    jwt::{AccessPayload, RefreshPayload, TokenClaims, TokenKind, TokenPayload, whitelist},
    rotation::KeyRotationService,
};

/// Signs access and refresh tokens with the current key set.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    service: Arc<KeyRotationService>,
    config: TokenConfig,
}

impl TokenIssuer {
    /// Creates an issuer backed by `service`.
    #[must_use]
    pub fn new(service: Arc<KeyRotationService>, config: TokenConfig) -> Self {
        Self { service, config }
    }

    /// Returns the token configuration.
    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Issues an access token for `subject`, keeping only the
    /// [`AccessPayload`] fields.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotInitialized`] if the rotation service has not been initialized
    /// - [`AuthError::TokenGeneration`] if the subject is not an object, lacks `id`, or signing
    ///   fails
    pub fn issue_access_token<S: Serialize + ?Sized>(&self, subject: &S) -> Result<String, AuthError> {
        self.issue_access_token_at(subject, Utc::now())
    }

    /// Issues an access token stamped with `now`.
    ///
    /// # Errors
    ///
    /// See [`issue_access_token`](Self::issue_access_token).
    pub fn issue_access_token_at<S: Serialize + ?Sized>(
        &self,
        subject: &S,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        self.issue::<AccessPayload, S>(subject, now)
    }

    /// Issues a refresh token for `subject`, keeping only its `id`.
    ///
    /// # Errors
    ///
    /// See [`issue_access_token`](Self::issue_access_token).
    pub fn issue_refresh_token<S: Serialize + ?Sized>(&self, subject: &S) -> Result<String, AuthError> {
        self.issue_refresh_token_at(subject, Utc::now())
    }

    /// Issues a refresh token stamped with `now`.
    ///
    /// # Errors
    ///
    /// See [`issue_access_token`](Self::issue_access_token).
    pub fn issue_refresh_token_at<S: Serialize + ?Sized>(
        &self,
        subject: &S,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        self.issue::<RefreshPayload, S>(subject, now)
    }

    fn ttl(&self, kind: TokenKind) -> std::time::Duration {
        match kind {
            TokenKind::Access => self.config.access_token_ttl,
            TokenKind::Refresh => self.config.refresh_token_ttl,
        }
    }

    #[tracing::instrument(skip(self, subject, now), fields(kind = %P::KIND))]
    fn issue<P: TokenPayload, S: Serialize + ?Sized>(
        &self,
        subject: &S,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        // One snapshot, so the embedded version always names the signing secret.
        let key_set = self.service.history()?.current();
        let payload: P = whitelist(subject)?;

        let ttl = i64::try_from(self.ttl(P::KIND).as_secs())
            .map_err(|_| AuthError::token_generation("token lifetime out of range"))?;
        let iat = now.timestamp();
        let claims = TokenClaims {
            payload,
            key_version: Some(key_set.version.clone()),
            iat,
            exp: iat.saturating_add(ttl),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        let encoding_key = EncodingKey::from_secret(P::KIND.secret(&key_set).as_bytes());
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &encoding_key)
            .map_err(|e| AuthError::token_generation(format!("Failed to sign token: {}", e)))?;

        tracing::debug!(key_version = %key_set.version, exp = claims.exp, "token issued");
        Ok(token)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use carebase_common_storage::auth::MemoryKeySetStore;
    use serde_json::{Value, json};

    use super::*;
    use crate::config::KeyRotationConfig;

    fn decode_payload(token: &str) -> Value {
        let payload = token.split('.').nth(1).unwrap();
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap()
    }

    fn decode_header(token: &str) -> Value {
        let header = token.split('.').next().unwrap();
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header).unwrap()).unwrap()
    }

    async fn issuer() -> (Arc<KeyRotationService>, TokenIssuer) {
        let service = Arc::new(KeyRotationService::new(
            Arc::new(MemoryKeySetStore::new()),
            KeyRotationConfig::default(),
        ));
        service.initialize().await.unwrap();
        let config = TokenConfig::builder().issuer("carebase-api").audience("carebase-clients").build().unwrap();
        (Arc::clone(&service), TokenIssuer::new(service, config))
    }

    #[tokio::test]
    async fn test_access_token_claims() {
        let (service, issuer) = issuer().await;
        let now = DateTime::from_timestamp(1_718_000_000, 0).unwrap();

        let token = issuer
            .issue_access_token_at(&json!({"id": "usr_1", "email": "ada@example.com", "role": "admin"}), now)
            .unwrap();

        let header = decode_header(&token);
        assert_eq!(header["alg"], "HS256");
        let payload = decode_payload(&token);
        assert_eq!(payload["id"], "usr_1");
        assert_eq!(payload["email"], "ada@example.com");
        assert!(payload.get("role").is_none());
        assert_eq!(payload["keyVersion"], service.current_key_version().unwrap().as_str());
        assert_eq!(payload["iat"], 1_718_000_000);
        assert_eq!(payload["exp"], 1_718_000_000 + 15 * 60);
        assert_eq!(payload["iss"], "carebase-api");
        assert_eq!(payload["aud"], "carebase-clients");
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_refresh_token_carries_only_id() {
        let (service, issuer) = issuer().await;
        let now = DateTime::from_timestamp(1_718_000_000, 0).unwrap();

        let token = issuer.issue_refresh_token_at(&json!({"id": 42, "email": "ada@example.com"}), now).unwrap();

        let payload = decode_payload(&token);
        assert_eq!(payload["id"], 42);
        assert!(payload.get("email").is_none());
        assert_eq!(payload["exp"], 1_718_000_000 + 6 * 24 * 3600);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_access_and_refresh_signatures_differ() {
        let (service, issuer) = issuer().await;
        let now = Utc::now();
        let subject = json!({"id": "usr_1"});

        let access = issuer.issue_access_token_at(&subject, now).unwrap();
        let refresh = issuer.issue_refresh_token_at(&subject, now).unwrap();

        let access_sig = access.rsplit('.').next().unwrap();
        let refresh_sig = refresh.rsplit('.').next().unwrap();
        assert_ne!(access_sig, refresh_sig);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_subject_rejected() {
        let (service, issuer) = issuer().await;

        assert!(matches!(issuer.issue_access_token(&json!("usr_1")), Err(AuthError::TokenGeneration(_))));
        assert!(matches!(
            issuer.issue_refresh_token(&json!({"email": "ada@example.com"})),
            Err(AuthError::TokenGeneration(_))
        ));
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_uninitialized_service() {
        let service = Arc::new(KeyRotationService::new(
            Arc::new(MemoryKeySetStore::new()),
            KeyRotationConfig::default(),
        ));
        let config = TokenConfig::builder().issuer("a").audience("b").build().unwrap();
        let issuer = TokenIssuer::new(service, config);

        assert!(matches!(issuer.issue_access_token(&json!({"id": 1})), Err(AuthError::NotInitialized)));
    }
}
