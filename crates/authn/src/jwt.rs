//! JWT claims, payload whitelists, and unverified token inspection.
//!
//! Tokens are HS256 JWTs whose payload is a whitelisted subject flattened
//! next to the registered claims and the `keyVersion` of the signing key
//! set:
//!
//! ```json
//! {
//!   "id": "usr_123",
//!   "email": "ada@example.com",
//!   "firstName": "Ada",
//!   "lastName": "Lovelace",
//!   "keyVersion": "v1718000000000_0a1b2c3d",
//!   "iat": 1718000000,
//!   "exp": 1718000900,
//!   "iss": "carebase-api",
//!   "aud": "carebase-clients"
//! }
//! ```
//!
//! # Example
//!
//! ```no_run
//! // Requires a JWT token string.
//! use carebase_common_authn::jwt::{decode_jwt_header, peek_key_version};
//!
//! # fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let header = decode_jwt_header(token)?;
//! let version = peek_key_version(token)?;
//!
//! println!("Algorithm: {:?}", header.alg);
//! println!("Key version: {:?}", version);
//! # Ok(())
//! # }
//! ```

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use carebase_common_storage::{KeyVersion, auth::KeySet};
use jsonwebtoken::{Header, decode_header};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::AuthError;

/// Name of the claim carrying the signing key version.
pub const KEY_VERSION_CLAIM: &str = "keyVersion";

/// Which of the two token kinds a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Short-lived token presented on API requests.
    Access,
    /// Long-lived token exchanged for a new access token.
    Refresh,
}

impl TokenKind {
    /// Lowercase name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }

    /// The secret in `key_set` that signs tokens of this kind.
    #[must_use]
    pub fn secret(self, key_set: &KeySet) -> &str {
        match self {
            Self::Access => &key_set.access_secret,
            Self::Refresh => &key_set.refresh_secret,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of the token subject.
///
/// User records may be keyed by string or by integer; both are carried
/// through unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubjectId {
    /// Numeric identifier.
    Int(i64),
    /// String identifier.
    Str(String),
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for SubjectId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<&str> for SubjectId {
    fn from(id: &str) -> Self {
        Self::Str(id.to_owned())
    }
}

impl From<String> for SubjectId {
    fn from(id: String) -> Self {
        Self::Str(id)
    }
}

/// Fields permitted in an access token.
///
/// Everything else on the subject is dropped at issuance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPayload {
    /// Subject identifier.
    pub id: SubjectId,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// Fields permitted in a refresh token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshPayload {
    /// Subject identifier.
    pub id: SubjectId,
}

/// A whitelisted payload carried by one kind of token.
pub trait TokenPayload: Serialize + DeserializeOwned {
    /// The kind of token that carries this payload.
    const KIND: TokenKind;
}

impl TokenPayload for AccessPayload {
    const KIND: TokenKind = TokenKind::Access;
}

impl TokenPayload for RefreshPayload {
    const KIND: TokenKind = TokenKind::Refresh;
}

/// Verified (or about-to-be-signed) token claims.
///
/// `P` is the whitelisted payload; its fields sit at the top level of the
/// JWT payload next to the registered claims.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims<P> {
    /// Whitelisted subject fields.
    #[serde(flatten)]
    pub payload: P,
    /// Version of the key set that signed the token.
    ///
    /// Absent only on tokens minted before versioned keys existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_version: Option<KeyVersion>,
    /// Issued at (seconds since epoch).
    pub iat: i64,
    /// Expiration time (seconds since epoch).
    pub exp: i64,
    /// Issuer.
    pub iss: String,
    /// Audience.
    pub aud: String,
}

/// Claims of an access token.
pub type AccessClaims = TokenClaims<AccessPayload>;

/// Claims of a refresh token.
pub type RefreshClaims = TokenClaims<RefreshPayload>;

/// Reduces `subject` to the fields of payload type `P`.
///
/// The subject is serialized to a JSON object and read back as `P`, so
/// fields `P` does not declare are dropped and declared fields must have
/// the right types.
///
/// # Errors
///
/// Returns [`AuthError::TokenGeneration`] if the subject does not
/// serialize to a JSON object, lacks `id`, or has a whitelisted field of
/// the wrong type.
pub fn whitelist<P, S>(subject: &S) -> Result<P, AuthError>
where
    P: DeserializeOwned,
    S: Serialize + ?Sized,
{
    let value = serde_json::to_value(subject).map_err(|e| {
        AuthError::token_generation(format!("Failed to serialize token subject: {}", e))
    })?;
    if !value.is_object() {
        return Err(AuthError::token_generation("Token subject must be a JSON object"));
    }
    serde_json::from_value(value)
        .map_err(|e| AuthError::token_generation(format!("Token subject rejected: {}", e)))
}

/// Decode JWT header without verification.
///
/// # Errors
///
/// Returns an error if the JWT header cannot be decoded.
pub fn decode_jwt_header(token: &str) -> Result<Header, AuthError> {
    decode_header(token)
        .map_err(|e| AuthError::invalid_token_format(format!("Failed to decode JWT header: {}", e)))
}

/// Splits a token and decodes one of its first two segments as a JSON object.
fn decode_segment(token: &str, index: usize) -> Result<serde_json::Map<String, serde_json::Value>, AuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::invalid_token_format("JWT must have 3 parts separated by dots"));
    }

    let bytes = URL_SAFE_NO_PAD.decode(parts[index]).map_err(|e| {
        AuthError::invalid_token_format(format!("Failed to decode JWT segment: {}", e))
    })?;

    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::invalid_token_format(format!("Failed to parse JWT segment: {}", e)))
}

/// Reads the raw `alg` header value without verification.
///
/// Unlike [`decode_jwt_header`], this also returns algorithms the
/// `jsonwebtoken` crate cannot represent (such as `none`), so they can be
/// rejected with a precise error.
///
/// # Errors
///
/// Returns [`AuthError::InvalidTokenFormat`] if the header is malformed,
/// and [`AuthError::MissingClaim`] if it has no string `alg`.
pub fn peek_algorithm(token: &str) -> Result<String, AuthError> {
    let header = decode_segment(token, 0)?;
    header
        .get("alg")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| AuthError::missing_claim("alg"))
}

/// Reads the `keyVersion` claim without verifying the signature.
///
/// Used only to choose which secret to verify with; nothing read here is
/// trusted until the signature checks out.
///
/// # Errors
///
/// Returns [`AuthError::InvalidTokenFormat`] if the payload is malformed
/// or `keyVersion` is present but not a string.
pub fn peek_key_version(token: &str) -> Result<Option<String>, AuthError> {
    let payload = decode_segment(token, 1)?;
    match payload.get(KEY_VERSION_CLAIM) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(version)) => Ok(Some(version.clone())),
        Some(_) => Err(AuthError::invalid_token_format("keyVersion claim must be a string")),
    }
}
