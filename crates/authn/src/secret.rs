//! Random key material.
//!
//! All randomness comes from the operating system CSPRNG. A failing
//! entropy source is reported as [`AuthError::Entropy`] and never papered
//! over with a weaker generator.

use carebase_common_storage::{
    KeyVersion,
    auth::{KeySet, SECRET_BYTES},
};
use chrono::{DateTime, Utc};
use fail::fail_point;
use rand::{TryRngCore, rngs::OsRng};
use zeroize::Zeroizing;

use crate::{config::ConfigError, error::AuthError};

/// Random bytes appended to a key version.
const VERSION_SUFFIX_BYTES: usize = 4;

fn fill_random(buf: &mut [u8]) -> Result<(), AuthError> {
    OsRng.try_fill_bytes(buf).map_err(|err| AuthError::entropy(err.to_string()))
}

/// Generates a version identifier of the form `v{unix_millis}_{8 hex}`.
///
/// # Errors
///
/// Returns [`AuthError::Entropy`] if the OS random source fails.
pub fn generate_version_at(now: DateTime<Utc>) -> Result<KeyVersion, AuthError> {
    let mut suffix = [0u8; VERSION_SUFFIX_BYTES];
    fill_random(&mut suffix)?;
    Ok(KeyVersion::from(format!("v{}_{}", now.timestamp_millis(), hex::encode(suffix))))
}

/// Generates a version identifier stamped with the current time.
///
/// # Errors
///
/// Returns [`AuthError::Entropy`] if the OS random source fails.
pub fn generate_version() -> Result<KeyVersion, AuthError> {
    generate_version_at(Utc::now())
}

/// Generates a hex-encoded secret of [`SECRET_BYTES`] random bytes.
///
/// Both the raw bytes and the encoded string are zeroized on drop.
///
/// # Errors
///
/// Returns [`AuthError::Entropy`] if the OS random source fails.
pub fn generate_secret() -> Result<Zeroizing<String>, AuthError> {
    fail_point!("secret-before-generate", |_| {
        Err(AuthError::entropy("injected entropy failure"))
    });

    let mut bytes = Zeroizing::new([0u8; SECRET_BYTES]);
    fill_random(bytes.as_mut_slice())?;
    Ok(Zeroizing::new(hex::encode(bytes.as_slice())))
}

/// Generates a complete key set created at `now` and retained for
/// `retention`.
///
/// # Errors
///
/// - [`AuthError::Entropy`] if the OS random source fails
/// - [`AuthError::Config`] if `now + retention` is out of range
pub fn generate_key_set_at(
    now: DateTime<Utc>,
    retention: chrono::Duration,
) -> Result<KeySet, AuthError> {
    let expires_at = now.checked_add_signed(retention).ok_or_else(|| ConfigError::AboveMaximum {
        field: "key_retention",
        max: format!("{}", DateTime::<Utc>::MAX_UTC - now),
        value: format!("{retention}"),
    })?;
    let version = generate_version_at(now)?;
    let access_secret = generate_secret()?;
    let refresh_secret = generate_secret()?;

    Ok(KeySet::builder()
        .version(version)
        .access_secret(access_secret)
        .refresh_secret(refresh_secret)
        .created_at(now)
        .expires_at(expires_at)
        .build())
}

/// Generates a complete key set created now.
///
/// # Errors
///
/// Returns [`AuthError::Entropy`] if the OS random source fails.
pub fn generate_key_set(retention: chrono::Duration) -> Result<KeySet, AuthError> {
    generate_key_set_at(Utc::now(), retention)
}
