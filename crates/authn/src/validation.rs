//! JWT algorithm and key-version validation.
//!
//! These checks run on unverified header and payload values, before any
//! secret is looked up.
//!
//! # Security
//!
//! - Strict algorithm checks to prevent algorithm substitution attacks
//! - Only HS256 is accepted, since tokens are signed with shared secrets
//! - `"none"` is always rejected

use carebase_common_storage::auth::MAX_VERSION_LEN;

use crate::error::AuthError;

/// Forbidden JWT algorithms that are never accepted for security reasons.
///
/// - `none`: No signature verification (trivially bypassable)
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none"];

/// Accepted JWT algorithms.
///
/// Key sets hold 512-bit HMAC secrets and tokens are signed with HS256.
/// Asymmetric algorithms are not accepted: a verifier that accepted RS256
/// or EdDSA here could be tricked into treating a shared secret as a
/// public key (algorithm confusion).
pub const ACCEPTED_ALGORITHMS: &[&str] = &["HS256"];

/// Validate JWT algorithm against security policies.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] if:
/// - Algorithm is "none"
/// - Algorithm is not in [`ACCEPTED_ALGORITHMS`]
///
/// # Examples
///
/// ```
/// use carebase_common_authn::validation::validate_algorithm;
///
/// assert!(validate_algorithm("HS256").is_ok());
/// assert!(validate_algorithm("RS256").is_err());
/// assert!(validate_algorithm("none").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), AuthError> {
    if FORBIDDEN_ALGORITHMS.iter().any(|forbidden| forbidden.eq_ignore_ascii_case(alg)) {
        return Err(AuthError::UnsupportedAlgorithm(format!(
            "Algorithm '{}' is not allowed for security reasons",
            alg
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(AuthError::UnsupportedAlgorithm(format!(
            "Algorithm '{}' is not in accepted list (only HS256 is supported)",
            alg
        )));
    }

    Ok(())
}

/// Validate the shape of a `keyVersion` claim.
///
/// Runs on the unverified claim, before the history lookup and before the
/// value is logged.
///
/// # Errors
///
/// Returns [`AuthError::InvalidTokenFormat`] if the version is longer than
/// [`MAX_VERSION_LEN`] bytes or contains whitespace or control characters.
pub fn validate_key_version(version: &str) -> Result<(), AuthError> {
    if version.len() > MAX_VERSION_LEN {
        return Err(AuthError::invalid_token_format(format!(
            "keyVersion exceeds {MAX_VERSION_LEN} bytes"
        )));
    }
    if version.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(AuthError::invalid_token_format(
            "keyVersion contains whitespace or control characters",
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_validate_algorithm_hs256_accepted() {
        assert!(validate_algorithm("HS256").is_ok());
    }

    #[rstest]
    #[case::none("none")]
    #[case::none_upper("NONE")]
    #[case::none_mixed("nOnE")]
    fn test_validate_algorithm_none_rejected(#[case] alg: &str) {
        let result = validate_algorithm(alg);
        assert!(
            matches!(result, Err(AuthError::UnsupportedAlgorithm(ref msg)) if msg.contains("not allowed for security reasons"))
        );
    }

    #[rstest]
    #[case::rs256("RS256")]
    #[case::eddsa("EdDSA")]
    #[case::es256("ES256")]
    #[case::hs384("HS384")]
    #[case::hs512("HS512")]
    fn test_validate_algorithm_not_in_list(#[case] alg: &str) {
        let result = validate_algorithm(alg);
        assert!(
            matches!(result, Err(AuthError::UnsupportedAlgorithm(ref msg)) if msg.contains("not in accepted list"))
        );
    }

    #[test]
    fn test_accepted_algorithms_constant() {
        assert_eq!(ACCEPTED_ALGORITHMS, &["HS256"]);
        assert_eq!(FORBIDDEN_ALGORITHMS, &["none"]);
    }

    #[test]
    fn test_validate_key_version() {
        assert!(validate_key_version("v1718000000000_0a1b2c3d").is_ok());
        assert!(validate_key_version("v1 2").is_err());
        assert!(validate_key_version("v1\u{0}").is_err());
        assert!(validate_key_version(&"v".repeat(MAX_VERSION_LEN + 1)).is_err());
    }
}
