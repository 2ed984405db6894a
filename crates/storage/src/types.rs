//! Common types used across key-set storage.

use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};

/// Opaque identifier of a [`KeySet`](crate::auth::KeySet).
///
/// Every issued token embeds the version of the key set that signed it, and
/// verification uses it to find the matching secret. Versions are generated
/// as `v{unix_millis}_{8 hex chars}`, but consumers must treat them as opaque
/// strings: older records may use any non-empty string.
///
/// Implements [`Borrow<str>`] so maps keyed by `KeyVersion` can be queried
/// with a plain `&str` taken from token claims.
///
/// # Examples
///
/// ```
/// use carebase_common_storage::KeyVersion;
///
/// let version = KeyVersion::from("v1718000000000_0a1b2c3d");
/// assert_eq!(version.as_str(), "v1718000000000_0a1b2c3d");
/// assert_eq!(version.to_string(), "v1718000000000_0a1b2c3d");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyVersion(String);

impl KeyVersion {
    /// Returns the version as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the version and returns the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for KeyVersion {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for KeyVersion {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<KeyVersion> for String {
    fn from(version: KeyVersion) -> Self {
        version.0
    }
}

impl AsRef<str> for KeyVersion {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for KeyVersion {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_key_version_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(KeyVersion::from("v1_aa"), 1);

        assert_eq!(map.get("v1_aa"), Some(&1));
        assert_eq!(map.get("v2_bb"), None);
    }

    #[test]
    fn test_key_version_serializes_transparently() {
        let json = serde_json::to_string(&KeyVersion::from("v1_aa")).unwrap_or_default();
        assert_eq!(json, "\"v1_aa\"");
    }
}
