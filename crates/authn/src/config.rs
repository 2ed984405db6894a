//! Token and key-rotation configuration.
//!
//! Both configs deserialize from any serde format, with durations written
//! in humantime notation (`"15m"`, `"24h"`, `"7days"`), and can be built
//! programmatically with validating builders.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use carebase_common_authn::config::{KeyRotationConfig, TokenConfig};
//!
//! let rotation = KeyRotationConfig::builder()
//!     .rotation_interval(Duration::from_secs(12 * 3600))
//!     .build()?;
//!
//! let tokens = TokenConfig::builder()
//!     .issuer("carebase-api")
//!     .audience("carebase-clients")
//!     .build()?;
//!
//! tokens.validate_against(&rotation)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default access-token lifetime (15 minutes).
pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

/// Default refresh-token lifetime (6 days).
pub const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(6 * 24 * 3600);

/// Default interval between scheduled rotations (24 hours).
pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Default retention of a key set after creation (7 days).
pub const DEFAULT_KEY_RETENTION: Duration = Duration::from_secs(7 * 24 * 3600);

/// Default capacity of the rotation event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 16;

/// Shortest accepted rotation interval.
pub const MIN_ROTATION_INTERVAL: Duration = Duration::from_secs(1);

/// Longest accepted key retention (10 years).
pub const MAX_KEY_RETENTION: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A value is below its minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// Name of the offending field.
        field: &'static str,
        /// Minimum accepted value, human readable.
        min: String,
        /// The rejected value, human readable.
        value: String,
    },

    /// A value is above its maximum.
    #[error("{field} must be at most {max}, got {value}")]
    AboveMaximum {
        /// Name of the offending field.
        field: &'static str,
        /// Maximum accepted value, human readable.
        max: String,
        /// The rejected value, human readable.
        value: String,
    },

    /// A required string field is empty.
    #[error("{field} must not be empty")]
    Empty {
        /// Name of the offending field.
        field: &'static str,
    },

    /// Tokens would outlive the key set that signed them.
    #[error(
        "{token} lifetime ({ttl:?}) plus rotation interval ({interval:?}) exceeds key retention ({retention:?})"
    )]
    TokenOutlivesKey {
        /// Which token kind (`access` or `refresh`).
        token: &'static str,
        /// Token lifetime.
        ttl: Duration,
        /// Rotation interval.
        interval: Duration,
        /// Key retention.
        retention: Duration,
    },
}

/// What verification does with a token whose key version is not retained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownKeyVersionPolicy {
    /// Verify against the current key set. A token signed by a pruned key
    /// then fails with an invalid signature.
    #[default]
    Fallback,
    /// Reject the token with
    /// [`AuthError::UnknownKeyVersion`](crate::AuthError::UnknownKeyVersion).
    Reject,
}

/// Key-rotation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[builder(finish_fn(name = build_unvalidated, vis = ""))]
pub struct KeyRotationConfig {
    /// Interval between scheduled rotations.
    #[serde(with = "humantime_serde", default = "default_rotation_interval")]
    #[builder(default = DEFAULT_ROTATION_INTERVAL)]
    pub rotation_interval: Duration,

    /// How long a key set stays verifiable after it is created.
    #[serde(with = "humantime_serde", default = "default_key_retention")]
    #[builder(default = DEFAULT_KEY_RETENTION)]
    pub key_retention: Duration,

    /// Handling of tokens that carry an unknown key version.
    #[serde(default)]
    #[builder(default)]
    pub unknown_version_policy: UnknownKeyVersionPolicy,

    /// Persist retired key sets so they survive a restart.
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub persist_history: bool,

    /// Buffered rotation events per subscriber.
    #[serde(default = "default_event_capacity")]
    #[builder(default = DEFAULT_EVENT_CAPACITY)]
    pub event_capacity: usize,
}

fn default_rotation_interval() -> Duration {
    DEFAULT_ROTATION_INTERVAL
}

fn default_key_retention() -> Duration {
    DEFAULT_KEY_RETENTION
}

fn default_true() -> bool {
    true
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for KeyRotationConfig {
    fn default() -> Self {
        Self {
            rotation_interval: DEFAULT_ROTATION_INTERVAL,
            key_retention: DEFAULT_KEY_RETENTION,
            unknown_version_policy: UnknownKeyVersionPolicy::default(),
            persist_history: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl<S: key_rotation_config_builder::IsComplete> KeyRotationConfigBuilder<S> {
    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any field is out of range (see
    /// [`KeyRotationConfig::validate`]).
    pub fn build(self) -> Result<KeyRotationConfig, ConfigError> {
        let config = self.build_unvalidated();
        config.validate()?;
        Ok(config)
    }
}

impl KeyRotationConfig {
    /// Checks field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BelowMinimum`] if:
    /// - `rotation_interval` is shorter than [`MIN_ROTATION_INTERVAL`]
    /// - `key_retention` is shorter than `rotation_interval`
    /// - `event_capacity` is zero
    ///
    /// Returns [`ConfigError::AboveMaximum`] if `key_retention` is longer
    /// than [`MAX_KEY_RETENTION`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rotation_interval < MIN_ROTATION_INTERVAL {
            return Err(ConfigError::BelowMinimum {
                field: "rotation_interval",
                min: format!("{MIN_ROTATION_INTERVAL:?}"),
                value: format!("{:?}", self.rotation_interval),
            });
        }
        if self.key_retention < self.rotation_interval {
            return Err(ConfigError::BelowMinimum {
                field: "key_retention",
                min: format!("{:?}", self.rotation_interval),
                value: format!("{:?}", self.key_retention),
            });
        }
        if self.key_retention > MAX_KEY_RETENTION {
            return Err(ConfigError::AboveMaximum {
                field: "key_retention",
                max: format!("{MAX_KEY_RETENTION:?}"),
                value: format!("{:?}", self.key_retention),
            });
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "event_capacity",
                min: "1".to_owned(),
                value: "0".to_owned(),
            });
        }
        Ok(())
    }

    /// Key retention as a [`chrono::Duration`].
    ///
    /// Saturates at `chrono::Duration::MAX` for values [`validate`](Self::validate)
    /// rejects.
    #[must_use]
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.key_retention).unwrap_or(chrono::Duration::MAX)
    }
}

/// Token issuance and verification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[builder(finish_fn(name = build_unvalidated, vis = ""))]
pub struct TokenConfig {
    /// Value of the `iss` claim.
    #[builder(into)]
    pub issuer: String,

    /// Value of the `aud` claim.
    #[builder(into)]
    pub audience: String,

    /// Access-token lifetime.
    #[serde(with = "humantime_serde", default = "default_access_token_ttl")]
    #[builder(default = DEFAULT_ACCESS_TOKEN_TTL)]
    pub access_token_ttl: Duration,

    /// Refresh-token lifetime.
    #[serde(with = "humantime_serde", default = "default_refresh_token_ttl")]
    #[builder(default = DEFAULT_REFRESH_TOKEN_TTL)]
    pub refresh_token_ttl: Duration,

    /// Clock-skew tolerance applied to `exp` during verification.
    #[serde(with = "humantime_serde", default)]
    #[builder(default)]
    pub leeway: Duration,
}

fn default_access_token_ttl() -> Duration {
    DEFAULT_ACCESS_TOKEN_TTL
}

fn default_refresh_token_ttl() -> Duration {
    DEFAULT_REFRESH_TOKEN_TTL
}

impl<S: token_config_builder::IsComplete> TokenConfigBuilder<S> {
    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the issuer or audience is empty or a
    /// lifetime is zero.
    pub fn build(self) -> Result<TokenConfig, ConfigError> {
        let config = self.build_unvalidated();
        config.validate()?;
        Ok(config)
    }
}

impl TokenConfig {
    /// Checks field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the issuer or audience is empty or either
    /// token lifetime is shorter than one second.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::Empty { field: "issuer" });
        }
        if self.audience.trim().is_empty() {
            return Err(ConfigError::Empty { field: "audience" });
        }
        for (field, ttl) in
            [("access_token_ttl", self.access_token_ttl), ("refresh_token_ttl", self.refresh_token_ttl)]
        {
            if ttl < Duration::from_secs(1) {
                return Err(ConfigError::BelowMinimum {
                    field,
                    min: "1s".to_owned(),
                    value: format!("{ttl:?}"),
                });
            }
        }
        Ok(())
    }

    /// Checks that no token can outlive the key set that signed it.
    ///
    /// A key set becomes retired at most `rotation_interval` after creation
    /// and stays verifiable until `key_retention` after creation, so every
    /// token lifetime must satisfy `ttl + rotation_interval <= key_retention`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TokenOutlivesKey`] naming the first token kind
    /// that violates the bound.
    pub fn validate_against(&self, rotation: &KeyRotationConfig) -> Result<(), ConfigError> {
        for (token, ttl) in [("access", self.access_token_ttl), ("refresh", self.refresh_token_ttl)] {
            let needed = ttl.saturating_add(rotation.rotation_interval);
            if needed > rotation.key_retention {
                return Err(ConfigError::TokenOutlivesKey {
                    token,
                    ttl,
                    interval: rotation.rotation_interval,
                    retention: rotation.key_retention,
                });
            }
        }
        Ok(())
    }

    /// Leeway in whole seconds, as compared against `exp`.
    #[must_use]
    pub fn leeway_secs(&self) -> i64 {
        i64::try_from(self.leeway.as_secs()).unwrap_or(i64::MAX)
    }
}
