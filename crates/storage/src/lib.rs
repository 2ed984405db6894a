//! Durable key-set storage for Carebase token signing.
//!
//! This crate provides the [`KeySet`](auth::KeySet) record, the
//! [`KeySetStore`](auth::KeySetStore) persistence trait with file-backed and
//! in-memory implementations, key-set audit logging, and the shared
//! [`StorageError`] type.
//!
//! # Quick Start
//!
//! ```
//! use chrono::{Duration, Utc};
//! use carebase_common_storage::auth::{KeySet, KeySetStore, MemoryKeySetStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryKeySetStore::new();
//!     let now = Utc::now();
//!     let key_set = KeySet::builder()
//!         .version("v1718000000000_0a1b2c3d")
//!         .access_secret("a".repeat(128))
//!         .refresh_secret("b".repeat(128))
//!         .expires_at(now + Duration::days(7))
//!         .build();
//!
//!     store.persist_current(&key_set).await?;
//!     assert!(store.load_current().await?.is_some());
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with key-set fixtures and a fault-injecting store
//!   wrapper. Enable this in `[dev-dependencies]` for integration tests.
//! - **`failpoints`**: Activates the `file-store-before-rename` fail point in
//!   [`FileKeySetStore`](auth::FileKeySetStore) for fault-injection tests.

#![deny(unsafe_code)]

pub mod auth;
pub mod error;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod types;

pub use error::{BoxError, StorageError, StorageResult};
pub use types::KeyVersion;
pub use zeroize::Zeroizing;
