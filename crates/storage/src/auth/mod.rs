//! Signing key-set types and durable storage.
//!
//! The token subsystem signs access and refresh tokens with symmetric
//! secrets grouped into a versioned [`KeySet`]. This module owns the record
//! type and the persistence seam; the rotation lifecycle itself lives in the
//! authn crate.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐  load / persist  ┌────────────────────┐
//! │ KeyRotationService│─────────────────►│    KeySetStore     │
//! │  (authn crate)    │                  │ File / Memory impl │
//! └───────────────────┘                  └────────────────────┘
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use carebase_common_storage::auth::{FileKeySetStore, KeySetStore};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let store = FileKeySetStore::new("keys");
//! match store.load_current().await {
//!     Ok(Some(key_set)) => println!("loaded {}", key_set.version),
//!     Ok(None) => println!("no key set yet"),
//!     Err(err) => eprintln!("key store unavailable: {err}"),
//! }
//! # });
//! ```

pub mod audit;
mod file;
mod key_set;
mod store;

pub use file::{CURRENT_KEYS_FILE, DEFAULT_KEYS_DIR, FileKeySetStore, RETIRED_KEYS_FILE};
pub use key_set::{KeySet, MAX_VERSION_LEN, MIN_SECRET_HEX_LEN, SECRET_BYTES};
pub use store::{KeySetStore, MemoryKeySetStore};
