//! In-memory index of the current and retired key sets.
//!
//! [`KeyHistory`] answers "which secret signed this token?" on the request
//! path. Lookups take a shared lock and clone an `Arc`, so they never wait
//! on storage or on a rotation in progress for longer than a pointer swap.
//!
//! # Invariants
//!
//! - There is always exactly one current key set.
//! - A retired key set stays resolvable until its `expires_at` passes and a
//!   prune runs.
//! - [`promote`](KeyHistory::promote) retires the outgoing key set and
//!   installs the new one under a single write lock. A concurrent reader
//!   sees either the old ring or the new one, never a ring where the
//!   outgoing key is missing.

use std::{collections::HashMap, sync::Arc};

use carebase_common_storage::{KeyVersion, auth::KeySet};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{config::UnknownKeyVersionPolicy, error::AuthError};

#[derive(Debug)]
struct KeyRing {
    current: Arc<KeySet>,
    retired: HashMap<KeyVersion, Arc<KeySet>>,
}

/// Current key set plus the retired key sets still inside their retention
/// window.
#[derive(Debug)]
pub struct KeyHistory {
    ring: RwLock<KeyRing>,
}

impl KeyHistory {
    /// Creates a history whose only entry is `current`.
    #[must_use]
    pub fn new(current: KeySet) -> Self {
        Self {
            ring: RwLock::new(KeyRing { current: Arc::new(current), retired: HashMap::new() }),
        }
    }

    /// Returns the key set used for new tokens.
    #[must_use]
    pub fn current(&self) -> Arc<KeySet> {
        Arc::clone(&self.ring.read().current)
    }

    /// Looks up a key set by version, falling back to the current one.
    ///
    /// An absent, empty, unknown, or pruned version resolves to the current
    /// key set. Verification against the wrong secret then fails with an
    /// invalid signature.
    #[must_use]
    pub fn get_by_version(&self, version: Option<&str>) -> Arc<KeySet> {
        let ring = self.ring.read();
        version
            .filter(|v| !v.is_empty())
            .and_then(|v| Self::lookup(&ring, v))
            .unwrap_or_else(|| Arc::clone(&ring.current))
    }

    /// Looks up a key set by version under the given policy.
    ///
    /// # Errors
    ///
    /// With [`UnknownKeyVersionPolicy::Reject`], returns
    /// [`AuthError::UnknownKeyVersion`] when the version is absent, empty,
    /// or not retained.
    pub fn resolve(
        &self,
        version: Option<&str>,
        policy: UnknownKeyVersionPolicy,
    ) -> Result<Arc<KeySet>, AuthError> {
        match policy {
            UnknownKeyVersionPolicy::Fallback => Ok(self.get_by_version(version)),
            UnknownKeyVersionPolicy::Reject => {
                let ring = self.ring.read();
                version
                    .filter(|v| !v.is_empty())
                    .and_then(|v| Self::lookup(&ring, v))
                    .ok_or_else(|| AuthError::unknown_key_version(version.unwrap_or_default()))
            },
        }
    }

    fn lookup(ring: &KeyRing, version: &str) -> Option<Arc<KeySet>> {
        if ring.current.version.as_str() == version {
            return Some(Arc::clone(&ring.current));
        }
        ring.retired.get(version).cloned()
    }

    /// Adds a retired key set.
    ///
    /// Returns `false` if `key_set` has the current version, which is left
    /// untouched.
    pub fn archive(&self, key_set: KeySet) -> bool {
        let mut ring = self.ring.write();
        if ring.current.version == key_set.version {
            return false;
        }
        ring.retired.insert(key_set.version.clone(), Arc::new(key_set));
        true
    }

    /// Retires the current key set and installs `next` as current.
    ///
    /// Returns the key set that was current before the call.
    pub fn promote(&self, next: KeySet) -> Arc<KeySet> {
        let next = Arc::new(next);
        let mut guard = self.ring.write();
        let ring = &mut *guard;
        ring.retired.remove(&next.version);
        let previous = std::mem::replace(&mut ring.current, next);
        ring.retired.insert(previous.version.clone(), Arc::clone(&previous));
        previous
    }

    /// Removes retired key sets whose `expires_at` is at or before `now`.
    ///
    /// The current key set is never removed. Returns the removed versions,
    /// sorted.
    pub fn prune_expired_at(&self, now: DateTime<Utc>) -> Vec<KeyVersion> {
        let mut ring = self.ring.write();
        let mut pruned: Vec<KeyVersion> = ring
            .retired
            .iter()
            .filter(|(_, key_set)| key_set.is_expired_at(now))
            .map(|(version, _)| version.clone())
            .collect();
        for version in &pruned {
            ring.retired.remove(version);
        }
        pruned.sort();
        pruned
    }

    /// Removes retired key sets that have expired as of now.
    pub fn prune_expired(&self) -> Vec<KeyVersion> {
        self.prune_expired_at(Utc::now())
    }

    /// Returns `true` if `version` is current or retained.
    #[must_use]
    pub fn contains(&self, version: &str) -> bool {
        Self::lookup(&self.ring.read(), version).is_some()
    }

    /// Retired versions, sorted.
    #[must_use]
    pub fn retired_versions(&self) -> Vec<KeyVersion> {
        let mut versions: Vec<_> = self.ring.read().retired.keys().cloned().collect();
        versions.sort();
        versions
    }

    /// Copies of the retired key sets, oldest first.
    #[must_use]
    pub fn retired(&self) -> Vec<KeySet> {
        let mut retired: Vec<KeySet> =
            self.ring.read().retired.values().map(|key_set| KeySet::clone(key_set)).collect();
        retired.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.version.cmp(&b.version)));
        retired
    }

    /// Number of retired key sets.
    #[must_use]
    pub fn retired_count(&self) -> usize {
        self.ring.read().retired.len()
    }
}
