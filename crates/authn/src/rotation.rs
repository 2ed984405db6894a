//! Signing-key lifecycle: load-or-generate at startup, scheduled and forced
//! rotation, and pruning of expired key sets.
//!
//! # Lifecycle
//!
//! ```text
//! new ──► initialize ──► load current (or generate + persist)
//!                        restore retained history
//!                        start scheduler
//!
//! every rotation_interval, or force_rotation:
//!     generate ──► persist history ──► persist current ──► promote ──► prune ──► event
//! ```
//!
//! A [`KeyRotationService`] is constructed once by the composition root,
//! initialized once, and shared as `Arc<KeyRotationService>` with the
//! [`TokenIssuer`](crate::TokenIssuer) and [`TokenVerifier`](crate::TokenVerifier).
//!
//! # Concurrency
//!
//! Rotations are serialized by an async mutex. A caller that queued behind
//! a rotation which completed while it waited does not rotate again; it
//! gets [`RotationOutcome::Collapsed`]. Two simultaneous
//! [`force_rotation`](KeyRotationService::force_rotation) calls therefore
//! produce one new key version.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use carebase_common_authn::{KeyRotationConfig, KeyRotationService};
//! use carebase_common_storage::auth::FileKeySetStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = Arc::new(KeyRotationService::new(
//!     Arc::new(FileKeySetStore::default()),
//!     KeyRotationConfig::default(),
//! ));
//! service.initialize().await?;
//!
//! let stats = service.stats()?;
//! println!("current key version: {}", stats.current_version);
//!
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use carebase_common_storage::{
    KeyVersion,
    auth::{
        KeySet, KeySetStore,
        audit::{AuditAction, AuditEvent, AuditLogger, AuditResult, TracingAuditLogger, key_set_resource},
    },
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::{
    sync::{Mutex as AsyncMutex, OnceCell, broadcast},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{config::KeyRotationConfig, error::AuthError, history::KeyHistory, secret};

/// What started a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationTrigger {
    /// The background scheduler.
    Scheduled,
    /// An explicit [`KeyRotationService::force_rotation`] call.
    Forced,
}

impl RotationTrigger {
    fn actor(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduler",
            Self::Forced => "admin",
        }
    }
}

impl fmt::Display for RotationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Forced => write!(f, "forced"),
        }
    }
}

/// Broadcast after every successful rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRotatedEvent {
    /// Version of the newly current key set.
    pub new_version: KeyVersion,
    /// Version of the key set that was retired.
    pub previous_version: KeyVersion,
    /// What started the rotation.
    pub trigger: RotationTrigger,
    /// When the rotation happened.
    pub rotated_at: DateTime<Utc>,
    /// Versions pruned from history during the rotation.
    pub pruned: Vec<KeyVersion>,
}

/// Result of a rotation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// This call rotated the keys.
    Rotated(KeyRotatedEvent),
    /// Another rotation completed while this call waited; nothing was done.
    Collapsed {
        /// The version current when the call returned.
        current_version: KeyVersion,
    },
}

impl RotationOutcome {
    /// The version current after the call.
    #[must_use]
    pub fn current_version(&self) -> &KeyVersion {
        match self {
            Self::Rotated(event) => &event.new_version,
            Self::Collapsed { current_version } => current_version,
        }
    }

    /// Returns `true` if this call performed the rotation.
    #[must_use]
    pub fn is_rotated(&self) -> bool {
        matches!(self, Self::Rotated(_))
    }
}

/// Administrative view of the key history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRotationStats {
    /// Version of the current key set.
    pub current_version: KeyVersion,
    /// Creation time of the current key set.
    pub current_key_created_at: DateTime<Utc>,
    /// Expiry of the current key set.
    pub current_key_expires_at: DateTime<Utc>,
    /// Number of retired key sets still retained.
    pub historical_versions_count: usize,
    /// Retired versions, sorted.
    pub historical_versions: Vec<KeyVersion>,
}

/// Health of the key lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRotationHealth {
    /// `true` when initialized and the current key set has not expired.
    pub healthy: bool,
    /// Version of the current key set, if initialized.
    pub current_version: Option<KeyVersion>,
    /// Time of the last successful rotation in this process.
    pub last_rotation: Option<DateTime<Utc>>,
    /// Why the service is unhealthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Point-in-time rotation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RotationMetricsSnapshot {
    /// Successful rotations.
    pub rotations_total: u64,
    /// Failed rotation attempts.
    pub rotation_failures_total: u64,
    /// Rotation requests collapsed into a concurrent rotation.
    pub collapsed_total: u64,
    /// Key sets pruned from history.
    pub pruned_total: u64,
    /// Time of the last successful rotation.
    pub last_rotation_at: Option<DateTime<Utc>>,
    /// Message of the last failed rotation attempt.
    pub last_failure: Option<String>,
}

#[derive(Default)]
struct RotationMetrics {
    rotations_total: AtomicU64,
    rotation_failures_total: AtomicU64,
    collapsed_total: AtomicU64,
    pruned_total: AtomicU64,
    last_rotation_at: Mutex<Option<DateTime<Utc>>>,
    last_failure: Mutex<Option<String>>,
}

/// Owns the key history, the durable store handle, the rotation critical
/// section, and the background scheduler.
pub struct KeyRotationService {
    store: Arc<dyn KeySetStore>,
    config: KeyRotationConfig,
    audit: Arc<dyn AuditLogger>,
    /// Set exactly once by a successful [`initialize`](Self::initialize).
    history: OnceCell<KeyHistory>,
    rotation_lock: AsyncMutex<()>,
    /// Incremented after every successful rotation. Callers snapshot it
    /// before queueing on `rotation_lock` to detect a rotation that
    /// completed while they waited.
    generation: AtomicU64,
    events: broadcast::Sender<KeyRotatedEvent>,
    metrics: RotationMetrics,
    cancel_token: CancellationToken,
    scheduler_handle: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for KeyRotationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRotationService")
            .field("config", &self.config)
            .field("initialized", &self.history.initialized())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl KeyRotationService {
    /// Creates an uninitialized service.
    ///
    /// Audit events go to [`TracingAuditLogger`] unless replaced with
    /// [`with_audit_logger`](Self::with_audit_logger).
    #[must_use]
    pub fn new(store: Arc<dyn KeySetStore>, config: KeyRotationConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            store,
            config,
            audit: Arc::new(TracingAuditLogger),
            history: OnceCell::new(),
            rotation_lock: AsyncMutex::new(()),
            generation: AtomicU64::new(0),
            events,
            metrics: RotationMetrics::default(),
            cancel_token: CancellationToken::new(),
            scheduler_handle: Mutex::new(None),
        }
    }

    /// Replaces the audit logger.
    #[must_use]
    pub fn with_audit_logger(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    /// Loads or generates the current key set, restores retained history,
    /// and starts the rotation scheduler.
    ///
    /// Idempotent: repeated or concurrent calls after the first success
    /// return `Ok(())` without touching storage or starting a second
    /// scheduler. A failed call leaves the service uninitialized and may be
    /// retried.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Config`] if the configuration is invalid
    /// - [`AuthError::Entropy`] if fresh key material cannot be generated
    /// - [`AuthError::KeyStorageError`] if the store cannot be read, or a freshly generated key
    ///   set cannot be persisted. A corrupt record is replaced instead.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    #[tracing::instrument(skip(self))]
    pub async fn initialize(self: &Arc<Self>) -> Result<(), AuthError> {
        self.history.get_or_try_init(|| self.bootstrap(Utc::now())).await?;
        self.start_scheduler();
        Ok(())
    }

    async fn bootstrap(&self, now: DateTime<Utc>) -> Result<KeyHistory, AuthError> {
        self.config.validate()?;
        self.load_or_generate(now).await
    }

    async fn load_or_generate(&self, now: DateTime<Utc>) -> Result<KeyHistory, AuthError> {
        let stored = match self.store.load_current().await {
            Ok(Some(key_set)) => match key_set.validate() {
                Ok(()) if key_set.is_expired_at(now) => {
                    tracing::warn!(
                        key_version = %key_set.version,
                        expires_at = %key_set.expires_at,
                        "stored key set has expired, generating a fresh one"
                    );
                    None
                },
                Ok(()) => Some(key_set),
                Err(err) => {
                    tracing::warn!(error = %err, "stored key set is invalid, generating a fresh one");
                    None
                },
            },
            Ok(None) => {
                tracing::info!("no stored key set, generating a fresh one");
                None
            },
            Err(err) if err.is_recoverable_by_regeneration() => {
                tracing::warn!(error = %err, "stored key set is corrupt, generating a fresh one");
                None
            },
            Err(err) => {
                tracing::error!(error = %err, "failed to read stored key set");
                return Err(err.into());
            },
        };

        let (current, action) = match stored {
            Some(key_set) => (key_set, AuditAction::LoadKeySet),
            None => {
                let fresh = secret::generate_key_set_at(now, self.config.retention())?;
                if let Err(err) = self.store.persist_current(&fresh).await {
                    self.audit(
                        "startup",
                        AuditAction::GenerateKeySet,
                        &fresh.version,
                        AuditResult::Failure(err.to_string()),
                        HashMap::new(),
                    )
                    .await;
                    return Err(err.into());
                }
                (fresh, AuditAction::GenerateKeySet)
            },
        };

        let version = current.version.clone();
        let history = KeyHistory::new(current);
        self.audit("startup", action, &version, AuditResult::Success, HashMap::new()).await;

        if self.config.persist_history {
            self.restore_retired(&history, now).await?;
        }

        tracing::info!(
            key_version = %version,
            retained = history.retired_count(),
            "key rotation service initialized"
        );
        Ok(history)
    }

    async fn restore_retired(
        &self,
        history: &KeyHistory,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let retired = match self.store.load_retired().await {
            Ok(retired) => retired,
            Err(err) if err.is_recoverable_by_regeneration() => {
                tracing::warn!(
                    error = %err,
                    "retained key sets are corrupt, tokens signed before restart may not verify"
                );
                return Ok(());
            },
            Err(err) => {
                tracing::error!(error = %err, "failed to read retained key sets");
                return Err(err.into());
            },
        };

        let mut restored = 0usize;
        for key_set in retired {
            if let Err(err) = key_set.validate() {
                tracing::warn!(key_version = %key_set.version, error = %err, "skipping invalid retained key set");
                continue;
            }
            if key_set.is_expired_at(now) {
                continue;
            }
            if history.archive(key_set) {
                restored += 1;
            }
        }

        if restored > 0 {
            let current = history.current();
            let metadata = HashMap::from([("restored".to_owned(), restored.to_string())]);
            self.audit("startup", AuditAction::RestoreHistory, &current.version, AuditResult::Success, metadata)
                .await;
        }
        Ok(())
    }

    /// Spawns the scheduler unless it is already running or the service
    /// has been shut down.
    fn start_scheduler(self: &Arc<Self>) {
        let mut handle = self.scheduler_handle.lock();
        if handle.is_some() || self.cancel_token.is_cancelled() {
            return;
        }

        let service = Arc::downgrade(self);
        let token = self.cancel_token.clone();
        let interval = self.config.rotation_interval;

        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; consume it so we start
            // with a full interval wait.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("key rotation scheduler shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(service) = service.upgrade() else {
                            break;
                        };
                        if let Err(err) = service.rotate(RotationTrigger::Scheduled, Utc::now()).await {
                            tracing::error!(error = %err, "scheduled key rotation failed");
                        }
                    }
                }
            }
        }));

        tracing::debug!(interval = ?interval, "key rotation scheduler started");
    }

    /// Rotates now, outside the schedule.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotInitialized`] before [`initialize`](Self::initialize)
    /// - [`AuthError::Entropy`] or [`AuthError::KeyStorageError`] if the new key set cannot be
    ///   generated or persisted; the previous key set stays current
    pub async fn force_rotation(&self) -> Result<RotationOutcome, AuthError> {
        self.force_rotation_at(Utc::now()).await
    }

    /// Rotates as of `now`, outside the schedule.
    ///
    /// # Errors
    ///
    /// See [`force_rotation`](Self::force_rotation).
    pub async fn force_rotation_at(&self, now: DateTime<Utc>) -> Result<RotationOutcome, AuthError> {
        self.rotate(RotationTrigger::Forced, now).await
    }

    #[tracing::instrument(skip(self, trigger, now), fields(trigger = %trigger))]
    async fn rotate(
        &self,
        trigger: RotationTrigger,
        now: DateTime<Utc>,
    ) -> Result<RotationOutcome, AuthError> {
        let history = self.history()?;
        let observed = self.generation.load(Ordering::Acquire);
        let _guard = self.rotation_lock.lock().await;

        if self.generation.load(Ordering::Acquire) != observed {
            self.metrics.collapsed_total.fetch_add(1, Ordering::Relaxed);
            let current_version = history.current().version.clone();
            tracing::debug!(key_version = %current_version, "rotation completed while waiting, skipping");
            return Ok(RotationOutcome::Collapsed { current_version });
        }

        match self.rotate_locked(history, trigger, now).await {
            Ok(event) => Ok(RotationOutcome::Rotated(event)),
            Err(err) => {
                self.metrics.rotation_failures_total.fetch_add(1, Ordering::Relaxed);
                *self.metrics.last_failure.lock() = Some(err.to_string());
                let current = history.current();
                self.audit(
                    trigger.actor(),
                    AuditAction::RotateKeySet,
                    &current.version,
                    AuditResult::Failure(err.to_string()),
                    HashMap::from([("trigger".to_owned(), trigger.to_string())]),
                )
                .await;
                Err(err)
            },
        }
    }

    /// Runs one rotation. Caller holds `rotation_lock`.
    async fn rotate_locked(
        &self,
        history: &KeyHistory,
        trigger: RotationTrigger,
        now: DateTime<Utc>,
    ) -> Result<KeyRotatedEvent, AuthError> {
        let next = secret::generate_key_set_at(now, self.config.retention())?;
        if history.contains(next.version.as_str()) {
            return Err(AuthError::entropy(format!(
                "generated key version {} is already in use",
                next.version
            )));
        }

        // The outgoing key must be durable as retired before anything
        // else can reference the new one.
        if self.config.persist_history {
            self.store.persist_retired(&retained_window(history, now)).await?;
        }
        self.store.persist_current(&next).await?;

        let new_version = next.version.clone();
        let previous = history.promote(next);
        let pruned = history.prune_expired_at(now);

        self.generation.fetch_add(1, Ordering::AcqRel);
        self.metrics.rotations_total.fetch_add(1, Ordering::Relaxed);
        self.metrics.pruned_total.fetch_add(pruned.len() as u64, Ordering::Relaxed);
        *self.metrics.last_rotation_at.lock() = Some(now);

        let event = KeyRotatedEvent {
            new_version,
            previous_version: previous.version.clone(),
            trigger,
            rotated_at: now,
            pruned,
        };

        tracing::info!(
            new_version = %event.new_version,
            previous_version = %event.previous_version,
            pruned = event.pruned.len(),
            "signing keys rotated"
        );

        self.audit(
            trigger.actor(),
            AuditAction::RotateKeySet,
            &event.new_version,
            AuditResult::Success,
            HashMap::from([
                ("previous_version".to_owned(), event.previous_version.to_string()),
                ("trigger".to_owned(), trigger.to_string()),
            ]),
        )
        .await;

        if !event.pruned.is_empty() {
            let versions =
                event.pruned.iter().map(KeyVersion::as_str).collect::<Vec<_>>().join(" ");
            self.audit(
                trigger.actor(),
                AuditAction::PruneKeySets,
                &event.new_version,
                AuditResult::Success,
                HashMap::from([("pruned_versions".to_owned(), versions)]),
            )
            .await;
        }

        // No subscribers is not an error.
        let _ = self.events.send(event.clone());
        Ok(event)
    }

    async fn audit(
        &self,
        actor: &str,
        action: AuditAction,
        version: &KeyVersion,
        result: AuditResult,
        metadata: HashMap<String, String>,
    ) {
        let event = AuditEvent::builder()
            .actor(actor)
            .action(action)
            .resource(key_set_resource(version))
            .result(result)
            .metadata(metadata)
            .build();
        self.audit.log(&event).await;
    }

    /// Stops the scheduler and waits for it to exit.
    ///
    /// A rotation already in progress runs to completion first. After
    /// shutdown, tokens can still be issued and verified and
    /// [`force_rotation`](Self::force_rotation) still works; only scheduled
    /// rotation stops.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let handle = self.scheduler_handle.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            tracing::warn!(error = %err, "key rotation scheduler panicked");
        }
    }

    /// Returns the key history.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotInitialized`] before [`initialize`](Self::initialize).
    pub fn history(&self) -> Result<&KeyHistory, AuthError> {
        self.history.get().ok_or(AuthError::NotInitialized)
    }

    /// Returns the version new tokens are signed with.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotInitialized`] before [`initialize`](Self::initialize).
    pub fn current_key_version(&self) -> Result<KeyVersion, AuthError> {
        Ok(self.history()?.current().version.clone())
    }

    /// Returns `true` if a token carrying `version` can be verified with a
    /// retained key set.
    ///
    /// Tokens without a version predate versioned keys and are considered
    /// valid. Returns `false` before initialization.
    #[must_use]
    pub fn is_key_version_valid(&self, version: Option<&str>) -> bool {
        match (version, self.history.get()) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(version), Some(history)) => history.contains(version),
        }
    }

    /// Returns the current key metadata and the retained versions.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotInitialized`] before [`initialize`](Self::initialize).
    pub fn stats(&self) -> Result<KeyRotationStats, AuthError> {
        let history = self.history()?;
        let current = history.current();
        let historical_versions = history.retired_versions();
        Ok(KeyRotationStats {
            current_version: current.version.clone(),
            current_key_created_at: current.created_at,
            current_key_expires_at: current.expires_at,
            historical_versions_count: historical_versions.len(),
            historical_versions,
        })
    }

    /// Reports health as of now.
    #[must_use]
    pub fn health(&self) -> KeyRotationHealth {
        self.health_at(Utc::now())
    }

    /// Reports health as of `now`.
    #[must_use]
    pub fn health_at(&self, now: DateTime<Utc>) -> KeyRotationHealth {
        let last_rotation = *self.metrics.last_rotation_at.lock();
        let Some(history) = self.history.get() else {
            return KeyRotationHealth {
                healthy: false,
                current_version: None,
                last_rotation,
                reason: Some("not initialized".to_owned()),
            };
        };

        let current = history.current();
        let expired = current.is_expired_at(now);
        KeyRotationHealth {
            healthy: !expired,
            current_version: Some(current.version.clone()),
            last_rotation,
            reason: expired.then(|| format!("current key set expired at {}", current.expires_at)),
        }
    }

    /// Returns a snapshot of the rotation counters.
    #[must_use]
    pub fn metrics(&self) -> RotationMetricsSnapshot {
        RotationMetricsSnapshot {
            rotations_total: self.metrics.rotations_total.load(Ordering::Relaxed),
            rotation_failures_total: self.metrics.rotation_failures_total.load(Ordering::Relaxed),
            collapsed_total: self.metrics.collapsed_total.load(Ordering::Relaxed),
            pruned_total: self.metrics.pruned_total.load(Ordering::Relaxed),
            last_rotation_at: *self.metrics.last_rotation_at.lock(),
            last_failure: self.metrics.last_failure.lock().clone(),
        }
    }

    /// Subscribes to [`KeyRotatedEvent`]s.
    ///
    /// Slow subscribers that fall more than `event_capacity` events behind
    /// observe [`broadcast::error::RecvError::Lagged`].
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<KeyRotatedEvent> {
        self.events.subscribe()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &KeyRotationConfig {
        &self.config
    }

    /// Returns the cancellation token for the scheduler.
    ///
    /// Callers can use this to integrate with external shutdown signals.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Returns `true` while the scheduler task is running.
    #[must_use]
    pub fn is_scheduler_running(&self) -> bool {
        self.scheduler_handle.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

/// Retired key sets that survive a rotation at `now`, including the
/// outgoing current set, oldest first.
fn retained_window(history: &KeyHistory, now: DateTime<Utc>) -> Vec<KeySet> {
    let mut window = history.retired();
    window.push(KeySet::clone(&history.current()));
    window.retain(|key_set| !key_set.is_expired_at(now));
    window
}

impl Drop for KeyRotationService {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
