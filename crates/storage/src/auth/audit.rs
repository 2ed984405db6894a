//! Audit logging for key-set lifecycle operations.
//!
//! Records who triggered a key lifecycle change, which key set it touched,
//! when it happened, and whether it succeeded. Healthcare deployments are
//! expected to retain these records (HIPAA audit controls).
//!
//! # Architecture
//!
//! The [`AuditLogger`] trait enables different audit backends:
//!
//! - [`TracingAuditLogger`]: Emits structured `tracing` events at INFO, suitable for log
//!   aggregation and SIEM integration.
//! - [`NoopAuditLogger`]: Discards events.
//! - Custom implementations can write to databases, external audit services, etc.
//!
//! # Usage
//!
//! ```no_run
//! use carebase_common_storage::auth::audit::{
//!     AuditAction, AuditEvent, AuditLogger, AuditResult, TracingAuditLogger, key_set_resource,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let logger = TracingAuditLogger;
//! let event = AuditEvent::builder()
//!     .actor("scheduler")
//!     .action(AuditAction::RotateKeySet)
//!     .resource(key_set_resource("v1718000000000_0a1b2c3d"))
//!     .result(AuditResult::Success)
//!     .build();
//! logger.log(&event).await;
//! # });
//! ```

use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Action performed on a key-set resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// An existing key set was loaded from durable storage.
    LoadKeySet,
    /// A fresh key set was generated and persisted.
    GenerateKeySet,
    /// The current key set was superseded by a new one.
    RotateKeySet,
    /// Expired key sets were removed from history.
    PruneKeySets,
    /// Retained key sets were restored from durable storage.
    RestoreHistory,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadKeySet => write!(f, "load_key_set"),
            Self::GenerateKeySet => write!(f, "generate_key_set"),
            Self::RotateKeySet => write!(f, "rotate_key_set"),
            Self::PruneKeySets => write!(f, "prune_key_sets"),
            Self::RestoreHistory => write!(f, "restore_history"),
        }
    }
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditResult {
    /// Operation completed successfully.
    Success,
    /// Operation failed with the given reason.
    Failure(String),
}

impl fmt::Display for AuditResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure(reason) => write!(f, "failure: {reason}"),
        }
    }
}

/// Structured audit event for key-set operations.
#[derive(Debug, Clone, bon::Builder)]
pub struct AuditEvent {
    /// When the event occurred (defaults to now).
    #[builder(default = Utc::now())]
    pub timestamp: DateTime<Utc>,
    /// Identity of the actor performing the operation (e.g. `scheduler`, `admin`, `startup`).
    #[builder(into)]
    pub actor: String,
    /// The action that was performed.
    pub action: AuditAction,
    /// Resource identifier (e.g. `key_set:v1718000000000_0a1b2c3d`).
    #[builder(into)]
    pub resource: String,
    /// Outcome of the operation.
    pub result: AuditResult,
    /// Additional context (e.g. previous version, pruned count).
    #[builder(default)]
    pub metadata: HashMap<String, String>,
}

/// Trait for audit log backends.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    /// Records an audit event.
    async fn log(&self, event: &AuditEvent);
}

#[async_trait]
impl<L: AuditLogger + ?Sized> AuditLogger for std::sync::Arc<L> {
    async fn log(&self, event: &AuditEvent) {
        (**self).log(event).await;
    }
}

/// Audit logger that emits structured `tracing` events.
///
/// Field mapping:
/// - `audit.timestamp`: RFC 3339 timestamp
/// - `audit.actor`: who triggered the action
/// - `audit.action`: the operation (e.g. "rotate_key_set")
/// - `audit.resource`: what was affected
/// - `audit.result`: "success" or "failure: ..."
/// - `audit.metadata`: `k=v` pairs, sorted by key
#[derive(Debug, Clone, Copy)]
pub struct TracingAuditLogger;

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log(&self, event: &AuditEvent) {
        let mut pairs: Vec<_> = event.metadata.iter().collect();
        pairs.sort();
        let metadata_str =
            pairs.into_iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(", ");

        tracing::info!(
            audit.timestamp = %event.timestamp.to_rfc3339(),
            audit.actor = %event.actor,
            audit.action = %event.action,
            audit.resource = %event.resource,
            audit.result = %event.result,
            audit.metadata = %metadata_str,
            "audit_event"
        );
    }
}

/// No-op audit logger for testing and environments where audit is not needed.
#[derive(Debug, Clone, Copy)]
pub struct NoopAuditLogger;

#[async_trait]
impl AuditLogger for NoopAuditLogger {
    async fn log(&self, _event: &AuditEvent) {}
}

/// Constructs a resource identifier for a key set.
pub fn key_set_resource(version: impl fmt::Display) -> String {
    format!("key_set:{version}")
}
