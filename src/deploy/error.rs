// ABOUTME: Error types for deployment operations.
// ABOUTME: Classifies failures into rollback triggers, fatal failures, and conflicts.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::artifact::ArtifactError;
use crate::router::RoutingError;
use crate::scheduler::SchedulerError;
use crate::types::PoolColor;

use super::status::DeploymentPhase;

/// Who holds the deploy lock of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolderInfo {
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub deployment: Option<String>,
}

impl fmt::Display for LockHolderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (pid {}) since {}",
            self.holder, self.pid, self.started_at
        )?;
        if let Some(deployment) = &self.deployment {
            write!(f, ", deployment {deployment}")?;
        }
        Ok(())
    }
}

/// Errors that can occur while starting or driving a deployment.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Another deployment is active for the group.
    #[error("a deployment is already active for group {group}: {}", holder.as_ref().map(|h| h.to_string()).unwrap_or_else(|| "holder unknown".to_string()))]
    Conflict {
        group: String,
        holder: Option<Box<LockHolderInfo>>,
    },

    #[error("deploy lock error: {0}")]
    Lock(String),

    /// The scheduler cannot launch the new replicas.
    #[error("provisioning the {pool} pool failed: {source}")]
    Provisioning {
        pool: PoolColor,
        source: SchedulerError,
    },

    #[error("replicas in the {pool} pool did not start within {timeout_secs}s")]
    ProvisioningTimeout { pool: PoolColor, timeout_secs: u64 },

    /// A transient scheduler error persisted through every retry.
    #[error("{operation} still failing after {attempts} attempts: {source}")]
    TransientScheduler {
        operation: String,
        attempts: u32,
        source: SchedulerError,
    },

    #[error("the {pool} pool did not become healthy within {timeout_secs}s")]
    HealthTimeout { pool: PoolColor, timeout_secs: u64 },

    #[error("health check of the {pool} pool failed: {reason}")]
    HealthCheckFailed { pool: PoolColor, reason: String },

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("no verification signal within the {0}s bake time")]
    VerificationTimeout(u64),

    /// Listener bindings violate the blue/green invariants before anything changed.
    #[error("routing state is corrupted: {0}")]
    RoutingCorruption(String),

    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("promoting the {pool} pool failed: {reason}")]
    Promotion { pool: PoolColor, reason: String },

    /// Draining the old pool failed. Never changes the outcome.
    #[error("draining the {pool} pool failed: {source}")]
    DrainFailure {
        pool: PoolColor,
        source: SchedulerError,
    },

    #[error("deployment cancelled during {phase}")]
    Cancelled { phase: DeploymentPhase },

    #[error("unknown deployment: {0}")]
    UnknownDeployment(String),

    /// An approval or rejection arrived once promotion could no longer be stopped.
    #[error("deployment {id} is {phase}, verification verdicts are no longer accepted")]
    VerdictTooLate { id: String, phase: DeploymentPhase },

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    Conflict,
    Lock,
    Provisioning,
    TransientScheduler,
    HealthTimeout,
    HealthCheckFailed,
    Verification,
    RoutingCorruption,
    Routing,
    Promotion,
    DrainFailure,
    Cancelled,
    UnknownDeployment,
    VerdictTooLate,
    Artifact,
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::Conflict { .. } => DeployErrorKind::Conflict,
            DeployError::Lock(_) => DeployErrorKind::Lock,
            DeployError::Provisioning { .. } | DeployError::ProvisioningTimeout { .. } => {
                DeployErrorKind::Provisioning
            }
            DeployError::TransientScheduler { .. } => DeployErrorKind::TransientScheduler,
            DeployError::HealthTimeout { .. } => DeployErrorKind::HealthTimeout,
            DeployError::HealthCheckFailed { .. } => DeployErrorKind::HealthCheckFailed,
            DeployError::VerificationFailed(_) | DeployError::VerificationTimeout(_) => {
                DeployErrorKind::Verification
            }
            DeployError::RoutingCorruption(_) => DeployErrorKind::RoutingCorruption,
            DeployError::Routing(_) => DeployErrorKind::Routing,
            DeployError::Promotion { .. } => DeployErrorKind::Promotion,
            DeployError::DrainFailure { .. } => DeployErrorKind::DrainFailure,
            DeployError::Cancelled { .. } => DeployErrorKind::Cancelled,
            DeployError::UnknownDeployment(_) => DeployErrorKind::UnknownDeployment,
            DeployError::VerdictTooLate { .. } => DeployErrorKind::VerdictTooLate,
            DeployError::Artifact(_) => DeployErrorKind::Artifact,
        }
    }

    /// Create a conflict error naming the current lock holder.
    pub fn lock_held(group: &str, holder: LockHolderInfo) -> Self {
        DeployError::Conflict {
            group: group.to_string(),
            holder: Some(Box::new(holder)),
        }
    }

    pub fn lock_error(message: impl Into<String>) -> Self {
        DeployError::Lock(message.into())
    }

    pub fn lock_holder_info(&self) -> Option<&LockHolderInfo> {
        match self {
            DeployError::Conflict { holder, .. } => holder.as_deref(),
            _ => None,
        }
    }

    /// Errors that end a deployment as rolled back rather than failed.
    pub fn is_rollback_trigger(&self) -> bool {
        matches!(
            self.kind(),
            DeployErrorKind::HealthTimeout
                | DeployErrorKind::HealthCheckFailed
                | DeployErrorKind::Verification
                | DeployErrorKind::Cancelled
        )
    }
}
