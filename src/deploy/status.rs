// ABOUTME: Runtime-visible deployment phase, outcome, and status records.
// ABOUTME: StatusHandle publishes updates to anyone querying or awaiting a deployment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use crate::types::{DeploymentId, GroupName, ImageRef, PoolColor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentPhase {
    Idle,
    Provisioning,
    HealthChecking,
    Verifying,
    Promoting,
    Draining,
    RollingBack,
    Failed,
    Completed,
}

impl DeploymentPhase {
    /// Phases in which cancellation and verification verdicts are still honored.
    pub fn accepts_signals(self) -> bool {
        matches!(
            self,
            DeploymentPhase::Idle
                | DeploymentPhase::Provisioning
                | DeploymentPhase::HealthChecking
                | DeploymentPhase::Verifying
        )
    }
}

impl fmt::Display for DeploymentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeploymentPhase::Idle => "idle",
            DeploymentPhase::Provisioning => "provisioning",
            DeploymentPhase::HealthChecking => "health_checking",
            DeploymentPhase::Verifying => "verifying",
            DeploymentPhase::Promoting => "promoting",
            DeploymentPhase::Draining => "draining",
            DeploymentPhase::RollingBack => "rolling_back",
            DeploymentPhase::Failed => "failed",
            DeploymentPhase::Completed => "completed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    RolledBack,
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Succeeded => "succeeded",
            Outcome::RolledBack => "rolled_back",
            Outcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Everything observable about one deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub id: DeploymentId,
    pub group: GroupName,
    pub image: ImageRef,
    /// Pool being brought up (the "green" role for this run).
    pub target_pool: Option<PoolColor>,
    /// Pool serving production when the deployment started.
    pub previous_pool: Option<PoolColor>,
    pub phase: DeploymentPhase,
    pub outcome: Option<Outcome>,
    pub reason: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Terminal statuses are what gets persisted.
pub type DeploymentRecord = DeploymentStatus;

impl DeploymentStatus {
    pub fn new(id: DeploymentId, group: GroupName, image: ImageRef) -> Self {
        Self {
            id,
            group,
            image,
            target_pool: None,
            previous_pool: None,
            phase: DeploymentPhase::Provisioning,
            outcome: None,
            reason: None,
            warnings: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == DeploymentPhase::Completed && self.outcome.is_some()
    }
}

/// Shared, observable status of a running deployment.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    tx: Arc<watch::Sender<DeploymentStatus>>,
}

impl StatusHandle {
    pub(crate) fn new(status: DeploymentStatus) -> Self {
        let (tx, _rx) = watch::channel(status);
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> DeploymentStatus {
        self.tx.borrow().clone()
    }

    pub fn phase(&self) -> DeploymentPhase {
        self.tx.borrow().phase
    }

    pub fn subscribe(&self) -> watch::Receiver<DeploymentStatus> {
        self.tx.subscribe()
    }

    pub(crate) fn set_phase(&self, phase: DeploymentPhase) {
        self.tx.send_modify(|status| status.phase = phase);
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut DeploymentStatus)) {
        self.tx.send_modify(f);
    }

    /// Replace the status with its terminal record.
    pub(crate) fn publish(&self, record: DeploymentRecord) {
        self.tx.send_replace(record);
    }

    /// Wait until the deployment reaches a terminal state.
    pub async fn wait_terminal(&self) -> DeploymentStatus {
        let mut rx = self.subscribe();
        match rx.wait_for(DeploymentStatus::is_terminal).await {
            Ok(status) => status.clone(),
            Err(_) => self.snapshot(),
        }
    }
}
