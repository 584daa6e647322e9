// ABOUTME: Replica scheduler contract: launch, observe, and drain replicas in a pool.
// ABOUTME: Errors distinguish transient outages from fatal launch failures.

mod simulated;

pub use simulated::{ProbeStep, SimulatedScheduler};

use async_trait::async_trait;
use std::time::Duration;

use crate::config::TaskSpec;
use crate::pool::HealthReport;
use crate::types::PoolColor;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("no capacity associated with the {0} pool")]
    CapacityUnavailable(PoolColor),

    #[error("scheduler does not manage the {0} pool")]
    UnknownPool(PoolColor),

    #[error("replica launch failed: {0}")]
    LaunchFailed(String),

    #[error("scheduler unavailable: {0}")]
    Unavailable(String),
}

impl SchedulerError {
    /// Only outages are worth retrying; everything else needs a new deployment.
    pub fn is_transient(&self) -> bool {
        matches!(self, SchedulerError::Unavailable(_))
    }
}

/// Runs replicas of a task into target pools.
#[async_trait]
pub trait ReplicaScheduler: Send + Sync {
    /// Pools this scheduler can place replicas into.
    fn pools(&self) -> Vec<PoolColor>;

    /// Capacity for the pool must exist and be associated before anything is
    /// scheduled into it.
    async fn ensure_capacity(&self, pool: PoolColor) -> Result<(), SchedulerError>;

    /// Request `count` replicas of `spec` in `pool`. Returns once the request
    /// is accepted; convergence is observed through `running_replicas`.
    async fn set_desired_replicas(
        &self,
        pool: PoolColor,
        spec: &TaskSpec,
        count: u32,
    ) -> Result<(), SchedulerError>;

    /// Replicas currently running. Launch failures discovered after the
    /// request was accepted surface here.
    async fn running_replicas(&self, pool: PoolColor) -> Result<u32, SchedulerError>;

    /// Most recent aggregated health of the pool.
    async fn health_of(&self, pool: PoolColor) -> Result<HealthReport, SchedulerError>;

    /// Deregister and terminate every replica of the pool, waiting
    /// `deregistration_delay` for in-flight requests first.
    async fn drain(
        &self,
        pool: PoolColor,
        deregistration_delay: Duration,
    ) -> Result<(), SchedulerError>;
}
