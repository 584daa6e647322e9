// ABOUTME: Health gate for a freshly provisioned pool.
// ABOUTME: Counts consecutive observations against the configured thresholds.

use chrono::Utc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::HealthCheckConfig;
use crate::pool::HealthStatus;
use crate::scheduler::ReplicaScheduler;
use crate::types::PoolColor;

use super::signal::CancelSignal;

/// One classified health observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Observation {
    Healthy,
    /// Conclusive failure: aborts the gate at once.
    Unhealthy(String),
    /// Inconclusive: a failed or late probe, partial health, or no replicas yet.
    Noise(String),
}

/// Probe the pool once, bounded by the per-probe timeout.
pub(crate) async fn observe(
    scheduler: &dyn ReplicaScheduler,
    pool: PoolColor,
    health_check: &HealthCheckConfig,
) -> Observation {
    let report = match tokio::time::timeout(health_check.timeout, scheduler.health_of(pool)).await
    {
        Err(_) => {
            return Observation::Noise(format!(
                "probe timed out after {}s",
                health_check.timeout.as_secs()
            ));
        }
        Ok(Err(err)) if err.is_transient() => return Observation::Noise(err.to_string()),
        Ok(Err(err)) => return Observation::Unhealthy(err.to_string()),
        Ok(Ok(report)) => report,
    };

    match report.effective_status(Utc::now(), health_check.interval) {
        HealthStatus::Healthy => Observation::Healthy,
        HealthStatus::Unhealthy if report.status != HealthStatus::Unhealthy => {
            Observation::Unhealthy(format!(
                "health report is stale (observed at {})",
                report.observed_at
            ))
        }
        HealthStatus::Unhealthy => {
            Observation::Unhealthy(format!("{pool} pool reported unhealthy"))
        }
        HealthStatus::Degraded => Observation::Noise(format!("{pool} pool is degraded")),
        HealthStatus::Empty => Observation::Noise(format!("{pool} pool has no replicas")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GateStep {
    Pending,
    Satisfied,
    Abort(String),
}

/// Consecutive-observation counter.
#[derive(Debug)]
pub(crate) struct HealthTracker {
    healthy_threshold: u32,
    unhealthy_threshold: u32,
    consecutive_healthy: u32,
    consecutive_failures: u32,
    probes: u32,
}

impl HealthTracker {
    pub(crate) fn new(health_check: &HealthCheckConfig) -> Self {
        Self {
            healthy_threshold: health_check.healthy_threshold.max(1),
            unhealthy_threshold: health_check.unhealthy_threshold.max(1),
            consecutive_healthy: 0,
            consecutive_failures: 0,
            probes: 0,
        }
    }

    pub(crate) fn probes(&self) -> u32 {
        self.probes
    }

    pub(crate) fn record(&mut self, observation: Observation) -> GateStep {
        self.probes += 1;
        match observation {
            Observation::Healthy => {
                self.consecutive_failures = 0;
                self.consecutive_healthy += 1;
                if self.consecutive_healthy >= self.healthy_threshold {
                    GateStep::Satisfied
                } else {
                    GateStep::Pending
                }
            }
            Observation::Unhealthy(reason) => GateStep::Abort(reason),
            Observation::Noise(reason) => {
                self.consecutive_healthy = 0;
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.unhealthy_threshold {
                    GateStep::Abort(format!(
                        "{} consecutive failed health checks, last: {reason}",
                        self.consecutive_failures
                    ))
                } else {
                    GateStep::Pending
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GateFailure {
    Unhealthy(String),
    Timeout,
    Cancelled,
}

/// Probe every interval until the pool is healthy enough, fails, or the
/// overall timeout passes. Returns the number of probes taken.
pub(crate) async fn await_healthy(
    scheduler: &dyn ReplicaScheduler,
    pool: PoolColor,
    health_check: &HealthCheckConfig,
    timeout: Duration,
    cancel: &CancelSignal,
) -> Result<u32, GateFailure> {
    let deadline = Instant::now() + timeout;
    let mut tracker = HealthTracker::new(health_check);

    loop {
        let observation = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GateFailure::Cancelled),
            observation = observe(scheduler, pool, health_check) => observation,
        };
        debug!(pool = %pool, probe = tracker.probes() + 1, ?observation, "health observation");

        match tracker.record(observation) {
            GateStep::Satisfied => return Ok(tracker.probes()),
            GateStep::Abort(reason) => return Err(GateFailure::Unhealthy(reason)),
            GateStep::Pending => {}
        }

        let next = Instant::now() + health_check.interval;
        let timed_out = next >= deadline;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GateFailure::Cancelled),
            _ = tokio::time::sleep_until(next.min(deadline)) => {}
        }
        if timed_out {
            return Err(GateFailure::Timeout);
        }
    }
}
