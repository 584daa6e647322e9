// ABOUTME: Target pools: health-checked replica sets behind one routing destination.
// ABOUTME: Pool health only ever changes by recording probe rounds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::HealthCheckConfig;
use crate::types::PoolColor;

/// Aggregate health of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Every replica passed the last probe round.
    Healthy,
    /// Some replicas passed, or the pool has not been probed since it was scaled.
    Degraded,
    /// No replica passed the last probe round.
    Unhealthy,
    /// The pool has no replicas.
    Empty,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Empty => "empty",
        };
        f.write_str(s)
    }
}

/// Result of probing every replica of a pool once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeRound {
    pub passing: u32,
    pub failing: u32,
}

impl ProbeRound {
    pub fn all_passing(replicas: u32) -> Self {
        Self {
            passing: replicas,
            failing: 0,
        }
    }

    pub fn all_failing(replicas: u32) -> Self {
        Self {
            passing: 0,
            failing: replicas,
        }
    }
}

/// Health as reported by a scheduler, stamped with when it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub observed_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn new(status: HealthStatus, observed_at: DateTime<Utc>) -> Self {
        Self {
            status,
            observed_at,
        }
    }

    /// Status to act on at `now`. Reports older than `max_age` count as unhealthy:
    /// missing data never vouches for a pool.
    pub fn effective_status(&self, now: DateTime<Utc>, max_age: Duration) -> HealthStatus {
        let age = now.signed_duration_since(self.observed_at);
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) if age <= max_age => self.status,
            _ => HealthStatus::Unhealthy,
        }
    }
}

/// One of the two pools of a router.
#[derive(Debug, Clone)]
pub struct TargetPool {
    color: PoolColor,
    address: String,
    health_check: HealthCheckConfig,
    replicas: u32,
    health: HealthReport,
}

impl TargetPool {
    pub fn new(color: PoolColor, address: impl Into<String>, health_check: HealthCheckConfig) -> Self {
        Self {
            color,
            address: address.into(),
            health_check,
            replicas: 0,
            health: HealthReport::new(HealthStatus::Empty, Utc::now()),
        }
    }

    pub fn color(&self) -> PoolColor {
        self.color
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn health_check(&self) -> &HealthCheckConfig {
        &self.health_check
    }

    pub fn replicas(&self) -> u32 {
        self.replicas
    }

    pub fn health(&self) -> HealthReport {
        self.health
    }

    /// Change the replica count. Earlier probe results describe replicas that
    /// may no longer exist, so health restarts from "not yet probed".
    pub fn set_replicas(&mut self, count: u32) {
        self.replicas = count;
        let status = if count == 0 {
            HealthStatus::Empty
        } else {
            HealthStatus::Degraded
        };
        self.health = HealthReport::new(status, Utc::now());
    }

    /// Record a probe round taken at `at` and return the resulting report.
    pub fn record_probe(&mut self, round: ProbeRound, at: DateTime<Utc>) -> HealthReport {
        let status = if self.replicas == 0 {
            HealthStatus::Empty
        } else if round.passing >= self.replicas && round.failing == 0 {
            HealthStatus::Healthy
        } else if round.passing == 0 {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        };
        self.health = HealthReport::new(status, at);
        self.health
    }
}
