// ABOUTME: Target pool health check parameters.
// ABOUTME: Defaults mirror a load balancer probing `/` every 35s with a 20s timeout.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Per-probe timeout. A probe that does not answer in time counts as a failure.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Consecutive healthy observations required before promotion.
    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: u32,

    /// Consecutive failed observations tolerated before aborting.
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

fn default_path() -> String {
    "/".to_string()
}

fn default_interval() -> Duration {
    Duration::from_secs(35)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_healthy_threshold() -> u32 {
    3
}

fn default_unhealthy_threshold() -> u32 {
    2
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            interval: default_interval(),
            timeout: default_timeout(),
            healthy_threshold: default_healthy_threshold(),
            unhealthy_threshold: default_unhealthy_threshold(),
        }
    }
}
