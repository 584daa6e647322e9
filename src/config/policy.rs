// ABOUTME: Promotion policy and deployment timing settings.
// ABOUTME: Only all-at-once promotion is executable; shifted policies are parsed but rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How production traffic moves to the new pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromotionPolicy {
    /// Switch every request at once.
    #[default]
    AllAtOnce,

    /// Shift `percent` of traffic every `interval`.
    Linear {
        percent: u8,
        #[serde(with = "humantime_serde")]
        interval: Duration,
    },

    /// Shift `percent` of traffic, wait `interval`, then shift the rest.
    Canary {
        percent: u8,
        #[serde(with = "humantime_serde")]
        interval: Duration,
    },
}

impl PromotionPolicy {
    pub fn is_supported(&self) -> bool {
        matches!(self, PromotionPolicy::AllAtOnce)
    }
}

impl fmt::Display for PromotionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromotionPolicy::AllAtOnce => f.write_str("all_at_once"),
            PromotionPolicy::Linear { percent, interval } => {
                write!(f, "linear {percent}% every {}s", interval.as_secs())
            }
            PromotionPolicy::Canary { percent, interval } => {
                write!(f, "canary {percent}% for {}s", interval.as_secs())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub policy: PromotionPolicy,

    #[serde(default, with = "humantime_serde")]
    pub bake_time: Duration,

    /// When set, bake time elapsing without an explicit approval rolls back.
    #[serde(default)]
    pub require_approval: bool,

    #[serde(default = "default_deregistration_delay", with = "humantime_serde")]
    pub deregistration_delay: Duration,

    #[serde(default = "default_provisioning_timeout", with = "humantime_serde")]
    pub provisioning_timeout: Duration,

    #[serde(default = "default_health_timeout", with = "humantime_serde")]
    pub health_timeout: Duration,
}

fn default_deregistration_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_provisioning_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(600)
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            policy: PromotionPolicy::default(),
            bake_time: Duration::ZERO,
            require_approval: false,
            deregistration_delay: default_deregistration_delay(),
            provisioning_timeout: default_provisioning_timeout(),
            health_timeout: default_health_timeout(),
        }
    }
}
