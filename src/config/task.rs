// ABOUTME: Task definition sizing shared by every replica of a deployment.
// ABOUTME: Combined with a resolved image to form the TaskSpec handed to the scheduler.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::types::ImageRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default = "default_cpu")]
    pub cpu: u32,

    #[serde(default = "default_memory_mib")]
    pub memory_mib: u32,

    #[serde(default = "default_container_port")]
    pub container_port: u16,

    #[serde(default = "default_container_timeout", with = "humantime_serde")]
    pub start_timeout: Duration,

    #[serde(default = "default_container_timeout", with = "humantime_serde")]
    pub stop_timeout: Duration,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_cpu() -> u32 {
    2048
}

fn default_memory_mib() -> u32 {
    4096
}

fn default_container_port() -> u16 {
    3000
}

fn default_container_timeout() -> Duration {
    Duration::from_secs(120)
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            cpu: default_cpu(),
            memory_mib: default_memory_mib(),
            container_port: default_container_port(),
            start_timeout: default_container_timeout(),
            stop_timeout: default_container_timeout(),
            env: BTreeMap::new(),
        }
    }
}

/// Everything the scheduler needs to launch one replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub image: ImageRef,
    #[serde(flatten)]
    pub task: TaskConfig,
}

impl TaskSpec {
    pub fn new(image: ImageRef, task: TaskConfig) -> Self {
        Self { image, task }
    }

    /// Spec with default sizing, mostly useful in tests and simulations.
    pub fn for_image(image: ImageRef) -> Self {
        Self::new(image, TaskConfig::default())
    }
}
