// ABOUTME: Configuration types and parsing for verdigris.yml.
// ABOUTME: Handles YAML parsing, file discovery, validation, and the init template.

mod capacity;
mod deserialize;
mod healthcheck;
mod listener;
mod policy;
mod retry;
mod task;

pub use capacity::{CapacityProvider, default_capacity_providers, has_weighted_provider};
pub use healthcheck::HealthCheckConfig;
pub use listener::{ListenerConfig, ListenersConfig};
pub use policy::{DeploymentConfig, PromotionPolicy};
pub use retry::RetryConfig;
pub use task::{TaskConfig, TaskSpec};

use crate::error::{Error, Result};
use crate::types::{GroupName, PoolColor};
use deserialize::deserialize_capacity_providers;
use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILENAME: &str = "verdigris.yml";
pub const CONFIG_FILENAME_ALT: &str = "verdigris.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".verdigris/config.yml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub group: GroupName,

    /// Artifact repository new images are resolved from.
    pub repository: String,

    #[serde(default)]
    pub registry: Option<String>,

    #[serde(default = "default_replicas")]
    pub replicas: u32,

    #[serde(default)]
    pub task: TaskConfig,

    #[serde(default)]
    pub pools: PoolsConfig,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    #[serde(default)]
    pub listeners: ListenersConfig,

    #[serde(default)]
    pub deployment: DeploymentConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(
        default = "default_capacity_providers",
        deserialize_with = "deserialize_capacity_providers"
    )]
    pub capacity_providers: NonEmpty<CapacityProvider>,
}

/// Routing addresses of the two pools. Unset addresses derive from the group name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolsConfig {
    #[serde(default)]
    pub blue: Option<String>,
    #[serde(default)]
    pub green: Option<String>,
}

fn default_replicas() -> u32 {
    2
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading configuration");
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Checks that cannot be expressed through serde defaults alone.
    pub fn validate(&self) -> Result<()> {
        if self.repository.trim().is_empty() {
            return Err(Error::InvalidConfig("repository cannot be empty".into()));
        }
        if self.replicas == 0 {
            return Err(Error::InvalidConfig("replicas must be at least 1".into()));
        }
        let hc = &self.health_check;
        if hc.interval.is_zero() {
            return Err(Error::InvalidConfig(
                "health_check.interval must be greater than zero".into(),
            ));
        }
        if hc.healthy_threshold == 0 || hc.unhealthy_threshold == 0 {
            return Err(Error::InvalidConfig(
                "health_check thresholds must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if let Some(test) = &self.listeners.test
            && test.port == self.listeners.production.port
        {
            return Err(Error::InvalidConfig(format!(
                "test listener cannot share production port {}",
                test.port
            )));
        }
        if self.deployment.require_approval && self.deployment.bake_time.is_zero() {
            return Err(Error::InvalidConfig(
                "deployment.require_approval needs a non-zero bake_time".into(),
            ));
        }
        if !has_weighted_provider(&self.capacity_providers) {
            return Err(Error::InvalidConfig(
                "at least one capacity provider needs a non-zero weight or base".into(),
            ));
        }
        Ok(())
    }

    /// Routing address of a pool.
    pub fn pool_address(&self, color: PoolColor) -> String {
        let configured = match color {
            PoolColor::Blue => self.pools.blue.as_ref(),
            PoolColor::Green => self.pools.green.as_ref(),
        };
        configured
            .cloned()
            .unwrap_or_else(|| format!("{}-{}", self.group, color))
    }

    pub fn template() -> Self {
        Config {
            group: GroupName::new("my-service").expect("template group name is valid"),
            repository: "my-service".to_string(),
            registry: None,
            replicas: default_replicas(),
            task: TaskConfig::default(),
            pools: PoolsConfig::default(),
            health_check: HealthCheckConfig::default(),
            listeners: ListenersConfig::default(),
            deployment: DeploymentConfig::default(),
            retry: RetryConfig::default(),
            capacity_providers: default_capacity_providers(),
        }
    }
}

pub fn init_config(
    dir: &Path,
    group: Option<&str>,
    repository: Option<&str>,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = Config::template();

    if let Some(g) = group {
        config.group = GroupName::new(g).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }
    if let Some(r) = repository {
        config.repository = r.to_string();
    }

    std::fs::write(&config_path, generate_template_yaml(&config))?;

    Ok(())
}

fn generate_template_yaml(config: &Config) -> String {
    format!(
        r#"group: {}
repository: {}
replicas: {}
health_check:
  path: "{}"
  interval: 35s
  timeout: 20s
  healthy_threshold: {}
listeners:
  production:
    port: {}
  test:
    port: 8080
deployment:
  policy:
    type: all_at_once
  deregistration_delay: 30s
"#,
        config.group,
        config.repository,
        config.replicas,
        config.health_check.path,
        config.health_check.healthy_threshold,
        config.listeners.production.port,
    )
}
