// ABOUTME: Deployment groups bind one router and one scheduler to a set of rollout settings.
// ABOUTME: Construction validates that both collaborators agree on the blue/green pair.

use nonempty::NonEmpty;
use snafu::{Snafu, ensure};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{
    CapacityProvider, Config, DeploymentConfig, HealthCheckConfig, PromotionPolicy, RetryConfig,
    TaskConfig, TaskSpec, has_weighted_provider,
};
use crate::router::TrafficRouter;
use crate::scheduler::ReplicaScheduler;
use crate::types::{GroupName, ImageRef, PoolColor};

/// Group construction failures.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GroupError {
    #[snafu(display("router for group {group} must expose exactly two pools, found {found}"))]
    PoolCount { group: String, found: usize },

    #[snafu(display("router for group {group} exposes the {color} pool twice"))]
    DuplicatePool { group: String, color: PoolColor },

    #[snafu(display("blue and green pools share routing address {address}"))]
    SharedAddress { address: String },

    #[snafu(display("scheduler does not manage the {color} pool"))]
    DanglingPool { color: PoolColor },

    #[snafu(display("promotion policy {policy} is not supported; only all_at_once is"))]
    UnsupportedPolicy { policy: PromotionPolicy },

    #[snafu(display("invalid group setting: {message}"))]
    InvalidSetting { message: String },
}

/// Settings every deployment of a group runs with.
#[derive(Debug, Clone)]
pub struct GroupSettings {
    pub replicas: u32,
    pub repository: String,
    pub registry: Option<String>,
    pub task: TaskConfig,
    pub health_check: HealthCheckConfig,
    pub deployment: DeploymentConfig,
    pub retry: RetryConfig,
    pub capacity_providers: NonEmpty<CapacityProvider>,
}

impl GroupSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            replicas: config.replicas,
            repository: config.repository.clone(),
            registry: config.registry.clone(),
            task: config.task.clone(),
            health_check: config.health_check.clone(),
            deployment: config.deployment.clone(),
            retry: config.retry.clone(),
            capacity_providers: config.capacity_providers.clone(),
        }
    }

    /// Task spec for an image using this group's task sizing.
    pub fn task_spec(&self, image: ImageRef) -> TaskSpec {
        TaskSpec::new(image, self.task.clone())
    }

    /// Upper bound on how long one deployment can run when every wait runs
    /// to its limit and every collaborator call exhausts its retries.
    pub fn longest_deployment(&self) -> Duration {
        let deployment = &self.deployment;
        deployment.provisioning_timeout
            + deployment.health_timeout
            + deployment.bake_time
            + deployment.deregistration_delay
            + self.retry.total_backoff() * RETRIED_CALLS
    }
}

/// Retried collaborator calls outside the bounded waits of one deployment.
const RETRIED_CALLS: u32 = 12;

/// Read-only configuration and collaborators for one blue/green service.
pub struct DeploymentGroup {
    name: GroupName,
    router: Arc<dyn TrafficRouter>,
    scheduler: Arc<dyn ReplicaScheduler>,
    settings: GroupSettings,
}

impl fmt::Debug for DeploymentGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentGroup")
            .field("name", &self.name)
            .field("policy", &self.settings.deployment.policy)
            .finish()
    }
}

impl DeploymentGroup {
    pub fn new(
        name: GroupName,
        router: Arc<dyn TrafficRouter>,
        scheduler: Arc<dyn ReplicaScheduler>,
        settings: GroupSettings,
    ) -> Result<Self, GroupError> {
        validate_pools(&name, router.as_ref(), scheduler.as_ref())?;
        validate_settings(&settings)?;

        Ok(Self {
            name,
            router,
            scheduler,
            settings,
        })
    }

    pub fn from_config(
        config: &Config,
        router: Arc<dyn TrafficRouter>,
        scheduler: Arc<dyn ReplicaScheduler>,
    ) -> Result<Self, GroupError> {
        Self::new(
            config.group.clone(),
            router,
            scheduler,
            GroupSettings::from_config(config),
        )
    }

    pub fn name(&self) -> &GroupName {
        &self.name
    }

    pub fn router(&self) -> &dyn TrafficRouter {
        self.router.as_ref()
    }

    pub fn scheduler(&self) -> &dyn ReplicaScheduler {
        self.scheduler.as_ref()
    }

    pub fn settings(&self) -> &GroupSettings {
        &self.settings
    }

    pub fn policy(&self) -> PromotionPolicy {
        self.settings.deployment.policy
    }
}

fn validate_pools(
    name: &GroupName,
    router: &dyn TrafficRouter,
    scheduler: &dyn ReplicaScheduler,
) -> Result<(), GroupError> {
    let pools = router.pools();
    ensure!(
        pools.len() == 2,
        PoolCountSnafu {
            group: name.to_string(),
            found: pools.len(),
        }
    );

    let mut seen = HashSet::new();
    for pool in &pools {
        ensure!(
            seen.insert(pool.color),
            DuplicatePoolSnafu {
                group: name.to_string(),
                color: pool.color,
            }
        );
    }
    ensure!(
        pools[0].address != pools[1].address,
        SharedAddressSnafu {
            address: pools[0].address.clone(),
        }
    );

    let managed = scheduler.pools();
    for pool in &pools {
        ensure!(
            managed.contains(&pool.color),
            DanglingPoolSnafu { color: pool.color }
        );
    }
    Ok(())
}

fn validate_settings(settings: &GroupSettings) -> Result<(), GroupError> {
    let policy = settings.deployment.policy;
    ensure!(policy.is_supported(), UnsupportedPolicySnafu { policy });

    let invalid = |message: &str| InvalidSettingSnafu {
        message: message.to_string(),
    };
    ensure!(settings.replicas > 0, invalid("replicas must be at least 1"));
    ensure!(
        settings.health_check.healthy_threshold > 0 && settings.health_check.unhealthy_threshold > 0,
        invalid("health check thresholds must be at least 1")
    );
    ensure!(
        !settings.health_check.interval.is_zero(),
        invalid("health check interval must be greater than zero")
    );
    ensure!(
        settings.retry.max_attempts > 0,
        invalid("retry attempts must be at least 1")
    );
    ensure!(
        !settings.deployment.require_approval || !settings.deployment.bake_time.is_zero(),
        invalid("require_approval needs a non-zero bake_time to wait in")
    );
    ensure!(
        has_weighted_provider(&settings.capacity_providers),
        invalid("at least one capacity provider needs a non-zero weight or base")
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{InMemoryRouter, Listener, PoolDescriptor};
    use crate::scheduler::SimulatedScheduler;
    use std::time::Duration;

    fn parts(config: &Config) -> (Arc<dyn TrafficRouter>, Arc<dyn ReplicaScheduler>) {
        (
            Arc::new(InMemoryRouter::from_config(config, PoolColor::Blue)),
            Arc::new(SimulatedScheduler::new(&config.health_check)),
        )
    }

    #[test]
    fn template_config_builds_a_group() {
        let config = Config::template();
        let (router, scheduler) = parts(&config);
        let group = DeploymentGroup::from_config(&config, router, scheduler).unwrap();
        assert_eq!(group.name().as_str(), "my-service");
        assert_eq!(group.policy(), PromotionPolicy::AllAtOnce);
    }

    #[test]
    fn shifted_policies_are_rejected() {
        let mut config = Config::template();
        config.deployment.policy = PromotionPolicy::Canary {
            percent: 10,
            interval: Duration::from_secs(300),
        };
        let (router, scheduler) = parts(&config);
        let err = DeploymentGroup::from_config(&config, router, scheduler).unwrap_err();
        assert!(matches!(err, GroupError::UnsupportedPolicy { .. }));
    }

    #[test]
    fn single_pool_router_is_rejected() {
        let config = Config::template();
        let router: Arc<dyn TrafficRouter> = Arc::new(InMemoryRouter::new(
            vec![PoolDescriptor {
                color: PoolColor::Blue,
                address: "blue".into(),
            }],
            Listener::production(80),
            None,
            PoolColor::Blue,
        ));
        let scheduler: Arc<dyn ReplicaScheduler> =
            Arc::new(SimulatedScheduler::new(&config.health_check));
        let err = DeploymentGroup::from_config(&config, router, scheduler).unwrap_err();
        assert!(matches!(err, GroupError::PoolCount { found: 1, .. }));
    }

    #[test]
    fn shared_addresses_are_rejected() {
        let mut config = Config::template();
        config.pools.blue = Some("10.0.0.5:80".into());
        config.pools.green = Some("10.0.0.5:80".into());
        let (router, scheduler) = parts(&config);
        let err = DeploymentGroup::from_config(&config, router, scheduler).unwrap_err();
        assert!(matches!(err, GroupError::SharedAddress { .. }));
    }

    #[test]
    fn approval_without_bake_time_is_rejected() {
        let mut config = Config::template();
        config.deployment.require_approval = true;
        let (router, scheduler) = parts(&config);
        let err = DeploymentGroup::from_config(&config, router, scheduler).unwrap_err();
        assert!(err.to_string().contains("bake_time"));
    }

    #[test]
    fn longest_deployment_grows_with_bake_time() {
        let mut config = Config::template();
        let settings = GroupSettings::from_config(&config);
        // 600s provisioning, 600s health, 30s deregistration, 12 x 15s backoff
        assert_eq!(settings.longest_deployment(), Duration::from_secs(1410));

        config.deployment.bake_time = Duration::from_secs(2 * 3600);
        let settings = GroupSettings::from_config(&config);
        assert_eq!(
            settings.longest_deployment(),
            Duration::from_secs(1410 + 2 * 3600)
        );
    }
}
