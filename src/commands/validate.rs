// ABOUTME: Validate command implementation.
// ABOUTME: Builds the deployment group from configuration to surface every construction error.

use std::sync::Arc;
use verdigris::config::Config;
use verdigris::error::Result;
use verdigris::group::DeploymentGroup;
use verdigris::output::Output;
use verdigris::router::InMemoryRouter;
use verdigris::scheduler::SimulatedScheduler;
use verdigris::types::PoolColor;

/// Check that the configuration describes a deployable group.
pub fn validate(config: &Config, output: &Output) -> Result<()> {
    let router = Arc::new(InMemoryRouter::from_config(config, PoolColor::Blue));
    let scheduler = Arc::new(SimulatedScheduler::new(&config.health_check));
    let group = DeploymentGroup::from_config(config, router, scheduler)?;

    output.progress(&format!(
        "Group {}: {} replica(s) of {}, policy {}",
        group.name(),
        config.replicas,
        config.repository,
        group.policy()
    ));
    for color in PoolColor::ALL {
        output.progress(&format!("  {color} pool -> {}", config.pool_address(color)));
    }
    output.progress(&format!(
        "  production listener on port {}",
        config.listeners.production.port
    ));
    if let Some(test) = &config.listeners.test {
        output.progress(&format!("  test listener on port {}", test.port));
    }

    output.success("Configuration is valid");
    Ok(())
}
