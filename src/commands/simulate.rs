// ABOUTME: Simulate command implementation.
// ABOUTME: Runs a full deployment against an in-memory router and a scripted scheduler.

use std::sync::Arc;
use std::time::Duration;

use crate::cli::SimulateArgs;
use verdigris::artifact::{ArtifactSource, StaticArtifactSource};
use verdigris::config::{Config, TaskSpec};
use verdigris::deploy::{FileLockStore, Orchestrator, Outcome};
use verdigris::error::{Error, Result};
use verdigris::group::DeploymentGroup;
use verdigris::output::Output;
use verdigris::router::InMemoryRouter;
use verdigris::scheduler::{ProbeStep, SchedulerError, SimulatedScheduler};
use verdigris::store::JsonLinesStore;
use verdigris::types::{ImageRef, PoolColor};

/// Deploy `args.tag` against simulated infrastructure and report the outcome.
pub async fn simulate(mut config: Config, args: SimulateArgs, mut output: Output) -> Result<()> {
    if args.speedup == 0 {
        return Err(Error::InvalidArgument("--speedup must be at least 1".into()));
    }
    let active = parse_pool(&args.active)?;
    let probes = args
        .probes
        .iter()
        .map(|step| parse_probe_step(step))
        .collect::<Result<Vec<_>>>()?;
    let fallback = parse_probe_step(&args.probe_fallback)?;
    accelerate(&mut config, args.speedup);
    output.start_timer();

    let target = active.other();
    let router = Arc::new(InMemoryRouter::from_config(&config, active));
    let scheduler = Arc::new(SimulatedScheduler::new(&config.health_check));

    let current = ImageRef::from_parts(config.registry.as_deref(), &config.repository, "current")
        .map_err(|e| Error::InvalidConfig(e.to_string()))?;
    scheduler.seed_running(
        active,
        TaskSpec::new(current, config.task.clone()),
        config.replicas,
    );
    scheduler.script_probes(target, probes);
    scheduler.set_probe_fallback(target, fallback);
    scheduler.inject_launch_outages(args.outages);
    if args.stall {
        scheduler.stall_launches(target);
    }
    if args.no_capacity {
        scheduler.set_capacity_associated(target, false);
    }
    if args.fail_drain {
        scheduler.fail_drains(
            active,
            SchedulerError::Unavailable("deregistration API unreachable".into()),
        );
    }

    let artifacts = StaticArtifactSource::new(config.registry.as_deref());
    artifacts.publish(&config.repository, &args.tag, &simulated_digest());
    let image = artifacts.resolve_image(&config.repository, &args.tag).await?;
    if args.missing_image {
        scheduler.reject_image(&image.to_string());
    }

    let group = DeploymentGroup::from_config(&config, router.clone(), scheduler.clone())?;
    let mut orchestrator = Orchestrator::new(group).force_lock(args.force);
    if let Some(dir) = &args.lock_dir {
        orchestrator = orchestrator.with_lock_store(Arc::new(FileLockStore::new(dir)));
    }
    if let Some(path) = &args.record_file {
        orchestrator = orchestrator.with_store(Arc::new(JsonLinesStore::new(path)));
    }

    output.progress(&format!(
        "Deploying {image} to the {target} pool ({active} serves production)"
    ));
    let spec = orchestrator.group().settings().task_spec(image);
    let id = orchestrator.start_deployment(spec)?;
    if args.approve {
        orchestrator.approve(&id)?;
    } else if let Some(reason) = args.reject {
        orchestrator.reject(&id, reason)?;
    }

    let status = orchestrator.wait(&id).await?;
    for warning in &status.warnings {
        output.warning(warning);
    }
    output.deployment(&status);

    let bindings = router.current_bindings();
    output.progress(&format!(
        "production -> {}, {} replica(s) in blue, {} in green",
        bindings
            .production
            .map(PoolColor::as_str)
            .unwrap_or("nothing"),
        scheduler.replicas(PoolColor::Blue),
        scheduler.replicas(PoolColor::Green),
    ));

    match status.outcome {
        Some(Outcome::Succeeded) => {
            output.success(&format!("Deployment {id} succeeded"));
            Ok(())
        }
        outcome => Err(Error::DeploymentUnsuccessful {
            id: id.to_string(),
            outcome: outcome
                .map(|o| o.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            reason: status.reason.unwrap_or_default(),
        }),
    }
}

fn parse_pool(value: &str) -> Result<PoolColor> {
    match value {
        "blue" => Ok(PoolColor::Blue),
        "green" => Ok(PoolColor::Green),
        other => Err(Error::InvalidArgument(format!(
            "unknown pool `{other}`, expected blue or green"
        ))),
    }
}

fn parse_probe_step(value: &str) -> Result<ProbeStep> {
    match value.trim() {
        "pass" => Ok(ProbeStep::Pass),
        "fail" => Ok(ProbeStep::Fail),
        "partial" => Ok(ProbeStep::Partial),
        "stale" => Ok(ProbeStep::Stale),
        "outage" => Ok(ProbeStep::Outage),
        "hang" => Ok(ProbeStep::Hang),
        other => Err(Error::InvalidArgument(format!("unknown probe outcome `{other}`"))),
    }
}

/// Divide every wait in the configuration so a simulation finishes quickly.
fn accelerate(config: &mut Config, factor: u32) {
    let scale = |d: Duration| d / factor;

    let hc = &mut config.health_check;
    hc.interval = scale(hc.interval).max(Duration::from_millis(1));
    hc.timeout = scale(hc.timeout).max(Duration::from_millis(1));

    let deployment = &mut config.deployment;
    deployment.bake_time = scale(deployment.bake_time);
    deployment.deregistration_delay = scale(deployment.deregistration_delay);
    deployment.provisioning_timeout = scale(deployment.provisioning_timeout);
    deployment.health_timeout = scale(deployment.health_timeout);

    config.retry.initial_backoff = scale(config.retry.initial_backoff);
    config.retry.max_backoff = scale(config.retry.max_backoff);
}

fn simulated_digest() -> String {
    format!(
        "sha256:{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acceleration_scales_every_wait() {
        let mut config = Config::template();
        accelerate(&mut config, 1000);
        assert_eq!(config.health_check.interval, Duration::from_millis(35));
        assert_eq!(config.health_check.timeout, Duration::from_millis(20));
        assert_eq!(
            config.deployment.deregistration_delay,
            Duration::from_millis(30)
        );
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(1));
    }

    #[test]
    fn probe_steps_parse() {
        assert_eq!(parse_probe_step("pass").unwrap(), ProbeStep::Pass);
        assert_eq!(parse_probe_step(" stale").unwrap(), ProbeStep::Stale);
        assert!(parse_probe_step("flaky").is_err());
        assert!(parse_pool("purple").is_err());
    }
}
