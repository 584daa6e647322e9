// ABOUTME: Tests for the typed deployment transitions driven step by step.
// ABOUTME: Verifies each state carries its routing plan and promotion safety checks.

mod support;

use std::sync::Arc;
use std::time::Duration;

use support::{Harness, config, spec};
use verdigris::deploy::{DeployErrorKind, Deployment, DeploymentPhase, Outcome};
use verdigris::scheduler::ReplicaScheduler;
use verdigris::types::{DeploymentId, PoolColor};

fn pending(h: &Harness) -> Deployment<verdigris::deploy::Pending> {
    let (deployment, _control) = Deployment::new(
        DeploymentId::generate(),
        Arc::new(h.group()),
        spec("v2"),
    );
    deployment
}

#[tokio::test(start_paused = true)]
async fn states_carry_the_routing_plan() {
    let h = Harness::new(config());
    let planned = pending(&h).plan_routing().await.unwrap();

    let plan = planned.routing_plan();
    assert_eq!(plan.target, PoolColor::Green);
    assert_eq!(plan.previous, PoolColor::Blue);
    assert_eq!(plan.test_before, Some(PoolColor::Green));

    let provisioned = planned.provision().await.unwrap();
    assert_eq!(provisioned.phase(), DeploymentPhase::Provisioning);
    assert_eq!(h.scheduler.replicas(PoolColor::Green), 2);

    let checked = provisioned.health_check().await.unwrap();
    assert_eq!(checked.health_probes(), 3);
    assert_eq!(checked.routing_plan(), plan);
}

#[tokio::test(start_paused = true)]
async fn promotion_refuses_a_pool_without_replicas() {
    let h = Harness::new(config());
    let verified = pending(&h)
        .plan_routing()
        .await
        .unwrap()
        .provision()
        .await
        .unwrap()
        .health_check()
        .await
        .unwrap()
        .verify()
        .await
        .unwrap();

    // Replicas disappear between verification and promotion
    h.scheduler
        .drain(PoolColor::Green, Duration::ZERO)
        .await
        .unwrap();

    let (verified, err) = verified.promote().await.unwrap_err();
    assert_eq!(err.kind(), DeployErrorKind::Promotion);
    assert_eq!(h.router.current_bindings().production, Some(PoolColor::Blue));

    let completed = verified.fail(err).await;
    assert_eq!(completed.outcome(), Outcome::Failed);
    assert!(completed.reason().contains("no running replicas"));

    let record = completed.finish();
    assert_eq!(record.phase, DeploymentPhase::Completed);
    assert_eq!(record.outcome, Some(Outcome::Failed));
}

#[tokio::test(start_paused = true)]
async fn promotion_recovers_when_router_already_switched() {
    let h = Harness::new(config());
    let verified = pending(&h)
        .plan_routing()
        .await
        .unwrap()
        .provision()
        .await
        .unwrap()
        .health_check()
        .await
        .unwrap()
        .verify()
        .await
        .unwrap();

    // Production moved outside the orchestrator, then the router went away
    // for longer than the retry budget.
    h.router.force_bindings(verdigris::router::ListenerBindings {
        production: Some(PoolColor::Green),
        test: Some(PoolColor::Blue),
    });
    h.router.inject_outage(5);

    // Already-active promotion short-circuits only once the outage clears, so
    // every attempt fails and the post-failure check finds green active.
    let promoted = verified.promote().await.unwrap();
    assert_eq!(promoted.diagnostics().warnings().len(), 1);

    let completed = promoted.drain().await;
    assert_eq!(completed.outcome(), Outcome::Succeeded);
    assert_eq!(h.scheduler.replicas(PoolColor::Blue), 0);
}

#[tokio::test(start_paused = true)]
async fn failure_leaves_the_target_running_when_it_serves_production() {
    let h = Harness::new(config());
    let verified = pending(&h)
        .plan_routing()
        .await
        .unwrap()
        .provision()
        .await
        .unwrap()
        .health_check()
        .await
        .unwrap()
        .verify()
        .await
        .unwrap();

    h.router.force_bindings(verdigris::router::ListenerBindings {
        production: Some(PoolColor::Green),
        test: Some(PoolColor::Blue),
    });
    let cause = verdigris::deploy::DeployError::Promotion {
        pool: PoolColor::Green,
        reason: "router timed out".to_string(),
    };

    let completed = verified.fail(cause).await;
    assert_eq!(completed.outcome(), Outcome::Failed);
    let warnings = completed.diagnostics().warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("production routes to the green pool"));
    assert_eq!(h.scheduler.replicas(PoolColor::Green), 2);
    assert_eq!(h.router.current_bindings().test, Some(PoolColor::Blue));
}
