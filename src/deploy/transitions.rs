// ABOUTME: State transition methods for deployment orchestration.
// ABOUTME: Each method consumes self and returns the next state on success.

use chrono::Utc;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::diagnostics::Warning;
use crate::router::PromoteOutcome;
use crate::scheduler::SchedulerError;
use crate::types::PoolColor;

use super::Deployment;
use super::error::DeployError;
use super::health::{GateFailure, GateStep, HealthTracker, await_healthy, observe};
use super::retry::{RetryError, with_backoff};
use super::signal::Verdict;
use super::state::{
    BeforePromotion, Completed, HealthChecked, Pending, Planned, Promoted, Provisioned, RoutingPlan,
    Verified,
};
use super::status::{DeploymentPhase, DeploymentRecord, Outcome};

/// Result type for transitions that may need rollback on failure.
pub type TransitionResult<T, S> = Result<Deployment<T>, (Deployment<S>, DeployError)>;

/// How often provisioning checks whether the requested replicas are running.
const PROVISION_POLL_INTERVAL: Duration = Duration::from_secs(5);

// =============================================================================
// Internal Helpers
// =============================================================================

impl<S> Deployment<S> {
    /// Internal helper to transition to a new state.
    fn transition<T>(self, state: T) -> Deployment<T> {
        Deployment {
            id: self.id,
            group: self.group,
            spec: self.spec,
            status: self.status,
            cancel: self.cancel,
            verdict: self.verdict,
            diag: self.diag,
            state,
        }
    }

    fn enter(&self, phase: DeploymentPhase) {
        self.status.set_phase(phase);
        info!(deployment = %self.id, group = %self.group.name(), phase = %phase, "entering phase");
    }

    fn conclude(self, outcome: Outcome, reason: String) -> Deployment<Completed> {
        info!(
            deployment = %self.id,
            group = %self.group.name(),
            outcome = %outcome,
            reason = %reason,
            "deployment concluded"
        );
        self.transition(Completed { outcome, reason })
    }
}

fn describe<E: Display>(err: RetryError<E>) -> String {
    match err {
        RetryError::Fatal(err) => err.to_string(),
        RetryError::Exhausted { attempts, last } => format!("{last} (after {attempts} attempts)"),
        RetryError::Cancelled => "cancelled".to_string(),
    }
}

fn scheduler_failure(
    pool: PoolColor,
    operation: &str,
    err: RetryError<SchedulerError>,
    phase: DeploymentPhase,
) -> DeployError {
    match err {
        RetryError::Fatal(source) => DeployError::Provisioning { pool, source },
        RetryError::Exhausted { attempts, last } => DeployError::TransientScheduler {
            operation: operation.to_string(),
            attempts,
            source: last,
        },
        RetryError::Cancelled => DeployError::Cancelled { phase },
    }
}

// =============================================================================
// Pre-flight
// =============================================================================

impl Deployment<Pending> {
    /// Read the listener bindings and choose the target pool.
    ///
    /// Refuses to continue when production is unbound or shares a pool with
    /// the test listener: the blue/green invariants are already broken and
    /// nothing has been modified yet.
    pub async fn plan_routing(self) -> TransitionResult<Planned, Pending> {
        let group = Arc::clone(&self.group);
        let router = group.router();
        let retry = &group.settings().retry;
        let cancel = self.cancel.clone();

        let bindings = match with_backoff(retry, Some(&cancel), "read listener bindings", || {
            router.bindings()
        })
        .await
        {
            Ok(bindings) => bindings,
            Err(RetryError::Cancelled) => {
                return Err((
                    self,
                    DeployError::Cancelled {
                        phase: DeploymentPhase::Idle,
                    },
                ));
            }
            Err(RetryError::Fatal(err)) | Err(RetryError::Exhausted { last: err, .. }) => {
                return Err((self, DeployError::Routing(err)));
            }
        };

        let previous = match bindings.production {
            Some(pool) if bindings.is_consistent() => pool,
            Some(pool) => {
                return Err((
                    self,
                    DeployError::RoutingCorruption(format!(
                        "production and test listeners both route to the {pool} pool"
                    )),
                ));
            }
            None => {
                return Err((
                    self,
                    DeployError::RoutingCorruption(
                        "production listener is not bound to any pool".to_string(),
                    ),
                ));
            }
        };

        let target = previous.other();
        if router.pool(target).is_none() {
            return Err((
                self,
                DeployError::RoutingCorruption(format!("router has no {target} pool")),
            ));
        }
        if !group.scheduler().pools().contains(&target) {
            return Err((
                self,
                DeployError::Provisioning {
                    pool: target,
                    source: SchedulerError::UnknownPool(target),
                },
            ));
        }

        let plan = RoutingPlan {
            target,
            previous,
            test_before: bindings.test,
        };
        self.status.update(|status| {
            status.target_pool = Some(target);
            status.previous_pool = Some(previous);
        });
        info!(
            deployment = %self.id,
            target = %target,
            previous = %previous,
            image = %self.spec.image,
            "planned pool switch"
        );
        Ok(self.transition(Planned { plan }))
    }

    /// End the deployment before anything was modified. Cancellation counts
    /// as a rollback, everything else as a failure.
    pub fn abort(self, cause: DeployError) -> Deployment<Completed> {
        if matches!(cause, DeployError::Cancelled { .. }) {
            self.enter(DeploymentPhase::RollingBack);
            return self.conclude(Outcome::RolledBack, cause.to_string());
        }
        self.enter(DeploymentPhase::Failed);
        error!(deployment = %self.id, error = %cause, "deployment failed before provisioning");
        self.conclude(Outcome::Failed, cause.to_string())
    }
}

// =============================================================================
// Provisioning
// =============================================================================

impl Deployment<Planned> {
    /// Associate capacity, request replicas, and wait for them to run.
    pub async fn provision(self) -> TransitionResult<Provisioned, Planned> {
        self.enter(DeploymentPhase::Provisioning);
        let plan = self.state.plan;
        let phase = DeploymentPhase::Provisioning;
        if self.cancel.is_cancelled() {
            return Err((self, DeployError::Cancelled { phase }));
        }

        let group = Arc::clone(&self.group);
        let scheduler = group.scheduler();
        let settings = group.settings();
        let cancel = self.cancel.clone();
        let spec = self.spec.clone();

        if let Err(err) = with_backoff(&settings.retry, Some(&cancel), "ensure capacity", || {
            scheduler.ensure_capacity(plan.target)
        })
        .await
        {
            let err = scheduler_failure(plan.target, "ensure capacity", err, phase);
            return Err((self, err));
        }

        info!(
            deployment = %self.id,
            pool = %plan.target,
            replicas = settings.replicas,
            image = %spec.image,
            "requesting replicas"
        );
        if let Err(err) = with_backoff(&settings.retry, Some(&cancel), "set desired replicas", || {
            scheduler.set_desired_replicas(plan.target, &spec, settings.replicas)
        })
        .await
        {
            let err = scheduler_failure(plan.target, "set desired replicas", err, phase);
            return Err((self, err));
        }

        let timeout = settings.deployment.provisioning_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            let running = match with_backoff(
                &settings.retry,
                Some(&cancel),
                "poll running replicas",
                || scheduler.running_replicas(plan.target),
            )
            .await
            {
                Ok(running) => running,
                Err(err) => {
                    let err = scheduler_failure(plan.target, "poll running replicas", err, phase);
                    return Err((self, err));
                }
            };

            if running >= settings.replicas {
                info!(deployment = %self.id, pool = %plan.target, running, "replicas running");
                break;
            }
            debug!(pool = %plan.target, running, desired = settings.replicas, "waiting for replicas");

            if Instant::now() >= deadline {
                return Err((
                    self,
                    DeployError::ProvisioningTimeout {
                        pool: plan.target,
                        timeout_secs: timeout.as_secs(),
                    },
                ));
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err((self, DeployError::Cancelled { phase })),
                _ = tokio::time::sleep_until((Instant::now() + PROVISION_POLL_INTERVAL).min(deadline)) => {}
            }
        }

        Ok(self.transition(Provisioned { plan }))
    }
}

// =============================================================================
// Health Checking
// =============================================================================

impl Deployment<Provisioned> {
    /// Gate on consecutive healthy observations of the target pool.
    pub async fn health_check(self) -> TransitionResult<HealthChecked, Provisioned> {
        self.enter(DeploymentPhase::HealthChecking);
        let plan = self.state.plan;
        let group = Arc::clone(&self.group);
        let settings = group.settings();
        let timeout = settings.deployment.health_timeout;

        let gate = await_healthy(
            group.scheduler(),
            plan.target,
            &settings.health_check,
            timeout,
            &self.cancel,
        )
        .await;

        match gate {
            Ok(probes) => {
                info!(deployment = %self.id, pool = %plan.target, probes, "target pool healthy");
                Ok(self.transition(HealthChecked { plan, probes }))
            }
            Err(GateFailure::Unhealthy(reason)) => Err((
                self,
                DeployError::HealthCheckFailed {
                    pool: plan.target,
                    reason,
                },
            )),
            Err(GateFailure::Timeout) => Err((
                self,
                DeployError::HealthTimeout {
                    pool: plan.target,
                    timeout_secs: timeout.as_secs(),
                },
            )),
            Err(GateFailure::Cancelled) => Err((
                self,
                DeployError::Cancelled {
                    phase: DeploymentPhase::HealthChecking,
                },
            )),
        }
    }
}

// =============================================================================
// Verification
// =============================================================================

impl Deployment<HealthChecked> {
    /// Number of probes the health gate needed.
    pub fn health_probes(&self) -> u32 {
        self.state.probes
    }

    /// Expose the target pool on the test listener and bake.
    ///
    /// During the bake time an approval promotes early and a rejection rolls
    /// back. With `require_approval`, silence until the bake time runs out is
    /// a rejection; without it, silence is consent. Health keeps being probed
    /// throughout.
    pub async fn verify(self) -> TransitionResult<Verified, HealthChecked> {
        self.enter(DeploymentPhase::Verifying);
        let plan = self.state.plan;
        let phase = DeploymentPhase::Verifying;
        let group = Arc::clone(&self.group);
        let router = group.router();
        let settings = group.settings();
        let cancel = self.cancel.clone();
        let verdicts = self.verdict.clone();

        if router.has_test_listener() {
            if let Err(err) = with_backoff(&settings.retry, Some(&cancel), "bind test traffic", || {
                router.bind_test_traffic(plan.target)
            })
            .await
            {
                let err = match err {
                    RetryError::Cancelled => DeployError::Cancelled { phase },
                    other => DeployError::VerificationFailed(format!(
                        "could not route test traffic to the {} pool: {}",
                        plan.target,
                        describe(other)
                    )),
                };
                return Err((self, err));
            }
            info!(deployment = %self.id, pool = %plan.target, "test traffic routed to target pool");
        }

        let bake_time = settings.deployment.bake_time;
        if bake_time.is_zero() {
            // A rejection sent while earlier phases ran still counts
            if let Some(Verdict::Reject(reason)) = verdicts.pending() {
                return Err((self, DeployError::VerificationFailed(reason)));
            }
            debug!(deployment = %self.id, "no bake time configured, skipping verification");
            return Ok(self.transition(Verified { plan }));
        }

        let health_check = &settings.health_check;
        let deadline = Instant::now() + bake_time;
        let mut tracker = HealthTracker::new(health_check);
        let mut next_probe = Instant::now() + health_check.interval;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err((self, DeployError::Cancelled { phase })),
                verdict = verdicts.received() => match verdict {
                    Verdict::Approve => {
                        info!(deployment = %self.id, "verification approved");
                        return Ok(self.transition(Verified { plan }));
                    }
                    Verdict::Reject(reason) => {
                        return Err((self, DeployError::VerificationFailed(reason)));
                    }
                },
                _ = tokio::time::sleep_until(next_probe.min(deadline)) => {}
            }

            if Instant::now() >= deadline {
                if settings.deployment.require_approval {
                    return Err((self, DeployError::VerificationTimeout(bake_time.as_secs())));
                }
                info!(deployment = %self.id, "bake time elapsed without objection");
                return Ok(self.transition(Verified { plan }));
            }

            let observation = observe(group.scheduler(), plan.target, health_check).await;
            if let GateStep::Abort(reason) = tracker.record(observation) {
                return Err((
                    self,
                    DeployError::VerificationFailed(format!(
                        "target pool became unhealthy during bake: {reason}"
                    )),
                ));
            }
            next_probe = Instant::now() + health_check.interval;
        }
    }
}

// =============================================================================
// Promotion
// =============================================================================

impl Deployment<Verified> {
    /// Atomically move production traffic to the target pool.
    ///
    /// This is the point of no return: cancellation is no longer observed.
    pub async fn promote(mut self) -> TransitionResult<Promoted, Verified> {
        self.enter(DeploymentPhase::Promoting);
        if self.cancel.is_cancelled() {
            info!(deployment = %self.id, "cancellation ignored, promotion already started");
        }
        let plan = self.state.plan;
        let group = Arc::clone(&self.group);
        let router = group.router();
        let scheduler = group.scheduler();
        let retry = &group.settings().retry;

        let running = match with_backoff(retry, None, "confirm target replicas", || {
            scheduler.running_replicas(plan.target)
        })
        .await
        {
            Ok(running) => running,
            Err(err) => {
                let reason = format!("could not confirm running replicas: {}", describe(err));
                return Err((self, DeployError::Promotion { pool: plan.target, reason }));
            }
        };
        if running == 0 {
            return Err((
                self,
                DeployError::Promotion {
                    pool: plan.target,
                    reason: "target pool has no running replicas".to_string(),
                },
            ));
        }

        match with_backoff(retry, None, "promote", || router.promote(plan.target)).await {
            Ok(PromoteOutcome::Switched { from }) => {
                info!(
                    deployment = %self.id,
                    from = ?from,
                    to = %plan.target,
                    "production traffic switched"
                );
            }
            Ok(PromoteOutcome::AlreadyActive) => {
                info!(deployment = %self.id, pool = %plan.target, "production already on target pool");
            }
            Err(err) => {
                let reason = describe(err);
                match router.active_pool().await {
                    Ok(active) if active == plan.target => {
                        self.diag.warn(Warning::promotion_recovered(format!(
                            "router reported `{reason}` but production traffic is on the {} pool",
                            plan.target
                        )));
                    }
                    _ => {
                        return Err((self, DeployError::Promotion { pool: plan.target, reason }));
                    }
                }
            }
        }

        Ok(self.transition(Promoted { plan }))
    }
}

// =============================================================================
// Draining
// =============================================================================

impl Deployment<Promoted> {
    /// Deregister and stop the previous pool. Failures here are warnings:
    /// production is already served by the new pool.
    pub async fn drain(mut self) -> Deployment<Completed> {
        self.enter(DeploymentPhase::Draining);
        let plan = self.state.plan;
        let group = Arc::clone(&self.group);
        let router = group.router();
        let scheduler = group.scheduler();
        let settings = group.settings();
        let delay = settings.deployment.deregistration_delay;

        match router.active_pool().await {
            Ok(active) if active == plan.previous => {
                self.diag.warn(Warning::drain_failure(format!(
                    "production still routes to the {} pool, leaving it running",
                    plan.previous
                )));
            }
            _ => {
                info!(
                    deployment = %self.id,
                    pool = %plan.previous,
                    delay_secs = delay.as_secs(),
                    "draining previous pool"
                );
                if let Err(err) = with_backoff(&settings.retry, None, "drain previous pool", || {
                    scheduler.drain(plan.previous, delay)
                })
                .await
                {
                    let err = match err {
                        RetryError::Fatal(source) | RetryError::Exhausted { last: source, .. } => {
                            DeployError::DrainFailure {
                                pool: plan.previous,
                                source,
                            }
                            .to_string()
                        }
                        RetryError::Cancelled => "drain cancelled".to_string(),
                    };
                    self.diag.warn(Warning::drain_failure(err));
                }
            }
        }

        let reason = format!(
            "production traffic moved from {} to {}",
            plan.previous, plan.target
        );
        self.conclude(Outcome::Succeeded, reason)
    }
}

// =============================================================================
// Rollback & Failure
// =============================================================================

impl<S: BeforePromotion> Deployment<S> {
    /// Scale the target pool back to zero and put the test listener back
    /// where it was. Problems become warnings.
    ///
    /// Nothing is touched unless production is confirmed to still be on the
    /// previous pool: a promotion that failed ambiguously may have switched it.
    async fn tear_down_target(&mut self) {
        let plan = self.state.plan();
        let group = Arc::clone(&self.group);
        let router = group.router();
        let retry = &group.settings().retry;

        match with_backoff(retry, None, "confirm production pool", || router.active_pool()).await {
            Ok(active) if active == plan.previous => {}
            Ok(active) => {
                self.diag.warn(Warning::teardown_failure(format!(
                    "production routes to the {active} pool, leaving the {} pool running",
                    plan.target
                )));
                return;
            }
            Err(err) => {
                self.diag.warn(Warning::teardown_failure(format!(
                    "could not confirm which pool serves production ({}), leaving the {} pool running",
                    describe(err),
                    plan.target
                )));
                return;
            }
        }

        if router.has_test_listener() {
            match router.test_pool().await {
                Ok(current) if current == plan.test_before => {}
                Ok(_) => {
                    let restored = match plan.test_before {
                        Some(pool) => {
                            with_backoff(retry, None, "restore test listener", || {
                                router.bind_test_traffic(pool)
                            })
                            .await
                        }
                        None => {
                            with_backoff(retry, None, "unbind test listener", || {
                                router.unbind_test_traffic()
                            })
                            .await
                        }
                    };
                    if let Err(err) = restored {
                        self.diag.warn(Warning::test_listener(format!(
                            "could not restore the test listener: {}",
                            describe(err)
                        )));
                    }
                }
                Err(err) => {
                    self.diag.warn(Warning::test_listener(format!(
                        "could not read the test listener: {err}"
                    )));
                }
            }
        }

        match with_backoff(retry, None, "tear down target pool", || {
            group.scheduler().drain(plan.target, Duration::ZERO)
        })
        .await
        {
            Ok(()) => info!(deployment = %self.id, pool = %plan.target, "target pool scaled to zero"),
            Err(err) => {
                self.diag.warn(Warning::teardown_failure(format!(
                    "could not tear down the {} pool: {}",
                    plan.target,
                    describe(err)
                )));
            }
        }
    }

    /// Abandon the target pool; production never moved.
    pub async fn rollback(mut self, cause: DeployError) -> Deployment<Completed> {
        self.enter(DeploymentPhase::RollingBack);
        warn!(deployment = %self.id, cause = %cause, "rolling back");
        self.tear_down_target().await;
        self.conclude(Outcome::RolledBack, cause.to_string())
    }

    /// Give up on the deployment; production never moved.
    pub async fn fail(mut self, cause: DeployError) -> Deployment<Completed> {
        self.enter(DeploymentPhase::Failed);
        error!(deployment = %self.id, error = %cause, "deployment failed");
        self.tear_down_target().await;
        self.conclude(Outcome::Failed, cause.to_string())
    }
}

impl Deployment<Completed> {
    /// Turn the finished deployment into its terminal record.
    pub fn finish(self) -> DeploymentRecord {
        let mut record = self.status.snapshot();
        record.phase = DeploymentPhase::Completed;
        record.outcome = Some(self.state.outcome);
        record.reason = Some(self.state.reason);
        record.warnings = self.diag.messages();
        record.ended_at = Some(Utc::now());
        record
    }
}

/// Drive a deployment from start to a terminal state.
pub async fn run_deployment(deployment: Deployment<Pending>) -> Deployment<Completed> {
    let deployment = match deployment.plan_routing().await {
        Ok(d) => d,
        Err((d, err)) => return d.abort(err),
    };

    let deployment = match deployment.provision().await {
        Ok(d) => d,
        Err((d, err @ DeployError::Cancelled { .. })) => return d.rollback(err).await,
        Err((d, err)) => return d.fail(err).await,
    };

    let deployment = match deployment.health_check().await {
        Ok(d) => d,
        Err((d, err)) => return d.rollback(err).await,
    };

    let deployment = match deployment.verify().await {
        Ok(d) => d,
        Err((d, err)) => return d.rollback(err).await,
    };

    let deployment = match deployment.promote().await {
        Ok(d) => d,
        Err((d, err)) => return d.fail(err).await,
    };

    deployment.drain().await
}
