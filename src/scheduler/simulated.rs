// ABOUTME: Scriptable in-process scheduler for simulations and tests.
// ABOUTME: Probe outcomes, launch failures, outages, and capacity are all injectable.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use super::{ReplicaScheduler, SchedulerError};
use crate::config::{HealthCheckConfig, TaskSpec};
use crate::pool::{HealthReport, ProbeRound, TargetPool};
use crate::types::{PoolColor, ReplicaId};

/// Outcome of one scripted health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStep {
    /// Every replica passes.
    Pass,
    /// Every replica fails.
    Fail,
    /// Exactly one replica fails.
    Partial,
    /// Report carries an old timestamp.
    Stale,
    /// The scheduler is unreachable for this probe.
    Outage,
    /// The probe never answers.
    Hang,
}

#[derive(Debug)]
struct PoolSim {
    pool: TargetPool,
    spec: Option<TaskSpec>,
    replica_ids: Vec<ReplicaId>,
    next_replica: u64,
    capacity_associated: bool,
    /// When set, replicas are requested but never start.
    stalled: bool,
    launch_failure: Option<SchedulerError>,
    script: VecDeque<ProbeStep>,
    fallback: ProbeStep,
    drain_failure: Option<SchedulerError>,
    drains: Vec<tokio::time::Instant>,
}

#[derive(Debug, Default)]
struct Faults {
    rejected_images: HashSet<String>,
    quota: Option<u32>,
    /// Calls to `set_desired_replicas` left to fail as unavailable.
    launch_outages: u32,
}

#[derive(Debug)]
pub struct SimulatedScheduler {
    pools: Mutex<HashMap<PoolColor, PoolSim>>,
    faults: Mutex<Faults>,
}

impl SimulatedScheduler {
    pub fn new(health_check: &HealthCheckConfig) -> Self {
        let pools = PoolColor::ALL
            .iter()
            .map(|&color| {
                let sim = PoolSim {
                    pool: TargetPool::new(color, color.as_str(), health_check.clone()),
                    spec: None,
                    replica_ids: Vec::new(),
                    next_replica: 1,
                    capacity_associated: true,
                    stalled: false,
                    launch_failure: None,
                    script: VecDeque::new(),
                    fallback: ProbeStep::Pass,
                    drain_failure: None,
                    drains: Vec::new(),
                };
                (color, sim)
            })
            .collect();
        Self {
            pools: Mutex::new(pools),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Start `count` healthy replicas of `spec` in `pool` without going through
    /// a deployment, e.g. the fleet that is live before the first rollout.
    pub fn seed_running(&self, pool: PoolColor, spec: TaskSpec, count: u32) {
        self.with_pool(pool, |sim| {
            sim.set_count(count);
            sim.spec = Some(spec);
            sim.pool.record_probe(ProbeRound::all_passing(count), Utc::now());
        });
    }

    /// Queue probe outcomes for `pool`; once exhausted, `fallback` repeats.
    pub fn script_probes(&self, pool: PoolColor, steps: impl IntoIterator<Item = ProbeStep>) {
        self.with_pool(pool, |sim| sim.script.extend(steps));
    }

    pub fn set_probe_fallback(&self, pool: PoolColor, step: ProbeStep) {
        self.with_pool(pool, |sim| sim.fallback = step);
    }

    pub fn set_capacity_associated(&self, pool: PoolColor, associated: bool) {
        self.with_pool(pool, |sim| sim.capacity_associated = associated);
    }

    /// Replicas requested for `pool` never reach the running state.
    pub fn stall_launches(&self, pool: PoolColor) {
        self.with_pool(pool, |sim| sim.stalled = true);
    }

    /// Launches into `pool` are accepted but then fail with `error`.
    pub fn fail_launches(&self, pool: PoolColor, error: SchedulerError) {
        self.with_pool(pool, |sim| sim.launch_failure = Some(error));
    }

    pub fn fail_drains(&self, pool: PoolColor, error: SchedulerError) {
        self.with_pool(pool, |sim| sim.drain_failure = Some(error));
    }

    /// Requests for this image are rejected as not found.
    pub fn reject_image(&self, image: &str) {
        self.faults.lock().rejected_images.insert(image.to_string());
    }

    /// Cap the replicas that may run across both pools.
    pub fn set_quota(&self, max_replicas: u32) {
        self.faults.lock().quota = Some(max_replicas);
    }

    pub fn inject_launch_outages(&self, calls: u32) {
        self.faults.lock().launch_outages = calls;
    }

    pub fn replicas(&self, pool: PoolColor) -> u32 {
        self.pools
            .lock()
            .get(&pool)
            .map(|sim| sim.pool.replicas())
            .unwrap_or(0)
    }

    pub fn replica_ids(&self, pool: PoolColor) -> Vec<ReplicaId> {
        self.pools
            .lock()
            .get(&pool)
            .map(|sim| sim.replica_ids.clone())
            .unwrap_or_default()
    }

    /// Image currently scheduled into `pool`, if any.
    pub fn image(&self, pool: PoolColor) -> Option<String> {
        self.pools
            .lock()
            .get(&pool)
            .and_then(|sim| sim.spec.as_ref().map(|s| s.image.to_string()))
    }

    /// Instants at which `pool` finished draining.
    pub fn drains(&self, pool: PoolColor) -> Vec<tokio::time::Instant> {
        self.pools
            .lock()
            .get(&pool)
            .map(|sim| sim.drains.clone())
            .unwrap_or_default()
    }

    fn with_pool<R>(&self, pool: PoolColor, f: impl FnOnce(&mut PoolSim) -> R) -> R {
        let mut pools = self.pools.lock();
        let sim = pools
            .get_mut(&pool)
            .expect("simulated scheduler manages both pools");
        f(sim)
    }

    fn try_with_pool<R>(
        &self,
        pool: PoolColor,
        f: impl FnOnce(&mut PoolSim) -> Result<R, SchedulerError>,
    ) -> Result<R, SchedulerError> {
        let mut pools = self.pools.lock();
        let sim = pools
            .get_mut(&pool)
            .ok_or(SchedulerError::UnknownPool(pool))?;
        f(sim)
    }
}

impl PoolSim {
    fn set_count(&mut self, count: u32) {
        let color = self.pool.color();
        self.replica_ids.truncate(count as usize);
        while self.replica_ids.len() < count as usize {
            self.replica_ids
                .push(ReplicaId::new(format!("{}-{}", color, self.next_replica)));
            self.next_replica += 1;
        }
        self.pool.set_replicas(count);
    }
}

#[async_trait]
impl ReplicaScheduler for SimulatedScheduler {
    fn pools(&self) -> Vec<PoolColor> {
        let mut pools: Vec<_> = self.pools.lock().keys().copied().collect();
        pools.sort_by_key(|c| c.as_str());
        pools
    }

    async fn ensure_capacity(&self, pool: PoolColor) -> Result<(), SchedulerError> {
        self.try_with_pool(pool, |sim| {
            if sim.capacity_associated {
                Ok(())
            } else {
                Err(SchedulerError::CapacityUnavailable(pool))
            }
        })
    }

    async fn set_desired_replicas(
        &self,
        pool: PoolColor,
        spec: &TaskSpec,
        count: u32,
    ) -> Result<(), SchedulerError> {
        {
            let mut faults = self.faults.lock();
            if faults.launch_outages > 0 {
                faults.launch_outages -= 1;
                return Err(SchedulerError::Unavailable("injected outage".to_string()));
            }
            if count > 0 && faults.rejected_images.contains(&spec.image.to_string()) {
                return Err(SchedulerError::ImageNotFound(spec.image.to_string()));
            }
            if let Some(quota) = faults.quota {
                let others = self.replicas(pool.other());
                if others + count > quota {
                    return Err(SchedulerError::QuotaExceeded(format!(
                        "{} replicas requested, {} of {} in use",
                        count, others, quota
                    )));
                }
            }
        }

        self.try_with_pool(pool, |sim| {
            sim.spec = Some(spec.clone());
            let running = if sim.stalled || sim.launch_failure.is_some() {
                0
            } else {
                count
            };
            sim.set_count(running);
            tracing::debug!(pool = %pool, requested = count, running, "desired replicas set");
            Ok(())
        })
    }

    async fn running_replicas(&self, pool: PoolColor) -> Result<u32, SchedulerError> {
        self.try_with_pool(pool, |sim| match &sim.launch_failure {
            Some(err) => Err(err.clone()),
            None => Ok(sim.pool.replicas()),
        })
    }

    async fn health_of(&self, pool: PoolColor) -> Result<HealthReport, SchedulerError> {
        let step = self.try_with_pool(pool, |sim| {
            Ok(sim.script.pop_front().unwrap_or(sim.fallback))
        })?;

        match step {
            ProbeStep::Outage => Err(SchedulerError::Unavailable("health API timed out".into())),
            ProbeStep::Hang => std::future::pending().await,
            ProbeStep::Stale => self.try_with_pool(pool, |sim| {
                let mut report = sim.pool.health();
                report.observed_at = Utc::now() - chrono::Duration::hours(1);
                Ok(report)
            }),
            ProbeStep::Pass | ProbeStep::Fail | ProbeStep::Partial => {
                self.try_with_pool(pool, |sim| {
                    let replicas = sim.pool.replicas();
                    let round = match step {
                        ProbeStep::Pass => ProbeRound::all_passing(replicas),
                        ProbeStep::Fail => ProbeRound::all_failing(replicas),
                        _ => ProbeRound {
                            passing: replicas.saturating_sub(1),
                            failing: replicas.min(1),
                        },
                    };
                    Ok(sim.pool.record_probe(round, Utc::now()))
                })
            }
        }
    }

    async fn drain(
        &self,
        pool: PoolColor,
        deregistration_delay: Duration,
    ) -> Result<(), SchedulerError> {
        self.try_with_pool(pool, |_| Ok(()))?;
        if !deregistration_delay.is_zero() {
            tokio::time::sleep(deregistration_delay).await;
        }
        self.try_with_pool(pool, |sim| {
            if let Some(err) = sim.drain_failure.clone() {
                return Err(err);
            }
            sim.set_count(0);
            sim.spec = None;
            sim.launch_failure = None;
            sim.stalled = false;
            sim.drains.push(tokio::time::Instant::now());
            Ok(())
        })
    }
}
