// ABOUTME: Orchestrator owning the deployments of one group.
// ABOUTME: Starts deployments behind the deploy lock and answers status, signal, and history queries.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{Instrument, info, info_span};

use crate::artifact::ArtifactSource;
use crate::config::TaskSpec;
use crate::diagnostics::{Diagnostics, Warning};
use crate::group::DeploymentGroup;
use crate::store::{DeploymentStore, MemoryStore};
use crate::types::DeploymentId;

use super::deployment::{Deployment, DeploymentControl};
use super::error::DeployError;
use super::lock::{DeployLock, LockInfo, LockStore, MemoryLockStore, STALE_LOCK_MARGIN};
use super::status::{DeploymentPhase, DeploymentRecord, DeploymentStatus};
use super::transitions::run_deployment;

/// Finished deployments kept for queries unless configured otherwise.
pub const FINISHED_RETAINED: usize = 64;

/// Deployments known to an orchestrator. Running ones keep their controls;
/// finished ones keep only their final record, oldest evicted first.
#[derive(Debug)]
struct Registry {
    running: HashMap<DeploymentId, DeploymentControl>,
    finished: VecDeque<DeploymentRecord>,
    retain: usize,
}

impl Registry {
    fn new(retain: usize) -> Self {
        Self {
            running: HashMap::new(),
            finished: VecDeque::new(),
            retain,
        }
    }

    fn active(&self) -> Option<DeploymentStatus> {
        self.running
            .values()
            .map(|control| control.status().snapshot())
            .find(|status| !status.is_terminal())
    }

    fn finished(&self, id: &DeploymentId) -> Option<&DeploymentRecord> {
        self.finished.iter().find(|record| &record.id == id)
    }

    fn retire(&mut self, id: &DeploymentId, record: DeploymentRecord) {
        self.running.remove(id);
        self.finished.push_back(record);
        while self.finished.len() > self.retain {
            self.finished.pop_front();
        }
    }
}

/// Runs blue/green deployments for a single group, one at a time.
pub struct Orchestrator {
    group: Arc<DeploymentGroup>,
    locks: Arc<dyn LockStore>,
    store: Arc<dyn DeploymentStore>,
    force_lock: bool,
    deployments: Arc<RwLock<Registry>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let deployments = self.deployments.read();
        f.debug_struct("Orchestrator")
            .field("group", &self.group.name())
            .field("running", &deployments.running.len())
            .field("finished", &deployments.finished.len())
            .finish()
    }
}

impl Orchestrator {
    /// Orchestrator with process-local locks and in-memory history.
    pub fn new(group: DeploymentGroup) -> Self {
        Self {
            group: Arc::new(group),
            locks: Arc::new(MemoryLockStore::new()),
            store: Arc::new(MemoryStore::default()),
            force_lock: false,
            deployments: Arc::new(RwLock::new(Registry::new(FINISHED_RETAINED))),
        }
    }

    pub fn with_lock_store(mut self, locks: Arc<dyn LockStore>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn DeploymentStore>) -> Self {
        self.store = store;
        self
    }

    /// Break an existing lock instead of reporting a conflict.
    pub fn force_lock(mut self, force: bool) -> Self {
        self.force_lock = force;
        self
    }

    /// Keep at most `count` finished deployments for status queries.
    pub fn retain_history(self, count: usize) -> Self {
        self.deployments.write().retain = count;
        self
    }

    pub fn group(&self) -> &DeploymentGroup {
        &self.group
    }

    /// Start a deployment of `spec` and return immediately.
    ///
    /// Fails with a conflict, synchronously, when another deployment of the
    /// group is active. Must be called from within a Tokio runtime.
    pub fn start_deployment(&self, spec: TaskSpec) -> Result<DeploymentId, DeployError> {
        let mut deployments = self.deployments.write();
        // A running deployment owns the group whatever the lock store says.
        if let Some(active) = deployments.active() {
            let mut holder = LockInfo::new(self.group.name(), Some(&active.id));
            holder.started_at = active.started_at;
            return Err(DeployError::lock_held(
                self.group.name().as_str(),
                holder.holder_info(),
            ));
        }

        let id = DeploymentId::generate();
        let lock = DeployLock::acquire(
            Arc::clone(&self.locks),
            self.group.name(),
            Some(&id),
            self.force_lock,
            self.group.settings().longest_deployment() + STALE_LOCK_MARGIN,
        )?;

        let (deployment, control) = Deployment::new(id.clone(), Arc::clone(&self.group), spec);
        let status = control.status().clone();
        deployments.running.insert(id.clone(), control);
        drop(deployments);

        info!(
            deployment = %id,
            group = %self.group.name(),
            image = %deployment.image(),
            "deployment started"
        );

        let store = Arc::clone(&self.store);
        let registry = Arc::clone(&self.deployments);
        let span = info_span!("deployment", id = %id, group = %self.group.name());
        tokio::spawn(
            async move {
                let completed = run_deployment(deployment).await;
                let mut record = completed.finish();

                let mut diag = Diagnostics::default();
                if let Err(e) = store.save_deployment_record(&record).await {
                    diag.warn(Warning::record_save(format!(
                        "failed to save deployment record: {e}"
                    )));
                }
                if let Err(e) = lock.release() {
                    diag.warn(Warning::lock_release(format!(
                        "failed to release deploy lock: {e}"
                    )));
                }
                record.warnings.extend(diag.messages());

                // Published last so waiters observe the lock already released.
                let id = record.id.clone();
                status.publish(record.clone());
                registry.write().retire(&id, record);
            }
            .instrument(span),
        );

        Ok(id)
    }

    /// Resolve `tag` in the group's repository to a pinned image, then deploy it.
    pub async fn deploy_tag(
        &self,
        artifacts: &dyn ArtifactSource,
        tag: &str,
    ) -> Result<DeploymentId, DeployError> {
        let settings = self.group.settings();
        let image = artifacts.resolve_image(&settings.repository, tag).await?;
        self.start_deployment(settings.task_spec(image))
    }

    pub fn get_deployment(&self, id: &DeploymentId) -> Option<DeploymentStatus> {
        let deployments = self.deployments.read();
        match deployments.running.get(id) {
            Some(control) => Some(control.status().snapshot()),
            None => deployments.finished(id).cloned(),
        }
    }

    /// The deployment currently running, if any.
    pub fn active_deployment(&self) -> Option<DeploymentStatus> {
        self.deployments.read().active()
    }

    /// Phase of the active deployment, or `Idle`.
    pub fn phase(&self) -> DeploymentPhase {
        self.active_deployment()
            .map(|status| status.phase)
            .unwrap_or(DeploymentPhase::Idle)
    }

    /// Retained terminal deployments started by this orchestrator, oldest first.
    pub fn history(&self) -> Vec<DeploymentStatus> {
        let deployments = self.deployments.read();
        let mut finished: Vec<_> = deployments
            .running
            .values()
            .map(|control| control.status().snapshot())
            .filter(DeploymentStatus::is_terminal)
            .chain(deployments.finished.iter().cloned())
            .collect();
        finished.sort_by_key(|status| status.started_at);
        finished
    }

    /// Wait for a deployment to reach its terminal state.
    pub async fn wait(&self, id: &DeploymentId) -> Result<DeploymentStatus, DeployError> {
        match self.lookup(id)? {
            Entry::Running(control) => Ok(control.status().wait_terminal().await),
            Entry::Finished(record) => Ok(*record),
        }
    }

    /// Request cancellation. Honored until promotion starts; afterwards the
    /// deployment runs to completion.
    pub fn cancel(&self, id: &DeploymentId) -> Result<(), DeployError> {
        match self.lookup(id)? {
            Entry::Running(control) => {
                let phase = control.status().phase();
                if !phase.accepts_signals() {
                    info!(deployment = %id, phase = %phase, "cancellation requested past the point of no return");
                }
                control.cancel();
            }
            Entry::Finished(_) => {
                info!(deployment = %id, "cancellation requested for a finished deployment");
            }
        }
        Ok(())
    }

    /// Approve promotion of a deployment that has not started promoting.
    pub fn approve(&self, id: &DeploymentId) -> Result<(), DeployError> {
        self.verdict_target(id)?.approve();
        Ok(())
    }

    /// Reject a deployment that has not started promoting; it rolls back.
    pub fn reject(&self, id: &DeploymentId, reason: impl Into<String>) -> Result<(), DeployError> {
        self.verdict_target(id)?.reject(reason);
        Ok(())
    }

    fn verdict_target(&self, id: &DeploymentId) -> Result<DeploymentControl, DeployError> {
        let phase = match self.lookup(id)? {
            Entry::Running(control) => {
                let phase = control.status().phase();
                if phase.accepts_signals() {
                    return Ok(control);
                }
                phase
            }
            Entry::Finished(record) => record.phase,
        };
        Err(DeployError::VerdictTooLate {
            id: id.to_string(),
            phase,
        })
    }

    fn lookup(&self, id: &DeploymentId) -> Result<Entry, DeployError> {
        let deployments = self.deployments.read();
        if let Some(control) = deployments.running.get(id) {
            return Ok(Entry::Running(control.clone()));
        }
        deployments
            .finished(id)
            .map(|record| Entry::Finished(Box::new(record.clone())))
            .ok_or_else(|| DeployError::UnknownDeployment(id.to_string()))
    }
}

enum Entry {
    Running(DeploymentControl),
    Finished(Box<DeploymentRecord>),
}
