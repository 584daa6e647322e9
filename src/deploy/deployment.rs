// ABOUTME: Generic deployment struct parameterized by state marker.
// ABOUTME: Carries the group, task spec, status handle, and control signals through every state.

use std::sync::Arc;

use crate::config::TaskSpec;
use crate::diagnostics::Diagnostics;
use crate::group::DeploymentGroup;
use crate::types::{DeploymentId, ImageRef};

use super::signal::{CancelSignal, SignalSenders, Verdict, VerdictSignal, signal_pair};
use super::state::{Completed, HasPlan, Pending, RoutingPlan};
use super::status::{DeploymentPhase, DeploymentStatus, Outcome, StatusHandle};

/// A deployment in progress, parameterized by its current state.
///
/// The state type parameter `S` carries state-specific data (the routing plan,
/// the final outcome) so that, for example, promotion cannot be attempted
/// before a target pool has been chosen and checked.
#[derive(Debug)]
pub struct Deployment<S> {
    pub(crate) id: DeploymentId,
    pub(crate) group: Arc<DeploymentGroup>,
    pub(crate) spec: TaskSpec,
    pub(crate) status: StatusHandle,
    pub(crate) cancel: CancelSignal,
    pub(crate) verdict: VerdictSignal,
    pub(crate) diag: Diagnostics,
    pub(crate) state: S,
}

/// Handle for observing and steering a deployment from outside its task.
#[derive(Debug, Clone)]
pub struct DeploymentControl {
    id: DeploymentId,
    status: StatusHandle,
    signals: SignalSenders,
}

impl DeploymentControl {
    pub fn id(&self) -> &DeploymentId {
        &self.id
    }

    pub fn status(&self) -> &StatusHandle {
        &self.status
    }

    /// Request cancellation. Only honored before promotion starts.
    pub fn cancel(&self) {
        self.signals.cancel();
    }

    pub fn approve(&self) {
        self.signals.send_verdict(Verdict::Approve);
    }

    pub fn reject(&self, reason: impl Into<String>) {
        self.signals.send_verdict(Verdict::Reject(reason.into()));
    }
}

impl Deployment<Pending> {
    pub fn new(
        id: DeploymentId,
        group: Arc<DeploymentGroup>,
        spec: TaskSpec,
    ) -> (Self, DeploymentControl) {
        let status = StatusHandle::new(DeploymentStatus::new(
            id.clone(),
            group.name().clone(),
            spec.image.clone(),
        ));
        let (signals, cancel, verdict) = signal_pair();
        let control = DeploymentControl {
            id: id.clone(),
            status: status.clone(),
            signals,
        };
        let deployment = Deployment {
            id,
            group,
            spec,
            status,
            cancel,
            verdict,
            diag: Diagnostics::default(),
            state: Pending,
        };
        (deployment, control)
    }
}

impl<S> Deployment<S> {
    pub fn id(&self) -> &DeploymentId {
        &self.id
    }

    pub fn group(&self) -> &DeploymentGroup {
        &self.group
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    pub fn image(&self) -> &ImageRef {
        &self.spec.image
    }

    pub fn phase(&self) -> DeploymentPhase {
        self.status.phase()
    }

    pub fn status(&self) -> DeploymentStatus {
        self.status.snapshot()
    }

    pub fn status_handle(&self) -> &StatusHandle {
        &self.status
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }
}

impl<S: HasPlan> Deployment<S> {
    pub fn routing_plan(&self) -> RoutingPlan {
        self.state.plan()
    }
}

impl Deployment<Completed> {
    pub fn outcome(&self) -> Outcome {
        self.state.outcome
    }

    pub fn reason(&self) -> &str {
        &self.state.reason
    }
}
