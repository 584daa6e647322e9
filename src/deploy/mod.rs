// ABOUTME: Deployment orchestration using the type state pattern.
// ABOUTME: Exports state markers, the Deployment struct, the orchestrator, and the deploy lock.

mod deployment;
mod error;
mod health;
mod lock;
mod orchestrator;
mod retry;
mod signal;
mod state;
mod status;
mod transitions;

pub use deployment::{Deployment, DeploymentControl};
pub use error::{DeployError, DeployErrorKind, LockHolderInfo};
pub use lock::{DeployLock, FileLockStore, LockInfo, LockState, LockStore, MemoryLockStore};
pub use orchestrator::Orchestrator;
pub use signal::{CancelSignal, Verdict, VerdictSignal};
pub use state::{
    BeforePromotion, Completed, HasPlan, HealthChecked, Pending, Planned, Promoted, Provisioned,
    RoutingPlan, Verified,
};
pub use status::{DeploymentPhase, DeploymentRecord, DeploymentStatus, Outcome, StatusHandle};
pub use transitions::{TransitionResult, run_deployment};
