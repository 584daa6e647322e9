// ABOUTME: Deployment state marker types for the type state pattern.
// ABOUTME: Each state carries the data its transitions are allowed to rely on.

use crate::types::PoolColor;

use super::status::Outcome;

/// Which pool is brought up, which one it replaces, and where test traffic
/// pointed before the deployment touched anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingPlan {
    pub target: PoolColor,
    pub previous: PoolColor,
    pub test_before: Option<PoolColor>,
}

/// Initial state: nothing inspected yet.
/// Available actions: `plan()`, `fail()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Pending;

/// Routing checked and target pool chosen.
/// Available actions: `provision()`, `fail()`, `rollback()`
#[derive(Debug, Clone, Copy)]
pub struct Planned {
    pub(crate) plan: RoutingPlan,
}

/// Desired replicas running in the target pool.
/// Available actions: `health_check()`, `rollback()`
#[derive(Debug, Clone, Copy)]
pub struct Provisioned {
    pub(crate) plan: RoutingPlan,
}

/// Target pool passed its health gate.
/// Available actions: `verify()`, `rollback()`
#[derive(Debug, Clone, Copy)]
pub struct HealthChecked {
    pub(crate) plan: RoutingPlan,
    pub(crate) probes: u32,
}

/// Verification approved, timed out benignly, or skipped.
/// Available actions: `promote()`, `fail()`
#[derive(Debug, Clone, Copy)]
pub struct Verified {
    pub(crate) plan: RoutingPlan,
}

/// Production traffic moved to the target pool.
/// Available actions: `drain()`
#[derive(Debug, Clone, Copy)]
pub struct Promoted {
    pub(crate) plan: RoutingPlan,
}

/// Terminal.
/// Available actions: `finish()`
#[derive(Debug, Clone)]
pub struct Completed {
    pub(crate) outcome: Outcome,
    pub(crate) reason: String,
}

/// States that know their routing plan.
pub trait HasPlan {
    fn plan(&self) -> RoutingPlan;
}

impl HasPlan for Planned {
    fn plan(&self) -> RoutingPlan {
        self.plan
    }
}

impl HasPlan for Provisioned {
    fn plan(&self) -> RoutingPlan {
        self.plan
    }
}

impl HasPlan for HealthChecked {
    fn plan(&self) -> RoutingPlan {
        self.plan
    }
}

impl HasPlan for Verified {
    fn plan(&self) -> RoutingPlan {
        self.plan
    }
}

impl HasPlan for Promoted {
    fn plan(&self) -> RoutingPlan {
        self.plan
    }
}

/// States from which the target pool can still be abandoned without
/// touching production traffic.
pub trait BeforePromotion: HasPlan {}

impl BeforePromotion for Planned {}
impl BeforePromotion for Provisioned {}
impl BeforePromotion for HealthChecked {}
impl BeforePromotion for Verified {}
