// ABOUTME: Traffic router contract: two pools, a production listener, an optional test listener.
// ABOUTME: Production rebinding is atomic, idempotent, and serialized per router.

mod memory;

pub use memory::InMemoryRouter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::PoolColor;

/// Routing destination of one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolDescriptor {
    pub color: PoolColor,
    pub address: String,
}

/// Which class of traffic a listener carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficClass {
    Production,
    Test,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    pub name: String,
    pub port: u16,
    pub class: TrafficClass,
}

impl Listener {
    pub fn production(port: u16) -> Self {
        Self {
            name: "production".to_string(),
            port,
            class: TrafficClass::Production,
        }
    }

    pub fn test(port: u16) -> Self {
        Self {
            name: "test".to_string(),
            port,
            class: TrafficClass::Test,
        }
    }
}

/// Current pool bound to each listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerBindings {
    pub production: Option<PoolColor>,
    pub test: Option<PoolColor>,
}

impl ListenerBindings {
    /// Production and test traffic must never share a pool outside a flip.
    pub fn is_consistent(&self) -> bool {
        match (self.production, self.test) {
            (Some(prod), Some(test)) => prod != test,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// What a promotion actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoteOutcome {
    Switched { from: Option<PoolColor> },
    AlreadyActive,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("router has no {0} pool")]
    UnknownPool(PoolColor),

    #[error("router is not initialized: production listener is unbound")]
    Uninitialized,

    #[error("test traffic cannot be bound to the production pool ({0})")]
    SamePool(PoolColor),

    #[error("router has no test listener")]
    NoTestListener,

    #[error("router unavailable: {0}")]
    Unavailable(String),
}

impl RoutingError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RoutingError::Unavailable(_))
    }
}

/// Load balancer abstraction owning the blue and green pools.
///
/// Implementations must serialize mutations: two concurrent `promote` calls on
/// the same router may not interleave, and the production listener is never
/// left unbound, even transiently.
#[async_trait]
pub trait TrafficRouter: Send + Sync {
    /// Pools known to this router.
    fn pools(&self) -> Vec<PoolDescriptor>;

    fn pool(&self, color: PoolColor) -> Option<PoolDescriptor> {
        self.pools().into_iter().find(|p| p.color == color)
    }

    fn has_test_listener(&self) -> bool;

    async fn bindings(&self) -> Result<ListenerBindings, RoutingError>;

    /// Rebind production traffic to `pool`. Promoting the active pool is a no-op.
    /// If the test listener pointed at `pool`, it moves to the previously active
    /// pool in the same step.
    async fn promote(&self, pool: PoolColor) -> Result<PromoteOutcome, RoutingError>;

    async fn bind_test_traffic(&self, pool: PoolColor) -> Result<(), RoutingError>;

    async fn unbind_test_traffic(&self) -> Result<(), RoutingError>;

    async fn active_pool(&self) -> Result<PoolColor, RoutingError> {
        self.bindings()
            .await?
            .production
            .ok_or(RoutingError::Uninitialized)
    }

    async fn inactive_pool(&self) -> Result<PoolColor, RoutingError> {
        let active = self.active_pool().await?;
        let inactive = active.other();
        if self.pool(inactive).is_none() {
            return Err(RoutingError::UnknownPool(inactive));
        }
        Ok(inactive)
    }

    async fn test_pool(&self) -> Result<Option<PoolColor>, RoutingError> {
        Ok(self.bindings().await?.test)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_sharing_a_pool_are_inconsistent() {
        let shared = ListenerBindings {
            production: Some(PoolColor::Blue),
            test: Some(PoolColor::Blue),
        };
        assert!(!shared.is_consistent());

        let split = ListenerBindings {
            production: Some(PoolColor::Blue),
            test: Some(PoolColor::Green),
        };
        assert!(split.is_consistent());
        assert!(!ListenerBindings::default().is_consistent());
    }
}
