// ABOUTME: In-process traffic router backed by a single mutex.
// ABOUTME: Used for simulations and tests; supports fault injection.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    Listener, ListenerBindings, PoolDescriptor, PromoteOutcome, RoutingError, TrafficRouter,
};
use crate::config::Config;
use crate::types::PoolColor;

#[derive(Debug)]
pub struct InMemoryRouter {
    pools: Vec<PoolDescriptor>,
    production: Listener,
    test: Option<Listener>,
    state: Mutex<RouterState>,
}

#[derive(Debug, Default)]
struct RouterState {
    bindings: ListenerBindings,
    /// Calls left to fail with `Unavailable`.
    outages: u32,
    switches: u32,
}

impl InMemoryRouter {
    /// Router with production bound to `active` and, when a test listener
    /// exists, test traffic bound to the other pool.
    pub fn new(
        pools: Vec<PoolDescriptor>,
        production: Listener,
        test: Option<Listener>,
        active: PoolColor,
    ) -> Self {
        let bindings = ListenerBindings {
            production: Some(active),
            test: test.as_ref().map(|_| active.other()),
        };
        Self {
            pools,
            production,
            test,
            state: Mutex::new(RouterState {
                bindings,
                ..Default::default()
            }),
        }
    }

    /// Router for a configuration, production initially on `active`.
    pub fn from_config(config: &Config, active: PoolColor) -> Self {
        let pools = PoolColor::ALL
            .iter()
            .map(|&color| PoolDescriptor {
                color,
                address: config.pool_address(color),
            })
            .collect();
        Self::new(
            pools,
            Listener::production(config.listeners.production.port),
            config.listeners.test.as_ref().map(|l| Listener::test(l.port)),
            active,
        )
    }

    pub fn production_listener(&self) -> &Listener {
        &self.production
    }

    pub fn test_listener(&self) -> Option<&Listener> {
        self.test.as_ref()
    }

    /// Overwrite bindings directly, bypassing every check. Models drift
    /// introduced outside the orchestrator.
    pub fn force_bindings(&self, bindings: ListenerBindings) {
        self.state.lock().bindings = bindings;
    }

    /// Make the next `calls` mutating or querying calls fail as unavailable.
    pub fn inject_outage(&self, calls: u32) {
        self.state.lock().outages = calls;
    }

    /// Number of promotions that actually changed the production binding.
    pub fn switch_count(&self) -> u32 {
        self.state.lock().switches
    }

    pub fn current_bindings(&self) -> ListenerBindings {
        self.state.lock().bindings
    }

    fn ensure_known(&self, pool: PoolColor) -> Result<(), RoutingError> {
        if self.pools.iter().any(|p| p.color == pool) {
            Ok(())
        } else {
            Err(RoutingError::UnknownPool(pool))
        }
    }
}

impl RouterState {
    fn check_outage(&mut self) -> Result<(), RoutingError> {
        if self.outages > 0 {
            self.outages -= 1;
            return Err(RoutingError::Unavailable("injected outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TrafficRouter for InMemoryRouter {
    fn pools(&self) -> Vec<PoolDescriptor> {
        self.pools.clone()
    }

    fn has_test_listener(&self) -> bool {
        self.test.is_some()
    }

    async fn bindings(&self) -> Result<ListenerBindings, RoutingError> {
        let mut state = self.state.lock();
        state.check_outage()?;
        Ok(state.bindings)
    }

    async fn promote(&self, pool: PoolColor) -> Result<PromoteOutcome, RoutingError> {
        self.ensure_known(pool)?;
        let mut state = self.state.lock();
        state.check_outage()?;

        let previous = state.bindings.production;
        if previous == Some(pool) {
            return Ok(PromoteOutcome::AlreadyActive);
        }

        // Both listener rules are replaced under one lock: observers see
        // either the old pair or the new pair.
        state.bindings.production = Some(pool);
        if state.bindings.test == Some(pool) {
            state.bindings.test = previous;
        }
        state.switches += 1;
        tracing::info!(pool = %pool, from = ?previous, port = self.production.port, "production listener rebound");

        Ok(PromoteOutcome::Switched { from: previous })
    }

    async fn bind_test_traffic(&self, pool: PoolColor) -> Result<(), RoutingError> {
        self.ensure_known(pool)?;
        if self.test.is_none() {
            return Err(RoutingError::NoTestListener);
        }
        let mut state = self.state.lock();
        state.check_outage()?;
        if state.bindings.production == Some(pool) {
            return Err(RoutingError::SamePool(pool));
        }
        state.bindings.test = Some(pool);
        Ok(())
    }

    async fn unbind_test_traffic(&self) -> Result<(), RoutingError> {
        if self.test.is_none() {
            return Err(RoutingError::NoTestListener);
        }
        let mut state = self.state.lock();
        state.check_outage()?;
        state.bindings.test = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router(active: PoolColor) -> InMemoryRouter {
        InMemoryRouter::from_config(&Config::template(), active)
    }

    #[tokio::test]
    async fn promote_swaps_test_listener_to_previous_pool() {
        let router = router(PoolColor::Blue);
        let outcome = router.promote(PoolColor::Green).await.unwrap();

        assert_eq!(
            outcome,
            PromoteOutcome::Switched {
                from: Some(PoolColor::Blue)
            }
        );
        let bindings = router.current_bindings();
        assert_eq!(bindings.production, Some(PoolColor::Green));
        assert_eq!(bindings.test, Some(PoolColor::Blue));
    }

    #[tokio::test]
    async fn promoting_active_pool_is_a_no_op() {
        let router = router(PoolColor::Blue);
        let outcome = router.promote(PoolColor::Blue).await.unwrap();
        assert_eq!(outcome, PromoteOutcome::AlreadyActive);
        assert_eq!(router.switch_count(), 0);
    }

    #[tokio::test]
    async fn test_traffic_cannot_share_production_pool() {
        let router = router(PoolColor::Green);
        let err = router.bind_test_traffic(PoolColor::Green).await.unwrap_err();
        assert_eq!(err, RoutingError::SamePool(PoolColor::Green));
    }

    #[tokio::test]
    async fn unknown_pool_is_rejected() {
        let router = InMemoryRouter::new(
            vec![PoolDescriptor {
                color: PoolColor::Blue,
                address: "blue".into(),
            }],
            Listener::production(80),
            None,
            PoolColor::Blue,
        );
        assert_eq!(
            router.promote(PoolColor::Green).await.unwrap_err(),
            RoutingError::UnknownPool(PoolColor::Green)
        );
        assert_eq!(
            router.inactive_pool().await.unwrap_err(),
            RoutingError::UnknownPool(PoolColor::Green)
        );
        assert_eq!(router.pool(PoolColor::Blue).map(|p| p.address), Some("blue".into()));
        assert!(router.pool(PoolColor::Green).is_none());
    }

    #[tokio::test]
    async fn unbound_production_means_uninitialized() {
        let router = router(PoolColor::Blue);
        router.force_bindings(ListenerBindings::default());
        assert_eq!(
            router.active_pool().await.unwrap_err(),
            RoutingError::Uninitialized
        );
    }

    #[tokio::test]
    async fn outage_is_transient_and_runs_out() {
        let router = router(PoolColor::Blue);
        router.inject_outage(1);
        let err = router.promote(PoolColor::Green).await.unwrap_err();
        assert!(err.is_transient());
        assert!(router.promote(PoolColor::Green).await.is_ok());
    }
}
