// ABOUTME: Test support utilities.
// ABOUTME: Builds a deployment group over the in-memory router and simulated scheduler.

use std::sync::{Arc, Once};

use verdigris::config::{Config, TaskSpec};
use verdigris::deploy::Orchestrator;
use verdigris::group::DeploymentGroup;
use verdigris::router::InMemoryRouter;
use verdigris::scheduler::SimulatedScheduler;
use verdigris::store::MemoryStore;
use verdigris::types::{GroupName, ImageRef, PoolColor};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("verdigris=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Template configuration for the `book-service` group.
#[allow(dead_code)]
pub fn config() -> Config {
    let mut config = Config::template();
    config.group = GroupName::new("book-service").unwrap();
    config.repository = "book-service".to_string();
    config
}

#[allow(dead_code)]
pub fn image(tag: &str) -> ImageRef {
    ImageRef::from_parts(None, "book-service", tag).unwrap()
}

#[allow(dead_code)]
pub fn spec(tag: &str) -> TaskSpec {
    TaskSpec::for_image(image(tag))
}

/// A group whose blue pool serves `v1` in production.
#[allow(dead_code)]
pub struct Harness {
    pub config: Config,
    pub router: Arc<InMemoryRouter>,
    pub scheduler: Arc<SimulatedScheduler>,
    pub store: Arc<MemoryStore>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(config: Config) -> Self {
        init_tracing();
        let router = Arc::new(InMemoryRouter::from_config(&config, PoolColor::Blue));
        let scheduler = Arc::new(SimulatedScheduler::new(&config.health_check));
        scheduler.seed_running(PoolColor::Blue, spec("v1"), config.replicas);
        Self {
            config,
            router,
            scheduler,
            store: Arc::new(MemoryStore::default()),
        }
    }

    pub fn group(&self) -> DeploymentGroup {
        DeploymentGroup::from_config(&self.config, self.router.clone(), self.scheduler.clone())
            .unwrap()
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.group()).with_store(self.store.clone())
    }

    pub fn production(&self) -> Option<PoolColor> {
        self.router.current_bindings().production
    }
}
