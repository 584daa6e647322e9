// ABOUTME: Production and test listener configuration.
// ABOUTME: The test listener is optional and only used for pre-promotion verification.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenersConfig {
    #[serde(default = "default_production")]
    pub production: ListenerConfig,

    #[serde(default)]
    pub test: Option<ListenerConfig>,
}

fn default_production() -> ListenerConfig {
    ListenerConfig { port: 80 }
}

impl Default for ListenersConfig {
    fn default() -> Self {
        Self {
            production: default_production(),
            test: Some(ListenerConfig { port: 8080 }),
        }
    }
}
