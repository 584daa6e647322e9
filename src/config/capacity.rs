// ABOUTME: Capacity provider strategy for the cluster the pools run on.
// ABOUTME: Replicas may only be scheduled once a weighted provider is associated.

use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityProvider {
    pub name: String,
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub base: u32,
}

impl CapacityProvider {
    pub fn new(name: &str, weight: u32) -> Self {
        Self {
            name: name.to_string(),
            weight,
            base: 0,
        }
    }
}

pub fn default_capacity_providers() -> NonEmpty<CapacityProvider> {
    let mut providers = NonEmpty::new(CapacityProvider::new("FARGATE", 1));
    providers.push(CapacityProvider::new("FARGATE_SPOT", 0));
    providers
}

/// True if at least one provider would actually receive replicas.
pub fn has_weighted_provider(providers: &NonEmpty<CapacityProvider>) -> bool {
    providers.iter().any(|p| p.weight > 0 || p.base > 0)
}
