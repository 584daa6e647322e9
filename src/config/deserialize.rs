// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Gives list-shaped settings clearer errors than the derived impls.

use nonempty::NonEmpty;
use serde::Deserialize;

use super::CapacityProvider;

pub fn deserialize_capacity_providers<'de, D>(
    deserializer: D,
) -> Result<NonEmpty<CapacityProvider>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<ProviderEntry> = Vec::deserialize(deserializer)?;
    let providers: Vec<CapacityProvider> = values.into_iter().map(Into::into).collect();

    NonEmpty::from_vec(providers)
        .ok_or_else(|| serde::de::Error::custom("at least one capacity provider is required"))
}

/// Providers may be written as a bare name (weight 1) or in full.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProviderEntry {
    Simple(String),
    Detailed(CapacityProvider),
}

impl From<ProviderEntry> for CapacityProvider {
    fn from(entry: ProviderEntry) -> Self {
        match entry {
            ProviderEntry::Simple(name) => CapacityProvider::new(&name, 1),
            ProviderEntry::Detailed(provider) => provider,
        }
    }
}
