// ABOUTME: Phantom-typed identifiers for compile-time type safety.
// ABOUTME: Keeps deployment IDs and replica IDs from being swapped.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Marker types for phantom type parameters.
pub enum DeploymentMarker {}
pub enum ReplicaMarker {}

/// A string identifier tagged with the kind of thing it names.
#[must_use = "IDs reference resources and should not be ignored"]
pub struct Id<T> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl Id<DeploymentMarker> {
    /// Generate a fresh deployment ID of the form `d-<32 hex chars>`.
    pub fn generate() -> Self {
        Self::new(format!("d-{}", uuid::Uuid::new_v4().simple()))
    }
}

// T is only a marker, so these impls must not require bounds on it.

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.value).finish()
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

pub type DeploymentId = Id<DeploymentMarker>;
pub type ReplicaId = Id<ReplicaMarker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_deployment_ids_are_unique() {
        let a = DeploymentId::generate();
        let b = DeploymentId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("d-"));
        assert_eq!(a.as_str().len(), 34);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = ReplicaId::new("green-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"green-1\"");
    }
}
