// ABOUTME: Artifact source contract: turns a repository and tag into a pinned image reference.
// ABOUTME: Includes a static in-memory registry for simulations and tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::types::{ImageRef, ParseImageRefError};

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("image {repository}:{tag} not found")]
    NotFound { repository: String, tag: String },

    #[error(transparent)]
    InvalidReference(#[from] ParseImageRefError),
}

#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn resolve_image(&self, repository: &str, tag: &str) -> Result<ImageRef, ArtifactError>;
}

/// Registry contents fixed up front: `(repository, tag) -> digest`.
#[derive(Debug, Default)]
pub struct StaticArtifactSource {
    registry: Option<String>,
    images: RwLock<HashMap<(String, String), String>>,
}

impl StaticArtifactSource {
    pub fn new(registry: Option<&str>) -> Self {
        Self {
            registry: registry.map(str::to_string),
            images: RwLock::new(HashMap::new()),
        }
    }

    pub fn publish(&self, repository: &str, tag: &str, digest: &str) {
        self.images.write().insert(
            (repository.to_string(), tag.to_string()),
            digest.to_string(),
        );
    }
}

#[async_trait]
impl ArtifactSource for StaticArtifactSource {
    async fn resolve_image(&self, repository: &str, tag: &str) -> Result<ImageRef, ArtifactError> {
        let digest = self
            .images
            .read()
            .get(&(repository.to_string(), tag.to_string()))
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound {
                repository: repository.to_string(),
                tag: tag.to_string(),
            })?;

        let image = ImageRef::from_parts(self.registry.as_deref(), repository, tag)?;
        Ok(image.with_digest(digest))
    }
}
