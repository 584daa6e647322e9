// ABOUTME: Container image references as produced by the artifact source.
// ABOUTME: Parses `[registry/]repository[:tag][@digest]` and pins digests.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character {0:?} in image reference")]
    InvalidChar(char),

    #[error("image reference has an empty {0}")]
    EmptyComponent(&'static str),

    #[error("digest must look like `algorithm:hex`, got {0}")]
    InvalidDigest(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    registry: Option<String>,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    /// Build a reference from an already-split repository and tag.
    pub fn from_parts(
        registry: Option<&str>,
        repository: &str,
        tag: &str,
    ) -> Result<Self, ParseImageRefError> {
        let joined = match registry {
            Some(registry) => format!("{registry}/{repository}:{tag}"),
            None => format!("{repository}:{tag}"),
        };
        Self::parse(&joined)
    }

    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }
        if let Some(c) = input
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || "/:.-_@".contains(*c)))
        {
            return Err(ParseImageRefError::InvalidChar(c));
        }

        let (rest, digest) = match input.split_once('@') {
            Some((rest, digest)) => {
                let valid = digest
                    .split_once(':')
                    .is_some_and(|(algo, hex)| !algo.is_empty() && !hex.is_empty());
                if !valid {
                    return Err(ParseImageRefError::InvalidDigest(digest.to_string()));
                }
                (rest, Some(digest.to_string()))
            }
            None => (input, None),
        };

        // A colon after the last slash separates the tag; earlier colons
        // belong to a registry port.
        let last_slash = rest.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (path, tag) = match rest[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                let tag = &rest[split + 1..];
                if tag.is_empty() {
                    return Err(ParseImageRefError::EmptyComponent("tag"));
                }
                (&rest[..split], Some(tag.to_string()))
            }
            None => (rest, None),
        };

        let (registry, repository) = match path.split_once('/') {
            Some((first, remainder))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), remainder.to_string())
            }
            _ => (None, path.to_string()),
        };
        if repository.is_empty() || repository.split('/').any(str::is_empty) {
            return Err(ParseImageRefError::EmptyComponent("repository"));
        }

        let tag = match (&tag, &digest) {
            (None, None) => Some("latest".to_string()),
            _ => tag,
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Pin this reference to a resolved content digest.
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{registry}/")?;
        }
        f.write_str(&self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

impl Serialize for ImageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ImageRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ImageRef::parse(&s).map_err(serde::de::Error::custom)
    }
}
