// ABOUTME: Application-wide error types for verdigris.
// ABOUTME: Covers configuration loading and CLI-level failures.

use std::path::PathBuf;
use thiserror::Error;

use crate::deploy::DeployError;
use crate::group::GroupError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Group(#[from] GroupError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error("deployment {id} finished as {outcome}: {reason}")]
    DeploymentUnsuccessful {
        id: String,
        outcome: String,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    Artifact(#[from] crate::artifact::ArtifactError),
}

pub type Result<T> = std::result::Result<T, Error>;
