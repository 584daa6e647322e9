// ABOUTME: Deployment history persistence behind a narrow store trait.
// ABOUTME: Ships an in-memory store and an append-only JSON-lines file store.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::deploy::DeploymentRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn save_deployment_record(&self, record: &DeploymentRecord) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<DeploymentRecord>>,
}

impl MemoryStore {
    pub fn records(&self) -> Vec<DeploymentRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn save_deployment_record(&self, record: &DeploymentRecord) -> Result<(), StoreError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// One JSON document per line, appended as deployments finish.
#[derive(Debug, Clone)]
pub struct JsonLinesStore {
    path: PathBuf,
}

impl JsonLinesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record; a missing file is an empty history.
    pub fn read_all(&self) -> Result<Vec<DeploymentRecord>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl DeploymentStore for JsonLinesStore {
    async fn save_deployment_record(&self, record: &DeploymentRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
