//! Output persistence collaborators.
//!
//! The engine saves every accepted (and every refined) step output through
//! [`OutputPersistence::save`]. Failures are logged by the engine and never
//! stop a run.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors returned by persistence backends.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid step id for storage: {0}")]
    InvalidStepId(String),

    #[error("Persistence error: {0}")]
    Other(String),
}

/// Stores step outputs.
#[async_trait]
pub trait OutputPersistence: Send + Sync {
    async fn save(&self, step_id: &str, content: &str) -> Result<(), PersistError>;
}

/// Keeps outputs in memory; mostly useful for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    saved: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<String>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest content saved for `step_id`.
    pub async fn get(&self, step_id: &str) -> Option<String> {
        self.saved.lock().await.get(step_id).cloned()
    }

    /// Step ids in the order their saves happened, repeats included.
    pub async fn write_log(&self) -> Vec<String> {
        self.writes.lock().await.clone()
    }
}

#[async_trait]
impl OutputPersistence for InMemoryPersistence {
    async fn save(&self, step_id: &str, content: &str) -> Result<(), PersistError> {
        self.saved
            .lock()
            .await
            .insert(step_id.to_string(), content.to_string());
        self.writes.lock().await.push(step_id.to_string());
        Ok(())
    }
}

/// Writes each step's output to `<dir>/<step_id>.<extension>`.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    dir: PathBuf,
    extension: String,
}

impl FilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extension: "md".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the output of `step_id` is written to.
    pub fn path_for(&self, step_id: &str) -> Result<PathBuf, PersistError> {
        let valid = !step_id.is_empty()
            && step_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !step_id.starts_with('.');
        if !valid {
            return Err(PersistError::InvalidStepId(step_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.{}", step_id, self.extension)))
    }
}

#[async_trait]
impl OutputPersistence for FilePersistence {
    async fn save(&self, step_id: &str, content: &str) -> Result<(), PersistError> {
        let path = self.path_for(step_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, content).await?;
        tracing::debug!(step_id = %step_id, path = %path.display(), "Step output written");
        Ok(())
    }
}
