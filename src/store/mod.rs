//! Persistence contracts for artifacts and task-list checkpoints.
//!
//! Both stores are keyed by session id. Artifacts are append-only from the
//! orchestrator's point of view; checkpoints are whole-document overwrites
//! where the last write wins.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::{Artifact, ArtifactKind};
use crate::task::TaskList;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid session id: {0}")]
    InvalidSession(String),
}

/// Snapshot of a run between two cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub task_list: TaskList,
    /// Every artifact produced so far, in write order
    pub artifacts: Vec<Artifact>,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(task_list: TaskList, artifacts: Vec<Artifact>) -> Self {
        Self {
            task_list,
            artifacts,
            saved_at: Utc::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.task_list.session_id
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Append an artifact to the session.
    async fn put(&self, session_id: &str, artifact: &Artifact) -> Result<(), StoreError>;

    /// All artifacts of the session, in write order.
    async fn get_all(&self, session_id: &str) -> Result<Vec<Artifact>, StoreError>;

    /// Last-written artifact of `kind`.
    async fn get_latest_by_type(
        &self,
        session_id: &str,
        kind: ArtifactKind,
    ) -> Result<Option<Artifact>, StoreError> {
        let all = self.get_all(session_id).await?;
        Ok(all.into_iter().rev().find(|a| a.kind() == kind))
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Overwrite the checkpoint of `checkpoint.task_list.session_id`.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    /// Latest checkpoint for the session, if any was saved.
    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, StoreError>;
}

/// Session ids become directory names, so keep them to a safe alphabet.
pub(crate) fn validate_session_id(session_id: &str) -> Result<(), StoreError> {
    let ok = !session_id.is_empty()
        && session_id.len() <= 128
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && session_id != "."
        && session_id != "..";
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidSession(session_id.to_string()))
    }
}
