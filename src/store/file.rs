//! JSON files on disk, one directory per session:
//!
//! ```text
//! {root}/{session_id}/checkpoint.json
//! {root}/{session_id}/artifacts.jsonl
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::{validate_session_id, ArtifactStore, Checkpoint, CheckpointStore, StoreError};
use crate::artifact::Artifact;

const CHECKPOINT_FILE: &str = "checkpoint.json";
const ARTIFACTS_FILE: &str = "artifacts.jsonl";

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a session's files.
    pub fn session_dir(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        validate_session_id(session_id)?;
        Ok(self.root.join(session_id))
    }

    async fn ensure_session_dir(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        let dir = self.session_dir(session_id)?;
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}

#[async_trait]
impl ArtifactStore for JsonFileStore {
    async fn put(&self, session_id: &str, artifact: &Artifact) -> Result<(), StoreError> {
        let dir = self.ensure_session_dir(session_id).await?;
        let mut line = serde_json::to_string(artifact)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(ARTIFACTS_FILE))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn get_all(&self, session_id: &str) -> Result<Vec<Artifact>, StoreError> {
        let path = self.session_dir(session_id)?.join(ARTIFACTS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let contents = tokio::fs::read_to_string(&path).await?;
        let mut artifacts = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            artifacts.push(serde_json::from_str(line)?);
        }
        Ok(artifacts)
    }
}

#[async_trait]
impl CheckpointStore for JsonFileStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let dir = self.ensure_session_dir(checkpoint.session_id()).await?;
        let contents = serde_json::to_string_pretty(checkpoint)?;

        // Write then rename so a crash never leaves a torn checkpoint.
        let tmp = dir.join(format!("{}.tmp", CHECKPOINT_FILE));
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, dir.join(CHECKPOINT_FILE)).await?;
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let path = self.session_dir(session_id)?.join(CHECKPOINT_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = tokio::fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&contents)?))
    }
}
