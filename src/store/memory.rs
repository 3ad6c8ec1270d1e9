use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ArtifactStore, Checkpoint, CheckpointStore, StoreError};
use crate::artifact::Artifact;

/// In-memory store for artifacts and checkpoints. Cloning shares state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    artifacts: Arc<RwLock<HashMap<String, Vec<Artifact>>>>,
    checkpoints: Arc<RwLock<HashMap<String, Checkpoint>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn put(&self, session_id: &str, artifact: &Artifact) -> Result<(), StoreError> {
        let mut artifacts = self.artifacts.write().await;
        artifacts
            .entry(session_id.to_string())
            .or_default()
            .push(artifact.clone());
        Ok(())
    }

    async fn get_all(&self, session_id: &str) -> Result<Vec<Artifact>, StoreError> {
        let artifacts = self.artifacts.read().await;
        Ok(artifacts.get(session_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.insert(checkpoint.session_id().to_string(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(session_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactContent, ArtifactKind, RequirementAnalysis};
    use crate::task::TaskList;

    fn analysis(id: &str, summary: &str) -> Artifact {
        Artifact::new(
            id,
            ArtifactContent::Analysis(RequirementAnalysis {
                summary: summary.to_string(),
                key_points: vec![],
            }),
            1,
        )
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = MemoryStore::new();
        store.put("s1", &analysis("a1", "one")).await.unwrap();
        store.put("s1", &analysis("a2", "two")).await.unwrap();
        store.put("s2", &analysis("b1", "other")).await.unwrap();

        assert_eq!(store.get_all("s1").await.unwrap().len(), 2);
        assert_eq!(store.get_all("s2").await.unwrap().len(), 1);
        assert!(store.get_all("s3").await.unwrap().is_empty());

        let latest = store
            .get_latest_by_type("s1", ArtifactKind::Analysis)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, "a2");
    }

    #[tokio::test]
    async fn test_checkpoint_last_write_wins() {
        let store = MemoryStore::new();
        let mut list = TaskList::new("s1", "topic", vec![]);
        store.save(&Checkpoint::new(list.clone(), vec![])).await.unwrap();

        list.topic = "updated".to_string();
        store.save(&Checkpoint::new(list, vec![])).await.unwrap();

        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.task_list.topic, "updated");
        assert!(store.load("missing").await.unwrap().is_none());
    }
}
