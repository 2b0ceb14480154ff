//! Concrete `MemoryBackend` implementations (C1).

#[cfg(feature = "file-backend")]
pub mod file;
#[cfg(feature = "memory")]
pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conductor_core::{ConductorResult, Memory, MemoryBackend, MemoryEntry, MemoryEntryKind};
use tokio::sync::Mutex;

/// The `Memory` facade agents and the execution engine call through (§4.1's
/// `append`/`read`/`putArtifact`/`getArtifact`/`snapshot`/`expire`). Wraps
/// any `MemoryBackend` and serializes writes to the same `(workflow_id,
/// agent_name)` stream with a per-stream lock, so a concurrent append from
/// two stages bound to the same agent never interleaves mid-write even
/// against a backend whose own locking is coarser.
pub struct SimpleMemory {
    backend: Arc<dyn MemoryBackend>,
    stream_locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl SimpleMemory {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self {
            backend,
            stream_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Ephemeral, process-local memory. Cleared on restart.
    #[cfg(feature = "memory")]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(memory::InMemoryBackend::new()))
    }

    /// Durable, file-backed memory rooted at `base_dir`.
    #[cfg(feature = "file-backend")]
    pub async fn file(base_dir: impl Into<std::path::PathBuf>) -> ConductorResult<Self> {
        Ok(Self::new(Arc::new(file::FileBackend::new(base_dir).await?)))
    }

    async fn lock_for(&self, workflow_id: &str, agent_name: &str) -> Arc<Mutex<()>> {
        let key = (workflow_id.to_string(), agent_name.to_string());
        let mut locks = self.stream_locks.lock().await;
        locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

#[async_trait]
impl Memory for SimpleMemory {
    async fn append(
        &self,
        workflow_id: &str,
        agent_name: &str,
        kind: MemoryEntryKind,
        content: &str,
    ) -> ConductorResult<u64> {
        let lock = self.lock_for(workflow_id, agent_name).await;
        let _guard = lock.lock().await;
        self.backend.append(workflow_id, agent_name, kind, content).await
    }

    async fn read(
        &self,
        workflow_id: &str,
        agent_name: &str,
        last_n: Option<usize>,
    ) -> ConductorResult<Vec<MemoryEntry>> {
        let query = match last_n {
            Some(n) => conductor_core::MemoryQuery::last(n),
            None => conductor_core::MemoryQuery::all(),
        };
        self.backend.read(workflow_id, agent_name, query).await
    }

    async fn put_artifact(
        &self,
        workflow_id: &str,
        key: &str,
        value: serde_json::Value,
    ) -> ConductorResult<()> {
        // Artifact writes are last-writer-wins and serialized per key by the
        // backend itself (in-process) or by single-writer-per-file semantics
        // (file backend); no additional lock needed here.
        self.backend.put_artifact(workflow_id, key, value).await
    }

    async fn get_artifact(
        &self,
        workflow_id: &str,
        key: &str,
    ) -> ConductorResult<Option<serde_json::Value>> {
        self.backend.get_artifact(workflow_id, key).await
    }

    async fn snapshot(&self, workflow_id: &str) -> ConductorResult<Vec<MemoryEntry>> {
        self.backend.snapshot(workflow_id).await
    }

    async fn expire(&self, older_than: DateTime<Utc>) -> ConductorResult<usize> {
        self.backend.expire(older_than).await
    }

    async fn append_and_put_artifact(
        &self,
        workflow_id: &str,
        agent_name: &str,
        kind: MemoryEntryKind,
        content: &str,
        artifact_key: &str,
        artifact_value: serde_json::Value,
    ) -> ConductorResult<u64> {
        let lock = self.lock_for(workflow_id, agent_name).await;
        let _guard = lock.lock().await;
        self.backend
            .append_and_put_artifact(workflow_id, agent_name, kind, content, artifact_key, artifact_value)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simple_memory_append_read_round_trips() {
        let memory = SimpleMemory::in_memory();
        memory.append("wf", "agent", MemoryEntryKind::UserTurn, "hi").await.unwrap();
        memory.append("wf", "agent", MemoryEntryKind::AgentTurn, "hello").await.unwrap();
        let entries = memory.read("wf", "agent", None).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, 0);
    }

    #[tokio::test]
    async fn simple_memory_append_and_put_artifact_is_visible_together() {
        let memory = SimpleMemory::in_memory();
        let seq = memory
            .append_and_put_artifact(
                "wf",
                "agent",
                MemoryEntryKind::AgentTurn,
                "final output",
                "stage-a",
                serde_json::json!("final output"),
            )
            .await
            .unwrap();
        assert_eq!(seq, 0);
        assert_eq!(memory.read("wf", "agent", None).await.unwrap().len(), 1);
        assert_eq!(
            memory.get_artifact("wf", "stage-a").await.unwrap(),
            Some(serde_json::json!("final output"))
        );
    }

    #[tokio::test]
    async fn simple_memory_concurrent_appends_stay_gap_free() {
        let memory = Arc::new(SimpleMemory::in_memory());
        let mut handles = Vec::new();
        for i in 0..20 {
            let memory = memory.clone();
            handles.push(tokio::spawn(async move {
                memory
                    .append("wf", "agent", MemoryEntryKind::AgentTurn, &format!("turn-{i}"))
                    .await
                    .unwrap()
            }));
        }
        let mut seqs: Vec<u64> = Vec::new();
        for h in handles {
            seqs.push(h.await.unwrap());
        }
        seqs.sort();
        let expected: Vec<u64> = (0..20).collect();
        assert_eq!(seqs, expected);
    }
}
