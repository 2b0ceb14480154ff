//! Durable, file-backed memory backend (C1). Persists one `(workflow_id,
//! agent_name)` log and one artifact key/value map per workflow as JSON on
//! disk, matching the logical schema of spec §6: `memory_entries(workflow_id,
//! agent_name, seq, kind, content, created_at)` and `artifacts(workflow_id,
//! key, value, updated_at)`.
//!
//! Layout under `base_dir`: `<workflow_id>.log.json` (ordered entries) and
//! `<workflow_id>.artifacts.json` (key/value map). Writes are read-modify-
//! write against the whole workflow file; callers serialize per-stream
//! writes above this backend (see `conductor_memory::SimpleMemory`), so two
//! concurrent appends to the same stream never race on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conductor_core::{ConductorError, ConductorResult, MemoryBackend, MemoryEntry, MemoryEntryKind, MemoryQuery};
use tokio::sync::RwLock;

#[derive(Default, Clone)]
struct WorkflowState {
    streams: HashMap<String, Vec<MemoryEntry>>,
    artifacts: HashMap<String, serde_json::Value>,
}

/// Persistent JSON-file memory backend. Stores all memory entries for a
/// workflow under `base_dir`, keeping an in-process cache so repeated reads
/// don't round-trip through disk.
pub struct FileBackend {
    base_dir: PathBuf,
    cache: Arc<RwLock<HashMap<String, WorkflowState>>>,
    max_entries_per_stream: Option<usize>,
}

fn log_path(base_dir: &Path, workflow_id: &str) -> PathBuf {
    base_dir.join(format!("{workflow_id}.log.json"))
}

fn artifacts_path(base_dir: &Path, workflow_id: &str) -> PathBuf {
    base_dir.join(format!("{workflow_id}.artifacts.json"))
}

impl FileBackend {
    /// Creates a backend rooted at `base_dir`, with no per-stream entry cap.
    pub async fn new(base_dir: impl Into<PathBuf>) -> ConductorResult<Self> {
        Self::with_max_entries(base_dir, None).await
    }

    /// Creates a backend that trims each `(workflow, agent)` stream to the
    /// most recent `max_entries` entries (by `seq`) after every append.
    pub async fn with_max_entries(
        base_dir: impl Into<PathBuf>,
        max_entries: Option<usize>,
    ) -> ConductorResult<Self> {
        let base_dir = base_dir.into();
        tokio::fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| ConductorError::internal(format!("failed to create {}: {e}", base_dir.display())))?;
        Ok(Self {
            base_dir,
            cache: Arc::new(RwLock::new(HashMap::new())),
            max_entries_per_stream: max_entries,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    async fn load(&self, workflow_id: &str) -> ConductorResult<()> {
        {
            let cache = self.cache.read().await;
            if cache.contains_key(workflow_id) {
                return Ok(());
            }
        }

        let log = log_path(&self.base_dir, workflow_id);
        let streams: HashMap<String, Vec<MemoryEntry>> = if log.exists() {
            let content = tokio::fs::read_to_string(&log)
                .await
                .map_err(|e| ConductorError::internal(format!("failed to read {}: {e}", log.display())))?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                let flat: Vec<MemoryEntry> = serde_json::from_str(&content)?;
                let mut map: HashMap<String, Vec<MemoryEntry>> = HashMap::new();
                for entry in flat {
                    map.entry(entry.agent_name.clone()).or_default().push(entry);
                }
                for stream in map.values_mut() {
                    stream.sort_by_key(|e| e.seq);
                }
                map
            }
        } else {
            HashMap::new()
        };

        let artifacts_file = artifacts_path(&self.base_dir, workflow_id);
        let artifacts: HashMap<String, serde_json::Value> = if artifacts_file.exists() {
            let content = tokio::fs::read_to_string(&artifacts_file)
                .await
                .map_err(|e| ConductorError::internal(format!("failed to read {}: {e}", artifacts_file.display())))?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            HashMap::new()
        };

        let mut cache = self.cache.write().await;
        cache
            .entry(workflow_id.to_string())
            .or_insert(WorkflowState { streams, artifacts });
        Ok(())
    }

    async fn persist_log(&self, workflow_id: &str) -> ConductorResult<()> {
        let flat: Vec<MemoryEntry> = {
            let cache = self.cache.read().await;
            let Some(state) = cache.get(workflow_id) else {
                return Ok(());
            };
            let mut all: Vec<MemoryEntry> = state.streams.values().flat_map(|s| s.iter().cloned()).collect();
            all.sort_by(|a, b| (a.agent_name.as_str(), a.seq).cmp(&(b.agent_name.as_str(), b.seq)));
            all
        };
        let content = serde_json::to_string_pretty(&flat)?;
        tokio::fs::write(log_path(&self.base_dir, workflow_id), content)
            .await
            .map_err(ConductorError::from)
    }

    async fn persist_artifacts(&self, workflow_id: &str) -> ConductorResult<()> {
        let map = {
            let cache = self.cache.read().await;
            cache.get(workflow_id).map(|s| s.artifacts.clone()).unwrap_or_default()
        };
        let content = serde_json::to_string_pretty(&map)?;
        tokio::fs::write(artifacts_path(&self.base_dir, workflow_id), content)
            .await
            .map_err(ConductorError::from)
    }
}

#[async_trait]
impl MemoryBackend for FileBackend {
    async fn append(
        &self,
        workflow_id: &str,
        agent_name: &str,
        kind: MemoryEntryKind,
        content: &str,
    ) -> ConductorResult<u64> {
        self.load(workflow_id).await?;
        let seq = {
            let mut cache = self.cache.write().await;
            let state = cache.entry(workflow_id.to_string()).or_default();
            let stream = state.streams.entry(agent_name.to_string()).or_default();
            let seq = stream.len() as u64;
            stream.push(MemoryEntry::new(workflow_id, agent_name, seq, kind, content));
            if let Some(max) = self.max_entries_per_stream {
                if stream.len() > max {
                    let excess = stream.len() - max;
                    stream.drain(0..excess);
                }
            }
            seq
        };
        self.persist_log(workflow_id).await?;
        Ok(seq)
    }

    async fn read(
        &self,
        workflow_id: &str,
        agent_name: &str,
        query: MemoryQuery,
    ) -> ConductorResult<Vec<MemoryEntry>> {
        self.load(workflow_id).await?;
        let cache = self.cache.read().await;
        let Some(state) = cache.get(workflow_id) else {
            return Ok(Vec::new());
        };
        let Some(stream) = state.streams.get(agent_name) else {
            return Ok(Vec::new());
        };
        Ok(query.apply(stream).to_vec())
    }

    async fn put_artifact(
        &self,
        workflow_id: &str,
        key: &str,
        value: serde_json::Value,
    ) -> ConductorResult<()> {
        self.load(workflow_id).await?;
        {
            let mut cache = self.cache.write().await;
            let state = cache.entry(workflow_id.to_string()).or_default();
            state.artifacts.insert(key.to_string(), value);
        }
        self.persist_artifacts(workflow_id).await
    }

    async fn get_artifact(
        &self,
        workflow_id: &str,
        key: &str,
    ) -> ConductorResult<Option<serde_json::Value>> {
        self.load(workflow_id).await?;
        let cache = self.cache.read().await;
        Ok(cache.get(workflow_id).and_then(|s| s.artifacts.get(key).cloned()))
    }

    async fn snapshot(&self, workflow_id: &str) -> ConductorResult<Vec<MemoryEntry>> {
        self.load(workflow_id).await?;
        let cache = self.cache.read().await;
        let Some(state) = cache.get(workflow_id) else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<MemoryEntry> = state.streams.values().flat_map(|s| s.iter().cloned()).collect();
        entries.sort_by(|a, b| (a.agent_name.as_str(), a.seq).cmp(&(b.agent_name.as_str(), b.seq)));
        Ok(entries)
    }

    async fn expire(&self, older_than: DateTime<Utc>) -> ConductorResult<usize> {
        let workflow_ids: Vec<String> = {
            let cache = self.cache.read().await;
            cache.keys().cloned().collect()
        };
        let mut removed = 0usize;
        for workflow_id in workflow_ids {
            let mut touched = false;
            {
                let mut cache = self.cache.write().await;
                if let Some(state) = cache.get_mut(&workflow_id) {
                    for stream in state.streams.values_mut() {
                        let before = stream.len();
                        stream.retain(|e| e.created_at >= older_than);
                        removed += before - stream.len();
                        if before != stream.len() {
                            touched = true;
                        }
                    }
                }
            }
            if touched {
                self.persist_log(&workflow_id).await?;
            }
        }
        Ok(removed)
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
        self.load(workflow_id).await?;
        let seq = {
            let mut cache = self.cache.write().await;
            let state = cache.entry(workflow_id.to_string()).or_default();
            let stream = state.streams.entry(agent_name.to_string()).or_default();
            let seq = stream.len() as u64;
            stream.push(MemoryEntry::new(workflow_id, agent_name, seq, kind, content));
            if let Some(max) = self.max_entries_per_stream {
                if stream.len() > max {
                    let excess = stream.len() - max;
                    stream.drain(0..excess);
                }
            }
            state.artifacts.insert(artifact_key.to_string(), artifact_value);
            seq
        };
        // Both files are rewritten before returning, so a reload after a
        // crash between these two writes sees either neither update or both.
        self.persist_log(workflow_id).await?;
        self.persist_artifacts(workflow_id).await?;
        Ok(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn append_then_read_round_trips_through_a_fresh_backend() {
        let dir = tempdir().unwrap();
        {
            let backend = FileBackend::new(dir.path()).await.unwrap();
            backend.append("wf", "agent", MemoryEntryKind::UserTurn, "hi").await.unwrap();
            backend.append("wf", "agent", MemoryEntryKind::AgentTurn, "hello").await.unwrap();
        }

        let backend = FileBackend::new(dir.path()).await.unwrap();
        let entries = backend.read("wf", "agent", MemoryQuery::all()).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, 0);
        assert_eq!(entries[1].content, "hello");
    }

    #[tokio::test]
    async fn artifacts_persist_across_backend_instances() {
        let dir = tempdir().unwrap();
        {
            let backend = FileBackend::new(dir.path()).await.unwrap();
            backend.put_artifact("wf", "k", serde_json::json!({"v": 1})).await.unwrap();
        }
        let backend = FileBackend::new(dir.path()).await.unwrap();
        assert_eq!(
            backend.get_artifact("wf", "k").await.unwrap(),
            Some(serde_json::json!({"v": 1}))
        );
    }

    #[tokio::test]
    async fn max_entries_trims_oldest_per_stream() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::with_max_entries(dir.path(), Some(2)).await.unwrap();
        for i in 0..5 {
            backend
                .append("wf", "agent", MemoryEntryKind::System, &format!("{i}"))
                .await
                .unwrap();
        }
        let entries = backend.read("wf", "agent", MemoryQuery::all()).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].content, "3");
        assert_eq!(entries[1].content, "4");
    }

    #[tokio::test]
    async fn append_and_put_artifact_persists_both_to_disk() {
        let dir = tempdir().unwrap();
        {
            let backend = FileBackend::new(dir.path()).await.unwrap();
            backend
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
        }
        let backend = FileBackend::new(dir.path()).await.unwrap();
        let entries = backend.read("wf", "agent", MemoryQuery::all()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            backend.get_artifact("wf", "stage-a").await.unwrap(),
            Some(serde_json::json!("final output"))
        );
    }

    #[tokio::test]
    async fn expire_drops_entries_older_than_cutoff() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path()).await.unwrap();
        backend.append("wf", "agent", MemoryEntryKind::System, "old").await.unwrap();
        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let removed = backend.expire(cutoff).await.unwrap();
        assert_eq!(removed, 1);
        assert!(backend.read("wf", "agent", MemoryQuery::all()).await.unwrap().is_empty());
    }
}
