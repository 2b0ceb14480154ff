//! Ephemeral, process-local memory backend (C1). Cleared on restart; used as
//! the default backend when no durable store is configured.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conductor_core::{ConductorResult, MemoryBackend, MemoryEntry, MemoryEntryKind, MemoryQuery};
use tokio::sync::RwLock;

#[derive(Default)]
struct WorkflowState {
    /// `(agent_name, seq)` ordered per agent stream.
    streams: HashMap<String, Vec<MemoryEntry>>,
    artifacts: HashMap<String, serde_json::Value>,
}

/// `HashMap`-backed `MemoryBackend` with no persistence. Writes to the same
/// `(workflow_id, agent_name)` stream are serialized by a per-workflow lock;
/// reads are non-blocking relative to other workflows.
#[derive(Default, Clone)]
pub struct InMemoryBackend {
    workflows: Arc<RwLock<HashMap<String, WorkflowState>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    async fn append(
        &self,
        workflow_id: &str,
        agent_name: &str,
        kind: MemoryEntryKind,
        content: &str,
    ) -> ConductorResult<u64> {
        let mut workflows = self.workflows.write().await;
        let state = workflows.entry(workflow_id.to_string()).or_default();
        let stream = state.streams.entry(agent_name.to_string()).or_default();
        let seq = stream.len() as u64;
        stream.push(MemoryEntry::new(workflow_id, agent_name, seq, kind, content));
        Ok(seq)
    }

    async fn read(
        &self,
        workflow_id: &str,
        agent_name: &str,
        query: MemoryQuery,
    ) -> ConductorResult<Vec<MemoryEntry>> {
        let workflows = self.workflows.read().await;
        let Some(state) = workflows.get(workflow_id) else {
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
        let mut workflows = self.workflows.write().await;
        let state = workflows.entry(workflow_id.to_string()).or_default();
        state.artifacts.insert(key.to_string(), value);
        Ok(())
    }

    async fn get_artifact(
        &self,
        workflow_id: &str,
        key: &str,
    ) -> ConductorResult<Option<serde_json::Value>> {
        let workflows = self.workflows.read().await;
        Ok(workflows
            .get(workflow_id)
            .and_then(|state| state.artifacts.get(key).cloned()))
    }

    async fn snapshot(&self, workflow_id: &str) -> ConductorResult<Vec<MemoryEntry>> {
        let workflows = self.workflows.read().await;
        let Some(state) = workflows.get(workflow_id) else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<MemoryEntry> = state
            .streams
            .values()
            .flat_map(|stream| stream.iter().cloned())
            .collect();
        entries.sort_by(|a, b| (a.agent_name.as_str(), a.seq).cmp(&(b.agent_name.as_str(), b.seq)));
        Ok(entries)
    }

    async fn expire(&self, older_than: DateTime<Utc>) -> ConductorResult<usize> {
        let mut workflows = self.workflows.write().await;
        let mut removed = 0usize;
        for state in workflows.values_mut() {
            for stream in state.streams.values_mut() {
                let before = stream.len();
                stream.retain(|entry| entry.created_at >= older_than);
                removed += before - stream.len();
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
        let mut workflows = self.workflows.write().await;
        let state = workflows.entry(workflow_id.to_string()).or_default();
        let stream = state.streams.entry(agent_name.to_string()).or_default();
        let seq = stream.len() as u64;
        stream.push(MemoryEntry::new(workflow_id, agent_name, seq, kind, content));
        state.artifacts.insert(artifact_key.to_string(), artifact_value);
        Ok(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_assigns_gap_free_sequence() {
        let backend = InMemoryBackend::new();
        let s0 = backend.append("wf", "agent", MemoryEntryKind::UserTurn, "hi").await.unwrap();
        let s1 = backend.append("wf", "agent", MemoryEntryKind::AgentTurn, "hello").await.unwrap();
        assert_eq!(s0, 0);
        assert_eq!(s1, 1);
    }

    #[tokio::test]
    async fn read_windows_to_last_n() {
        let backend = InMemoryBackend::new();
        for i in 0..5 {
            backend
                .append("wf", "agent", MemoryEntryKind::System, &format!("{i}"))
                .await
                .unwrap();
        }
        let last_two = backend.read("wf", "agent", MemoryQuery::last(2)).await.unwrap();
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].seq, 3);
        assert_eq!(last_two[1].seq, 4);
    }

    #[tokio::test]
    async fn artifacts_are_last_writer_wins() {
        let backend = InMemoryBackend::new();
        backend.put_artifact("wf", "k", serde_json::json!(1)).await.unwrap();
        backend.put_artifact("wf", "k", serde_json::json!(2)).await.unwrap();
        assert_eq!(
            backend.get_artifact("wf", "k").await.unwrap(),
            Some(serde_json::json!(2))
        );
    }

    #[tokio::test]
    async fn snapshot_orders_by_agent_then_seq() {
        let backend = InMemoryBackend::new();
        backend.append("wf", "b", MemoryEntryKind::System, "b0").await.unwrap();
        backend.append("wf", "a", MemoryEntryKind::System, "a0").await.unwrap();
        backend.append("wf", "a", MemoryEntryKind::System, "a1").await.unwrap();
        let snap = backend.snapshot("wf").await.unwrap();
        let names: Vec<_> = snap.iter().map(|e| (e.agent_name.as_str(), e.seq)).collect();
        assert_eq!(names, vec![("a", 0), ("a", 1), ("b", 0)]);
    }

    #[tokio::test]
    async fn append_and_put_artifact_records_both_under_one_write() {
        let backend = InMemoryBackend::new();
        let seq = backend
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
        let entries = backend.read("wf", "agent", MemoryQuery::all()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            backend.get_artifact("wf", "stage-a").await.unwrap(),
            Some(serde_json::json!("final output"))
        );
    }

    #[tokio::test]
    async fn unknown_workflow_reads_as_empty() {
        let backend = InMemoryBackend::new();
        assert!(backend
            .read("missing", "agent", MemoryQuery::all())
            .await
            .unwrap()
            .is_empty());
    }
}
