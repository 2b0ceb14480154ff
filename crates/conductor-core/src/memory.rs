// Memory Store types (C1). Concrete backends live in the `conductor-memory`
// crate; this module only defines the shared vocabulary: entries, queries,
// and the `MemoryBackend` trait backends implement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConductorResult;

/// Discriminates what produced a `MemoryEntry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum MemoryEntryKind {
    UserTurn,
    AgentTurn,
    ToolCall,
    ToolResult,
    System,
}

/// A single append-only record in a `(workflowId, agentName)` stream.
/// `seq` is strictly increasing and gap-free within that stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub workflow_id: String,
    pub agent_name: String,
    pub seq: u64,
    pub kind: MemoryEntryKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(
        workflow_id: impl Into<String>,
        agent_name: impl Into<String>,
        seq: u64,
        kind: MemoryEntryKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            agent_name: agent_name.into(),
            seq,
            kind,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// A bounded read over one `(workflowId, agentName)` stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryQuery {
    /// Return only the last N entries in ascending `seq`. `None` means all.
    pub last_n: Option<usize>,
}

impl MemoryQuery {
    pub fn all() -> Self {
        Self { last_n: None }
    }

    pub fn last(n: usize) -> Self {
        Self { last_n: Some(n) }
    }

    /// Applies the window to an already-ordered slice of entries.
    pub fn apply<'a>(&self, entries: &'a [MemoryEntry]) -> &'a [MemoryEntry] {
        match self.last_n {
            Some(n) if n < entries.len() => &entries[entries.len() - n..],
            _ => entries,
        }
    }
}

/// The durable backend `Memory` delegates to. Implementations must serialize
/// writes to the same `(workflow_id, agent_name)` stream and must never
/// renumber or mutate an already-persisted entry.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Atomically assigns the next `seq` for `(workflow_id, agent_name)` and
    /// appends the entry, returning the assigned `seq`.
    async fn append(
        &self,
        workflow_id: &str,
        agent_name: &str,
        kind: MemoryEntryKind,
        content: &str,
    ) -> ConductorResult<u64>;

    /// Reads entries for `(workflow_id, agent_name)` in ascending `seq`,
    /// windowed by `query`.
    async fn read(
        &self,
        workflow_id: &str,
        agent_name: &str,
        query: MemoryQuery,
    ) -> ConductorResult<Vec<MemoryEntry>>;

    /// Last-writer-wins artifact write, serialized per `(workflow_id, key)`.
    async fn put_artifact(
        &self,
        workflow_id: &str,
        key: &str,
        value: serde_json::Value,
    ) -> ConductorResult<()>;

    async fn get_artifact(
        &self,
        workflow_id: &str,
        key: &str,
    ) -> ConductorResult<Option<serde_json::Value>>;

    /// Stable ordered snapshot across all agents in a workflow, tie-broken by
    /// `(agent_name, seq)`.
    async fn snapshot(&self, workflow_id: &str) -> ConductorResult<Vec<MemoryEntry>>;

    /// Drops entries and artifacts older than `older_than` across all
    /// workflows the backend knows about. Caller-invoked, not self-scheduled.
    async fn expire(&self, older_than: DateTime<Utc>) -> ConductorResult<usize>;

    /// Appends a turn and writes an artifact as one transaction: a crash
    /// between the two never leaves only one of them durable. Implementors
    /// must perform both under a single internal lock acquisition rather
    /// than sequencing independent `append`/`put_artifact` calls.
    async fn append_and_put_artifact(
        &self,
        workflow_id: &str,
        agent_name: &str,
        kind: MemoryEntryKind,
        content: &str,
        artifact_key: &str,
        artifact_value: serde_json::Value,
    ) -> ConductorResult<u64>;
}

/// The facade agents and the engine use. A thin wrapper over `MemoryBackend`
/// that exists so call sites name Memory Store operations the way §4.1
/// names them (`append`/`read`/`putArtifact`/`getArtifact`) rather than the
/// backend's own method names.
#[async_trait]
pub trait Memory: Send + Sync {
    async fn append(
        &self,
        workflow_id: &str,
        agent_name: &str,
        kind: MemoryEntryKind,
        content: &str,
    ) -> ConductorResult<u64>;

    async fn read(
        &self,
        workflow_id: &str,
        agent_name: &str,
        last_n: Option<usize>,
    ) -> ConductorResult<Vec<MemoryEntry>>;

    async fn put_artifact(
        &self,
        workflow_id: &str,
        key: &str,
        value: serde_json::Value,
    ) -> ConductorResult<()>;

    async fn get_artifact(
        &self,
        workflow_id: &str,
        key: &str,
    ) -> ConductorResult<Option<serde_json::Value>>;

    async fn snapshot(&self, workflow_id: &str) -> ConductorResult<Vec<MemoryEntry>>;

    async fn expire(&self, older_than: DateTime<Utc>) -> ConductorResult<usize>;

    /// The transactional `(append turn, write artifact)` pair a stage's
    /// completion needs (§4.1's single-stage transaction boundary).
    async fn append_and_put_artifact(
        &self,
        workflow_id: &str,
        agent_name: &str,
        kind: MemoryEntryKind,
        content: &str,
        artifact_key: &str,
        artifact_value: serde_json::Value,
    ) -> ConductorResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_query_windows_to_last_n() {
        let entries: Vec<MemoryEntry> = (0..5)
            .map(|i| MemoryEntry::new("wf", "agent", i, MemoryEntryKind::AgentTurn, format!("{i}")))
            .collect();
        let windowed = MemoryQuery::last(2).apply(&entries);
        assert_eq!(windowed.len(), 2);
        assert_eq!(windowed[0].seq, 3);
        assert_eq!(windowed[1].seq, 4);
    }

    #[test]
    fn memory_query_all_returns_everything() {
        let entries: Vec<MemoryEntry> = (0..3)
            .map(|i| MemoryEntry::new("wf", "agent", i, MemoryEntryKind::System, "x"))
            .collect();
        assert_eq!(MemoryQuery::all().apply(&entries).len(), 3);
    }
}
