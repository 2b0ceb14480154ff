//! Conductor Memory - the durable Memory Store (C1).
//!
//! Two backend implementations:
//!
//! - [`InMemoryBackend`] - ephemeral, process-local, cleared on restart.
//! - [`FileBackend`] - durable JSON-file storage, one log + one artifact map
//!   per workflow.
//!
//! [`SimpleMemory`] is the facade the rest of Conductor calls through; it
//! wraps either backend and serializes writes to the same `(workflow_id,
//! agent_name)` stream.
//!
//! ```rust,no_run
//! use conductor_memory::SimpleMemory;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let memory = SimpleMemory::in_memory();
//! let memory = SimpleMemory::file("./workflow-memory").await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;

#[cfg(feature = "file-backend")]
pub use backend::file::FileBackend;
#[cfg(feature = "memory")]
pub use backend::memory::InMemoryBackend;
pub use backend::SimpleMemory;

pub use conductor_core::{Memory, MemoryBackend, MemoryEntry, MemoryEntryKind, MemoryQuery};
