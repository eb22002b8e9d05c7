//! Error types for graph construction and execution
//!
//! Every failed run surfaces as a [`GraphError`]; a suspended run is not an error and is
//! reported through [`RunOutcome::Interrupted`](crate::RunOutcome::Interrupted).
//!
//! # Error Categories
//!
//! - **Construction**: `Validation`, `Configuration`
//! - **Execution**: `NodeExecution`, `InvalidRoute`, `RecursionLimit`
//! - **Interrupts**: `NoPendingInterrupt`, `InterruptPending`, `DuplicateInterrupt`, `MultipleInterrupts`
//! - **Persistence**: `StorageUnavailable`, `Store`, `SchemaMismatch`
//! - **State**: `State`
//! - **System**: `Serialization`, `Io`
//!
//! # Matching Errors
//!
//! ```rust
//! use stategraph_core::error::GraphError;
//!
//! fn describe(err: &GraphError) -> String {
//!     match err {
//!         GraphError::NoPendingInterrupt { thread_id } => format!("{thread_id} is not waiting"),
//!         GraphError::SchemaMismatch { detail, .. } => format!("migrate: {detail}"),
//!         err if err.is_storage_unavailable() => "retry later".to_string(),
//!         other => other.to_string(),
//!     }
//! }
//! ```

use crate::interrupt::Suspension;
use crate::state::StateError;
use crate::store::StoreError;
use stategraph_checkpoint::CheckpointError;
use thiserror::Error;

/// Convenience result type using [`GraphError`]
pub type Result<T> = std::result::Result<T, GraphError>;

/// Error type for all graph operations
#[derive(Error, Debug)]
pub enum GraphError {
    /// Graph structure validation failed
    ///
    /// Occurs during compilation when an edge references an unknown node, the graph
    /// has no entry point, or a conditional edge declares no candidates.
    #[error("Graph validation failed: {0}")]
    Validation(String),

    /// A node returned an error during its step
    ///
    /// With the propagate policy the run aborts and no checkpoint is written for the
    /// step, so a retry resumes from the prior checkpoint.
    #[error("Node '{node}' execution failed: {error}")]
    NodeExecution {
        /// Name of the node that failed
        node: String,
        /// Error message from node execution
        error: String,
    },

    /// A routing decision selected a node outside the declared candidate set
    #[error("Node '{node}' routed to '{target}', which is not one of its declared destinations {allowed:?}")]
    InvalidRoute {
        node: String,
        target: String,
        allowed: Vec<String>,
    },

    /// A resume targeted a thread that has no unresolved interrupt
    #[error("Thread '{thread_id}' has no pending interrupt to resume")]
    NoPendingInterrupt { thread_id: String },

    /// A continue call targeted a suspended thread; it must be resumed instead
    #[error("Thread '{thread_id}' is suspended at node '{node}' and must be resumed with a value")]
    InterruptPending { thread_id: String, node: String },

    /// A node requested a second suspension before the first was resolved
    #[error("Node '{node}' requested a second interrupt before the first was resumed")]
    DuplicateInterrupt { node: String },

    /// Several nodes of the same step requested a suspension
    #[error("Nodes {nodes:?} requested interrupts in the same step; a thread holds at most one")]
    MultipleInterrupts { nodes: Vec<String> },

    /// The checkpoint store failed; the thread's history is unchanged
    #[error("Checkpoint storage unavailable: {0}")]
    StorageUnavailable(#[from] CheckpointError),

    /// The memory store failed
    #[error("Memory store error: {0}")]
    Store(#[from] StoreError),

    /// A persisted snapshot is incompatible with the current field declarations
    #[error("Snapshot of thread '{thread_id}' does not match the state schema: {detail}")]
    SchemaMismatch { thread_id: String, detail: String },

    /// A state update could not be applied
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// A single call executed more steps than allowed
    #[error("Recursion limit of {limit} steps reached without completing")]
    RecursionLimit { limit: usize },

    /// Engine configuration is invalid or could not be loaded
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised by [`NodeContext::interrupt`](crate::NodeContext::interrupt) to unwind a node
    /// at its suspension point. Nodes propagate it with `?`.
    #[error("Interrupt requested in node '{}'", .0.node)]
    NodeInterrupt(Suspension),
}

impl GraphError {
    /// Create a node execution error
    pub fn node_execution(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            error: error.into(),
        }
    }

    /// Create a schema mismatch error
    pub fn schema_mismatch(thread_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            thread_id: thread_id.into(),
            detail: detail.into(),
        }
    }

    /// True for failures of the checkpoint or memory store medium
    pub fn is_storage_unavailable(&self) -> bool {
        match self {
            GraphError::StorageUnavailable(err) => err.is_storage_failure(),
            GraphError::Store(err) => err.is_storage_failure(),
            _ => false,
        }
    }
}
