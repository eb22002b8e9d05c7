//! Result and inspection types returned by [`CompiledGraph`](super::CompiledGraph)

use crate::error::Result;
use crate::interrupt::ThreadStatus;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde_json::Value;
use stategraph_checkpoint::{Checkpoint, CheckpointId, CheckpointMetadata, Interrupt};
use std::pin::Pin;

/// A suspension surfaced to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct InterruptInfo {
    pub thread_id: String,
    /// Checkpoint the interrupt is recorded against
    pub checkpoint_id: CheckpointId,
    pub interrupt_id: String,
    pub node: String,
    pub payload: Value,
}

impl InterruptInfo {
    pub(crate) fn new(thread_id: &str, checkpoint_id: CheckpointId, interrupt: Interrupt) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            checkpoint_id,
            interrupt_id: interrupt.id,
            node: interrupt.node,
            payload: interrupt.payload,
        }
    }
}

/// How a run call ended; failures are the `Err` side of the result
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The thread reached END; holds the final snapshot
    Completed(Value),
    /// A node suspended; resume the thread with a value
    Interrupted(InterruptInfo),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, RunOutcome::Interrupted(_))
    }

    /// Final snapshot of a completed run
    pub fn values(&self) -> Option<&Value> {
        match self {
            RunOutcome::Completed(values) => Some(values),
            RunOutcome::Interrupted(_) => None,
        }
    }

    pub fn interrupt(&self) -> Option<&InterruptInfo> {
        match self {
            RunOutcome::Completed(_) => None,
            RunOutcome::Interrupted(info) => Some(info),
        }
    }
}

/// Point-in-time view of a thread, built from one checkpoint
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub values: Value,
    /// Nodes scheduled next; empty once completed
    pub next: Vec<String>,
    pub interrupt: Option<Interrupt>,
    pub checkpoint_id: CheckpointId,
    pub parent_id: Option<CheckpointId>,
    pub metadata: CheckpointMetadata,
    pub created_at: DateTime<Utc>,
    pub status: ThreadStatus,
}

impl From<Checkpoint> for StateSnapshot {
    fn from(checkpoint: Checkpoint) -> Self {
        let status = ThreadStatus::of(Some(&checkpoint));
        Self {
            values: Value::Object(checkpoint.values),
            next: checkpoint.pending_nodes,
            interrupt: checkpoint.interrupt,
            checkpoint_id: checkpoint.id,
            parent_id: checkpoint.parent_id,
            metadata: checkpoint.metadata,
            created_at: checkpoint.created_at,
            status,
        }
    }
}

/// Lazy history, newest first
pub type StateSnapshotStream = Pin<Box<dyn Stream<Item = Result<StateSnapshot>> + Send>>;
