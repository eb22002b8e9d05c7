//! Core checkpoint data structures
//!
//! A [`Checkpoint`] is one persisted execution instant of a thread: the full state
//! snapshot, the nodes scheduled to run next, and at most one pending [`Interrupt`].
//!
//! ```text
//! thread "t1"
//!   #1  input   values={counter:0}  pending=[increment]
//!   #2  loop    values={counter:1}  pending=[review]
//!   #3  loop    values={counter:1}  pending=[review]   interrupt={node:review, payload:{ask:"approve?"}}
//!   #4  loop    values={...}        pending=[]          (terminal)
//! ```
//!
//! Checkpoints are immutable once appended, with one exception: the suspension
//! annotations ([`Checkpoint::interrupt`] and [`Checkpoint::pending_writes`]) are attached
//! to the checkpoint at which a node suspended, through
//! [`CheckpointSaver::put_writes`](crate::traits::CheckpointSaver::put_writes).
//! The snapshot, pending nodes and metadata never change after the append.
//!
//! # Suspension state
//!
//! Everything needed to resume a suspended thread lives on the checkpoint itself:
//!
//! - [`Interrupt::payload`] is the value the node surfaced, stored as-is so the caller
//!   receives a structurally identical payload after a restart.
//! - [`Interrupt::resume_values`] holds answers already delivered to earlier suspension
//!   points of the same node execution, replayed in order when the node re-runs.
//! - [`PendingWrite`]s are the results of sibling nodes in the same step that completed
//!   before the suspension; they are merged once the suspended node finishes so those
//!   siblings do not run twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Identifier of a checkpoint, strictly increasing within a thread and starting at 1
pub type CheckpointId = i64;

/// Field name to value mapping persisted as the state snapshot
pub type StateValues = serde_json::Map<String, Value>;

/// Metadata source type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Checkpoint created from the input of a run
    Input,
    /// Checkpoint created by the executor after a step
    Loop,
    /// Checkpoint created from a manual state update or cancellation
    Update,
}

/// Metadata associated with a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointMetadata {
    /// The source of the checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// The step number of the checkpoint
    /// -1 for the first "input" checkpoint
    /// 0 for the first "loop" checkpoint
    /// n for the nth checkpoint afterwards
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<i32>,

    /// Updates written by each node during the step that produced this checkpoint
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub writes: BTreeMap<String, Value>,

    /// Additional custom metadata
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl CheckpointMetadata {
    /// Create a new checkpoint metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source
    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the step number
    pub fn with_step(mut self, step: i32) -> Self {
        self.step = Some(step);
        self
    }

    /// Record the update a node wrote in this step
    pub fn with_write(mut self, node: impl Into<String>, update: Value) -> Self {
        self.writes.insert(node.into(), update);
        self
    }

    /// Add custom metadata
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A suspension request recorded against a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interrupt {
    /// Unique id of this suspension
    pub id: String,

    /// Node that requested the suspension
    pub node: String,

    /// Opaque payload surfaced to the caller
    pub payload: Value,

    /// Answers already delivered to earlier suspension points of the same node execution
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resume_values: Vec<Value>,

    /// When the suspension was recorded
    pub created_at: DateTime<Utc>,
}

impl Interrupt {
    /// Create an interrupt raised by `node` with `payload`
    pub fn new(node: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            node: node.into(),
            payload,
            resume_values: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach answers that were consumed before this suspension
    pub fn with_resume_values(mut self, resume_values: Vec<Value>) -> Self {
        self.resume_values = resume_values;
        self
    }
}

/// Result of a node that completed in a step that was later suspended by a sibling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingWrite {
    /// Node that produced the write
    pub node: String,

    /// Partial state update, `Value::Null` when the node wrote nothing
    #[serde(default)]
    pub update: Value,

    /// Explicit routing directive, `None` when the node's edges decide
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goto: Option<Vec<String>>,
}

impl PendingWrite {
    /// A plain state update
    pub fn update(node: impl Into<String>, update: Value) -> Self {
        Self {
            node: node.into(),
            update,
            goto: None,
        }
    }

    /// A routing directive with an optional update
    pub fn goto(node: impl Into<String>, update: Value, goto: Vec<String>) -> Self {
        Self {
            node: node.into(),
            update,
            goto: Some(goto),
        }
    }
}

/// Suspension annotations attached to an existing checkpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckpointWrites {
    /// Sibling results to apply when the step completes
    pub pending_writes: Vec<PendingWrite>,

    /// The pending interrupt, `None` clears it
    pub interrupt: Option<Interrupt>,
}

/// State snapshot at a given point in time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// The version of the checkpoint format (currently 1)
    pub v: i32,

    /// Thread this checkpoint belongs to
    pub thread_id: String,

    /// Assigned by the saver on append; 0 before that
    pub id: CheckpointId,

    /// The checkpoint this one was derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CheckpointId>,

    /// Full state snapshot
    pub values: StateValues,

    /// Nodes scheduled to run next; empty means terminal
    #[serde(default)]
    pub pending_nodes: Vec<String>,

    /// Field name to merge strategy fingerprint, fixed for the lifetime of a thread
    #[serde(default)]
    pub schema: BTreeMap<String, String>,

    /// At most one unresolved interrupt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<Interrupt>,

    /// Completed sibling results of a suspended step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_writes: Vec<PendingWrite>,

    /// Checkpoint metadata
    #[serde(default)]
    pub metadata: CheckpointMetadata,

    /// When the checkpoint was created
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Current checkpoint format version
    pub const CURRENT_VERSION: i32 = 1;

    /// Create a checkpoint that has not been appended yet
    pub fn new(values: StateValues, pending_nodes: Vec<String>) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            thread_id: String::new(),
            id: 0,
            parent_id: None,
            values,
            pending_nodes,
            schema: BTreeMap::new(),
            interrupt: None,
            pending_writes: Vec::new(),
            metadata: CheckpointMetadata::default(),
            created_at: Utc::now(),
        }
    }

    /// Create an empty terminal checkpoint
    pub fn empty() -> Self {
        Self::new(StateValues::new(), Vec::new())
    }

    /// Set the schema fingerprint
    pub fn with_schema(mut self, schema: BTreeMap<String, String>) -> Self {
        self.schema = schema;
        self
    }

    /// Set the metadata
    pub fn with_metadata(mut self, metadata: CheckpointMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// True when no nodes are scheduled and nothing is pending
    pub fn is_terminal(&self) -> bool {
        self.pending_nodes.is_empty() && self.interrupt.is_none()
    }

    /// True when an unresolved interrupt is recorded
    pub fn is_suspended(&self) -> bool {
        self.interrupt.is_some()
    }

    /// Apply suspension annotations in place
    pub fn apply_writes(&mut self, writes: CheckpointWrites) {
        self.pending_writes = writes.pending_writes;
        self.interrupt = writes.interrupt;
    }
}

/// Options for listing a thread's checkpoints, newest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    /// Only checkpoints with an id strictly lower than this
    pub before: Option<CheckpointId>,

    /// Maximum number of checkpoints to yield
    pub limit: Option<usize>,

    /// Rows fetched from storage per round trip
    pub page_size: usize,
}

impl ListOptions {
    /// Default number of rows fetched per page
    pub const DEFAULT_PAGE_SIZE: usize = 50;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_before(mut self, before: CheckpointId) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            before: None,
            limit: None,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }
}

/// Summary of a stored thread, enough for external retention tooling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadInfo {
    pub thread_id: String,
    pub checkpoint_count: usize,
    pub latest_checkpoint_id: CheckpointId,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checkpoint_creation() {
        let checkpoint = Checkpoint::empty();
        assert_eq!(checkpoint.v, Checkpoint::CURRENT_VERSION);
        assert_eq!(checkpoint.id, 0);
        assert!(checkpoint.values.is_empty());
        assert!(checkpoint.is_terminal());
        assert!(!checkpoint.is_suspended());
    }

    #[test]
    fn test_checkpoint_metadata() {
        let metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Input)
            .with_step(-1)
            .with_write("increment", json!({"counter": 1}))
            .with_extra("key", json!("value"));

        assert_eq!(metadata.source, Some(CheckpointSource::Input));
        assert_eq!(metadata.step, Some(-1));
        assert_eq!(metadata.writes.get("increment"), Some(&json!({"counter": 1})));
        assert_eq!(metadata.extra.get("key"), Some(&json!("value")));
    }

    #[test]
    fn test_suspended_checkpoint_is_not_terminal() {
        let mut checkpoint = Checkpoint::new(StateValues::new(), vec!["review".to_string()]);
        checkpoint.apply_writes(CheckpointWrites {
            pending_writes: vec![PendingWrite::update("audit", json!({"seen": true}))],
            interrupt: Some(Interrupt::new("review", json!({"ask": "approve?"}))),
        });

        assert!(checkpoint.is_suspended());
        assert!(!checkpoint.is_terminal());
        assert_eq!(checkpoint.pending_writes.len(), 1);
    }

    #[test]
    fn test_interrupt_payload_survives_serialization() {
        let payload = json!({"ask": "approve?", "details": {"zeta": 1, "alpha": [1, 2.5, null]}});
        let interrupt = Interrupt::new("review", payload.clone())
            .with_resume_values(vec![json!("first answer")]);

        let bytes = serde_json::to_vec(&interrupt).unwrap();
        let restored: Interrupt = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(restored, interrupt);
        assert_eq!(
            serde_json::to_string(&restored.payload).unwrap(),
            serde_json::to_string(&payload).unwrap()
        );
    }

    #[test]
    fn test_list_options_page_size_floor() {
        let options = ListOptions::new().with_page_size(0).with_limit(3);
        assert_eq!(options.page_size, 1);
        assert_eq!(options.limit, Some(3));
    }
}
