//! Control directives returned by nodes
//!
//! A node normally returns a partial state update and lets its outgoing edges pick the
//! next node. Returning a [`Command`] with a `goto` instead redirects execution to the
//! named node(s) directly, bypassing declared edges. This is how escalation patterns
//! such as "skip on rejection" are written:
//!
//! ```rust
//! use stategraph_core::{Command, NodeResult};
//! use serde_json::json;
//!
//! fn after_review(approved: bool) -> NodeResult {
//!     if approved {
//!         json!({"status": "approved"}).into()
//!     } else {
//!         Command::new()
//!             .with_update(json!({"status": "rejected"}))
//!             .with_goto("notify_rejection")
//!             .into()
//!     }
//! }
//! # assert!(after_review(false).has_goto());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Destination(s) of a [`Command`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum GotoTarget {
    Node(String),
    Nodes(Vec<String>),
}

impl GotoTarget {
    pub fn into_nodes(self) -> Vec<String> {
        match self {
            GotoTarget::Node(node) => vec![node],
            GotoTarget::Nodes(nodes) => nodes,
        }
    }
}

impl From<String> for GotoTarget {
    fn from(node: String) -> Self {
        GotoTarget::Node(node)
    }
}

impl From<&str> for GotoTarget {
    fn from(node: &str) -> Self {
        GotoTarget::Node(node.to_string())
    }
}

impl From<Vec<String>> for GotoTarget {
    fn from(nodes: Vec<String>) -> Self {
        GotoTarget::Nodes(nodes)
    }
}

impl From<Vec<&str>> for GotoTarget {
    fn from(nodes: Vec<&str>) -> Self {
        GotoTarget::Nodes(nodes.into_iter().map(str::to_string).collect())
    }
}

/// Optional update plus optional explicit routing
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Command {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub goto: Option<GotoTarget>,
}

impl Command {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_update(mut self, update: Value) -> Self {
        self.update = Some(update);
        self
    }

    pub fn with_goto(mut self, goto: impl Into<GotoTarget>) -> Self {
        self.goto = Some(goto.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.update.is_none() && self.goto.is_none()
    }
}
