//! Per-invocation node context
//!
//! Each node call receives a [`NodeContext`] carrying its thread and step, access to the
//! memory store, and the suspension primitive [`NodeContext::interrupt`].
//!
//! # Suspending
//!
//! ```rust,ignore
//! graph.add_node("review", |state, ctx: NodeContext| async move {
//!     let answer = ctx.interrupt(json!({"ask": "approve?"}))?;
//!     Ok(json!({"approved": answer["approved"]}))
//! });
//! ```
//!
//! The first time the node runs, `interrupt` returns `Err(GraphError::NodeInterrupt)`
//! and `?` unwinds the node. The executor records the payload on the current checkpoint
//! and returns control to the caller. When the thread is resumed the node runs again from
//! its start and the same call returns the resume value. Code before the call therefore
//! runs at least twice.

use crate::error::{GraphError, Result};
use crate::interrupt::Suspension;
use crate::store::BaseStore;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Progress {
    /// Next resume value to hand out
    cursor: usize,
    suspension: Option<Suspension>,
}

struct ContextInner {
    thread_id: String,
    node: String,
    step: i32,
    resume_values: Vec<Value>,
    progress: Mutex<Progress>,
    store: Option<Arc<dyn BaseStore>>,
}

/// Handle passed to every node invocation
#[derive(Clone)]
pub struct NodeContext {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("thread_id", &self.inner.thread_id)
            .field("node", &self.inner.node)
            .field("step", &self.inner.step)
            .field("resume_values", &self.inner.resume_values.len())
            .finish()
    }
}

impl NodeContext {
    pub fn new(thread_id: impl Into<String>, node: impl Into<String>, step: i32) -> Self {
        Self::build(thread_id.into(), node.into(), step, Vec::new(), None)
    }

    pub(crate) fn build(
        thread_id: String,
        node: String,
        step: i32,
        resume_values: Vec<Value>,
        store: Option<Arc<dyn BaseStore>>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                thread_id,
                node,
                step,
                resume_values,
                progress: Mutex::new(Progress::default()),
                store,
            }),
        }
    }

    /// Answer suspension points with `resume_values`, in order
    pub fn with_resume_values(self, resume_values: Vec<Value>) -> Self {
        let inner = &self.inner;
        Self::build(
            inner.thread_id.clone(),
            inner.node.clone(),
            inner.step,
            resume_values,
            inner.store.clone(),
        )
    }

    pub fn with_store(self, store: Arc<dyn BaseStore>) -> Self {
        let inner = &self.inner;
        Self::build(
            inner.thread_id.clone(),
            inner.node.clone(),
            inner.step,
            inner.resume_values.clone(),
            Some(store),
        )
    }

    pub fn thread_id(&self) -> &str {
        &self.inner.thread_id
    }

    pub fn node(&self) -> &str {
        &self.inner.node
    }

    pub fn step(&self) -> i32 {
        self.inner.step
    }

    /// True when this invocation re-runs a node that suspended earlier
    pub fn is_resuming(&self) -> bool {
        !self.inner.resume_values.is_empty()
    }

    pub fn store(&self) -> Option<&Arc<dyn BaseStore>> {
        self.inner.store.as_ref()
    }

    /// The memory store, or a configuration error when the graph was compiled without one
    pub fn require_store(&self) -> Result<&Arc<dyn BaseStore>> {
        self.store().ok_or_else(|| {
            GraphError::Configuration(format!(
                "Node '{}' needs a memory store but none is configured",
                self.inner.node
            ))
        })
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.inner
            .progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Suspend the thread with `payload`, or return the resume value answering this call.
    ///
    /// Calls are matched to resume values by order. Calling again after a suspension was
    /// requested in the same execution fails with [`GraphError::DuplicateInterrupt`].
    pub fn interrupt(&self, payload: Value) -> Result<Value> {
        let mut progress = self.progress();

        if progress.suspension.is_some() {
            return Err(GraphError::DuplicateInterrupt {
                node: self.inner.node.clone(),
            });
        }

        if let Some(value) = self.inner.resume_values.get(progress.cursor) {
            progress.cursor += 1;
            return Ok(value.clone());
        }

        let suspension = Suspension {
            node: self.inner.node.clone(),
            payload,
            resume_values: self.inner.resume_values[..progress.cursor].to_vec(),
        };
        progress.suspension = Some(suspension.clone());
        Err(GraphError::NodeInterrupt(suspension))
    }

    /// Suspension requested during this execution, even if the node swallowed the error
    pub(crate) fn take_suspension(&self) -> Option<Suspension> {
        self.progress().suspension.take()
    }
}
