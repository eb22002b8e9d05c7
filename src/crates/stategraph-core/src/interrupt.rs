//! Interrupt controller: the per-thread suspension state machine
//!
//! ```text
//!            run                    ctx.interrupt(payload)
//!   New ───────────► Running ─────────────────────────────► Suspended
//!                     │  ▲                                      │
//!                     │  └──────────── resume(value) ───────────┘
//!                     ▼
//!                 Completed ──── run(input) ───► Running   (new turn)
//! ```
//!
//! The status of a thread is derived from its latest checkpoint alone. A suspended thread
//! is a checkpoint with an [`Interrupt`] attached; nothing about it lives in memory, so a
//! thread suspended before a restart is resumed from the store after it.

use crate::error::{GraphError, Result};
use serde_json::Value;
use stategraph_checkpoint::{
    Checkpoint, CheckpointId, CheckpointSaver, CheckpointWrites, Interrupt, PendingWrite,
};
use std::sync::Arc;

/// A suspension point reached inside a node
#[derive(Debug, Clone, PartialEq)]
pub struct Suspension {
    pub node: String,
    pub payload: Value,
    /// Answers consumed by earlier suspension points of this node execution
    pub resume_values: Vec<Value>,
}

impl Suspension {
    pub(crate) fn into_interrupt(self) -> Interrupt {
        Interrupt::new(self.node, self.payload).with_resume_values(self.resume_values)
    }
}

/// Lifecycle state of a thread
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadStatus {
    /// No checkpoint exists
    New,
    /// Nodes are scheduled
    Running { next: Vec<String> },
    /// Waiting for a resume value
    Suspended { node: String, payload: Value },
    /// Reached END
    Completed,
}

impl ThreadStatus {
    pub fn of(latest: Option<&Checkpoint>) -> Self {
        match latest {
            None => ThreadStatus::New,
            Some(checkpoint) => match &checkpoint.interrupt {
                Some(interrupt) => ThreadStatus::Suspended {
                    node: interrupt.node.clone(),
                    payload: interrupt.payload.clone(),
                },
                None if checkpoint.pending_nodes.is_empty() => ThreadStatus::Completed,
                None => ThreadStatus::Running {
                    next: checkpoint.pending_nodes.clone(),
                },
            },
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, ThreadStatus::Suspended { .. })
    }
}

/// How a run call enters execution, decided from the latest checkpoint
#[derive(Debug)]
pub(crate) enum RunEntry {
    /// No checkpoint yet
    Fresh,
    /// Pending nodes run against the persisted snapshot
    Continue(Checkpoint),
    /// Re-run the suspended step, answering the next suspension point with `resume_values`
    Resume {
        checkpoint: Checkpoint,
        resume_values: Vec<Value>,
    },
    /// Completed thread given new input
    NewTurn(Checkpoint),
    /// Completed thread, nothing to do
    Finished(Checkpoint),
}

/// Decide how to enter a thread.
///
/// A resume value requires a pending interrupt; a suspended thread only accepts a resume.
pub(crate) fn plan(
    thread_id: &str,
    latest: Option<Checkpoint>,
    has_input: bool,
    resume: Option<Value>,
) -> Result<RunEntry> {
    match (latest, resume) {
        (Some(checkpoint), Some(value)) => match &checkpoint.interrupt {
            Some(interrupt) => {
                let mut resume_values = interrupt.resume_values.clone();
                resume_values.push(value);
                Ok(RunEntry::Resume {
                    checkpoint,
                    resume_values,
                })
            }
            None => Err(GraphError::NoPendingInterrupt {
                thread_id: thread_id.to_string(),
            }),
        },
        (None, Some(_)) => Err(GraphError::NoPendingInterrupt {
            thread_id: thread_id.to_string(),
        }),
        (Some(checkpoint), None) => {
            if let Some(interrupt) = &checkpoint.interrupt {
                return Err(GraphError::InterruptPending {
                    thread_id: thread_id.to_string(),
                    node: interrupt.node.clone(),
                });
            }
            if !checkpoint.pending_nodes.is_empty() {
                if has_input {
                    tracing::warn!(
                        thread_id = %thread_id,
                        checkpoint_id = checkpoint.id,
                        "Thread has pending nodes; ignoring new input"
                    );
                }
                Ok(RunEntry::Continue(checkpoint))
            } else if has_input {
                Ok(RunEntry::NewTurn(checkpoint))
            } else {
                Ok(RunEntry::Finished(checkpoint))
            }
        }
        (None, None) => Ok(RunEntry::Fresh),
    }
}

/// Reads and records suspensions through a checkpoint saver
#[derive(Clone)]
pub struct InterruptController {
    saver: Arc<dyn CheckpointSaver>,
}

impl InterruptController {
    pub fn new(saver: Arc<dyn CheckpointSaver>) -> Self {
        Self { saver }
    }

    pub async fn status(&self, thread_id: &str) -> Result<ThreadStatus> {
        let latest = self.saver.latest(thread_id).await?;
        Ok(ThreadStatus::of(latest.as_ref()))
    }

    /// The unresolved interrupt of a thread, if any
    pub async fn pending(&self, thread_id: &str) -> Result<Option<Interrupt>> {
        Ok(self
            .saver
            .latest(thread_id)
            .await?
            .and_then(|checkpoint| checkpoint.interrupt))
    }

    /// Attach a suspension and the completed sibling writes to `checkpoint_id`
    pub async fn suspend(
        &self,
        thread_id: &str,
        checkpoint_id: CheckpointId,
        suspension: Suspension,
        pending_writes: Vec<PendingWrite>,
    ) -> Result<Interrupt> {
        let interrupt = suspension.into_interrupt();
        self.saver
            .put_writes(
                thread_id,
                checkpoint_id,
                CheckpointWrites {
                    pending_writes,
                    interrupt: Some(interrupt.clone()),
                },
            )
            .await?;

        tracing::info!(
            thread_id = %thread_id,
            checkpoint_id,
            node = %interrupt.node,
            "Thread suspended"
        );
        Ok(interrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stategraph_checkpoint::{InMemoryCheckpointSaver, StateValues};

    fn pending(nodes: &[&str]) -> Checkpoint {
        Checkpoint::new(
            StateValues::new(),
            nodes.iter().map(|node| node.to_string()).collect(),
        )
    }

    fn suspended(resume_values: Vec<Value>) -> Checkpoint {
        let mut checkpoint = pending(&["review"]);
        checkpoint.interrupt = Some(
            Interrupt::new("review", json!({"ask": "approve?"})).with_resume_values(resume_values),
        );
        checkpoint
    }

    #[test]
    fn test_status_transitions() {
        assert_eq!(ThreadStatus::of(None), ThreadStatus::New);
        assert_eq!(
            ThreadStatus::of(Some(&pending(&["a"]))),
            ThreadStatus::Running {
                next: vec!["a".to_string()]
            }
        );
        assert!(ThreadStatus::of(Some(&suspended(vec![]))).is_suspended());
        assert_eq!(ThreadStatus::of(Some(&pending(&[]))), ThreadStatus::Completed);
    }

    #[test]
    fn test_resume_requires_interrupt() {
        let err = plan("t1", None, false, Some(json!(true))).unwrap_err();
        assert!(matches!(err, GraphError::NoPendingInterrupt { thread_id } if thread_id == "t1"));

        let err = plan("t1", Some(pending(&[])), false, Some(json!(true))).unwrap_err();
        assert!(matches!(err, GraphError::NoPendingInterrupt { .. }));
    }

    #[test]
    fn test_resume_appends_answer() {
        let entry = plan("t1", Some(suspended(vec![json!(1)])), false, Some(json!(2))).unwrap();
        match entry {
            RunEntry::Resume { resume_values, .. } => {
                assert_eq!(resume_values, vec![json!(1), json!(2)])
            }
            other => panic!("unexpected entry: {other:?}"),
        }
    }

    #[test]
    fn test_continue_on_suspended_thread_fails() {
        let err = plan("t1", Some(suspended(vec![])), true, None).unwrap_err();
        assert!(matches!(err, GraphError::InterruptPending { node, .. } if node == "review"));
    }

    #[test]
    fn test_entry_selection() {
        assert!(matches!(plan("t", None, true, None).unwrap(), RunEntry::Fresh));
        assert!(matches!(
            plan("t", Some(pending(&["a"])), true, None).unwrap(),
            RunEntry::Continue(_)
        ));
        assert!(matches!(
            plan("t", Some(pending(&[])), true, None).unwrap(),
            RunEntry::NewTurn(_)
        ));
        assert!(matches!(
            plan("t", Some(pending(&[])), false, None).unwrap(),
            RunEntry::Finished(_)
        ));
    }

    #[tokio::test]
    async fn test_controller_suspend_and_pending() {
        let saver = Arc::new(InMemoryCheckpointSaver::new());
        let controller = InterruptController::new(saver.clone());
        let id = saver.append("t1", pending(&["review"])).await.unwrap();

        assert!(controller.pending("t1").await.unwrap().is_none());

        let suspension = Suspension {
            node: "review".to_string(),
            payload: json!({"ask": "approve?"}),
            resume_values: vec![],
        };
        controller
            .suspend("t1", id, suspension, vec![PendingWrite::update("audit", json!({}))])
            .await
            .unwrap();

        let interrupt = controller.pending("t1").await.unwrap().unwrap();
        assert_eq!(interrupt.payload, json!({"ask": "approve?"}));
        assert!(controller.status("t1").await.unwrap().is_suspended());
        assert_eq!(saver.latest("t1").await.unwrap().unwrap().pending_writes.len(), 1);
    }
}
