//! The step loop
//!
//! ```text
//! load latest ─► plan entry ─► ┌───────────────────── step ─────────────────────┐
//!                              │ spawn pending nodes (minus completed siblings) │
//!                              │ classify: update | suspension | failure        │
//!                              │   failure     ─► Err, nothing written          │
//!                              │   suspension  ─► put_writes, return Interrupted│
//!                              │   updates     ─► merge, route, append          │
//!                              └────────────── until no pending nodes ──────────┘
//! ```
//!
//! Nodes of one step see the same snapshot and their updates are merged afterwards. Two
//! nodes of the same step replacing the same replace-semantics field is a caller error:
//! which value survives is unspecified, and the executor only logs a warning. Use an
//! append field or a reducer for values several branches write.
//!
//! One checkpoint is appended per completed step. A step that fails writes nothing, so
//! the thread can be retried from the last checkpoint. A step that suspends writes nothing
//! new either: the interrupt and the results of its finished siblings are attached to the
//! checkpoint the step started from.

use super::{CompiledGraph, InterruptInfo, RunOutcome};
use crate::context::NodeContext;
use crate::error::{GraphError, Result};
use crate::graph::{dedupe_targets, FailurePolicy, START};
use crate::interrupt::{self, RunEntry, Suspension};
use crate::state::{MergeStrategy, StateSchema};
use serde_json::{json, Map, Value};
use stategraph_checkpoint::{Checkpoint, CheckpointMetadata, CheckpointSource, PendingWrite};
use std::collections::{HashMap, HashSet};

impl CompiledGraph {
    /// Start a thread, or start a new turn on a completed one, with `input`
    pub async fn invoke(&self, thread_id: &str, input: Value) -> Result<RunOutcome> {
        self.run(thread_id, Some(input), None).await
    }

    /// Answer the pending interrupt of a thread and continue it
    pub async fn resume(&self, thread_id: &str, value: Value) -> Result<RunOutcome> {
        self.run(thread_id, None, Some(value)).await
    }

    /// Continue a thread from its latest checkpoint without new input
    pub async fn continue_run(&self, thread_id: &str) -> Result<RunOutcome> {
        self.run(thread_id, None, None).await
    }

    /// Drive a thread until it completes, suspends or fails.
    ///
    /// - No checkpoint yet: `input` seeds the snapshot and the START successors run.
    /// - Pending nodes: they run against the persisted snapshot; `input` is ignored.
    /// - Completed thread with `input`: a new turn merges the input and starts over.
    /// - `resume`: requires a pending interrupt; the interrupted node runs again and its
    ///   suspension point returns the value.
    ///
    /// Parallel branches must not replace the same field in one step; the surviving value
    /// is unspecified.
    #[tracing::instrument(skip(self, input, resume), fields(resuming = resume.is_some()))]
    pub async fn run(
        &self,
        thread_id: &str,
        input: Option<Value>,
        resume: Option<Value>,
    ) -> Result<RunOutcome> {
        let latest = self.load_latest(thread_id).await?;

        let (checkpoint, resume_values) =
            match interrupt::plan(thread_id, latest, input.is_some(), resume)? {
                RunEntry::Fresh => (self.start_thread(thread_id, input.as_ref()).await?, Vec::new()),
                RunEntry::NewTurn(previous) => {
                    (self.start_turn(thread_id, previous, input.as_ref()).await?, Vec::new())
                }
                RunEntry::Continue(checkpoint) => (checkpoint, Vec::new()),
                RunEntry::Resume {
                    checkpoint,
                    resume_values,
                } => {
                    tracing::info!(
                        thread_id = %thread_id,
                        checkpoint_id = checkpoint.id,
                        "Resuming thread"
                    );
                    (checkpoint, resume_values)
                }
                RunEntry::Finished(checkpoint) => {
                    tracing::debug!(thread_id = %thread_id, "Thread already completed");
                    return Ok(RunOutcome::Completed(Value::Object(checkpoint.values)));
                }
            };

        self.execute(thread_id, checkpoint, resume_values).await
    }

    async fn start_thread(&self, thread_id: &str, input: Option<&Value>) -> Result<Checkpoint> {
        let values = self.schema.initial_state(input)?;
        let next = self.graph.route(START, &Value::Object(values.clone()))?;

        let mut metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Input)
            .with_step(-1);
        if let Some(input) = input {
            metadata = metadata.with_write(START, input.clone());
        }

        let checkpoint = Checkpoint::new(values, next)
            .with_schema(self.schema.fingerprint())
            .with_metadata(metadata);
        let checkpoint = self.commit(thread_id, checkpoint, None).await?;

        tracing::info!(thread_id = %thread_id, checkpoint_id = checkpoint.id, "Thread started");
        Ok(checkpoint)
    }

    async fn start_turn(
        &self,
        thread_id: &str,
        previous: Checkpoint,
        input: Option<&Value>,
    ) -> Result<Checkpoint> {
        let mut values = previous.values;
        let mut metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Input)
            .with_step(previous.metadata.step.unwrap_or(-1) + 1);

        if let Some(input) = input {
            self.schema.apply(&mut values, input)?;
            metadata = metadata.with_write(START, input.clone());
        }
        let next = self.graph.route(START, &Value::Object(values.clone()))?;

        let checkpoint = Checkpoint::new(values, next)
            .with_schema(self.schema.fingerprint())
            .with_metadata(metadata);
        let checkpoint = self.commit(thread_id, checkpoint, Some(previous.id)).await?;

        tracing::info!(thread_id = %thread_id, checkpoint_id = checkpoint.id, "New turn started");
        Ok(checkpoint)
    }

    async fn execute(
        &self,
        thread_id: &str,
        mut current: Checkpoint,
        mut resume_values: Vec<Value>,
    ) -> Result<RunOutcome> {
        let mut steps = 0usize;

        loop {
            if current.pending_nodes.is_empty() {
                tracing::info!(
                    thread_id = %thread_id,
                    checkpoint_id = current.id,
                    "Thread completed"
                );
                return Ok(RunOutcome::Completed(Value::Object(current.values)));
            }

            if steps >= self.execution.max_steps {
                tracing::warn!(
                    thread_id = %thread_id,
                    limit = self.execution.max_steps,
                    "Recursion limit reached"
                );
                return Err(GraphError::RecursionLimit {
                    limit: self.execution.max_steps,
                });
            }
            steps += 1;

            let step = current.metadata.step.unwrap_or(-1) + 1;
            tracing::debug!(
                thread_id = %thread_id,
                checkpoint_id = current.id,
                step,
                nodes = ?current.pending_nodes,
                "Executing step"
            );

            let (writes, suspension) = self
                .run_step(thread_id, &current, step, std::mem::take(&mut resume_values))
                .await?;

            if let Some(suspension) = suspension {
                let checkpoint_id = current.id;
                let interrupt = self
                    .interrupts
                    .suspend(thread_id, checkpoint_id, suspension, writes)
                    .await?;
                return Ok(RunOutcome::Interrupted(InterruptInfo::new(
                    thread_id,
                    checkpoint_id,
                    interrupt,
                )));
            }

            let next = self.apply_step(thread_id, current, step, writes).await?;
            current = next;
        }
    }

    /// Run the nodes of one step concurrently and collect their writes.
    ///
    /// Nodes whose write is already recorded on the checkpoint do not run again. Returns
    /// the writes in scheduling order and at most one suspension.
    async fn run_step(
        &self,
        thread_id: &str,
        current: &Checkpoint,
        step: i32,
        mut resume_values: Vec<Value>,
    ) -> Result<(Vec<PendingWrite>, Option<Suspension>)> {
        let completed: HashSet<&str> = current
            .pending_writes
            .iter()
            .map(|write| write.node.as_str())
            .collect();
        let suspended_node = current.interrupt.as_ref().map(|i| i.node.as_str());
        let snapshot = Value::Object(current.values.clone());

        let mut contexts = Vec::new();
        let mut handles = Vec::new();
        for node in &current.pending_nodes {
            if completed.contains(node.as_str()) {
                continue;
            }
            let spec = self.graph.nodes.get(node).ok_or_else(|| {
                GraphError::Validation(format!("Checkpoint schedules unknown node '{}'", node))
            })?;

            let node_resume = if suspended_node == Some(node.as_str()) {
                std::mem::take(&mut resume_values)
            } else {
                Vec::new()
            };
            let ctx = NodeContext::build(
                thread_id.to_string(),
                node.clone(),
                step,
                node_resume,
                self.store.clone(),
            );

            let executor = spec.executor.clone();
            let state = snapshot.clone();
            let task_ctx = ctx.clone();
            handles.push(tokio::spawn(async move { executor(state, task_ctx).await }));
            contexts.push((node.clone(), ctx));
        }

        let results = futures::future::join_all(handles).await;

        let mut writes = current.pending_writes.clone();
        let mut suspensions = Vec::new();
        for ((node, ctx), joined) in contexts.into_iter().zip(results) {
            let result = joined.unwrap_or_else(|e| {
                Err(GraphError::node_execution(&node, format!("task failed: {}", e)))
            });

            match (result, ctx.take_suspension()) {
                (Err(GraphError::DuplicateInterrupt { node }), _) => {
                    return Err(GraphError::DuplicateInterrupt { node });
                }
                (_, Some(suspension)) | (Err(GraphError::NodeInterrupt(suspension)), None) => {
                    suspensions.push(suspension);
                }
                (Ok(result), None) => writes.push(result.into_write(&node)),
                (Err(err), None) => writes.push(self.handle_failure(thread_id, &node, err)?),
            }
        }

        if suspensions.len() > 1 {
            return Err(GraphError::MultipleInterrupts {
                nodes: suspensions.into_iter().map(|s| s.node).collect(),
            });
        }
        Ok((writes, suspensions.pop()))
    }

    /// Turn a node error into a captured write, or abort the run
    fn handle_failure(&self, thread_id: &str, node: &str, err: GraphError) -> Result<PendingWrite> {
        if err.is_storage_unavailable() {
            tracing::error!(thread_id = %thread_id, node = %node, error = %err, "Storage failure in node");
            return Err(err);
        }

        let policy = self
            .graph
            .nodes
            .get(node)
            .and_then(|spec| spec.failure_policy)
            .unwrap_or(self.execution.failure_policy);
        let error_field = &self.execution.error_field;

        let message = match err {
            GraphError::NodeExecution { error, .. } => error,
            other => other.to_string(),
        };

        if policy == FailurePolicy::Capture {
            if self.schema.get(error_field).is_some() {
                tracing::warn!(
                    thread_id = %thread_id,
                    node = %node,
                    error = %message,
                    "Node failed; captured into state"
                );
                let mut update = Map::new();
                update.insert(
                    error_field.clone(),
                    json!({"node": node, "error": message}),
                );
                return Ok(PendingWrite::update(node, Value::Object(update)));
            }
            tracing::warn!(
                node = %node,
                field = %error_field,
                "Capture policy needs a declared error field; propagating"
            );
        }

        tracing::warn!(thread_id = %thread_id, node = %node, error = %message, "Node failed");
        Err(GraphError::node_execution(node, message))
    }

    /// Merge the writes of a completed step, route, and append the next checkpoint
    async fn apply_step(
        &self,
        thread_id: &str,
        current: Checkpoint,
        step: i32,
        mut writes: Vec<PendingWrite>,
    ) -> Result<Checkpoint> {
        let order: HashMap<&str, usize> = current
            .pending_nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.as_str(), i))
            .collect();
        writes.sort_by_key(|write| order.get(write.node.as_str()).copied().unwrap_or(usize::MAX));

        for (field, first, second) in replace_conflicts(&self.schema, &writes) {
            tracing::warn!(
                thread_id = %thread_id,
                step,
                field = %field,
                nodes = ?[first, second],
                "Several nodes replaced the same field in one step; the surviving value is unspecified"
            );
        }

        let mut values = current.values.clone();
        let mut metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Loop)
            .with_step(step);
        for write in &writes {
            self.schema.apply(&mut values, &write.update).map_err(|e| {
                GraphError::node_execution(&write.node, format!("invalid update: {}", e))
            })?;
            metadata = metadata.with_write(write.node.clone(), write.update.clone());
        }

        let post_update = Value::Object(values.clone());
        let mut next = Vec::new();
        for write in &writes {
            let targets = match &write.goto {
                Some(goto) => self.graph.resolve_goto(&write.node, goto)?,
                None => self.graph.route(&write.node, &post_update)?,
            };
            next.extend(targets);
        }

        let checkpoint = Checkpoint::new(values, dedupe_targets(next))
            .with_schema(self.schema.fingerprint())
            .with_metadata(metadata);
        let checkpoint = self.commit(thread_id, checkpoint, Some(current.id)).await?;

        tracing::debug!(
            thread_id = %thread_id,
            checkpoint_id = checkpoint.id,
            step,
            next = ?checkpoint.pending_nodes,
            "Step committed"
        );
        Ok(checkpoint)
    }
}

/// Replace-semantics fields written by more than one node: `(field, first node, other node)`
fn replace_conflicts<'a>(
    schema: &StateSchema,
    writes: &'a [PendingWrite],
) -> Vec<(&'a str, &'a str, &'a str)> {
    let mut writers: HashMap<&str, &str> = HashMap::new();
    let mut conflicts = Vec::new();

    for write in writes {
        let Some(update) = write.update.as_object() else {
            continue;
        };
        for field in update.keys() {
            let replaces = schema
                .get(field)
                .map_or(false, |spec| matches!(spec.strategy, MergeStrategy::Replace));
            if !replaces {
                continue;
            }
            match writers.get(field.as_str()) {
                Some(first) if *first != write.node.as_str() => {
                    conflicts.push((field.as_str(), *first, write.node.as_str()));
                }
                Some(_) => {}
                None => {
                    writers.insert(field.as_str(), write.node.as_str());
                }
            }
        }
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FieldSpec;

    fn schema() -> StateSchema {
        StateSchema::new()
            .field(FieldSpec::replace("winner"))
            .field(FieldSpec::append("log"))
    }

    #[test]
    fn test_replace_conflicts_detects_shared_replace_field() {
        let writes = vec![
            PendingWrite::update("left", json!({"winner": "left", "log": "left"})),
            PendingWrite::update("right", json!({"winner": "right", "log": "right"})),
        ];
        assert_eq!(
            replace_conflicts(&schema(), &writes),
            vec![("winner", "left", "right")]
        );
    }

    #[test]
    fn test_append_fields_never_conflict() {
        let writes = vec![
            PendingWrite::update("left", json!({"log": "left"})),
            PendingWrite::update("right", json!({"log": "right"})),
            PendingWrite::update("idle", Value::Null),
        ];
        assert!(replace_conflicts(&schema(), &writes).is_empty());
    }
}
