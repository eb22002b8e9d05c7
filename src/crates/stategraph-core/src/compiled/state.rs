//! State inspection and manual updates

use super::{CompiledGraph, StateSnapshot, StateSnapshotStream};
use crate::error::{GraphError, Result};
use crate::graph::{END, START};
use futures::TryStreamExt;
use serde_json::Value;
use stategraph_checkpoint::{Checkpoint, CheckpointId, CheckpointMetadata, CheckpointSource, ListOptions};

impl CompiledGraph {
    /// Latest checkpoint of a thread as a [`StateSnapshot`], `None` for an unknown thread
    pub async fn get_state(&self, thread_id: &str) -> Result<Option<StateSnapshot>> {
        Ok(self
            .saver
            .latest(thread_id)
            .await?
            .map(StateSnapshot::from))
    }

    /// Checkpoints of a thread, newest first, fetched page by page as the stream is polled.
    ///
    /// Each call queries storage again, so the stream can be re-created at any time.
    pub async fn get_state_history(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<StateSnapshotStream> {
        let mut options = ListOptions::new().with_page_size(self.execution.history_page_size);
        if let Some(limit) = limit {
            options = options.with_limit(limit);
        }

        let stream = self.saver.list(thread_id, options).await?;
        Ok(Box::pin(
            stream
                .map_ok(StateSnapshot::from)
                .map_err(GraphError::StorageUnavailable),
        ))
    }

    /// Append a checkpoint that merges `values` into the latest snapshot.
    ///
    /// Without `as_node` the scheduled nodes and any pending interrupt carry over, so a
    /// suspended thread stays suspended and sees the edited state when resumed. With
    /// `as_node` the update is treated as that node's output: its edges pick the next nodes
    /// and a pending interrupt is dropped. `as_node = END` makes the thread terminal.
    pub async fn update_state(
        &self,
        thread_id: &str,
        values: Value,
        as_node: Option<&str>,
    ) -> Result<CheckpointId> {
        if let Some(node) = as_node {
            if node != END && !self.graph.nodes.contains_key(node) {
                return Err(GraphError::Validation(format!(
                    "Cannot update state as unknown node '{}'",
                    node
                )));
            }
        }

        let latest = self.load_latest(thread_id).await?;
        let (mut state, step, parent_id, mut checkpoint) = match latest {
            Some(latest) => {
                let step = latest.metadata.step.unwrap_or(-1) + 1;
                let mut carried = Checkpoint::new(Default::default(), latest.pending_nodes);
                carried.interrupt = latest.interrupt;
                carried.pending_writes = latest.pending_writes;
                (latest.values, step, Some(latest.id), carried)
            }
            None => {
                let state = self.schema.initial_state(None)?;
                let next = self.graph.route(START, &Value::Object(state.clone()))?;
                (state, -1, None, Checkpoint::new(Default::default(), next))
            }
        };

        self.schema.apply(&mut state, &values)?;

        let mut metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Update)
            .with_step(step);
        if let Some(node) = as_node {
            metadata = metadata.with_write(node, values.clone());
            checkpoint.interrupt = None;
            checkpoint.pending_writes.clear();
            checkpoint.pending_nodes = if node == END {
                Vec::new()
            } else {
                self.graph.route(node, &Value::Object(state.clone()))?
            };
        }

        checkpoint.values = state;
        let checkpoint = checkpoint
            .with_schema(self.schema.fingerprint())
            .with_metadata(metadata);
        let checkpoint = self.commit(thread_id, checkpoint, parent_id).await?;

        tracing::info!(
            thread_id = %thread_id,
            checkpoint_id = checkpoint.id,
            as_node = ?as_node,
            "State updated"
        );
        Ok(checkpoint.id)
    }

    /// Force a thread into a terminal state; a pending interrupt is discarded
    pub async fn cancel(&self, thread_id: &str) -> Result<CheckpointId> {
        self.update_state(thread_id, Value::Null, Some(END)).await
    }
}
