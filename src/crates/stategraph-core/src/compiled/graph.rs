//! CompiledGraph struct and builder methods

use crate::config::ExecutionConfig;
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::interrupt::{InterruptController, ThreadStatus};
use crate::state::{StateError, StateSchema};
use crate::store::BaseStore;
use stategraph_checkpoint::{Checkpoint, CheckpointId, CheckpointSaver, Interrupt};
use std::sync::Arc;

/// Compiled graph ready for execution.
///
/// Cheap to clone; clones share the topology, the saver and the store. A `CompiledGraph`
/// holds no per-thread state, so one instance serves any number of threads.
#[derive(Clone)]
pub struct CompiledGraph {
    pub(crate) graph: Arc<Graph>,
    pub(crate) schema: Arc<StateSchema>,
    pub(crate) saver: Arc<dyn CheckpointSaver>,
    pub(crate) interrupts: InterruptController,
    pub(crate) store: Option<Arc<dyn BaseStore>>,
    pub(crate) execution: ExecutionConfig,
}

impl CompiledGraph {
    pub(crate) fn new(graph: Graph, schema: StateSchema, saver: Arc<dyn CheckpointSaver>) -> Self {
        Self {
            graph: Arc::new(graph),
            schema: Arc::new(schema),
            interrupts: InterruptController::new(saver.clone()),
            saver,
            store: None,
            execution: ExecutionConfig::default(),
        }
    }

    /// Memory store handed to every node through its context
    pub fn with_store(mut self, store: Arc<dyn BaseStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_execution(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }

    pub fn checkpointer(&self) -> &Arc<dyn CheckpointSaver> {
        &self.saver
    }

    pub fn store(&self) -> Option<&Arc<dyn BaseStore>> {
        self.store.as_ref()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn execution_config(&self) -> &ExecutionConfig {
        &self.execution
    }

    pub async fn status(&self, thread_id: &str) -> Result<ThreadStatus> {
        self.interrupts.status(thread_id).await
    }

    /// The unresolved interrupt of a thread, read from storage
    pub async fn pending_interrupt(&self, thread_id: &str) -> Result<Option<Interrupt>> {
        self.interrupts.pending(thread_id).await
    }

    /// Latest checkpoint, checked against the schema and with new fields defaulted
    pub(crate) async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let Some(mut checkpoint) = self.saver.latest(thread_id).await? else {
            return Ok(None);
        };

        self.schema
            .reconcile(&checkpoint.schema, &mut checkpoint.values)
            .map_err(|e| match e {
                StateError::SchemaMismatch(detail) => GraphError::schema_mismatch(thread_id, detail),
                other => GraphError::State(other),
            })?;
        Ok(Some(checkpoint))
    }

    /// Append `checkpoint` as the child of `parent_id` and return it with its assigned id
    pub(crate) async fn commit(
        &self,
        thread_id: &str,
        mut checkpoint: Checkpoint,
        parent_id: Option<CheckpointId>,
    ) -> Result<Checkpoint> {
        let id = self
            .saver
            .append(thread_id, checkpoint.clone())
            .await
            .map_err(|e| {
                tracing::error!(thread_id = %thread_id, error = %e, "Failed to append checkpoint");
                GraphError::StorageUnavailable(e)
            })?;

        checkpoint.thread_id = thread_id.to_string();
        checkpoint.id = id;
        checkpoint.parent_id = parent_id;
        Ok(checkpoint)
    }
}
