//! StateGraph builder
//!
//! ```rust
//! use stategraph_core::{StateGraph, END};
//! use stategraph_core::state::{FieldSpec, StateSchema};
//! use stategraph_checkpoint::InMemoryCheckpointSaver;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> stategraph_core::Result<()> {
//! let schema = StateSchema::new().field(FieldSpec::replace("counter").with_default(json!(0)));
//!
//! let mut graph = StateGraph::new(schema);
//! graph.add_node("increment", |state, _ctx| async move {
//!     let counter = state["counter"].as_i64().unwrap_or(0);
//!     Ok(json!({"counter": counter + 1}))
//! });
//! graph.set_entry("increment");
//! graph.add_edge("increment", END);
//!
//! let compiled = graph.compile(Arc::new(InMemoryCheckpointSaver::new()))?;
//! let outcome = compiled.invoke("t1", json!({"counter": 0})).await?;
//! assert_eq!(outcome.values().unwrap()["counter"], 1);
//! # Ok(())
//! # }
//! ```

use crate::compiled::CompiledGraph;
use crate::context::NodeContext;
use crate::error::{GraphError, Result};
use crate::graph::{
    ConditionalEdgeResult, FailurePolicy, Graph, NodeExecutor, NodeId, NodeSpec, END, START,
};
use crate::node_result::NodeResult;
use crate::state::StateSchema;
use serde_json::Value;
use stategraph_checkpoint::CheckpointSaver;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Builder for a graph over a declared [`StateSchema`]
pub struct StateGraph {
    graph: Graph,
    schema: StateSchema,
}

impl StateGraph {
    pub fn new(schema: StateSchema) -> Self {
        Self {
            graph: Graph::new(),
            schema,
        }
    }

    /// Add a node.
    ///
    /// The function receives the current snapshot and a [`NodeContext`] and returns
    /// anything convertible to a [`NodeResult`]: a `Value` update, a
    /// [`Command`](crate::Command), or `()`.
    pub fn add_node<F, Fut, R>(&mut self, id: impl Into<NodeId>, node: F) -> &mut Self
    where
        F: Fn(Value, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Into<NodeResult> + 'static,
    {
        let executor: NodeExecutor = Arc::new(move |state, ctx| {
            let fut = node(state, ctx);
            Box::pin(async move { fut.await.map(Into::into) })
        });
        self.add_node_with_executor(id, executor)
    }

    /// Add a node with a pre-built executor
    pub fn add_node_with_executor(
        &mut self,
        id: impl Into<NodeId>,
        executor: NodeExecutor,
    ) -> &mut Self {
        let id = id.into();
        let spec = NodeSpec {
            name: id.clone(),
            executor,
            failure_policy: None,
        };
        self.graph.add_node(id, spec);
        self
    }

    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> &mut Self {
        self.graph.add_edge(from.into(), to.into());
        self
    }

    /// Add a conditional edge that routes based on state
    ///
    /// # Arguments
    ///
    /// * `from` - Source node ID
    /// * `router` - Function of the post-update snapshot returning branch label(s)
    /// * `branches` - Label to node ID; any other label is an `InvalidRoute`
    pub fn add_conditional_edge<F, R>(
        &mut self,
        from: impl Into<NodeId>,
        router: F,
        branches: HashMap<String, NodeId>,
    ) -> &mut Self
    where
        F: Fn(&Value) -> R + Send + Sync + 'static,
        R: Into<ConditionalEdgeResult>,
    {
        self.graph.add_conditional_edge(
            from.into(),
            Arc::new(move |state: &Value| router(state).into()),
            branches,
        );
        self
    }

    /// Conditional edge whose router returns node IDs directly, restricted to `candidates`
    pub fn add_conditional_edges<F, R, I, S>(
        &mut self,
        from: impl Into<NodeId>,
        router: F,
        candidates: I,
    ) -> &mut Self
    where
        F: Fn(&Value) -> R + Send + Sync + 'static,
        R: Into<ConditionalEdgeResult>,
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        let branches = candidates
            .into_iter()
            .map(|candidate| {
                let candidate = candidate.into();
                (candidate.clone(), candidate)
            })
            .collect();
        self.add_conditional_edge(from, router, branches)
    }

    /// Add an edge from START to `node`
    pub fn set_entry(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.graph.add_edge(START.to_string(), node.into());
        self
    }

    /// Add an edge from `node` to END
    pub fn add_finish(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.graph.add_edge(node.into(), END.to_string());
        self
    }

    /// Override the graph-wide failure policy for one node
    pub fn set_failure_policy(&mut self, node: &str, policy: FailurePolicy) -> &mut Self {
        if let Some(spec) = self.graph.nodes.get_mut(node) {
            spec.failure_policy = Some(policy);
        }
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    /// Validate the topology and bind it to a checkpoint saver
    pub fn compile(self, saver: Arc<dyn CheckpointSaver>) -> Result<CompiledGraph> {
        self.graph.validate().map_err(GraphError::Validation)?;

        if self.schema.is_empty() {
            return Err(GraphError::Validation(
                "State schema declares no fields".to_string(),
            ));
        }

        Ok(CompiledGraph::new(self.graph, self.schema, saver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FieldSpec;
    use serde_json::json;
    use stategraph_checkpoint::InMemoryCheckpointSaver;

    fn schema() -> StateSchema {
        StateSchema::new().field(FieldSpec::replace("status"))
    }

    #[test]
    fn test_compile_requires_entry() {
        let mut graph = StateGraph::new(schema());
        graph.add_node("a", |_state, _ctx| async { Ok(()) });

        let result = graph.compile(Arc::new(InMemoryCheckpointSaver::new()));
        assert!(matches!(result, Err(GraphError::Validation(_))));
    }

    #[test]
    fn test_compile_rejects_empty_schema() {
        let mut graph = StateGraph::new(StateSchema::new());
        graph.add_node("a", |_state, _ctx| async { Ok(()) });
        graph.set_entry("a");

        let result = graph.compile(Arc::new(InMemoryCheckpointSaver::new()));
        assert!(matches!(result, Err(GraphError::Validation(_))));
    }

    #[test]
    fn test_conditional_edges_from_candidates() {
        let mut graph = StateGraph::new(schema());
        graph
            .add_node("check", |_state, _ctx| async { Ok(()) })
            .add_node("yes", |_state, _ctx| async { Ok(()) })
            .add_node("no", |_state, _ctx| async { Ok(()) });
        graph.set_entry("check");
        graph.add_conditional_edges(
            "check",
            |state: &Value| {
                if state["status"] == "ok" {
                    "yes"
                } else {
                    "no"
                }
            },
            ["yes", "no"],
        );

        let compiled = graph.compile(Arc::new(InMemoryCheckpointSaver::new())).unwrap();
        assert_eq!(
            compiled.graph().route("check", &json!({"status": "ok"})).unwrap(),
            vec!["yes".to_string()]
        );
    }

    #[test]
    fn test_set_failure_policy() {
        let mut graph = StateGraph::new(schema());
        graph.add_node("a", |_state, _ctx| async { Ok(()) });
        graph.set_failure_policy("a", FailurePolicy::Capture);
        assert_eq!(
            graph.graph().nodes["a"].failure_policy,
            Some(FailurePolicy::Capture)
        );
    }
}
