//! Graph topology: nodes, edges and routing
//!
//! ```text
//!   __start__ ──► classify ──(router)──┬──► approve ──► __end__
//!                                      └──► reject  ──► __end__
//! ```
//!
//! Edges leaving a node are either [`Edge::Direct`] or [`Edge::Conditional`]. A conditional
//! edge evaluates its router over the post-update snapshot and maps the returned label(s)
//! through a declared branch table; a label outside that table is an
//! [`InvalidRoute`](crate::GraphError::InvalidRoute). A node without outgoing edges ends
//! its branch.

use crate::context::NodeContext;
use crate::error::{GraphError, Result};
use crate::node_result::NodeResult;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type NodeId = String;

/// Sentinel entry node
pub const START: &str = "__start__";

/// Sentinel terminal node
pub const END: &str = "__end__";

/// Boxed future returned by a node
pub type NodeFuture = Pin<Box<dyn Future<Output = Result<NodeResult>> + Send>>;

/// Node function: current snapshot and context in, update or command out
pub type NodeExecutor = Arc<dyn Fn(Value, NodeContext) -> NodeFuture + Send + Sync>;

/// Routing function of a conditional edge
pub type RouterFn = Arc<dyn Fn(&Value) -> ConditionalEdgeResult + Send + Sync>;

/// Label(s) chosen by a router
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionalEdgeResult {
    Node(String),
    Nodes(Vec<String>),
}

impl ConditionalEdgeResult {
    fn into_labels(self) -> Vec<String> {
        match self {
            ConditionalEdgeResult::Node(label) => vec![label],
            ConditionalEdgeResult::Nodes(labels) => labels,
        }
    }
}

impl From<&str> for ConditionalEdgeResult {
    fn from(label: &str) -> Self {
        ConditionalEdgeResult::Node(label.to_string())
    }
}

impl From<String> for ConditionalEdgeResult {
    fn from(label: String) -> Self {
        ConditionalEdgeResult::Node(label)
    }
}

impl From<Vec<String>> for ConditionalEdgeResult {
    fn from(labels: Vec<String>) -> Self {
        ConditionalEdgeResult::Nodes(labels)
    }
}

/// What happens when a node returns an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Abort the run; the step is not checkpointed
    #[default]
    Propagate,
    /// Record the failure in the configured error field and keep going
    Capture,
}

#[derive(Clone)]
pub enum Edge {
    Direct(NodeId),

    Conditional {
        router: RouterFn,
        /// Label returned by the router to destination node
        branches: HashMap<String, NodeId>,
    },
}

impl Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Direct(node_id) => f.debug_tuple("Direct").field(node_id).finish(),
            Edge::Conditional { branches, .. } => f
                .debug_struct("Conditional")
                .field("router", &"<function>")
                .field("branches", branches)
                .finish(),
        }
    }
}

#[derive(Clone)]
pub struct NodeSpec {
    pub name: String,
    pub executor: NodeExecutor,
    /// Overrides the graph-wide failure policy
    pub failure_policy: Option<FailurePolicy>,
}

impl Debug for NodeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSpec")
            .field("name", &self.name)
            .field("executor", &"<function>")
            .field("failure_policy", &self.failure_policy)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: HashMap<NodeId, NodeSpec>,
    pub edges: HashMap<NodeId, Vec<Edge>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: NodeId, spec: NodeSpec) {
        self.nodes.insert(id, spec);
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.edges.entry(from).or_default().push(Edge::Direct(to));
    }

    pub fn add_conditional_edge(
        &mut self,
        from: NodeId,
        router: RouterFn,
        branches: HashMap<String, NodeId>,
    ) {
        self.edges
            .entry(from)
            .or_default()
            .push(Edge::Conditional { router, branches });
    }

    fn is_target(&self, node: &str) -> bool {
        node == END || self.nodes.contains_key(node)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        for name in self.nodes.keys() {
            if name == START || name == END {
                return Err(format!("{} is a reserved node name", name));
            }
        }

        if !self.edges.contains_key(START) {
            return Err("Graph has no entry point; add an edge from START".to_string());
        }

        for (from, edges) in &self.edges {
            if from != START && !self.nodes.contains_key(from) {
                return Err(format!("Edge source {} does not exist", from));
            }

            for edge in edges {
                match edge {
                    Edge::Direct(to) => {
                        if !self.is_target(to) {
                            return Err(format!("Edge target {} does not exist", to));
                        }
                    }
                    Edge::Conditional { branches, .. } => {
                        if branches.is_empty() {
                            return Err(format!(
                                "Conditional edge from {} declares no destinations",
                                from
                            ));
                        }
                        for to in branches.values() {
                            if !self.is_target(to) {
                                return Err(format!("Branch target {} does not exist", to));
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Successors of `node` given the snapshot after its update, deduplicated, `END` removed
    pub fn route(&self, node: &str, state: &Value) -> Result<Vec<NodeId>> {
        let mut next = Vec::new();

        for edge in self.edges.get(node).map(Vec::as_slice).unwrap_or_default() {
            match edge {
                Edge::Direct(to) => next.push(to.clone()),
                Edge::Conditional { router, branches } => {
                    for label in router(state).into_labels() {
                        let to = branches.get(&label).ok_or_else(|| {
                            let mut allowed: Vec<String> = branches.keys().cloned().collect();
                            allowed.sort();
                            GraphError::InvalidRoute {
                                node: node.to_string(),
                                target: label.clone(),
                                allowed,
                            }
                        })?;
                        next.push(to.clone());
                    }
                }
            }
        }

        Ok(dedupe_targets(next))
    }

    /// Validate the targets of an explicit `goto` issued by `node`
    pub fn resolve_goto(&self, node: &str, targets: &[String]) -> Result<Vec<NodeId>> {
        for target in targets {
            if !self.is_target(target) {
                let mut allowed: Vec<String> = self.nodes.keys().cloned().collect();
                allowed.push(END.to_string());
                allowed.sort();
                return Err(GraphError::InvalidRoute {
                    node: node.to_string(),
                    target: target.clone(),
                    allowed,
                });
            }
        }
        Ok(dedupe_targets(targets.to_vec()))
    }
}

/// Keep the first occurrence of every target and drop `END`
pub(crate) fn dedupe_targets(targets: Vec<NodeId>) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|target| target != END && seen.insert(target.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop(name: &str) -> NodeSpec {
        NodeSpec {
            name: name.to_string(),
            executor: Arc::new(|_state, _ctx| Box::pin(async { Ok(NodeResult::empty()) })),
            failure_policy: None,
        }
    }

    fn graph_with(nodes: &[&str]) -> Graph {
        let mut graph = Graph::new();
        for node in nodes {
            graph.add_node(node.to_string(), noop(node));
        }
        graph
    }

    #[test]
    fn test_special_constants() {
        assert_eq!(START, "__start__");
        assert_eq!(END, "__end__");
    }

    #[test]
    fn test_validation_requires_entry() {
        let graph = graph_with(&["a"]);
        assert!(graph.validate().unwrap_err().contains("entry"));
    }

    #[test]
    fn test_validation_unknown_target() {
        let mut graph = graph_with(&["a"]);
        graph.add_edge(START.to_string(), "a".to_string());
        graph.add_edge("a".to_string(), "missing".to_string());
        assert!(graph.validate().unwrap_err().contains("missing"));
    }

    #[test]
    fn test_validation_rejects_reserved_names() {
        let mut graph = graph_with(&[END]);
        graph.add_edge(START.to_string(), END.to_string());
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_direct_routing_dedupes_and_drops_end() {
        let mut graph = graph_with(&["a", "b"]);
        graph.add_edge("a".to_string(), "b".to_string());
        graph.add_edge("a".to_string(), "b".to_string());
        graph.add_edge("a".to_string(), END.to_string());

        assert_eq!(graph.route("a", &json!({})).unwrap(), vec!["b".to_string()]);
        assert!(graph.route("b", &json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_conditional_routing() {
        let mut graph = graph_with(&["classify", "approve", "reject"]);
        let branches = HashMap::from([
            ("yes".to_string(), "approve".to_string()),
            ("no".to_string(), "reject".to_string()),
        ]);
        graph.add_conditional_edge(
            "classify".to_string(),
            Arc::new(|state: &Value| {
                if state["ok"].as_bool().unwrap_or(false) {
                    "yes".into()
                } else {
                    "no".into()
                }
            }),
            branches,
        );

        assert_eq!(graph.route("classify", &json!({"ok": true})).unwrap(), vec!["approve"]);
        assert_eq!(graph.route("classify", &json!({"ok": false})).unwrap(), vec!["reject"]);
    }

    #[test]
    fn test_conditional_routing_outside_candidates() {
        let mut graph = graph_with(&["classify", "approve"]);
        graph.add_conditional_edge(
            "classify".to_string(),
            Arc::new(|_: &Value| "elsewhere".into()),
            HashMap::from([("approve".to_string(), "approve".to_string())]),
        );

        let err = graph.route("classify", &json!({})).unwrap_err();
        match err {
            GraphError::InvalidRoute { node, target, allowed } => {
                assert_eq!(node, "classify");
                assert_eq!(target, "elsewhere");
                assert_eq!(allowed, vec!["approve".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_goto() {
        let graph = graph_with(&["a", "b"]);
        assert_eq!(
            graph
                .resolve_goto("a", &["b".to_string(), END.to_string()])
                .unwrap(),
            vec!["b".to_string()]
        );
        assert!(matches!(
            graph.resolve_goto("a", &["nowhere".to_string()]),
            Err(GraphError::InvalidRoute { .. })
        ));
    }
}
