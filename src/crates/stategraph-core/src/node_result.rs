//! What a node returns: a state update or a [`Command`]

use crate::command::Command;
use serde_json::Value;
use stategraph_checkpoint::PendingWrite;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeResult {
    /// Partial state update; the node's edges choose the successors
    State(Value),

    /// Update plus optional explicit routing
    Command(Command),
}

impl NodeResult {
    /// A result that changes nothing
    pub fn empty() -> Self {
        NodeResult::State(Value::Null)
    }

    pub fn get_state_update(&self) -> Option<&Value> {
        match self {
            NodeResult::State(value) => Some(value),
            NodeResult::Command(cmd) => cmd.update.as_ref(),
        }
    }

    pub fn get_command(&self) -> Option<&Command> {
        match self {
            NodeResult::State(_) => None,
            NodeResult::Command(cmd) => Some(cmd),
        }
    }

    pub fn has_goto(&self) -> bool {
        matches!(self, NodeResult::Command(cmd) if cmd.goto.is_some())
    }

    /// Persistable form of this result, attributed to `node`
    pub(crate) fn into_write(self, node: &str) -> PendingWrite {
        match self {
            NodeResult::State(update) => PendingWrite::update(node, update),
            NodeResult::Command(Command { update, goto }) => {
                let update = update.unwrap_or(Value::Null);
                match goto {
                    Some(goto) => PendingWrite::goto(node, update, goto.into_nodes()),
                    None => PendingWrite::update(node, update),
                }
            }
        }
    }
}

impl From<Value> for NodeResult {
    fn from(value: Value) -> Self {
        NodeResult::State(value)
    }
}

impl From<Command> for NodeResult {
    fn from(cmd: Command) -> Self {
        NodeResult::Command(cmd)
    }
}

impl From<()> for NodeResult {
    fn from(_: ()) -> Self {
        NodeResult::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_result_state() {
        let result = NodeResult::State(json!({"count": 42}));

        assert_eq!(result.get_state_update(), Some(&json!({"count": 42})));
        assert!(result.get_command().is_none());
        assert!(!result.has_goto());

        let write = result.into_write("counter");
        assert_eq!(write.node, "counter");
        assert_eq!(write.update, json!({"count": 42}));
        assert!(write.goto.is_none());
    }

    #[test]
    fn test_node_result_command() {
        let cmd = Command::new()
            .with_update(json!({"status": "done"}))
            .with_goto("next");
        let result = NodeResult::Command(cmd);

        assert_eq!(result.get_state_update(), Some(&json!({"status": "done"})));
        assert!(result.has_goto());

        let write = result.into_write("review");
        assert_eq!(write.goto, Some(vec!["next".to_string()]));
    }

    #[test]
    fn test_command_without_goto_uses_edges() {
        let write = NodeResult::from(Command::new().with_update(json!({"a": 1}))).into_write("n");
        assert!(write.goto.is_none());
        assert_eq!(write.update, json!({"a": 1}));
    }

    #[test]
    fn test_unit_is_empty_update() {
        let write = NodeResult::from(()).into_write("noop");
        assert_eq!(write.update, Value::Null);
    }
}
