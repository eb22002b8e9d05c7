//! Expense approval with a human in the loop.
//!
//! The first run suspends at `manager_review` and exits. Running it again with a decision
//! resumes the same thread from the SQLite file, even though the process restarted:
//!
//! ```bash
//! cargo run --example approval_workflow            # suspends, prints the question
//! cargo run --example approval_workflow -- approve # resumes and completes
//! ```
//!
//! Settings come from `stategraph.toml` if present and `STATEGRAPH_*` variables.

use serde_json::{json, Value};
use stategraph_core::state::{FieldSpec, StateSchema};
use stategraph_core::{
    init_logging, ConfigLoader, Engine, GraphError, RunOutcome, StateGraph, ThreadStatus, END,
};
use std::collections::HashMap;

const THREAD_ID: &str = "expense-1042";

fn build_graph() -> StateGraph {
    let schema = StateSchema::new()
        .field(FieldSpec::replace("amount").with_default(json!(0)))
        .field(FieldSpec::replace("decision"))
        .field(FieldSpec::append("audit"));

    let mut graph = StateGraph::new(schema);
    graph
        .add_node("submit", |state, _ctx| async move {
            Ok(json!({"audit": format!("submitted {}", state["amount"])}))
        })
        .add_node("manager_review", |state, ctx| async move {
            let decision = ctx.interrupt(json!({
                "question": "Approve this expense?",
                "amount": state["amount"].clone(),
            }))?;
            Ok(json!({"decision": decision, "audit": "reviewed"}))
        })
        .add_node("pay", |_state, _ctx| async { Ok(json!({"audit": "paid"})) })
        .add_node("reject", |_state, _ctx| async {
            Ok(json!({"audit": "rejected"}))
        });

    graph.set_entry("submit");
    graph.add_edge("submit", "manager_review");
    graph.add_conditional_edge(
        "manager_review",
        |state: &Value| match state["decision"].as_str() {
            Some("approve") => "approved",
            _ => "rejected",
        },
        HashMap::from([
            ("approved".to_string(), "pay".to_string()),
            ("rejected".to_string(), "reject".to_string()),
        ]),
    );
    graph.add_finish("pay").add_finish("reject");
    graph
}

fn report(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Interrupted(info) => {
            println!("Waiting on '{}': {}", info.node, info.payload);
            println!("Re-run with `approve` or `reject` to answer.");
        }
        RunOutcome::Completed(values) => {
            println!("Completed: {}", serde_json::to_string_pretty(values).unwrap_or_default());
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), GraphError> {
    let config = ConfigLoader::new().with_file("stategraph.toml").load().await?;
    init_logging(&config.logging)?;

    let engine = Engine::open(config, None).await?;
    let compiled = engine.compile(build_graph())?;

    let decision = std::env::args().nth(1);
    let outcome = match (compiled.status(THREAD_ID).await?, decision) {
        (ThreadStatus::Suspended { .. }, Some(decision)) => {
            compiled.resume(THREAD_ID, json!(decision)).await?
        }
        (ThreadStatus::Suspended { payload, .. }, None) => {
            println!("Still waiting: {}", payload);
            engine.shutdown().await;
            return Ok(());
        }
        _ => compiled.invoke(THREAD_ID, json!({"amount": 250})).await?,
    };

    report(&outcome);
    engine.shutdown().await;
    Ok(())
}
