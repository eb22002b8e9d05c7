//! # stategraph-core - Durable, Resumable Graph Execution
//!
//! Build a graph of async nodes over a declared state, run it step by step, and persist
//! every step so a thread can be suspended for human input and resumed later, in the
//! same process or a fresh one.
//!
//! ## Overview
//!
//! - **State schema** - named fields, each with a merge strategy ([`state`])
//! - **Nodes and edges** - direct and conditional routing between [`START`] and [`END`]
//! - **Checkpoints** - one per completed step, through a
//!   [`CheckpointSaver`](stategraph_checkpoint::CheckpointSaver)
//! - **Interrupts** - [`NodeContext::interrupt`] suspends a thread with a payload;
//!   [`CompiledGraph::resume`] answers it
//! - **Memory store** - namespaced long-term items with optional embedding search ([`store`])
//!
//! ## Quick Start
//!
//! ```rust
//! use stategraph_core::{Engine, EngineConfig, StateGraph, END};
//! use stategraph_core::config::Backend;
//! use stategraph_core::state::{FieldSpec, StateSchema};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> stategraph_core::Result<()> {
//! let mut config = EngineConfig::default();
//! config.database.backend = Backend::Memory;
//! let engine = Engine::open(config, None).await?;
//!
//! let schema = StateSchema::new()
//!     .field(FieldSpec::replace("draft"))
//!     .field(FieldSpec::replace("status"));
//!
//! let mut graph = StateGraph::new(schema);
//! graph.add_node("review", |state, ctx| async move {
//!     let decision = ctx.interrupt(json!({"draft": state["draft"].clone()}))?;
//!     Ok(json!({"status": decision}))
//! });
//! graph.set_entry("review");
//! graph.add_edge("review", END);
//!
//! let compiled = engine.compile(graph)?;
//!
//! let outcome = compiled.invoke("thread-1", json!({"draft": "hello"})).await?;
//! assert_eq!(outcome.interrupt().unwrap().payload, json!({"draft": "hello"}));
//!
//! let outcome = compiled.resume("thread-1", json!("approved")).await?;
//! assert_eq!(outcome.values().unwrap()["status"], "approved");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐ compile ┌───────────────┐  append / put_writes  ┌──────────────────────┐
//! │  StateGraph  ├────────►│ CompiledGraph ├──────────────────────►│ stategraph-checkpoint│
//! └──────────────┘         └───────┬───────┘                       └──────────────────────┘
//!                                  │ NodeContext
//!                                  ▼
//!                          ┌───────────────┐
//!                          │   BaseStore   │  InMemoryStore | SqliteStore
//!                          └───────────────┘
//! ```

pub mod builder;
pub mod command;
pub mod compiled;
pub mod config;
pub mod context;
pub mod db;
pub mod engine;
pub mod error;
pub mod graph;
pub mod interrupt;
pub mod logging;
pub mod node_result;
pub mod state;
pub mod store;

pub use builder::StateGraph;
pub use command::{Command, GotoTarget};
pub use compiled::{CompiledGraph, InterruptInfo, RunOutcome, StateSnapshot, StateSnapshotStream};
pub use config::{ConfigLoader, EngineConfig, ExecutionConfig};
pub use context::NodeContext;
pub use db::Database;
pub use engine::Engine;
pub use error::{GraphError, Result};
pub use graph::{ConditionalEdgeResult, FailurePolicy, NodeExecutor, NodeId, END, START};
pub use interrupt::{InterruptController, Suspension, ThreadStatus};
pub use logging::init_logging;
pub use node_result::NodeResult;

pub use stategraph_checkpoint;
