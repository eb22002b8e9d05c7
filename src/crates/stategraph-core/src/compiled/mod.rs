//! CompiledGraph execution engine for durable, resumable runs
//!
//! A graph built with [`StateGraph`](crate::StateGraph) compiles into a [`CompiledGraph`],
//! which drives threads step by step against a [`CheckpointSaver`](stategraph_checkpoint::CheckpointSaver).
//!
//! # Key Types
//!
//! - [`CompiledGraph`] - The executable graph runtime
//! - [`RunOutcome`] - Completed snapshot or a pending interrupt
//! - [`StateSnapshot`] - Point-in-time view of a thread
//! - [`StateSnapshotStream`] - Lazy, newest-first history
//!
//! # Running a thread
//!
//! - [`invoke`](CompiledGraph::invoke) starts a thread or a new turn
//! - [`resume`](CompiledGraph::resume) answers a pending interrupt
//! - [`continue_run`](CompiledGraph::continue_run) picks up pending nodes, e.g. after a crash
//!
//! Every call starts from storage. Nothing about a thread is kept in memory between calls,
//! which is what lets a suspended thread be resumed by a different process.

mod execution;
mod graph;
mod state;
mod types;

pub use graph::CompiledGraph;
pub use types::{InterruptInfo, RunOutcome, StateSnapshot, StateSnapshotStream};
