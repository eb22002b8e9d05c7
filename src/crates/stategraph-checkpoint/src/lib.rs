//! # stategraph-checkpoint - Durable State for Graph Execution
//!
//! **Trait-based checkpoint storage** used by `stategraph-core` to persist every step of a
//! graph run and to restore a thread after a suspension or a process restart.
//!
//! ## Overview
//!
//! A thread is an ordered list of [`Checkpoint`]s. The executor appends one after each
//! step; the latest checkpoint alone is enough to continue a thread:
//!
//! - **values** - the full state snapshot
//! - **pending_nodes** - what runs next (empty means the thread completed)
//! - **interrupt** - at most one pending [`Interrupt`] with its opaque payload
//! - **pending_writes** - results of sibling nodes from a suspended step
//!
//! ## Backends
//!
//! - [`InMemoryCheckpointSaver`] - `Arc<RwLock<HashMap>>`, for tests and demos
//! - [`SqliteCheckpointSaver`] - sqlx + SQLite, survives restarts (feature `sqlite`, on by default)
//!
//! Custom backends implement [`CheckpointSaver`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stategraph_checkpoint::{Checkpoint, CheckpointSaver, InMemoryCheckpointSaver, StateValues};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let saver = InMemoryCheckpointSaver::new();
//!
//!     let mut values = StateValues::new();
//!     values.insert("counter".into(), json!(0));
//!     let id = saver.append("thread-123", Checkpoint::new(values, vec!["increment".into()])).await?;
//!
//!     let latest = saver.latest("thread-123").await?.expect("checkpoint");
//!     assert_eq!(latest.id, id);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              stategraph-core (Graph Execution)          │
//! │  • step loop, interrupts, resume                        │
//! └────────────────────┬────────────────────────────────────┘
//!                      │ append() after each step
//!                      │ put_writes() on suspension
//!                      ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │           CheckpointSaver Trait (This Crate)            │
//! └────────────────────┬────────────────────────────────────┘
//!            ┌─────────┴──────────┐
//!            ▼                    ▼
//!     ┌──────────────┐    ┌──────────────┐
//!     │  In-Memory   │    │    SQLite    │
//!     └──────────────┘    └──────────────┘
//! ```

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod serializer;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

// Re-export main types
pub use checkpoint::{
    Checkpoint, CheckpointId, CheckpointMetadata, CheckpointSource, CheckpointWrites, Interrupt,
    ListOptions, PendingWrite, StateValues, ThreadInfo,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
pub use serializer::{JsonSerializer, SerializerProtocol};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointSaver;
pub use traits::{CheckpointSaver, CheckpointStream};
