//! Checkpoint storage trait for pluggable persistence backends
//!
//! [`CheckpointSaver`] is the only interface the executor uses to persist and restore
//! thread state. Two implementations ship with this crate:
//!
//! - [`InMemoryCheckpointSaver`](crate::memory::InMemoryCheckpointSaver) for tests and
//!   short-lived processes
//! - [`SqliteCheckpointSaver`](crate::sqlite::SqliteCheckpointSaver) for durable storage
//!   that survives process restarts
//!
//! # Contract
//!
//! ```text
//! append(thread, cp)        -> id      all-or-nothing, id = previous + 1
//! latest(thread)            -> cp?     reflects the last completed append
//! get(thread, id)           -> cp?
//! list(thread, options)     -> stream  newest first, restartable, paged by durable backends
//! put_writes(thread, id, w)            replaces interrupt + pending writes of one checkpoint
//! list_threads()            -> infos   thread id, count, latest id, timestamp
//! delete_thread(thread)                external retention only
//! ```
//!
//! # Concurrency
//!
//! Implementations must be safe to call concurrently for different threads. Two writers
//! appending to the *same* thread at once get last-write-wins behavior; callers avoid this
//! by giving each independent conversation its own thread id.

use crate::{
    checkpoint::{Checkpoint, CheckpointId, CheckpointWrites, ListOptions, ThreadInfo},
    error::Result,
};
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

/// Stream of checkpoints, newest first
pub type CheckpointStream = Pin<Box<dyn Stream<Item = Result<Checkpoint>> + Send>>;

/// Persistence backend for thread checkpoints
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Append a checkpoint to a thread and return its assigned id.
    ///
    /// The saver overwrites `thread_id`, `id` and `parent_id` on the stored copy. A
    /// checkpoint is either fully visible to later reads or not visible at all.
    async fn append(&self, thread_id: &str, checkpoint: Checkpoint) -> Result<CheckpointId>;

    /// The most recently appended checkpoint of a thread
    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// A specific checkpoint of a thread
    async fn get(&self, thread_id: &str, checkpoint_id: CheckpointId) -> Result<Option<Checkpoint>>;

    /// Lazily list a thread's checkpoints, most recent first.
    ///
    /// Each call re-queries storage, so a stream can be recreated at any time.
    async fn list(&self, thread_id: &str, options: ListOptions) -> Result<CheckpointStream>;

    /// Attach or replace the suspension annotations of an existing checkpoint.
    ///
    /// Fails with [`CheckpointError::NotFound`](crate::CheckpointError::NotFound) when
    /// the checkpoint does not exist.
    async fn put_writes(
        &self,
        thread_id: &str,
        checkpoint_id: CheckpointId,
        writes: CheckpointWrites,
    ) -> Result<()>;

    /// Summaries of every stored thread, most recently updated first
    async fn list_threads(&self) -> Result<Vec<ThreadInfo>>;

    /// Remove every checkpoint of a thread. Deleting an unknown thread is not an error.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// Full history of a thread with default paging
    async fn history(&self, thread_id: &str) -> Result<CheckpointStream> {
        self.list(thread_id, ListOptions::default()).await
    }
}
