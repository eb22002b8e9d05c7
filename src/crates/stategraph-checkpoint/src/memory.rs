//! In-memory checkpoint storage for development and testing
//!
//! [`InMemoryCheckpointSaver`] keeps every thread's checkpoints in an
//! `Arc<RwLock<HashMap<thread_id, Vec<Checkpoint>>>>`. Clones share the same storage,
//! which makes it easy to simulate a process restart in tests: drop the compiled graph,
//! build a new one over a clone of the saver, and continue the thread.
//!
//! Data is lost when the last clone is dropped. Use
//! [`SqliteCheckpointSaver`](crate::sqlite::SqliteCheckpointSaver) when threads must
//! survive a real restart.

use crate::{
    checkpoint::{Checkpoint, CheckpointId, CheckpointWrites, ListOptions, ThreadInfo},
    error::{CheckpointError, Result},
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use futures::stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory checkpoint storage
type CheckpointStorage = Arc<RwLock<HashMap<String, Vec<Checkpoint>>>>;

/// In-memory checkpoint saver implementation
///
/// # Example
///
/// ```rust
/// use stategraph_checkpoint::{Checkpoint, CheckpointSaver, InMemoryCheckpointSaver};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let saver = InMemoryCheckpointSaver::new();
///     let id = saver.append("thread-1", Checkpoint::empty()).await?;
///     assert_eq!(id, 1);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryCheckpointSaver {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointSaver {
    /// Create a new in-memory checkpoint saver
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the number of threads being tracked
    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Get the total number of checkpoints across all threads
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Clear all checkpoints (useful for testing)
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

impl Default for InMemoryCheckpointSaver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn append(&self, thread_id: &str, mut checkpoint: Checkpoint) -> Result<CheckpointId> {
        if thread_id.is_empty() {
            return Err(CheckpointError::Invalid("thread_id is required".to_string()));
        }

        let mut storage = self.storage.write().await;
        let entries = storage.entry(thread_id.to_string()).or_default();

        let parent_id = entries.last().map(|entry| entry.id);
        let id = parent_id.unwrap_or(0) + 1;

        checkpoint.thread_id = thread_id.to_string();
        checkpoint.id = id;
        checkpoint.parent_id = parent_id;
        entries.push(checkpoint);

        tracing::trace!(thread_id, checkpoint_id = id, "Appended checkpoint");
        Ok(id)
    }

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(thread_id)
            .and_then(|entries| entries.last().cloned()))
    }

    async fn get(&self, thread_id: &str, checkpoint_id: CheckpointId) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage.get(thread_id).and_then(|entries| {
            entries
                .iter()
                .find(|entry| entry.id == checkpoint_id)
                .cloned()
        }))
    }

    /// Unlike the SQLite saver this does not page: `options.page_size` is ignored and the
    /// matching history is cloned up front, so the stream is a snapshot taken at call time.
    async fn list(&self, thread_id: &str, options: ListOptions) -> Result<CheckpointStream> {
        let storage = self.storage.read().await;

        let results: Vec<Result<Checkpoint>> = storage
            .get(thread_id)
            .map(|entries| {
                entries
                    .iter()
                    .rev()
                    .filter(|entry| options.before.map_or(true, |before| entry.id < before))
                    .take(options.limit.unwrap_or(usize::MAX))
                    .cloned()
                    .map(Ok)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Box::pin(stream::iter(results)))
    }

    async fn put_writes(
        &self,
        thread_id: &str,
        checkpoint_id: CheckpointId,
        writes: CheckpointWrites,
    ) -> Result<()> {
        let mut storage = self.storage.write().await;

        if let Some(entry) = storage
            .get_mut(thread_id)
            .and_then(|entries| entries.iter_mut().find(|e| e.id == checkpoint_id))
        {
            entry.apply_writes(writes);
            return Ok(());
        }

        Err(CheckpointError::NotFound(format!(
            "{}#{}",
            thread_id, checkpoint_id
        )))
    }

    async fn list_threads(&self) -> Result<Vec<ThreadInfo>> {
        let storage = self.storage.read().await;

        let mut threads: Vec<ThreadInfo> = storage
            .iter()
            .filter_map(|(thread_id, entries)| {
                entries.last().map(|latest| ThreadInfo {
                    thread_id: thread_id.clone(),
                    checkpoint_count: entries.len(),
                    latest_checkpoint_id: latest.id,
                    updated_at: latest.created_at,
                })
            })
            .collect();

        threads.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.thread_id.cmp(&b.thread_id))
        });
        Ok(threads)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut storage = self.storage.write().await;
        storage.remove(thread_id);
        Ok(())
    }
}
