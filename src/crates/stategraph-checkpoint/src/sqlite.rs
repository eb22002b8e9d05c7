//! SQLite-backed checkpoint storage
//!
//! One row per checkpoint, keyed by `(thread_id, checkpoint_id)`:
//!
//! ```text
//! checkpoints
//! ├── thread_id       TEXT     opaque thread identity
//! ├── checkpoint_id   INTEGER  1, 2, 3, ... within a thread
//! ├── parent_id       INTEGER  previous checkpoint, NULL for the first
//! ├── v               INTEGER  checkpoint format version
//! ├── snapshot        BLOB     field -> value map
//! ├── pending_nodes   BLOB     nodes to run next
//! ├── schema          BLOB     merge strategy fingerprint
//! ├── metadata        BLOB     source, step, writes
//! ├── interrupt       BLOB     pending interrupt or NULL
//! ├── pending_writes  BLOB     sibling results of a suspended step
//! └── created_at      TEXT     RFC 3339 timestamp
//! ```
//!
//! Appends compute the next id and insert the row in one statement, so a checkpoint is
//! either fully committed or absent. Run the pool in WAL mode with `synchronous=FULL`
//! (see [`SqliteCheckpointSaver::connect`]) for crash safety.

use crate::{
    checkpoint::{Checkpoint, CheckpointId, CheckpointWrites, ListOptions, ThreadInfo},
    error::{CheckpointError, Result},
    serializer::{JsonSerializer, SerializerProtocol},
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, TryStreamExt};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS checkpoints (
    thread_id TEXT NOT NULL,
    checkpoint_id INTEGER NOT NULL,
    parent_id INTEGER,
    v INTEGER NOT NULL,
    snapshot BLOB NOT NULL,
    pending_nodes BLOB NOT NULL,
    schema BLOB NOT NULL,
    metadata BLOB NOT NULL,
    interrupt BLOB,
    pending_writes BLOB NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (thread_id, checkpoint_id)
)";

const SELECT_COLUMNS: &str = "thread_id, checkpoint_id, parent_id, v, snapshot, pending_nodes, \
     schema, metadata, interrupt, pending_writes, created_at";

#[derive(sqlx::FromRow)]
struct CheckpointRow {
    thread_id: String,
    checkpoint_id: i64,
    parent_id: Option<i64>,
    v: i64,
    snapshot: Vec<u8>,
    pending_nodes: Vec<u8>,
    schema: Vec<u8>,
    metadata: Vec<u8>,
    interrupt: Option<Vec<u8>>,
    pending_writes: Vec<u8>,
    created_at: String,
}

impl CheckpointRow {
    fn decode<S: SerializerProtocol>(self, serializer: &S) -> Result<Checkpoint> {
        Ok(Checkpoint {
            v: i32::try_from(self.v)
                .map_err(|_| CheckpointError::Invalid(format!("format version {}", self.v)))?,
            thread_id: self.thread_id,
            id: self.checkpoint_id,
            parent_id: self.parent_id,
            values: serializer.loads(&self.snapshot)?,
            pending_nodes: serializer.loads(&self.pending_nodes)?,
            schema: serializer.loads(&self.schema)?,
            interrupt: self
                .interrupt
                .as_deref()
                .map(|bytes| serializer.loads(bytes))
                .transpose()?,
            pending_writes: serializer.loads(&self.pending_writes)?,
            metadata: serializer.loads(&self.metadata)?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| CheckpointError::Invalid(format!("bad timestamp {raw:?}: {e}")))
}

/// Checkpoint saver persisting to a SQLite database through a shared pool
#[derive(Debug, Clone)]
pub struct SqliteCheckpointSaver<S = JsonSerializer> {
    pool: SqlitePool,
    serializer: Arc<S>,
}

impl SqliteCheckpointSaver<JsonSerializer> {
    /// Wrap an existing pool. Call [`setup`](Self::setup) before first use.
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_serializer(pool, JsonSerializer::new())
    }

    /// Open (creating if missing) a database file configured for durable appends,
    /// and create the table.
    pub async fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let saver = Self::new(pool);
        saver.setup().await?;
        Ok(saver)
    }
}

impl<S: SerializerProtocol> SqliteCheckpointSaver<S> {
    /// Wrap an existing pool with a custom column serializer
    pub fn with_serializer(pool: SqlitePool, serializer: S) -> Self {
        Self {
            pool,
            serializer: Arc::new(serializer),
        }
    }

    /// Create the checkpoints table if it does not exist
    pub async fn setup(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        tracing::debug!("Checkpoint table ready");
        Ok(())
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn fetch_page<S: SerializerProtocol>(
    pool: &SqlitePool,
    serializer: &S,
    thread_id: &str,
    before: Option<CheckpointId>,
    limit: usize,
) -> Result<Vec<Checkpoint>> {
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM checkpoints
         WHERE thread_id = ? AND (? IS NULL OR checkpoint_id < ?)
         ORDER BY checkpoint_id DESC
         LIMIT ?"
    );

    let rows = sqlx::query_as::<_, CheckpointRow>(&sql)
        .bind(thread_id)
        .bind(before)
        .bind(before)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(|row| row.decode(serializer)).collect()
}

/// Paging state of a lazy history listing
struct ListCursor<S> {
    pool: SqlitePool,
    serializer: Arc<S>,
    thread_id: String,
    before: Option<CheckpointId>,
    remaining: Option<usize>,
    page_size: usize,
    exhausted: bool,
}

#[async_trait]
impl<S: SerializerProtocol + 'static> CheckpointSaver for SqliteCheckpointSaver<S> {
    async fn append(&self, thread_id: &str, checkpoint: Checkpoint) -> Result<CheckpointId> {
        if thread_id.is_empty() {
            return Err(CheckpointError::Invalid("thread_id is required".to_string()));
        }

        let snapshot = self.serializer.dumps(&checkpoint.values)?;
        let pending_nodes = self.serializer.dumps(&checkpoint.pending_nodes)?;
        let schema = self.serializer.dumps(&checkpoint.schema)?;
        let metadata = self.serializer.dumps(&checkpoint.metadata)?;
        let interrupt = checkpoint
            .interrupt
            .as_ref()
            .map(|interrupt| self.serializer.dumps(interrupt))
            .transpose()?;
        let pending_writes = self.serializer.dumps(&checkpoint.pending_writes)?;
        let created_at = checkpoint
            .created_at
            .to_rfc3339_opts(SecondsFormat::Micros, true);

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO checkpoints (thread_id, checkpoint_id, parent_id, v, snapshot, pending_nodes, schema, metadata, interrupt, pending_writes, created_at)
             SELECT ?, COALESCE(MAX(checkpoint_id), 0) + 1, MAX(checkpoint_id), ?, ?, ?, ?, ?, ?, ?, ?
             FROM checkpoints WHERE thread_id = ?
             RETURNING checkpoint_id",
        )
        .bind(thread_id)
        .bind(checkpoint.v)
        .bind(&snapshot)
        .bind(&pending_nodes)
        .bind(&schema)
        .bind(&metadata)
        .bind(&interrupt)
        .bind(&pending_writes)
        .bind(&created_at)
        .bind(thread_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(thread_id, checkpoint_id = id, "Appended checkpoint");
        Ok(id)
    }

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let mut page = fetch_page(&self.pool, self.serializer.as_ref(), thread_id, None, 1).await?;
        Ok(page.pop())
    }

    async fn get(&self, thread_id: &str, checkpoint_id: CheckpointId) -> Result<Option<Checkpoint>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM checkpoints WHERE thread_id = ? AND checkpoint_id = ?"
        );
        let row = sqlx::query_as::<_, CheckpointRow>(&sql)
            .bind(thread_id)
            .bind(checkpoint_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row.decode(self.serializer.as_ref())).transpose()
    }

    async fn list(&self, thread_id: &str, options: ListOptions) -> Result<CheckpointStream> {
        let cursor = ListCursor {
            pool: self.pool.clone(),
            serializer: Arc::clone(&self.serializer),
            thread_id: thread_id.to_string(),
            before: options.before,
            remaining: options.limit,
            page_size: options.page_size.max(1),
            exhausted: false,
        };

        let pages = stream::try_unfold(cursor, |mut cursor| async move {
            if cursor.exhausted || cursor.remaining == Some(0) {
                return Ok::<_, CheckpointError>(None);
            }

            let take = cursor
                .remaining
                .map_or(cursor.page_size, |remaining| remaining.min(cursor.page_size));
            let page = fetch_page(
                &cursor.pool,
                cursor.serializer.as_ref(),
                &cursor.thread_id,
                cursor.before,
                take,
            )
            .await?;

            if page.is_empty() {
                return Ok(None);
            }

            cursor.exhausted = page.len() < take;
            cursor.before = page.last().map(|checkpoint| checkpoint.id);
            if let Some(remaining) = cursor.remaining.as_mut() {
                *remaining = remaining.saturating_sub(page.len());
            }

            Ok(Some((page, cursor)))
        });

        Ok(Box::pin(
            pages
                .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
                .try_flatten(),
        ))
    }

    async fn put_writes(
        &self,
        thread_id: &str,
        checkpoint_id: CheckpointId,
        writes: CheckpointWrites,
    ) -> Result<()> {
        let interrupt = writes
            .interrupt
            .as_ref()
            .map(|interrupt| self.serializer.dumps(interrupt))
            .transpose()?;
        let pending_writes = self.serializer.dumps(&writes.pending_writes)?;

        let result = sqlx::query(
            "UPDATE checkpoints SET interrupt = ?, pending_writes = ?
             WHERE thread_id = ? AND checkpoint_id = ?",
        )
        .bind(&interrupt)
        .bind(&pending_writes)
        .bind(thread_id)
        .bind(checkpoint_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CheckpointError::NotFound(format!(
                "{}#{}",
                thread_id, checkpoint_id
            )));
        }

        tracing::debug!(
            thread_id,
            checkpoint_id,
            suspended = writes.interrupt.is_some(),
            "Stored checkpoint writes"
        );
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<ThreadInfo>> {
        let rows: Vec<(String, i64, i64, String)> = sqlx::query_as(
            "SELECT thread_id, COUNT(*), MAX(checkpoint_id), MAX(created_at)
             FROM checkpoints
             GROUP BY thread_id
             ORDER BY MAX(created_at) DESC, thread_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(thread_id, count, latest, updated_at)| {
                Ok(ThreadInfo {
                    thread_id,
                    checkpoint_count: usize::try_from(count).unwrap_or_default(),
                    latest_checkpoint_id: latest,
                    updated_at: parse_timestamp(&updated_at)?,
                })
            })
            .collect()
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
        tracing::info!(thread_id, "Deleted thread checkpoints");
        Ok(())
    }
}
