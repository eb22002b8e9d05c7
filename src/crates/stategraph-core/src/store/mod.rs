//! Namespaced memory store with optional semantic search
//!
//! Facts that must outlive a single thread (user preferences, learned memories) live in a
//! [`BaseStore`]. Items are addressed by a hierarchical [`Namespace`] plus a key:
//!
//! ```text
//! ("users", "alice", "memories") / "k1"  →  {"text": "loves hiking"}
//! ("users", "bob",   "memories") / "k1"  →  {"text": "follows stock prices"}
//! ```
//!
//! A search over `("users", "alice")` sees only Alice's items; a search over `("users",)`
//! sees both. When the store is built with an [`IndexConfig`], `put` embeds the configured
//! text fields of the value and `search` with a query ranks items by cosine similarity.
//!
//! # Quick Start
//!
//! ```rust
//! use stategraph_core::store::{namespace, BaseStore, InMemoryStore, SearchRequest};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), stategraph_core::store::StoreError> {
//! let store = InMemoryStore::new();
//! let alice = namespace(&["users", "alice"]);
//!
//! store.put(&alice, "theme", json!({"value": "dark"})).await?;
//! let item = store.get(&alice, "theme").await?.unwrap();
//! assert_eq!(item.value["value"], "dark");
//!
//! let hits = store.search(SearchRequest::new(namespace(&["users"]))).await?;
//! assert_eq!(hits.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Implementations
//!
//! - [`InMemoryStore`] - tokio `RwLock` over a `BTreeMap`, for tests and single-process use
//! - [`SqliteStore`] - sqlx + SQLite, embeddings persisted next to the value

mod embed;
mod memory;
mod sqlite;

pub use embed::{cosine_similarity, lookup_path, Embedder, IndexConfig};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use thiserror::Error;

/// Hierarchical partition of the store, e.g. `["users", "alice", "memories"]`
pub type Namespace = Vec<String>;

/// Build a [`Namespace`] from string segments
pub fn namespace(segments: &[&str]) -> Namespace {
    segments.iter().map(|segment| segment.to_string()).collect()
}

/// Errors raised by memory store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid namespace {0:?}")]
    InvalidNamespace(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    /// The embedder failed or returned a vector of the wrong length
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// True when the storage medium failed, as opposed to a bad request
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, StoreError::Storage(_) | StoreError::Database(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A stored value with its address and timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub namespace: Namespace,
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One search hit; `score` is set only for similarity-ranked results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchItem {
    #[serde(flatten)]
    pub item: Item,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Parameters of [`BaseStore::search`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
    pub namespace_prefix: Namespace,
    /// Natural language query; ranks by similarity when the store is indexed
    pub query: Option<String>,
    /// Exact-match predicate over value fields, dotted paths allowed
    pub filter: Option<Map<String, Value>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl SearchRequest {
    pub fn new(namespace_prefix: Namespace) -> Self {
        Self {
            namespace_prefix,
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_filter(mut self, filter: Map<String, Value>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Parameters of [`BaseStore::list_namespaces`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListNamespacesRequest {
    pub prefix: Namespace,
    /// Truncate namespaces to this many segments
    pub max_depth: Option<usize>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl ListNamespacesRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: Namespace) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Long-lived key/value store shared by all threads.
///
/// Safe under concurrent calls on different `(namespace, key)` pairs. Concurrent writes to
/// the same pair have no defined order.
#[async_trait]
pub trait BaseStore: Send + Sync {
    /// Insert or replace; `created_at` survives replacement
    async fn put(&self, namespace: &[String], key: &str, value: Value) -> Result<()>;

    async fn get(&self, namespace: &[String], key: &str) -> Result<Option<Item>>;

    /// Remove an item; removing a missing item succeeds
    async fn delete(&self, namespace: &[String], key: &str) -> Result<()>;

    /// Items under a namespace prefix, filtered, then ranked, then paged
    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchItem>>;

    /// Distinct namespaces under a prefix, sorted
    async fn list_namespaces(&self, request: ListNamespacesRequest) -> Result<Vec<Namespace>>;
}

/// Reject empty namespaces and segments that are empty or contain `.`
pub(crate) fn validate_namespace(namespace: &[String]) -> Result<()> {
    if namespace.is_empty() {
        return Err(StoreError::InvalidNamespace(
            "namespace must have at least one segment".to_string(),
        ));
    }
    validate_prefix(namespace)
}

/// Like [`validate_namespace`] but the empty prefix (whole store) is allowed
pub(crate) fn validate_prefix(prefix: &[String]) -> Result<()> {
    for segment in prefix {
        if segment.is_empty() {
            return Err(StoreError::InvalidNamespace(format!(
                "{}: empty segment",
                prefix.join(".")
            )));
        }
        if segment.contains('.') {
            return Err(StoreError::InvalidNamespace(format!(
                "{}: segment '{}' contains '.'",
                prefix.join("."),
                segment
            )));
        }
    }
    Ok(())
}

/// Storage key of a namespace; unambiguous because segments cannot contain `.`
pub(crate) fn namespace_key(namespace: &[String]) -> String {
    namespace.join(".")
}

pub(crate) fn parse_namespace_key(key: &str) -> Namespace {
    key.split('.').map(str::to_string).collect()
}

pub(crate) fn has_prefix(namespace: &[String], prefix: &[String]) -> bool {
    namespace.len() >= prefix.len() && namespace[..prefix.len()] == *prefix
}

fn matches_filter(value: &Value, filter: &Map<String, Value>) -> bool {
    filter
        .iter()
        .all(|(path, expected)| lookup_path(value, path) == Some(expected))
}

/// An item under the searched prefix together with its stored embedding
pub(crate) struct Candidate {
    pub item: Item,
    pub embedding: Option<Vec<f32>>,
}

/// Filter, score, order and page search candidates.
///
/// With a query vector, scored items come first by descending similarity and items
/// without an embedding follow. An embedding whose length differs from the query's
/// (left over from an earlier index configuration) counts as missing. Ties and unranked searches order by `updated_at`
/// descending, then key.
pub(crate) fn rank(
    candidates: Vec<Candidate>,
    request: &SearchRequest,
    query: Option<&[f32]>,
) -> Vec<SearchItem> {
    let mut hits: Vec<SearchItem> = candidates
        .into_iter()
        .filter(|candidate| match &request.filter {
            Some(filter) => matches_filter(&candidate.item.value, filter),
            None => true,
        })
        .map(|candidate| {
            let score = match (query, &candidate.embedding) {
                (Some(query), Some(embedding)) if embedding.len() == query.len() => {
                    Some(f64::from(cosine_similarity(query, embedding)))
                }
                (Some(query), Some(embedding)) => {
                    tracing::warn!(
                        namespace = ?candidate.item.namespace,
                        key = %candidate.item.key,
                        stored_dims = embedding.len(),
                        query_dims = query.len(),
                        "Stored embedding does not match the index dimensions, ranking item as unembedded"
                    );
                    None
                }
                _ => None,
            };
            SearchItem {
                item: candidate.item,
                score,
            }
        })
        .collect();

    hits.sort_by(|a, b| {
        let by_score = match (a.score, b.score) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_score
            .then_with(|| b.item.updated_at.cmp(&a.item.updated_at))
            .then_with(|| a.item.key.cmp(&b.item.key))
    });

    let limit = request.limit.unwrap_or(usize::MAX);
    hits.into_iter().skip(request.offset).take(limit).collect()
}

/// Distinct, truncated, sorted and paged namespaces under `request.prefix`
pub(crate) fn collect_namespaces<'a>(
    namespaces: impl Iterator<Item = &'a Namespace>,
    request: &ListNamespacesRequest,
) -> Vec<Namespace> {
    let distinct: BTreeSet<Namespace> = namespaces
        .filter(|namespace| has_prefix(namespace, &request.prefix))
        .map(|namespace| match request.max_depth {
            Some(depth) => namespace.iter().take(depth).cloned().collect(),
            None => namespace.clone(),
        })
        .collect();

    let limit = request.limit.unwrap_or(usize::MAX);
    distinct
        .into_iter()
        .skip(request.offset)
        .take(limit)
        .collect()
}
