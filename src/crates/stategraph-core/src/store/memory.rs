//! In-memory [`BaseStore`]

use super::{
    collect_namespaces, has_prefix, namespace_key, rank, validate_namespace, validate_prefix,
    BaseStore, Candidate, IndexConfig, Item, ListNamespacesRequest, Namespace, Result,
    SearchItem, SearchRequest,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
    item: Item,
    embedding: Option<Vec<f32>>,
}

/// Store held in process memory; clones share the same data
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<RwLock<BTreeMap<(String, String), Entry>>>,
    index: Option<IndexConfig>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable semantic search
    pub fn with_index(mut self, index: IndexConfig) -> Self {
        self.index = Some(index);
        self
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl BaseStore for InMemoryStore {
    async fn put(&self, namespace: &[String], key: &str, value: Value) -> Result<()> {
        validate_namespace(namespace)?;

        let embedding = match &self.index {
            Some(index) => index.embed_value(&value).await?,
            None => None,
        };

        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let slot = (namespace_key(namespace), key.to_string());
        let created_at = entries
            .get(&slot)
            .map(|entry| entry.item.created_at)
            .unwrap_or(now);

        entries.insert(
            slot,
            Entry {
                item: Item {
                    namespace: namespace.to_vec(),
                    key: key.to_string(),
                    value,
                    created_at,
                    updated_at: now,
                },
                embedding,
            },
        );

        tracing::debug!(namespace = %namespace_key(namespace), key = %key, "Stored item");
        Ok(())
    }

    async fn get(&self, namespace: &[String], key: &str) -> Result<Option<Item>> {
        validate_namespace(namespace)?;
        let entries = self.entries.read().await;
        Ok(entries
            .get(&(namespace_key(namespace), key.to_string()))
            .map(|entry| entry.item.clone()))
    }

    async fn delete(&self, namespace: &[String], key: &str) -> Result<()> {
        validate_namespace(namespace)?;
        self.entries
            .write()
            .await
            .remove(&(namespace_key(namespace), key.to_string()));
        Ok(())
    }

    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchItem>> {
        validate_prefix(&request.namespace_prefix)?;

        let query = match (&self.index, &request.query) {
            (Some(index), Some(query)) => Some(index.embed_query(query).await?),
            _ => None,
        };

        let candidates: Vec<Candidate> = {
            let entries = self.entries.read().await;
            entries
                .values()
                .filter(|entry| has_prefix(&entry.item.namespace, &request.namespace_prefix))
                .map(|entry| Candidate {
                    item: entry.item.clone(),
                    embedding: entry.embedding.clone(),
                })
                .collect()
        };

        Ok(rank(candidates, &request, query.as_deref()))
    }

    async fn list_namespaces(&self, request: ListNamespacesRequest) -> Result<Vec<Namespace>> {
        validate_prefix(&request.prefix)?;
        let entries = self.entries.read().await;
        Ok(collect_namespaces(
            entries.values().map(|entry| &entry.item.namespace),
            &request,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{namespace, Embedder, StoreError};
    use serde_json::json;

    /// Two-topic embedder: outdoor words and finance words
    struct TopicEmbedder;

    #[async_trait]
    impl Embedder for TopicEmbedder {
        async fn embed_documents(&self, documents: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(documents
                .iter()
                .map(|doc| {
                    let doc = doc.to_lowercase();
                    let outdoor = ["hiking", "outdoor", "camping", "activities"]
                        .iter()
                        .filter(|word| doc.contains(*word))
                        .count() as f32;
                    let finance = ["stock", "prices", "market"]
                        .iter()
                        .filter(|word| doc.contains(*word))
                        .count() as f32;
                    vec![outdoor, finance, 0.1]
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryStore::new();
        let ns = namespace(&["users", "alice"]);

        store.put(&ns, "k1", json!({"text": "hello"})).await.unwrap();
        let item = store.get(&ns, "k1").await.unwrap().unwrap();
        assert_eq!(item.value, json!({"text": "hello"}));
        assert_eq!(item.namespace, ns);

        store.delete(&ns, "k1").await.unwrap();
        assert!(store.get(&ns, "k1").await.unwrap().is_none());

        // deleting again is fine
        store.delete(&ns, "k1").await.unwrap();
    }

    #[tokio::test]
    async fn test_replace_keeps_created_at() {
        let store = InMemoryStore::new();
        let ns = namespace(&["m"]);

        store.put(&ns, "k", json!(1)).await.unwrap();
        let first = store.get(&ns, "k").await.unwrap().unwrap();
        store.put(&ns, "k", json!(2)).await.unwrap();
        let second = store.get(&ns, "k").await.unwrap().unwrap();

        assert_eq!(second.value, json!(2));
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_namespace_rejected() {
        let store = InMemoryStore::new();
        let err = store.put(&[], "k", json!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidNamespace(_)));
    }

    #[tokio::test]
    async fn test_namespace_isolation() {
        let store = InMemoryStore::new();
        store
            .put(&namespace(&["users", "alice"]), "k", json!({"text": "a"}))
            .await
            .unwrap();

        let bob = store
            .search(SearchRequest::new(namespace(&["users", "bob"])))
            .await
            .unwrap();
        assert!(bob.is_empty());

        let users = store
            .search(SearchRequest::new(namespace(&["users"])))
            .await
            .unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].item.key, "k");
    }

    #[tokio::test]
    async fn test_semantic_ranking() {
        let store = InMemoryStore::new().with_index(IndexConfig::new(3, Arc::new(TopicEmbedder)));
        let ns = namespace(&["m", "u1"]);

        store.put(&ns, "k1", json!({"text": "loves hiking"})).await.unwrap();
        store
            .put(&ns, "k2", json!({"text": "tracks stock prices"}))
            .await
            .unwrap();
        store.put(&ns, "k3", json!({"note": "no text"})).await.unwrap();

        let hits = store
            .search(SearchRequest::new(ns.clone()).with_query("outdoor activities"))
            .await
            .unwrap();

        let keys: Vec<&str> = hits.iter().map(|hit| hit.item.key.as_str()).collect();
        assert_eq!(keys, vec!["k1", "k2", "k3"]);
        assert!(hits[0].score.unwrap() > hits[1].score.unwrap());
        assert!(hits[2].score.is_none());
    }

    #[tokio::test]
    async fn test_list_namespaces() {
        let store = InMemoryStore::new();
        for (ns, key) in [
            (namespace(&["users", "alice", "memories"]), "a"),
            (namespace(&["users", "bob", "memories"]), "b"),
            (namespace(&["docs"]), "c"),
        ] {
            store.put(&ns, key, json!({})).await.unwrap();
        }

        let namespaces = store
            .list_namespaces(
                ListNamespacesRequest::new()
                    .with_prefix(namespace(&["users"]))
                    .with_max_depth(2),
            )
            .await
            .unwrap();
        assert_eq!(
            namespaces,
            vec![namespace(&["users", "alice"]), namespace(&["users", "bob"])]
        );
    }
}
