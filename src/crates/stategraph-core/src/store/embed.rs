//! Embedding index configuration and similarity
//!
//! The store never talks to an embedding model directly. Callers inject an [`Embedder`];
//! the store only asks it for vectors of the configured dimensionality and compares them
//! with [`cosine_similarity`].

use super::{Result, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Maps text to fixed-length vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per document, in order
    async fn embed_documents(&self, documents: &[&str]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[query])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Embedding("embedder returned no vector".to_string()))
    }
}

/// Store-wide semantic index settings
#[derive(Clone)]
pub struct IndexConfig {
    /// Length of every vector the embedder returns
    pub dims: usize,
    pub embedder: Arc<dyn Embedder>,
    /// Dotted paths into the value whose text is embedded
    pub fields: Vec<String>,
}

impl fmt::Debug for IndexConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexConfig")
            .field("dims", &self.dims)
            .field("embedder", &"<embedder>")
            .field("fields", &self.fields)
            .finish()
    }
}

impl IndexConfig {
    pub fn new(dims: usize, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            dims,
            embedder,
            fields: vec!["text".to_string()],
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Text of the indexed fields, joined by newlines; `None` when none are present
    pub fn extract_text(&self, value: &Value) -> Option<String> {
        let mut parts = Vec::new();
        for field in &self.fields {
            match lookup_path(value, field) {
                None | Some(Value::Null) => {}
                Some(Value::String(text)) => parts.push(text.clone()),
                Some(Value::Array(items)) => {
                    for item in items {
                        match item {
                            Value::String(text) => parts.push(text.clone()),
                            Value::Null => {}
                            other => parts.push(other.to_string()),
                        }
                    }
                }
                Some(other) => parts.push(other.to_string()),
            }
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    /// Embedding of a value, `None` if it has no indexable text
    pub(crate) async fn embed_value(&self, value: &Value) -> Result<Option<Vec<f32>>> {
        let text = match self.extract_text(value) {
            Some(text) => text,
            None => return Ok(None),
        };

        let vector = self
            .embedder
            .embed_documents(&[text.as_str()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Embedding("embedder returned no vector".to_string()))?;
        self.check_dims(&vector)?;
        Ok(Some(vector))
    }

    pub(crate) async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let vector = self.embedder.embed_query(query).await?;
        self.check_dims(&vector)?;
        Ok(vector)
    }

    fn check_dims(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dims {
            return Err(StoreError::Embedding(format!(
                "expected {} dimensions, embedder returned {}",
                self.dims,
                vector.len()
            )));
        }
        Ok(())
    }
}

/// Resolve a dotted path such as `"profile.bio"` inside a JSON value
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Cosine similarity in `[-1, 1]`; 0 for empty, mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed_documents(&self, documents: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(documents.iter().map(|_| self.0.clone()).collect())
        }
    }

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_extract_text_from_paths() {
        let index = IndexConfig::new(2, Arc::new(FixedEmbedder(vec![1.0, 0.0])))
            .with_fields(["text", "profile.tags"]);

        let value = json!({"text": "loves hiking", "profile": {"tags": ["outdoors", 3]}});
        assert_eq!(
            index.extract_text(&value).unwrap(),
            "loves hiking\noutdoors\n3"
        );
        assert!(index.extract_text(&json!({"other": "x"})).is_none());
    }

    #[test]
    fn test_lookup_path() {
        let value = json!({"a": {"b": [10, {"c": "deep"}]}});
        assert_eq!(lookup_path(&value, "a.b.1.c"), Some(&json!("deep")));
        assert_eq!(lookup_path(&value, "a.missing"), None);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_embedding_error() {
        let index = IndexConfig::new(3, Arc::new(FixedEmbedder(vec![1.0, 0.0])));

        let err = index.embed_value(&json!({"text": "hi"})).await.unwrap_err();
        assert!(matches!(err, StoreError::Embedding(_)));
        assert!(index.embed_query("hi").await.is_err());
        assert!(index.embed_value(&json!({})).await.unwrap().is_none());
    }

    proptest! {
        #[test]
        fn prop_cosine_is_symmetric_and_bounded(
            a in proptest::collection::vec(-100.0f32..100.0, 4),
            b in proptest::collection::vec(-100.0f32..100.0, 4),
        ) {
            let ab = cosine_similarity(&a, &b);
            let ba = cosine_similarity(&b, &a);
            prop_assert!((ab - ba).abs() < 1e-5);
            prop_assert!((-1.0001..=1.0001).contains(&ab));
        }
    }
}
