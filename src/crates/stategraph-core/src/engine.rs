//! Engine: owns the storage handles and compiles graphs against them
//!
//! ```text
//! Engine::open(config, index)
//!   ├── Database (sqlx pool, WAL)     ── closed by shutdown()
//!   ├── CheckpointSaver  ◄── every CompiledGraph
//!   └── BaseStore        ◄── every NodeContext
//! ```
//!
//! Storage is never ambient: each compiled graph receives the handles explicitly.

use crate::builder::StateGraph;
use crate::compiled::CompiledGraph;
use crate::config::{Backend, EngineConfig};
use crate::db::Database;
use crate::error::{GraphError, Result};
use crate::graph::FailurePolicy;
use crate::store::{BaseStore, InMemoryStore, IndexConfig, SqliteStore};
use stategraph_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver, SqliteCheckpointSaver};
use std::sync::Arc;
use tracing::info;

pub struct Engine {
    config: EngineConfig,
    database: Option<Database>,
    checkpointer: Arc<dyn CheckpointSaver>,
    store: Arc<dyn BaseStore>,
}

impl Engine {
    /// Open the configured backend and create its tables.
    ///
    /// `index` enables semantic search in the memory store; its fields are taken from
    /// `config.store.index_fields`, and `config.store.dims`, when set, must match it.
    pub async fn open(config: EngineConfig, index: Option<IndexConfig>) -> Result<Self> {
        let index = match index {
            Some(index) => {
                if let Some(dims) = config.store.dims {
                    if dims != index.dims {
                        return Err(GraphError::Configuration(format!(
                            "store.dims is {} but the embedding index produces {} dimensions",
                            dims, index.dims
                        )));
                    }
                }
                Some(index.with_fields(config.store.index_fields.clone()))
            }
            None => None,
        };

        let (database, checkpointer, store): (
            Option<Database>,
            Arc<dyn CheckpointSaver>,
            Arc<dyn BaseStore>,
        ) = match config.database.backend {
            Backend::Sqlite => {
                let database = Database::open(&config.database).await?;

                let saver = SqliteCheckpointSaver::new(database.pool().clone());
                saver.setup().await?;

                let mut store = SqliteStore::new(database.pool().clone());
                if let Some(index) = index {
                    store = store.with_index(index);
                }
                store.setup().await?;

                (Some(database), Arc::new(saver), Arc::new(store))
            }
            Backend::Memory => {
                let mut store = InMemoryStore::new();
                if let Some(index) = index {
                    store = store.with_index(index);
                }
                (None, Arc::new(InMemoryCheckpointSaver::new()), Arc::new(store))
            }
        };

        info!(backend = ?config.database.backend, "Engine opened");
        Ok(Self {
            config,
            database,
            checkpointer,
            store,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn checkpointer(&self) -> Arc<dyn CheckpointSaver> {
        self.checkpointer.clone()
    }

    pub fn store(&self) -> Arc<dyn BaseStore> {
        self.store.clone()
    }

    /// `None` for the in-memory backend
    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    /// Compile `graph` with this engine's saver, store and execution settings
    pub fn compile(&self, graph: StateGraph) -> Result<CompiledGraph> {
        let execution = &self.config.execution;
        let captures = execution.failure_policy == FailurePolicy::Capture
            || graph
                .graph()
                .nodes
                .values()
                .any(|spec| spec.failure_policy == Some(FailurePolicy::Capture));
        if captures && graph.schema().get(&execution.error_field).is_none() {
            return Err(GraphError::Configuration(format!(
                "Capture policy requires the state field '{}' to be declared",
                execution.error_field
            )));
        }

        Ok(graph
            .compile(self.checkpointer.clone())?
            .with_store(self.store.clone())
            .with_execution(execution.clone()))
    }

    /// Close the database; compiled graphs of this engine stop working
    pub async fn shutdown(self) {
        if let Some(database) = &self.database {
            database.close().await;
        }
        info!("Engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FieldSpec, StateSchema};
    use crate::store::Embedder;
    use async_trait::async_trait;
    use serde_json::json;

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed_documents(
            &self,
            documents: &[&str],
        ) -> crate::store::Result<Vec<Vec<f32>>> {
            Ok(documents.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn memory_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.database.backend = Backend::Memory;
        config
    }

    #[tokio::test]
    async fn test_memory_engine_compiles_graph() {
        let engine = Engine::open(memory_config(), None).await.unwrap();
        assert!(engine.database().is_none());

        let mut graph = StateGraph::new(StateSchema::new().field(FieldSpec::replace("n")));
        graph.add_node("set", |_state, _ctx| async { Ok(json!({"n": 1})) });
        graph.set_entry("set");

        let compiled = engine.compile(graph).unwrap();
        let outcome = compiled.invoke("t", json!({})).await.unwrap();
        assert_eq!(outcome.values().unwrap()["n"], 1);
        assert!(compiled.store().is_some());

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_dims_mismatch_rejected() {
        let mut config = memory_config();
        config.store.dims = Some(3);

        let result = Engine::open(config, Some(IndexConfig::new(2, Arc::new(UnitEmbedder)))).await;
        assert!(matches!(result, Err(GraphError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_capture_requires_error_field() {
        let mut config = memory_config();
        config.execution.failure_policy = FailurePolicy::Capture;
        let engine = Engine::open(config, None).await.unwrap();

        let mut graph = StateGraph::new(StateSchema::new().field(FieldSpec::replace("n")));
        graph.add_node("set", |_state, _ctx| async { Ok(()) });
        graph.set_entry("set");

        assert!(matches!(
            engine.compile(graph),
            Err(GraphError::Configuration(_))
        ));
    }
}
