//! Result Backend Client (spec §4.2).
//!
//! Key→value store keyed by task id: durably stores/fetches/deletes Task
//! DAG blobs, and probes leaf readiness. Same `Surreal<Any>` connection
//! wrapper and `upsert`/`select`/`delete` CRUD shape as
//! `orchestrator::persistence::{client, workflow_store}`, with the
//! "typed error enum with a `from_surrealdb_error` classifier" pattern
//! collapsed here into `GatewayError::BackendUnavailable`.

use crate::dag::GatewayTaskState;
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use uuid::Uuid;

/// One leaf's latest observed readiness, as a worker last wrote it (spec
/// §4.2: `probe_ready` never raises on unknown ids).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafRecord {
    pub ready: bool,
    pub state: GatewayTaskState,
    pub output: Option<serde_json::Value>,
}

/// Durable store for Task DAG metadata and leaf results, keyed by id.
#[async_trait]
pub trait ResultBackendClient: Send + Sync {
    /// Idempotent store; overwriting is not expected in normal operation
    /// but is not an error (spec §4.2).
    async fn put_dag(&self, id: Uuid, dag_blob: Vec<u8>) -> GatewayResult<()>;

    /// One-shot lookup. Returns `Ok(None)` when the id was never stored or
    /// has already been deleted (spec §4.2: "NotFound").
    async fn get_dag(&self, id: Uuid) -> GatewayResult<Option<Vec<u8>>>;

    /// Removes the DAG node and forgets all descendant leaf results (spec
    /// §4.2, §4.6 step 6). Idempotent: deleting twice is not an error.
    async fn delete_dag(&self, id: Uuid) -> GatewayResult<()>;

    /// Never raises on an id no worker has written yet — unknown maps to
    /// `(false, PENDING, None)` (spec §4.2).
    async fn probe_ready(&self, leaf_id: Uuid) -> GatewayResult<LeafRecord>;
}

fn unknown_leaf() -> LeafRecord {
    LeafRecord {
        ready: false,
        state: GatewayTaskState::Pending,
        output: None,
    }
}

/// Configuration for connecting to the SurrealDB-backed result store
/// (mirrors `orchestrator::persistence::client::StoreConfig`).
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub credentials: Option<(String, String)>,
}

impl BackendConfig {
    pub fn in_memory() -> Self {
        Self {
            url: "mem://".to_string(),
            namespace: "chemgate".to_string(),
            database: "gateway".to_string(),
            credentials: None,
        }
    }
}

/// Production adapter backed by SurrealDB.
pub struct SurrealResultBackend {
    db: Surreal<Any>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DagRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<surrealdb::sql::Thing>,
    blob: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LeafRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<surrealdb::sql::Thing>,
    #[serde(flatten)]
    record: LeafRecord,
}

impl SurrealResultBackend {
    pub async fn connect(config: BackendConfig) -> GatewayResult<Self> {
        let db = Surreal::<Any>::init();
        db.connect(&config.url)
            .await
            .map_err(|e| GatewayError::BackendUnavailable(e.to_string()))?;

        if let Some((username, password)) = &config.credentials {
            db.signin(Root { username, password })
                .await
                .map_err(|e| GatewayError::BackendUnavailable(e.to_string()))?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| GatewayError::BackendUnavailable(e.to_string()))?;

        Ok(Self { db })
    }

    /// Called by the worker-facing side of the system when a leaf
    /// completes. Not part of the gateway's own request path, but kept
    /// here so the backend adapter is self-contained and testable without
    /// a real worker fleet.
    pub async fn record_leaf_result(&self, leaf_id: Uuid, record: LeafRecord) -> GatewayResult<()> {
        let _: Option<LeafRow> = self
            .db
            .upsert(("leaf_result", leaf_id.to_string()))
            .content(LeafRow { id: None, record })
            .await
            .map_err(|e| GatewayError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ResultBackendClient for SurrealResultBackend {
    async fn put_dag(&self, id: Uuid, dag_blob: Vec<u8>) -> GatewayResult<()> {
        let _: Option<DagRecord> = self
            .db
            .upsert(("dag", id.to_string()))
            .content(DagRecord {
                id: None,
                blob: dag_blob,
            })
            .await
            .map_err(|e| GatewayError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn get_dag(&self, id: Uuid) -> GatewayResult<Option<Vec<u8>>> {
        let record: Option<DagRecord> = self
            .db
            .select(("dag", id.to_string()))
            .await
            .map_err(|e| GatewayError::BackendUnavailable(e.to_string()))?;
        Ok(record.map(|r| r.blob))
    }

    async fn delete_dag(&self, id: Uuid) -> GatewayResult<()> {
        let dag_blob: Option<DagRecord> = self
            .db
            .select(("dag", id.to_string()))
            .await
            .map_err(|e| GatewayError::BackendUnavailable(e.to_string()))?;

        let _: Option<DagRecord> = self
            .db
            .delete(("dag", id.to_string()))
            .await
            .map_err(|e| GatewayError::BackendUnavailable(e.to_string()))?;

        if let Some(record) = dag_blob {
            if let Ok(dag) = crate::dag::TaskDag::deserialize(&record.blob) {
                for leaf in dag.leaves() {
                    let _: Option<LeafRow> = self
                        .db
                        .delete(("leaf_result", leaf.task_id.to_string()))
                        .await
                        .map_err(|e| GatewayError::BackendUnavailable(e.to_string()))?;
                }
            }
        }
        Ok(())
    }

    async fn probe_ready(&self, leaf_id: Uuid) -> GatewayResult<LeafRecord> {
        let row: Option<LeafRow> = self
            .db
            .select(("leaf_result", leaf_id.to_string()))
            .await
            .map_err(|e| GatewayError::BackendUnavailable(e.to_string()))?;
        Ok(row.map(|r| r.record).unwrap_or_else(unknown_leaf))
    }
}

/// In-memory fake for tests, following the `oya_web::actors::
/// mock_state_manager` pattern: a working store with no network I/O.
#[derive(Default, Clone)]
pub struct InMemoryResultBackend {
    dags: Arc<Mutex<HashMap<Uuid, Vec<u8>>>>,
    leaves: Arc<Mutex<HashMap<Uuid, LeafRecord>>>,
}

impl InMemoryResultBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: simulate a worker writing a leaf result.
    pub fn set_leaf_result(&self, leaf_id: Uuid, record: LeafRecord) {
        if let Ok(mut guard) = self.leaves.lock() {
            guard.insert(leaf_id, record);
        }
    }

    pub fn dag_count(&self) -> usize {
        self.dags.lock().map(|g| g.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ResultBackendClient for InMemoryResultBackend {
    async fn put_dag(&self, id: Uuid, dag_blob: Vec<u8>) -> GatewayResult<()> {
        self.dags
            .lock()
            .map_err(|_| GatewayError::BackendUnavailable("poisoned lock".to_string()))?
            .insert(id, dag_blob);
        Ok(())
    }

    async fn get_dag(&self, id: Uuid) -> GatewayResult<Option<Vec<u8>>> {
        Ok(self
            .dags
            .lock()
            .map_err(|_| GatewayError::BackendUnavailable("poisoned lock".to_string()))?
            .get(&id)
            .cloned())
    }

    async fn delete_dag(&self, id: Uuid) -> GatewayResult<()> {
        let mut dags = self
            .dags
            .lock()
            .map_err(|_| GatewayError::BackendUnavailable("poisoned lock".to_string()))?;
        if let Some(blob) = dags.remove(&id) {
            if let Ok(dag) = crate::dag::TaskDag::deserialize(&blob) {
                let mut leaves = self
                    .leaves
                    .lock()
                    .map_err(|_| GatewayError::BackendUnavailable("poisoned lock".to_string()))?;
                for leaf in dag.leaves() {
                    leaves.remove(&leaf.task_id);
                }
            }
        }
        Ok(())
    }

    async fn probe_ready(&self, leaf_id: Uuid) -> GatewayResult<LeafRecord> {
        Ok(self
            .leaves
            .lock()
            .map_err(|_| GatewayError::BackendUnavailable("poisoned lock".to_string()))?
            .get(&leaf_id)
            .cloned()
            .unwrap_or_else(unknown_leaf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let backend = InMemoryResultBackend::new();
        let id = Uuid::new_v4();
        backend.put_dag(id, b"hello".to_vec()).await.unwrap();
        let got = backend.get_dag(id).await.unwrap();
        assert_eq!(got, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let backend = InMemoryResultBackend::new();
        let got = backend.get_dag(Uuid::new_v4()).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn probe_unknown_leaf_is_pending_not_error() {
        let backend = InMemoryResultBackend::new();
        let record = backend.probe_ready(Uuid::new_v4()).await.unwrap();
        assert!(!record.ready);
        assert_eq!(record.state, GatewayTaskState::Pending);
        assert!(record.output.is_none());
    }

    #[tokio::test]
    async fn delete_removes_dag_and_descendant_leaves() {
        let backend = InMemoryResultBackend::new();
        let leaf_id = Uuid::new_v4();
        let dag = crate::dag::TaskDag::Leaf(crate::dag::Leaf {
            task_id: leaf_id,
            program: crate::model::ProgramSelector::Psi4,
            input: serde_json::json!({}),
        });
        let root = dag.root_id();
        backend.put_dag(root, dag.serialize().unwrap()).await.unwrap();
        backend.set_leaf_result(
            leaf_id,
            LeafRecord {
                ready: true,
                state: GatewayTaskState::Success,
                output: Some(serde_json::json!({"success": true})),
            },
        );

        backend.delete_dag(root).await.unwrap();

        assert!(backend.get_dag(root).await.unwrap().is_none());
        let record = backend.probe_ready(leaf_id).await.unwrap();
        assert!(!record.ready);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let backend = InMemoryResultBackend::new();
        let id = Uuid::new_v4();
        assert!(backend.delete_dag(id).await.is_ok());
        assert!(backend.delete_dag(id).await.is_ok());
    }
}
