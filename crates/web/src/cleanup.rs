//! Deferred backend cleanup after a successful retrieval (spec §4.6 step
//! 6).
//!
//! `original_source`'s `result()` handler schedules `delete_result` via
//! FastAPI's `BackgroundTasks`, which runs strictly after the response
//! has been sent. axum has no direct equivalent, so this spawns a
//! detached `tokio::spawn` task instead — fire-and-forget, not tied to
//! the request's own cancellation, the same "run after the response, I
//! don't need to wait for it" intent.

use chemgate_core::ResultBackendClient;
use std::sync::Arc;
use uuid::Uuid;

pub fn schedule_delete(backend: Arc<dyn ResultBackendClient>, dag_id: Uuid) {
    tokio::spawn(async move {
        if let Err(e) = backend.delete_dag(dag_id).await {
            tracing::warn!(%dag_id, error = %e, "deferred dag cleanup failed");
        }
    });
}
