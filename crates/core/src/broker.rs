//! Broker Client (spec §4.1).
//!
//! Creates worker-executable tasks for a (program, input, options) triple
//! and submits them to the broker, returning stable ids. Modeled as an
//! async trait so a production HTTP adapter and an in-memory fake share
//! call sites, trait-shaped channels behind a shared `AppState`.

use crate::dag::Leaf;
use crate::error::{GatewayError, GatewayResult};
use crate::model::ProgramSelector;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Default outbound submission timeout (spec §5: "outbound HTTP uses a
/// default 5-second timeout").
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// One task submitted to the broker and the id it was assigned.
#[derive(Debug, Clone)]
pub struct AsyncHandle {
    pub task_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct GroupHandle {
    pub group_id: Uuid,
    pub children: Vec<AsyncHandle>,
}

#[derive(Debug, Clone)]
pub struct ChordHandle {
    pub chord_id: Uuid,
    pub fan_out: Vec<AsyncHandle>,
    pub reducer: AsyncHandle,
}

#[derive(Debug, Serialize)]
struct LeafDescriptor<'a> {
    task_id: Uuid,
    program: &'a str,
    input: &'a serde_json::Value,
    queue: Option<&'a str>,
}

/// Submits task descriptors to the broker and materializes typed handles.
///
/// Must not block the request thread on broker network latency past the
/// submission timeout; on failure it surfaces `BrokerUnavailable` rather
/// than propagating a transport error (spec §4.1).
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn submit_leaf(
        &self,
        program: ProgramSelector,
        input: serde_json::Value,
        queue: Option<&str>,
    ) -> GatewayResult<AsyncHandle>;

    async fn submit_group(
        &self,
        program: ProgramSelector,
        inputs: Vec<serde_json::Value>,
        queue: Option<&str>,
    ) -> GatewayResult<GroupHandle>;

    async fn submit_chord(
        &self,
        program: ProgramSelector,
        fan_out_inputs: Vec<serde_json::Value>,
        reducer_input: serde_json::Value,
        queue: Option<&str>,
    ) -> GatewayResult<ChordHandle>;

    /// Best-effort revocation after a persistence failure post-submission
    /// (spec §4.5). Swallows its own failures — callers already know the
    /// request is failing and only want to limit wasted worker time.
    async fn revoke(&self, task_id: Uuid);
}

impl AsyncHandle {
    pub fn into_leaf(self, program: ProgramSelector, input: serde_json::Value) -> Leaf {
        Leaf {
            task_id: self.task_id,
            program,
            input,
        }
    }
}

/// Production adapter: the broker is modeled as an HTTP service (spec §6
/// names only a "broker connection string"; this core treats that string
/// as a base URL and POSTs task descriptors to it).
pub struct ReqwestBrokerClient {
    http: reqwest::Client,
    base_url: String,
}

impl ReqwestBrokerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_SUBMIT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn post_descriptor(&self, descriptor: &LeafDescriptor<'_>) -> GatewayResult<()> {
        self.http
            .post(format!("{}/tasks", self.base_url))
            .json(descriptor)
            .send()
            .await
            .map_err(|e| GatewayError::BrokerUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| GatewayError::BrokerUnavailable(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl BrokerClient for ReqwestBrokerClient {
    async fn submit_leaf(
        &self,
        program: ProgramSelector,
        input: serde_json::Value,
        queue: Option<&str>,
    ) -> GatewayResult<AsyncHandle> {
        let task_id = Uuid::new_v4();
        self.post_descriptor(&LeafDescriptor {
            task_id,
            program: program.as_wire_str(),
            input: &input,
            queue,
        })
        .await?;
        Ok(AsyncHandle { task_id })
    }

    async fn submit_group(
        &self,
        program: ProgramSelector,
        inputs: Vec<serde_json::Value>,
        queue: Option<&str>,
    ) -> GatewayResult<GroupHandle> {
        let mut children = Vec::with_capacity(inputs.len());
        for input in inputs {
            children.push(self.submit_leaf(program, input, queue).await?);
        }
        Ok(GroupHandle {
            group_id: Uuid::new_v4(),
            children,
        })
    }

    async fn submit_chord(
        &self,
        program: ProgramSelector,
        fan_out_inputs: Vec<serde_json::Value>,
        reducer_input: serde_json::Value,
        queue: Option<&str>,
    ) -> GatewayResult<ChordHandle> {
        let mut fan_out = Vec::with_capacity(fan_out_inputs.len());
        for input in fan_out_inputs {
            fan_out.push(self.submit_leaf(program, input, queue).await?);
        }
        let reducer = self.submit_leaf(program, reducer_input, queue).await?;
        Ok(ChordHandle {
            chord_id: Uuid::new_v4(),
            fan_out,
            reducer,
        })
    }

    async fn revoke(&self, task_id: Uuid) {
        let outcome = self
            .http
            .post(format!("{}/tasks/{}/revoke", self.base_url, task_id))
            .send()
            .await;
        if let Err(e) = outcome {
            tracing::warn!(%task_id, error = %e, "best-effort revocation failed");
        }
    }
}

/// In-memory fake broker for tests: mints ids and records submitted leaves
/// without any network I/O (teacher grounding: `oya_web::actors::
/// mock_scheduler`/`mock_state_manager`, which run a real receiver loop but
/// never reach out over the network).
#[derive(Default)]
pub struct InMemoryBrokerClient {
    submitted: Mutex<Vec<Uuid>>,
    revoked: Mutex<Vec<Uuid>>,
}

impl InMemoryBrokerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted_ids(&self) -> Vec<Uuid> {
        self.submitted.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn revoked_ids(&self) -> Vec<Uuid> {
        self.revoked.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BrokerClient for InMemoryBrokerClient {
    async fn submit_leaf(
        &self,
        _program: ProgramSelector,
        _input: serde_json::Value,
        _queue: Option<&str>,
    ) -> GatewayResult<AsyncHandle> {
        let task_id = Uuid::new_v4();
        if let Ok(mut guard) = self.submitted.lock() {
            guard.push(task_id);
        }
        Ok(AsyncHandle { task_id })
    }

    async fn submit_group(
        &self,
        program: ProgramSelector,
        inputs: Vec<serde_json::Value>,
        queue: Option<&str>,
    ) -> GatewayResult<GroupHandle> {
        let mut children = Vec::with_capacity(inputs.len());
        for input in inputs {
            children.push(self.submit_leaf(program, input, queue).await?);
        }
        Ok(GroupHandle {
            group_id: Uuid::new_v4(),
            children,
        })
    }

    async fn submit_chord(
        &self,
        program: ProgramSelector,
        fan_out_inputs: Vec<serde_json::Value>,
        reducer_input: serde_json::Value,
        queue: Option<&str>,
    ) -> GatewayResult<ChordHandle> {
        let mut fan_out = Vec::with_capacity(fan_out_inputs.len());
        for input in fan_out_inputs {
            fan_out.push(self.submit_leaf(program, input, queue).await?);
        }
        let reducer = self.submit_leaf(program, reducer_input, queue).await?;
        Ok(ChordHandle {
            chord_id: Uuid::new_v4(),
            fan_out,
            reducer,
        })
    }

    async fn revoke(&self, task_id: Uuid) {
        if let Ok(mut guard) = self.revoked.lock() {
            guard.push(task_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_broker_mints_distinct_ids() {
        let broker = InMemoryBrokerClient::new();
        let a = broker
            .submit_leaf(ProgramSelector::Psi4, serde_json::json!({}), None)
            .await
            .unwrap();
        let b = broker
            .submit_leaf(ProgramSelector::Psi4, serde_json::json!({}), None)
            .await
            .unwrap();
        assert_ne!(a.task_id, b.task_id);
        assert_eq!(broker.submitted_ids().len(), 2);
    }

    #[tokio::test]
    async fn in_memory_broker_records_revocations() {
        let broker = InMemoryBrokerClient::new();
        let handle = broker
            .submit_leaf(ProgramSelector::Psi4, serde_json::json!({}), None)
            .await
            .unwrap();
        broker.revoke(handle.task_id).await;
        assert_eq!(broker.revoked_ids(), vec![handle.task_id]);
    }
}
