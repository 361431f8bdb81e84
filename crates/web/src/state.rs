//! Shared application state (spec §4, §6).
//!
//! A small `Clone` struct of `Arc`-wrapped shared handles passed to every
//! handler via axum's `State` extractor. Trait objects stand in for an
//! actor-sender channel since this gateway's broker/backend clients are
//! plain async services, not actors.

use crate::auth::JwksCache;
use chemgate_core::{BrokerClient, ResultBackendClient, Settings};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<dyn BrokerClient>,
    pub backend: Arc<dyn ResultBackendClient>,
    pub settings: Arc<Settings>,
    pub jwks: JwksCache,
}

impl AppState {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        backend: Arc<dyn ResultBackendClient>,
        settings: Arc<Settings>,
        jwks: JwksCache,
    ) -> Self {
        Self {
            broker,
            backend,
            settings,
            jwks,
        }
    }
}
