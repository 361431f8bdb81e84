//! HTTP route table (spec §6).

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;

pub mod compute;
pub mod health;
pub mod oauth;

/// Build the `/api/v2`-nested router (prefix itself applied by the
/// caller in `server.rs`, matching `original_source`'s
/// `api_v2_str` + per-router prefix composition).
pub fn compute_router(prefix: &str) -> Router<AppState> {
    Router::new()
        .route(prefix, post(compute::submit_compute))
        .route(&format!("{prefix}/output/{{task_id}}"), get(compute::get_output))
}

pub fn oauth_router(prefix: &str) -> Router<AppState> {
    Router::new()
        .route(&format!("{prefix}/token"), post(oauth::token))
        .route(&format!("{prefix}/auth0/callback"), get(oauth::auth0_callback))
}

pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(health::health_check))
}
