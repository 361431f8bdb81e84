//! Server assembly with Tower middleware (spec §6, §4.9).
//!
//! Grounded on `oya_web::server::{run_server, create_app}`: bind a
//! `TcpListener`, build the router with CORS/compression/trace layers,
//! serve. The API prefix is read from `Settings::api_v2_str` instead of
//! hardcoded, since this gateway's prefix is configurable (spec §6).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use chemgate_core::{BrokerClient, ResultBackendClient, Settings};
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::JwksCache;
use crate::routes::{compute_router, health_router, oauth_router};
use crate::state::AppState;

pub fn build_app(
    broker: Arc<dyn BrokerClient>,
    backend: Arc<dyn ResultBackendClient>,
    settings: Arc<Settings>,
    jwks: JwksCache,
) -> Router {
    let api_prefix = settings.api_v2_str.clone();
    let compute_prefix = settings.api_compute_prefix.clone();
    let oauth_prefix = settings.api_oauth_prefix.clone();
    let state = AppState::new(broker, backend, settings, jwks);

    Router::new()
        .merge(health_router())
        .nest(
            &api_prefix,
            compute_router(&compute_prefix).merge(oauth_router(&oauth_prefix)),
        )
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(
    broker: Arc<dyn BrokerClient>,
    backend: Arc<dyn ResultBackendClient>,
    settings: Arc<Settings>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = settings.bind_addr.parse()?;

    // Fetched once here, not inside `AppState` -- a rotated signing key
    // forces a restart rather than a background refresh (spec §5).
    let jwks = JwksCache::fetch(&settings).await?;
    let app = build_app(broker, backend, settings, jwks);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "chemgate listening");

    axum::serve(listener, app).await?;
    Ok(())
}
