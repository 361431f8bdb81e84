//! OAuth passthrough routes (spec §6; explicit Non-goal: no full OIDC
//! client, just the thin adapter spec.md describes).
//!
//! Grounded on `original_source/terachem_cloud/routes/oauth.py`:
//! `/token` forwards a password/refresh-token grant to the configured
//! Auth0 tenant and relays its JSON response verbatim; `/auth0/callback`
//! exchanges an authorization code, sets the resulting tokens as
//! httpOnly cookies, and redirects to the dashboard.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::Form;
use chemgate_core::GatewayError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scope: String,
}

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    grant_type: &'static str,
    audience: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    username: &'a str,
    password: &'a str,
    scope: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshGrant<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    refresh_token: &'a str,
}

/// POST `/oauth/token`.
pub async fn token(State(state): State<AppState>, Form(form): Form<TokenRequest>) -> Result<Json<serde_json::Value>> {
    if state.settings.auth0_domain.is_empty() {
        return Err(AppError::Gateway(GatewayError::AuthFailure(
            "no OIDC tenant configured".to_string(),
        )));
    }

    let http = reqwest::Client::new();
    let url = format!("https://{}/oauth/token", state.settings.auth0_domain);

    let body = match form.grant_type.as_str() {
        "password" => serde_json::to_value(PasswordGrant {
            grant_type: "password",
            audience: &state.settings.auth0_api_audience,
            client_id: form.client_id.as_deref().unwrap_or_default(),
            client_secret: form.client_secret.as_deref().unwrap_or_default(),
            username: form.username.as_deref().unwrap_or_default(),
            password: form.password.as_deref().unwrap_or_default(),
            scope: &form.scope,
        })
        .expect("static grant shape always serializes"),
        "refresh_token" => serde_json::to_value(RefreshGrant {
            grant_type: "refresh_token",
            client_id: form.client_id.as_deref().unwrap_or_default(),
            client_secret: form.client_secret.as_deref().unwrap_or_default(),
            refresh_token: form.refresh_token.as_deref().unwrap_or_default(),
        })
        .expect("static grant shape always serializes"),
        other => {
            return Err(AppError::Gateway(GatewayError::SchemaViolation(format!(
                "unsupported grant_type '{other}'"
            ))))
        }
    };

    forward_token_request(&http, &url, &body).await
}

async fn forward_token_request(
    http: &reqwest::Client,
    url: &str,
    body: &serde_json::Value,
) -> Result<Json<serde_json::Value>> {
    let response = http
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| AppError::Gateway(GatewayError::UpstreamOAuthError { status: 0, body: e.to_string() }))?;

    let status = response.status();
    let payload: serde_json::Value = response
        .json()
        .await
        .map_err(|e| AppError::Gateway(GatewayError::UpstreamOAuthError { status: status.as_u16(), body: e.to_string() }))?;

    if !status.is_success() {
        return Err(AppError::Gateway(GatewayError::UpstreamOAuthError {
            status: status.as_u16(),
            body: payload.to_string(),
        }));
    }

    Ok(Json(payload))
}

/// GET `/oauth/auth0/callback`.
pub async fn auth0_callback(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    let code = params
        .get("code")
        .ok_or_else(|| AppError::Gateway(GatewayError::SchemaViolation("missing 'code' query parameter".into())))?;

    if state.settings.auth0_domain.is_empty() {
        return Err(AppError::Gateway(GatewayError::AuthFailure(
            "no OIDC tenant configured".to_string(),
        )));
    }

    let http = reqwest::Client::new();
    let url = format!("https://{}/oauth/token", state.settings.auth0_domain);
    let body = serde_json::json!({
        "grant_type": "authorization_code",
        "client_id": state.settings.auth0_client_id,
        "client_secret": state.settings.auth0_client_secret,
        "audience": state.settings.auth0_api_audience,
        "code": code,
        "redirect_uri": state.settings.base_url,
    });

    let tokens = forward_token_request(&http, &url, &body).await?.0;

    let id_token = tokens
        .get("id_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::Gateway(GatewayError::UpstreamOAuthError { status: 0, body: "missing id_token".into() }))?;
    let refresh_token = tokens.get("refresh_token").and_then(|v| v.as_str()).unwrap_or_default();

    let mut response = (StatusCode::FOUND, ()).into_response();
    response.headers_mut().insert(
        header::LOCATION,
        "/users/dashboard".parse().expect("static redirect target is valid"),
    );
    response.headers_mut().append(
        header::SET_COOKIE,
        format!("id_token={id_token}; HttpOnly; Path=/").parse().expect("cookie value is header-safe"),
    );
    response.headers_mut().append(
        header::SET_COOKIE,
        format!("refresh_token={refresh_token}; HttpOnly; Path=/").parse().expect("cookie value is header-safe"),
    );

    Ok(response)
}
