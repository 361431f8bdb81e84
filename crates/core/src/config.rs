//! Configuration resolution (spec §4.9).
//!
//! Process-wide `Settings`, resolved once at startup from unprefixed,
//! case-insensitive environment variables (with a `.env` file loaded first
//! via `dotenvy`) and an optional `/var/secrets` mount, via `config::Config`
//! + source precedence, simplified down to a flat struct since this gateway
//! has no nested subsystem config. Matches `original_source`'s
//! `Settings(BaseSettings)` (`chemcloud_server/config.py`), which carries no
//! `env_prefix` and reads `secrets_dir="/var/secrets"` when that directory
//! is mounted.

use crate::error::{GatewayError, GatewayResult};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Directory mounted by the orchestrator with one file per secret setting
/// (spec §4.9), mirroring `original_source`'s `secrets_dir`.
const SECRETS_DIR: &str = "/var/secrets";

fn default_api_prefix() -> String {
    "/api/v2".to_string()
}

fn default_api_compute_prefix() -> String {
    "/compute".to_string()
}

fn default_api_oauth_prefix() -> String {
    "/oauth".to_string()
}

fn default_max_batch_inputs() -> usize {
    100
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_auth0_algorithms() -> Vec<String> {
    vec!["RS256".to_string()]
}

/// Resolved application settings (spec §4.9, §6).
///
/// Mirrors `original_source`'s `Settings` (`chemcloud_server/config.py`):
/// same field names translated to snake_case-on-the-wire env vars, same
/// "auth0 settings drive a one-time JWKS fetch" relationship, but with no
/// `lru_cache`-style singleton trick — the binary resolves this once and
/// hands an `Arc<Settings>` down through `AppState` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_api_prefix")]
    pub api_v2_str: String,

    /// Sub-path the compute router mounts under `api_v2_str` (spec §6).
    #[serde(default = "default_api_compute_prefix")]
    pub api_compute_prefix: String,
    /// Sub-path the OAuth passthrough router mounts under `api_v2_str`.
    #[serde(default = "default_api_oauth_prefix")]
    pub api_oauth_prefix: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_max_batch_inputs")]
    pub max_batch_inputs: usize,

    /// This gateway's own externally-reachable URL, used as the OAuth
    /// redirect_uri (spec §6: `BASE_URL`).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Base URL of the broker (task queue) service.
    pub broker_url: String,

    /// Connection string for the result backend (`mem://` for
    /// development, a real SurrealDB endpoint in production).
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    #[serde(default)]
    pub backend_namespace: Option<String>,
    #[serde(default)]
    pub backend_database: Option<String>,

    /// Auth0-style OIDC tenant domain. Empty disables JWKS fetch and
    /// token verification, the way `original_source` runs in CI with
    /// blank auth0 settings.
    #[serde(default)]
    pub auth0_domain: String,
    #[serde(default)]
    pub auth0_client_id: String,
    #[serde(default)]
    pub auth0_client_secret: String,
    #[serde(default)]
    pub auth0_api_audience: String,
    #[serde(default = "default_jwt_issuer_template")]
    pub jwt_issuer: Option<String>,
    /// Scope a bearer token must carry to call `/compute/*` (spec §4.8).
    #[serde(default = "default_required_scope")]
    pub required_scope: String,
    /// Signing algorithms accepted when validating a bearer token (spec
    /// §4.8), mirroring `original_source`'s `auth0_algorithms` list.
    #[serde(default = "default_auth0_algorithms")]
    pub auth0_algorithms: Vec<String>,
}

fn default_backend_url() -> String {
    "mem://".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_jwt_issuer_template() -> Option<String> {
    None
}

fn default_required_scope() -> String {
    "compute:public".to_string()
}

impl Settings {
    /// Resolve settings from `.env` + `CHEMGATE_`-prefixed environment
    /// variables (spec §4.9). Does not perform the JWKS fetch — callers
    /// that need auth should call [`Settings::jwt_issuer_url`] and fetch
    /// keys themselves once at startup, mirroring
    /// `original_source`'s `get_settings()` building the JWKS list before
    /// constructing the final `Settings`.
    pub fn resolve() -> GatewayResult<Self> {
        // Missing .env is not an error -- most deployments configure
        // purely through the environment.
        let _ = dotenvy::dotenv();

        let mut builder = Config::builder();
        if let Some(secrets) = secrets_dir_source(Path::new(SECRETS_DIR))? {
            // Lowest precedence: a bare env var always wins over a mounted
            // secret file, matching `original_source`'s pydantic behavior.
            builder = builder.add_source(secrets);
        }
        let config = builder
            .add_source(Environment::default().separator("__"))
            .build()
            .map_err(|e| GatewayError::SchemaViolation(format!("config: {e}")))?;

        let mut settings: Settings = config
            .try_deserialize()
            .map_err(|e| GatewayError::SchemaViolation(format!("config: {e}")))?;

        if settings.jwt_issuer.is_none() && !settings.auth0_domain.is_empty() {
            settings.jwt_issuer = Some(format!("https://{}/", settings.auth0_domain));
        }

        Ok(settings)
    }

    pub fn auth_enabled(&self) -> bool {
        !self.auth0_domain.is_empty()
    }

    pub fn jwks_url(&self) -> Option<String> {
        if self.auth0_domain.is_empty() {
            None
        } else {
            Some(format!("https://{}/.well-known/jwks.json", self.auth0_domain))
        }
    }
}

/// Builds a config source out of a mounted secrets directory, one file per
/// setting field (file name = field name, contents = value), mirroring
/// `original_source`'s `secrets_dir="/var/secrets"` pydantic behavior.
/// Returns `Ok(None)` when the directory isn't mounted, matching the
/// original's `Path(secrets_dir).is_dir()` guard.
fn secrets_dir_source(dir: &Path) -> GatewayResult<Option<File<config::FileSourceString, FileFormat>>> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut toml = String::new();
    for entry in std::fs::read_dir(dir)
        .map_err(|e| GatewayError::SchemaViolation(format!("reading secrets dir: {e}")))?
    {
        let entry = entry.map_err(|e| GatewayError::SchemaViolation(format!("reading secrets dir: {e}")))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(key) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let value = std::fs::read_to_string(&path)
            .map_err(|e| GatewayError::SchemaViolation(format!("reading secret '{key}': {e}")))?;
        toml.push_str(&format!("{key} = {:?}\n", value.trim()));
    }

    Ok(Some(File::from_str(&toml, FileFormat::Toml)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_disabled_when_domain_blank() {
        let settings = Settings {
            api_v2_str: default_api_prefix(),
            api_compute_prefix: default_api_compute_prefix(),
            api_oauth_prefix: default_api_oauth_prefix(),
            bind_addr: default_bind_addr(),
            max_batch_inputs: default_max_batch_inputs(),
            base_url: default_base_url(),
            broker_url: "http://localhost:9000".to_string(),
            backend_url: default_backend_url(),
            backend_namespace: None,
            backend_database: None,
            auth0_domain: String::new(),
            auth0_client_id: String::new(),
            auth0_client_secret: String::new(),
            auth0_api_audience: String::new(),
            jwt_issuer: None,
            required_scope: default_required_scope(),
            auth0_algorithms: default_auth0_algorithms(),
        };
        assert!(!settings.auth_enabled());
        assert!(settings.jwks_url().is_none());
    }

    #[test]
    fn jwks_url_derives_from_domain() {
        let settings = Settings {
            api_v2_str: default_api_prefix(),
            api_compute_prefix: default_api_compute_prefix(),
            api_oauth_prefix: default_api_oauth_prefix(),
            bind_addr: default_bind_addr(),
            max_batch_inputs: default_max_batch_inputs(),
            base_url: default_base_url(),
            broker_url: "http://localhost:9000".to_string(),
            backend_url: default_backend_url(),
            backend_namespace: None,
            backend_database: None,
            auth0_domain: "example.auth0.com".to_string(),
            auth0_client_id: String::new(),
            auth0_client_secret: String::new(),
            auth0_api_audience: "https://api.example.com".to_string(),
            jwt_issuer: None,
            required_scope: default_required_scope(),
            auth0_algorithms: default_auth0_algorithms(),
        };
        assert!(settings.auth_enabled());
        assert_eq!(
            settings.jwks_url().as_deref(),
            Some("https://example.auth0.com/.well-known/jwks.json")
        );
    }

    #[test]
    fn secrets_dir_source_reads_one_file_per_field() {
        let dir = std::env::temp_dir().join(format!("chemgate-secrets-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("broker_url"), "http://secret-broker:9000\n").unwrap();

        let source = secrets_dir_source(&dir).unwrap().expect("directory exists");
        let config = Config::builder().add_source(source).build().unwrap();
        assert_eq!(
            config.get_string("broker_url").unwrap(),
            "http://secret-broker:9000"
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn secrets_dir_source_absent_directory_is_none() {
        let missing = Path::new("/definitely/not/a/real/secrets/dir");
        assert!(secrets_dir_source(missing).unwrap().is_none());
    }
}
