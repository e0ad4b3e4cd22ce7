//! Server wiring for Assura: configuration, state construction and the
//! top-level router. The binary in `main.rs` is a thin shell over this.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use assura_api::{ApiState, api_router};
use assura_core::{
  claims::{ClaimRegistry, ClaimsConfig},
  evidence::EvidencePolicy,
  identifier::{IdentifierConfig, IdentifierGenerator},
  store::IdentityStore,
};
use axum::Router;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

/// Prefix for environment overrides, e.g. `ASSURA_PORT`.
pub const ENV_PREFIX: &str = "ASSURA";

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  pub identifier: IdentifierConfig,
  pub evidence:   EvidencePolicy,
  pub claims:     ClaimsConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".to_owned(),
      port:       8080,
      store_path: PathBuf::from("~/.local/share/assura/assura.db"),
      identifier: IdentifierConfig::default(),
      evidence:   EvidencePolicy::default(),
      claims:     ClaimsConfig::default(),
    }
  }
}

impl ServerConfig {
  /// Layer the TOML file at `path` (if it exists) under `ASSURA_*`
  /// environment variables. Nested keys use `__`, e.g.
  /// `ASSURA_CLAIMS__PROVIDER_TIMEOUT_MS`.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix(ENV_PREFIX)
          .prefix_separator("_")
          .separator("__"),
      )
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  /// The store path with a leading `~` expanded.
  pub fn resolved_store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
}

// ─── State and router ─────────────────────────────────────────────────────────

/// Build handler state around an opened store. Fails on an invalid
/// identifier configuration.
pub fn build_state<S>(config: &ServerConfig, store: S) -> anyhow::Result<ApiState<S>>
where
  S: IdentityStore + 'static,
{
  let generator = IdentifierGenerator::new(&config.identifier)
    .context("invalid [identifier] configuration")?;
  let store = Arc::new(store);
  let registry = ClaimRegistry::from_config(&config.claims, store.clone());

  Ok(ApiState {
    store,
    generator: Arc::new(generator),
    policy: Arc::new(config.evidence.clone()),
    registry: Arc::new(registry),
  })
}

/// The API router wrapped in request tracing.
pub fn app<S>(state: ApiState<S>) -> Router
where
  S: IdentityStore + 'static,
{
  api_router(state).layer(TraceLayer::new_for_http())
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
