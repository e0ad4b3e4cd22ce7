//! The ordered provider registry and the aggregator.

use std::{sync::Arc, time::Duration};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ClaimContext, ClaimProvider, ClaimSet, ProviderError, providers};
use crate::{Error, Result, store::IdentityStore, subject::SubjectId};

/// The built-in providers, as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
  Subject,
  Profile,
  Address,
  Document,
  Organization,
  Assurance,
  Fido,
  Upstream,
  VerifiedClaims,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimsConfig {
  /// Evaluation and merge order. Later entries override earlier ones.
  pub providers:           Vec<ProviderKind>,
  pub provider_timeout_ms: u64,
  /// `trust_framework` reported inside `verified_claims`.
  pub trust_framework:     String,
}

impl Default for ClaimsConfig {
  fn default() -> Self {
    Self {
      providers:           vec![
        ProviderKind::Subject,
        ProviderKind::Profile,
        ProviderKind::Address,
        ProviderKind::Document,
        ProviderKind::Organization,
        ProviderKind::Assurance,
        ProviderKind::Fido,
        ProviderKind::Upstream,
        ProviderKind::VerifiedClaims,
      ],
      provider_timeout_ms: 2000,
      trust_framework:     "nist_800_63A".to_owned(),
    }
  }
}

impl ClaimsConfig {
  pub fn provider_timeout(&self) -> Duration {
    Duration::from_millis(self.provider_timeout_ms)
  }
}

/// An explicit, ordered list of claim providers.
#[derive(Clone)]
pub struct ClaimRegistry {
  providers: Vec<Arc<dyn ClaimProvider>>,
  timeout:   Duration,
}

impl std::fmt::Debug for ClaimRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ClaimRegistry")
      .field("providers", &self.names())
      .field("timeout", &self.timeout)
      .finish()
  }
}

impl ClaimRegistry {
  pub fn new(timeout: Duration) -> Self { Self { providers: Vec::new(), timeout } }

  pub fn with_provider(mut self, provider: impl ClaimProvider + 'static) -> Self {
    self.push(Arc::new(provider));
    self
  }

  pub fn push(&mut self, provider: Arc<dyn ClaimProvider>) { self.providers.push(provider); }

  /// Build the built-in providers over `store`, in configured order.
  pub fn from_config<S>(config: &ClaimsConfig, store: Arc<S>) -> Self
  where
    S: IdentityStore + 'static,
  {
    let mut registry = Self::new(config.provider_timeout());
    for kind in &config.providers {
      let store = store.clone();
      let provider: Arc<dyn ClaimProvider> = match kind {
        ProviderKind::Subject => Arc::new(providers::SubjectProvider::new(store)),
        ProviderKind::Profile => Arc::new(providers::ProfileProvider::new(store)),
        ProviderKind::Address => Arc::new(providers::AddressProvider::new(store)),
        ProviderKind::Document => Arc::new(providers::DocumentProvider::new(store)),
        ProviderKind::Organization => Arc::new(providers::OrganizationProvider::new(store)),
        ProviderKind::Assurance => Arc::new(providers::AssuranceProvider::new(store)),
        ProviderKind::Fido => Arc::new(providers::FidoProvider::new(store)),
        ProviderKind::Upstream => Arc::new(providers::UpstreamProvider::new(store)),
        ProviderKind::VerifiedClaims => Arc::new(providers::VerifiedClaimsProvider::new(
          store,
          config.trust_framework.clone(),
        )),
      };
      registry.push(provider);
    }
    registry
  }

  pub fn names(&self) -> Vec<&'static str> {
    self.providers.iter().map(|p| p.name()).collect()
  }

  pub fn timeout(&self) -> Duration { self.timeout }

  /// Run every provider for `subject_id` and merge the results.
  ///
  /// Providers run concurrently, each bounded by the registry timeout. Their
  /// fragments are merged in registry order once all have finished, so the
  /// result does not depend on completion order. A provider that fails,
  /// panics or times out is logged and skipped.
  ///
  /// Fails with [`Error::MissingMandatoryClaim`] if no provider produced a
  /// non-empty `sub`.
  pub async fn aggregate(&self, subject_id: &SubjectId, today: NaiveDate) -> Result<ClaimSet> {
    let ctx = ClaimContext { subject_id: subject_id.clone(), today };

    let handles: Vec<_> = self
      .providers
      .iter()
      .map(|provider| {
        let name = provider.name();
        let provider = provider.clone();
        let ctx = ctx.clone();
        let timeout = self.timeout;
        let handle = tokio::spawn(async move {
          match tokio::time::timeout(timeout, provider.provide(&ctx)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::TimedOut(timeout)),
          }
        });
        (name, handle)
      })
      .collect();

    let mut claims = ClaimSet::new();
    for (name, handle) in handles {
      let outcome = match handle.await {
        Ok(result) => result,
        Err(join) if join.is_panic() => Err(ProviderError::Panicked(panic_message(join))),
        Err(join) => Err(ProviderError::Panicked(join.to_string())),
      };
      match outcome {
        Ok(fragment) => {
          debug!(provider = name, subject = %subject_id, claims = fragment.len(), "provider done");
          claims.merge(fragment);
        }
        Err(error) => {
          warn!(provider = name, subject = %subject_id, %error, "claim provider failed");
        }
      }
    }

    if claims.subject().is_none() {
      return Err(Error::MissingMandatoryClaim(subject_id.clone()));
    }
    Ok(claims)
  }
}

fn panic_message(join: tokio::task::JoinError) -> String {
  let payload = join.into_panic();
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_owned()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic payload".to_owned()
  }
}
