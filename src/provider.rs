//! Authentication-provider contract and registry.
//!
//! A provider is the pluggable backend that owns authentication, session,
//! and identity operations for one tenant or deployment mode — a local
//! no-login mode, a hosted multi-tenant service, an enterprise SSO bridge.
//! This crate never implements a provider; it resolves one per request and
//! hands it to the stages and terminal handlers through the request
//! context.
//!
//! The registry is assembled before the listener starts and is read-only
//! afterwards, so concurrent lookups need no synchronization beyond the
//! `Arc` it is shared through.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::Capability;
use crate::error::Error;
use crate::handler::BoxFuture;

/// Errors a provider backend can surface.
///
/// The authentication stages translate these into request outcomes; they
/// never retry. `Unreachable` is worth distinguishing from a bad token so
/// that an outage does not read as a credential problem in the logs.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The token does not name a live session.
    #[error("token rejected")]
    TokenRejected,
    /// The session exists but has expired.
    #[error("session expired")]
    SessionExpired,
    /// The provider backend could not be reached.
    #[error("provider unreachable: {0}")]
    Unreachable(String),
}

/// A pluggable authentication/session/identity backend.
///
/// Implementations may block on network I/O inside the returned futures;
/// that waits only the task serving the current request. Implementations
/// must be safe for unsynchronized concurrent calls — the same instance
/// serves every in-flight request that resolved to it.
pub trait Provider: Send + Sync + 'static {
    /// Registry key and log identifier, e.g. `"local"` or `"cloud"`.
    fn name(&self) -> &str;

    /// Checks that `token` names a live authenticated session.
    fn authenticate<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<(), ProviderError>>;

    /// Loads the user and preference state bound to `token`.
    fn fetch_session<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Session, ProviderError>>;
}

/// The authenticated user, as the provider describes them.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Per-user gateway preferences loaded alongside the session.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Preference {
    #[serde(default)]
    pub anonymous_usage_stats: bool,
    #[serde(default)]
    pub theme: Option<String>,
}

/// User plus preference state for one authenticated session.
///
/// Written into the request context by the session-injection stage;
/// terminal handlers on `Enforced` routes can rely on it being present.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Session {
    pub user: User,
    #[serde(default)]
    pub preferences: Preference,
}

impl Capability for Session {
    const NAME: &'static str = "session";
}

/// All configured providers, keyed by name, with an optional default used
/// when a request does not name one.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    default: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a provider under its own name. Registering two providers with
    /// one name is a configuration bug and fails fast.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> Result<(), Error> {
        let name = provider.name().to_owned();
        if self.providers.contains_key(&name) {
            return Err(Error::DuplicateProvider { name });
        }
        self.providers.insert(name, provider);
        Ok(())
    }

    /// Names the provider to fall back to when a request carries no
    /// provider cookie. Must already be registered.
    pub fn set_default(&mut self, name: &str) -> Result<(), Error> {
        if !self.providers.contains_key(name) {
            return Err(Error::UnknownProvider { name: name.to_owned() });
        }
        self.default = Some(name.to_owned());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).map(Arc::clone)
    }

    pub fn default_provider(&self) -> Option<Arc<dyn Provider>> {
        self.default.as_deref().and_then(|name| self.get(name))
    }

    /// Registered provider names, sorted for stable listings.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
