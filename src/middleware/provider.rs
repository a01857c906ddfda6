//! Provider-resolution stage.
//!
//! Outermost stage on every authenticated chain. It only *decides* which
//! provider backend serves this request — enforcement lives one stage in,
//! so this stage never rejects anything. Recording an explicit
//! [`ResolvedProvider`] of `None` (rather than writing nothing) is what
//! lets the enforcement stage distinguish "resolution ran and found no
//! provider" from "resolution never ran" — the latter is a mis-ordered
//! chain and fails loudly.

use std::sync::Arc;

use tracing::debug;

use crate::context::Capability;
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::provider::{Provider, ProviderRegistry};
use crate::request::Request;
use crate::response::Response;

/// Cookie naming the provider backend that should serve this request.
/// Set by the provider-selection surface at login time.
pub const PROVIDER_COOKIE: &str = "portico-provider";

/// The outcome of provider resolution: the chosen backend, or an explicit
/// "none" when neither the request nor the registry default names one.
#[derive(Clone)]
pub struct ResolvedProvider(Option<Arc<dyn Provider>>);

impl ResolvedProvider {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn get(&self) -> Option<&Arc<dyn Provider>> {
        self.0.as_ref()
    }
}

impl Capability for ResolvedProvider {
    const NAME: &'static str = "provider";
}

impl std::fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(provider) => write!(f, "ResolvedProvider({})", provider.name()),
            None => f.write_str("ResolvedProvider(none)"),
        }
    }
}

/// Stage that decides which provider serves the request: the provider
/// cookie if it names a registered backend, else the registry default.
pub struct ProviderResolver {
    registry: Arc<ProviderRegistry>,
}

impl ProviderResolver {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }
}

impl Middleware for ProviderResolver {
    fn name(&self) -> &'static str {
        "provider"
    }

    fn handle<'a>(
        &'a self,
        mut req: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let chosen = match req.cookie(PROVIDER_COOKIE) {
                Some(name) => {
                    let provider = self.registry.get(name);
                    if provider.is_none() {
                        debug!(name, "provider cookie names an unregistered provider");
                    }
                    provider.or_else(|| self.registry.default_provider())
                }
                None => self.registry.default_provider(),
            };
            match &chosen {
                Some(provider) => debug!(provider = provider.name(), "resolved provider"),
                None => debug!("no provider resolved"),
            }
            req.context_mut().set(ResolvedProvider(chosen))?;
            next.run(req).await
        })
    }
}
