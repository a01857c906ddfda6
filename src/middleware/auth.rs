//! Authentication-enforcement stage.
//!
//! Reads the provider the resolution stage chose, checks the session token
//! against it, and records an [`AuthOutcome`]. What happens on failure is
//! the route's enforcement policy, seeded into the context by the
//! pipeline: `Enforced` routes terminate here — redirect to the
//! provider-selection surface for browsers, 401 for API clients — while
//! `SoftAuth` routes forward with an `Anonymous` outcome the terminal
//! handler interprets. Every `Enforced` route is therefore unreachable
//! without a session the provider accepted, and that property is auditable
//! from the route table alone.

use std::sync::Arc;

use http::header;
use tracing::debug;

use crate::context::Capability;
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::middleware::provider::ResolvedProvider;
use crate::middleware::{Middleware, Next};
use crate::policy::Policy;
use crate::provider::Provider;
use crate::request::Request;
use crate::response::Response;

/// Cookie carrying the provider session token.
pub const TOKEN_COOKIE: &str = "portico-token";

/// What authentication concluded about this request.
#[derive(Clone)]
pub enum AuthOutcome {
    /// The provider accepted the token. Carries the provider so the
    /// session stage cannot observe an authenticated request without one.
    Authenticated {
        token: String,
        provider: Arc<dyn Provider>,
    },
    /// No provider, no token, or the provider rejected the token. Only
    /// reachable past this stage on `SoftAuth` routes.
    Anonymous,
}

impl AuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

impl Capability for AuthOutcome {
    const NAME: &'static str = "auth";
}

impl std::fmt::Debug for AuthOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authenticated { provider, .. } => {
                write!(f, "Authenticated({})", provider.name())
            }
            Self::Anonymous => f.write_str("Anonymous"),
        }
    }
}

/// Stage that enforces the route's authentication policy.
#[derive(Default)]
pub struct Authenticator;

impl Authenticator {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for Authenticator {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn handle<'a>(
        &'a self,
        mut req: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let policy = *req.context().require::<Policy>()?;
            let provider = req.context().require::<ResolvedProvider>()?.get().cloned();
            let token = session_token(&req).map(str::to_owned);

            let (outcome, rejection) = match (provider, token) {
                (None, _) => (AuthOutcome::Anonymous, Some("no provider resolved")),
                (Some(_), None) => (AuthOutcome::Anonymous, Some("no session token")),
                (Some(provider), Some(token)) => match provider.authenticate(&token).await {
                    Ok(()) => (AuthOutcome::Authenticated { token, provider }, None),
                    Err(err) => {
                        debug!(provider = provider.name(), %err, "token rejected");
                        (AuthOutcome::Anonymous, Some("provider rejected token"))
                    }
                },
            };

            if policy.requires_session() {
                if let Some(reason) = rejection {
                    return Err(Error::Unauthenticated { reason: reason.to_owned() });
                }
            }

            req.context_mut().set(outcome)?;
            next.run(req).await
        })
    }
}

/// Session token from the token cookie, falling back to a bearer
/// `authorization` header for API clients that do not hold cookies.
fn session_token(req: &Request) -> Option<&str> {
    req.cookie(TOKEN_COOKIE)
        .or_else(|| req.header(header::AUTHORIZATION.as_str())?.strip_prefix("Bearer "))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use http::StatusCode;

    use super::*;
    use crate::method::Method;
    use crate::middleware::Pipeline;
    use crate::middleware::provider::ProviderResolver;
    use crate::provider::{
        Preference, ProviderError, ProviderRegistry, Session, User,
    };
    use crate::router::Params;

    /// Provider accepting exactly one token.
    struct OneToken;

    impl Provider for OneToken {
        fn name(&self) -> &str {
            "local"
        }

        fn authenticate<'a>(
            &'a self,
            token: &'a str,
        ) -> BoxFuture<'a, Result<(), ProviderError>> {
            Box::pin(async move {
                if token == "good" { Ok(()) } else { Err(ProviderError::TokenRejected) }
            })
        }

        fn fetch_session<'a>(
            &'a self,
            _: &'a str,
        ) -> BoxFuture<'a, Result<Session, ProviderError>> {
            Box::pin(async {
                Ok(Session {
                    user: User { id: "u1".into(), name: "Ada".into(), email: None },
                    preferences: Preference::default(),
                })
            })
        }
    }

    fn chain(policy: Policy) -> (Pipeline, Arc<AtomicBool>) {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(OneToken)).unwrap();
        registry.set_default("local").unwrap();

        let reached = Arc::new(AtomicBool::new(false));
        let spy = {
            let reached = Arc::clone(&reached);
            move |_req: Request| {
                let reached = Arc::clone(&reached);
                async move {
                    reached.store(true, Ordering::SeqCst);
                    Response::text("handler")
                }
            }
        };
        let pipeline = Pipeline::new(
            policy,
            vec![
                Arc::new(ProviderResolver::new(Arc::new(registry))),
                Arc::new(Authenticator::new()),
            ],
            spy,
        );
        (pipeline, reached)
    }

    #[tokio::test]
    async fn enforced_without_token_rejects_before_handler() {
        let (pipeline, reached) = chain(Policy::Enforced);
        let resp = pipeline
            .handle(Request::new(Method::Get, "/api/user"), Params::default())
            .await;
        assert_eq!(resp.status_code(), StatusCode::UNAUTHORIZED);
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn enforced_browser_request_redirects_to_provider_selection() {
        let (pipeline, reached) = chain(Policy::Enforced);
        let req = Request::new(Method::Get, "/api/user").with_header("accept", "text/html");
        let resp = pipeline.handle(req, Params::default()).await;
        assert_eq!(resp.status_code(), StatusCode::FOUND);
        assert_eq!(resp.header("location"), Some("/provider"));
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn enforced_with_valid_token_forwards() {
        let (pipeline, reached) = chain(Policy::Enforced);
        let req = Request::new(Method::Get, "/api/user")
            .with_header("cookie", "portico-token=good");
        let resp = pipeline.handle(req, Params::default()).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert!(reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn enforced_with_rejected_token_terminates() {
        let (pipeline, reached) = chain(Policy::Enforced);
        let req = Request::new(Method::Get, "/api/user")
            .with_header("cookie", "portico-token=stale");
        let resp = pipeline.handle(req, Params::default()).await;
        assert_eq!(resp.status_code(), StatusCode::UNAUTHORIZED);
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn soft_auth_forwards_anonymously() {
        let (pipeline, reached) = chain(Policy::SoftAuth);
        let resp = pipeline
            .handle(Request::new(Method::Get, "/api/components"), Params::default())
            .await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert!(reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn bearer_header_is_accepted_in_place_of_cookie() {
        let (pipeline, reached) = chain(Policy::Enforced);
        let req = Request::new(Method::Get, "/api/user")
            .with_header("authorization", "Bearer good");
        let resp = pipeline.handle(req, Params::default()).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert!(reached.load(Ordering::SeqCst));
    }
}
