//! Session-injection stage.
//!
//! Turns an authenticated token into the user/preference state the
//! terminal handler works with. Runs after [`auth`](super::auth) — it
//! reads the recorded [`AuthOutcome`] and, for authenticated requests,
//! asks the provider for the session and writes it into context. Whether
//! a load failure is fatal mirrors the route's enforcement policy.

use tracing::{debug, warn};

use crate::error::Error;
use crate::handler::BoxFuture;
use crate::middleware::auth::AuthOutcome;
use crate::middleware::{Middleware, Next};
use crate::policy::Policy;
use crate::request::Request;
use crate::response::Response;

/// Stage that loads the session for authenticated requests.
#[derive(Default)]
pub struct SessionInjector;

impl SessionInjector {
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for SessionInjector {
    fn name(&self) -> &'static str {
        "session"
    }

    fn handle<'a>(
        &'a self,
        mut req: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let policy = *req.context().require::<Policy>()?;
            let outcome = req.context().require::<AuthOutcome>()?.clone();

            match outcome {
                AuthOutcome::Authenticated { token, provider } => {
                    match provider.fetch_session(&token).await {
                        Ok(session) => {
                            debug!(user = %session.user.id, "session injected");
                            req.context_mut().set(session)?;
                        }
                        Err(err) if policy.requires_session() => {
                            return Err(Error::Unauthenticated {
                                reason: format!("session load failed: {err}"),
                            });
                        }
                        Err(err) => {
                            warn!(%err, "continuing without session");
                        }
                    }
                }
                AuthOutcome::Anonymous if policy.requires_session() => {
                    return Err(Error::Unauthenticated {
                        reason: "no authenticated session".to_owned(),
                    });
                }
                AuthOutcome::Anonymous => {}
            }

            next.run(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::StatusCode;

    use super::*;
    use crate::method::Method;
    use crate::middleware::Pipeline;
    use crate::middleware::auth::Authenticator;
    use crate::middleware::provider::ProviderResolver;
    use crate::provider::{
        Preference, Provider, ProviderError, ProviderRegistry, Session, User,
    };
    use crate::router::Params;

    /// Provider whose sessions can be made to fail loading.
    struct Flaky {
        sessions_up: bool,
    }

    impl Provider for Flaky {
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
            Box::pin(async move {
                if self.sessions_up {
                    Ok(Session {
                        user: User { id: "u1".into(), name: "Ada".into(), email: None },
                        preferences: Preference::default(),
                    })
                } else {
                    Err(ProviderError::Unreachable("session store down".into()))
                }
            })
        }
    }

    fn chain(policy: Policy, sessions_up: bool) -> Pipeline {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(Flaky { sessions_up })).unwrap();
        registry.set_default("local").unwrap();

        Pipeline::new(
            policy,
            vec![
                Arc::new(ProviderResolver::new(Arc::new(registry))),
                Arc::new(Authenticator::new()),
                Arc::new(SessionInjector::new()),
            ],
            |req: Request| async move {
                match req.session() {
                    Some(session) => Response::text(session.user.id.clone()),
                    None => Response::text("anonymous"),
                }
            },
        )
    }

    #[tokio::test]
    async fn injects_session_for_authenticated_request() {
        let pipeline = chain(Policy::Enforced, true);
        let req = Request::new(Method::Get, "/api/user")
            .with_header("cookie", "portico-token=good");
        let resp = pipeline.handle(req, Params::default()).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.body(), b"u1");
    }

    #[tokio::test]
    async fn load_failure_is_fatal_when_enforced() {
        let pipeline = chain(Policy::Enforced, false);
        let req = Request::new(Method::Get, "/api/user")
            .with_header("cookie", "portico-token=good");
        let resp = pipeline.handle(req, Params::default()).await;
        assert_eq!(resp.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn load_failure_is_tolerated_when_soft() {
        let pipeline = chain(Policy::SoftAuth, false);
        let req = Request::new(Method::Get, "/api/components")
            .with_header("cookie", "portico-token=good");
        let resp = pipeline.handle(req, Params::default()).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.body(), b"anonymous");
    }

    #[tokio::test]
    async fn anonymous_soft_request_reaches_handler_without_session() {
        let pipeline = chain(Policy::SoftAuth, true);
        let resp = pipeline
            .handle(Request::new(Method::Get, "/api/components"), Params::default())
            .await;
        assert_eq!(resp.body(), b"anonymous");
    }
}
