//! Middleware layer: the stage contract and the pipeline composer.
//!
//! Every route owns one [`Pipeline`] — an ordered list of stages plus a
//! terminal handler, composed once at start-up. At request time the chain
//! runs outer to inner: each stage either rejects the request terminally
//! or forwards it to [`Next`] with an augmented context. No stage runs at
//! composition time.
//!
//! The stage list is plain data. Chain order and contents are inspectable
//! (see [`Pipeline::stage_names`]) and reordering two stages is
//! observable: a stage that reads a context capability before its writer
//! has run fails with a `missing context value` error instead of silently
//! defaulting. That property is what lets the route table encode different
//! security postures by ordering alone.
//!
//! Built-in stages, outermost first as the gateway chart composes them:
//!
//! | Stage | Writes | Rejects with |
//! |---|---|---|
//! | [`provider::ProviderResolver`] | resolved provider | never |
//! | [`auth::Authenticator`] | auth outcome | redirect / 401 |
//! | [`session::SessionInjector`] | session | redirect / 401 |
//! | [`gate::SubsystemGate`] | — | 503 |

pub mod auth;
pub mod gate;
pub mod provider;
pub mod session;

use std::sync::Arc;

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::policy::Policy;
use crate::request::Request;
use crate::response::Response;
use crate::router::Params;

// ── Stage contract ────────────────────────────────────────────────────────────

/// A single middleware stage.
///
/// Stages are stateless with respect to any one request: they may close
/// over process-wide collaborators (a provider registry, a subsystem
/// probe) but must not retain per-request state between invocations — the
/// same instance serves every route that lists it.
///
/// A stage either returns a response (or error) without calling
/// `next.run`, which short-circuits the chain, or calls `next.run(req)`
/// exactly once to forward.
pub trait Middleware: Send + Sync + 'static {
    /// Stable name for logs and for [`Pipeline::stage_names`].
    fn name(&self) -> &'static str;

    /// Processes the request, forwarding through `next` unless this stage
    /// terminates it.
    fn handle<'a>(
        &'a self,
        req: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>>;
}

/// The remainder of a pipeline, from one stage's point of view.
///
/// Consumed by [`Next::run`], so a stage cannot forward the same request
/// twice.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Middleware>],
    terminal: &'a BoxedHandler,
}

impl<'a> Next<'a> {
    /// Invokes the rest of the chain: the next stage if one remains,
    /// otherwise the terminal handler.
    pub async fn run(self, req: Request) -> Result<Response, Error> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next { stages: rest, terminal: self.terminal };
                stage.handle(req, next).await
            }
            None => Ok(self.terminal.call(req).await),
        }
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// One route's composed chain: enforcement policy, ordered stages,
/// terminal handler. Immutable once built.
pub struct Pipeline {
    policy: Policy,
    stages: Vec<Arc<dyn Middleware>>,
    terminal: BoxedHandler,
}

impl Pipeline {
    /// Composes `stages` (outermost first) around `terminal`.
    ///
    /// Equivalent to `stage₁(stage₂(…(stageₙ(terminal))…))`, but the list
    /// stays inspectable data rather than nested call-expressions.
    pub fn new(
        policy: Policy,
        stages: Vec<Arc<dyn Middleware>>,
        terminal: impl Handler,
    ) -> Self {
        Self {
            policy,
            stages,
            terminal: terminal.into_boxed_handler(),
        }
    }

    /// A stage-free pipeline: just the policy and the terminal handler.
    pub fn handler(policy: Policy, terminal: impl Handler) -> Self {
        Self::new(policy, Vec::new(), terminal)
    }

    /// The enforcement policy fixed at composition time.
    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Stage names, outermost first. The route table's security posture
    /// is auditable from these without running anything.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Runs one request through the chain.
    ///
    /// Seeds the context with the route's policy and the dispatcher's
    /// extracted path parameters before the first stage, then converts
    /// any middleware error into its client-facing response. Terminal
    /// handler output passes through untouched.
    pub async fn handle(&self, req: Request, params: Params) -> Response {
        let wants_html = req.prefers_html();
        match self.run(req, params).await {
            Ok(response) => response,
            Err(err) => err.into_response(wants_html),
        }
    }

    async fn run(&self, mut req: Request, params: Params) -> Result<Response, Error> {
        req.context_mut().set(self.policy)?;
        req.context_mut().set(params)?;
        let next = Next { stages: &self.stages, terminal: &self.terminal };
        next.run(req).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use http::StatusCode;

    use super::*;
    use crate::method::Method;
    use crate::provider::Session;

    /// Records its name into a shared trace, in call order.
    struct Tracer {
        name: &'static str,
        trace: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Middleware for Tracer {
        fn name(&self) -> &'static str {
            self.name
        }

        fn handle<'a>(
            &'a self,
            req: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Result<Response, Error>> {
            Box::pin(async move {
                self.trace.lock().unwrap().push(self.name);
                next.run(req).await
            })
        }
    }

    /// Reads the session capability before anything wrote it.
    struct ReadsSessionEarly;

    impl Middleware for ReadsSessionEarly {
        fn name(&self) -> &'static str {
            "reads-session"
        }

        fn handle<'a>(
            &'a self,
            req: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Result<Response, Error>> {
            Box::pin(async move {
                let _ = req.context().require::<Session>()?;
                next.run(req).await
            })
        }
    }

    struct Rejects;

    impl Middleware for Rejects {
        fn name(&self) -> &'static str {
            "rejects"
        }

        fn handle<'a>(
            &'a self,
            _req: Request,
            _next: Next<'a>,
        ) -> BoxFuture<'a, Result<Response, Error>> {
            Box::pin(async { Ok(Response::status(StatusCode::FORBIDDEN)) })
        }
    }

    fn ok_handler() -> impl Handler {
        |_req: Request| async { Response::text("ok") }
    }

    #[tokio::test]
    async fn stages_run_outer_to_inner() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(
            Policy::Open,
            vec![
                Arc::new(Tracer { name: "outer", trace: Arc::clone(&trace) }),
                Arc::new(Tracer { name: "inner", trace: Arc::clone(&trace) }),
            ],
            ok_handler(),
        );

        let resp = pipeline
            .handle(Request::new(Method::Get, "/x"), Params::default())
            .await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(*trace.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[tokio::test]
    async fn reading_before_writing_is_a_500_not_a_default() {
        let pipeline = Pipeline::new(
            Policy::Open,
            vec![Arc::new(ReadsSessionEarly)],
            ok_handler(),
        );

        let resp = pipeline
            .handle(Request::new(Method::Get, "/x"), Params::default())
            .await;
        assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn short_circuit_skips_terminal_handler() {
        let reached = Arc::new(AtomicBool::new(false));
        let spy = {
            let reached = Arc::clone(&reached);
            move |_req: Request| {
                let reached = Arc::clone(&reached);
                async move {
                    reached.store(true, Ordering::SeqCst);
                    Response::text("never")
                }
            }
        };
        let pipeline = Pipeline::new(Policy::Open, vec![Arc::new(Rejects)], spy);

        let resp = pipeline
            .handle(Request::new(Method::Get, "/x"), Params::default())
            .await;
        assert_eq!(resp.status_code(), StatusCode::FORBIDDEN);
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn pipeline_seeds_policy_and_params() {
        let pipeline = Pipeline::handler(Policy::SoftAuth, |req: Request| async move {
            let policy = *req.context().require::<Policy>().unwrap();
            let id = req.param("id").unwrap_or("-").to_owned();
            Response::text(format!("{policy}:{id}"))
        });

        let params = Params::from_iter([("id".to_owned(), "42".to_owned())]);
        let resp = pipeline.handle(Request::new(Method::Get, "/x/42"), params).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
    }

    #[test]
    fn stage_names_expose_the_chain() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(
            Policy::Enforced,
            vec![
                Arc::new(Tracer { name: "outer", trace: Arc::clone(&trace) }),
                Arc::new(Rejects),
            ],
            ok_handler(),
        );
        assert_eq!(pipeline.stage_names(), vec!["outer", "rejects"]);
        assert_eq!(pipeline.policy(), Policy::Enforced);
    }
}
