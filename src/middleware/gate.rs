//! Subsystem-readiness gates.
//!
//! Some terminal handlers are only meaningful once a downstream subsystem
//! — the cluster connection, the controller set — is reachable and
//! initialized. A gate sits innermost in the chain and answers
//! `503 Service Unavailable` while the dependency is down, so the handler
//! never observes a half-initialized collaborator. Gates verify; they do
//! not repair or retry.

use std::sync::Arc;

use crate::error::Error;
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Why a subsystem cannot serve requests right now.
#[derive(Debug, thiserror::Error)]
pub enum SubsystemError {
    /// Start-up for this subsystem has not completed.
    #[error("not initialized")]
    NotInitialized,
    /// The subsystem answered its probe with a failure.
    #[error("unreachable: {0}")]
    Unreachable(String),
}

/// A downstream dependency whose readiness gates one or more routes.
///
/// Probes may do I/O; they run inside the task serving the gated request.
pub trait Subsystem: Send + Sync + 'static {
    /// Gate name, e.g. `"cluster"` — doubles as the stage name in
    /// [`Pipeline::stage_names`](crate::Pipeline::stage_names).
    fn name(&self) -> &'static str;

    /// Resolves `Ok` when the subsystem can serve a request right now.
    fn ready(&self) -> BoxFuture<'_, Result<(), SubsystemError>>;
}

/// Stage wrapping a [`Subsystem`] probe.
pub struct SubsystemGate {
    subsystem: Arc<dyn Subsystem>,
}

impl SubsystemGate {
    pub fn new(subsystem: Arc<dyn Subsystem>) -> Self {
        Self { subsystem }
    }
}

impl Middleware for SubsystemGate {
    fn name(&self) -> &'static str {
        self.subsystem.name()
    }

    fn handle<'a>(
        &'a self,
        req: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            match self.subsystem.ready().await {
                Ok(()) => next.run(req).await,
                Err(source) => Err(Error::Unavailable {
                    subsystem: self.subsystem.name(),
                    source,
                }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use http::StatusCode;

    use super::*;
    use crate::method::Method;
    use crate::middleware::Pipeline;
    use crate::policy::Policy;
    use crate::router::Params;

    struct Toggle {
        up: AtomicBool,
    }

    impl Subsystem for Toggle {
        fn name(&self) -> &'static str {
            "cluster"
        }

        fn ready(&self) -> BoxFuture<'_, Result<(), SubsystemError>> {
            Box::pin(async {
                if self.up.load(Ordering::SeqCst) {
                    Ok(())
                } else {
                    Err(SubsystemError::NotInitialized)
                }
            })
        }
    }

    fn gated(up: bool) -> (Pipeline, Arc<AtomicBool>) {
        let subsystem = Arc::new(Toggle { up: AtomicBool::new(up) });
        let reached = Arc::new(AtomicBool::new(false));
        let spy = {
            let reached = Arc::clone(&reached);
            move |_req: Request| {
                let reached = Arc::clone(&reached);
                async move {
                    reached.store(true, Ordering::SeqCst);
                    Response::text("scan complete")
                }
            }
        };
        let pipeline = Pipeline::new(
            Policy::Open,
            vec![Arc::new(SubsystemGate::new(subsystem))],
            spy,
        );
        (pipeline, reached)
    }

    #[tokio::test]
    async fn closed_gate_returns_503_without_reaching_handler() {
        let (pipeline, reached) = gated(false);
        let resp = pipeline
            .handle(Request::new(Method::Get, "/api/telemetry/metrics/scan"), Params::default())
            .await;
        assert_eq!(resp.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn open_gate_forwards() {
        let (pipeline, reached) = gated(true);
        let resp = pipeline
            .handle(Request::new(Method::Get, "/api/telemetry/metrics/scan"), Params::default())
            .await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert!(reached.load(Ordering::SeqCst));
    }
}
