//! HTTP server and graceful shutdown.
//!
//! One listener, one logical task per inbound connection, dispatch through
//! an immutable [`Router`]. On **SIGTERM** (what Kubernetes sends before
//! SIGKILL) or **Ctrl-C** the server:
//!
//! 1. Immediately stops `listener.accept()` — no new connections.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.
//!
//! Bind and address failures are fatal configuration errors surfaced as
//! `Err` from `serve` — the process exits non-zero rather than running a
//! server that cannot accept. Per-request dispatch never panics and never
//! exits the process.

use std::net::SocketAddr;
use std::sync::Arc;

use http::StatusCode;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::error::Error;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// The HTTP server.
pub struct Server {
    addr: String,
}

impl Server {
    /// Configures the server to bind to `addr` (a `host:port` string)
    /// when [`serve`](Server::serve) is called. The address is validated
    /// in `serve`, with the rest of the start-up configuration.
    pub fn bind(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing) — or immediately
    /// with a configuration error if the listener cannot be set up.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let addr: SocketAddr = self
            .addr
            .parse()
            .map_err(|_| Error::ListenAddr { addr: self.addr.clone() })?;
        let listener = TcpListener::bind(addr).await.map_err(|source| Error::Bind {
            addr: self.addr.clone(),
            source,
        })?;

        // Arc so concurrent connection tasks share one routing table.
        let router = Arc::new(router);

        info!(addr = %addr, routes = router.routes().len(), "portico listening");

        // JoinSet tracks every spawned connection task so we can wait for
        // them all to finish during graceful shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // `biased` checks arms top-to-bottom: a SIGTERM stops
                // accepting even if more connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // `service_fn` runs once per request on the
                        // connection, not once per connection.
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            async move { dispatch(router, req).await }
                        });

                        // auto::Builder handles HTTP/1.1 and HTTP/2,
                        // whatever the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not
                // grow without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Drain: wait for every in-flight connection before returning.
        while tasks.join_next().await.is_some() {}

        info!("portico stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Core hot path: routes one request and produces one response.
///
/// The error type is [`Infallible`](std::convert::Infallible) — every
/// failure becomes an HTTP status here, so hyper never sees an error and
/// the connection stays usable.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<http::Response<http_body_util::Full<bytes::Bytes>>, std::convert::Infallible> {
    // Extension methods (PURGE, WebDAV verbs, …) are rejected before
    // dispatch — the chart never registers them.
    let Some(method) = Method::from_http(req.method()) else {
        debug!(method = %req.method(), "extension method rejected");
        return Ok(Response::status(StatusCode::METHOD_NOT_ALLOWED).into_inner());
    };

    let response = router.respond(Request::from_hyper(method, req)).await;
    Ok(response.into_inner())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by the Kubernetes
/// control plane) and **SIGINT** (Ctrl-C, for local dev). On Windows only
/// Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    // `pending()` never resolves — on non-Unix platforms the SIGTERM arm
    // is effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
