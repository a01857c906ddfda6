//! Unified error type.
//!
//! Two kinds of failure live here, and they surface differently:
//!
//! - **Configuration errors** (`InvalidPattern`, `DuplicateRoute`,
//!   `DuplicateProvider`, `UnknownProvider`, `ListenAddr`, `Bind`) are fatal
//!   at start-up. They come out of [`RouterBuilder::build`](crate::RouterBuilder)
//!   or [`Server::serve`](crate::Server) and the process exits non-zero —
//!   there is no partially started server.
//! - **Request-path errors** (`Unauthenticated`, `Unavailable`,
//!   `MissingContext`, `OccupiedContext`, `Body`) short-circuit one
//!   pipeline. The pipeline converts them to a response via
//!   [`Error::into_response`]; no failure here ever takes the process down.
//!
//! Not-found and method-not-allowed are deliberately *not* errors — they are
//! ordinary [`Dispatch`](crate::Dispatch) outcomes, kept distinct so that
//! clients can tell "no such path" from "wrong method on a real path".

use http::StatusCode;
use tracing::{error, warn};

use crate::middleware::gate::SubsystemError;
use crate::response::Response;

/// The error type for portico's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A route pattern the router cannot compile. Start-up fatal.
    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The same (pattern, method) pair registered twice. Start-up fatal.
    #[error("duplicate route: {method} {pattern}")]
    DuplicateRoute { pattern: String, method: String },

    /// Two providers registered under one name. Start-up fatal.
    #[error("duplicate provider `{name}`")]
    DuplicateProvider { name: String },

    /// A default provider was named that no registration supplied.
    #[error("unknown provider `{name}`")]
    UnknownProvider { name: String },

    /// A stage read a capability no earlier stage wrote — the chain for
    /// this route is mis-ordered.
    #[error("missing context value `{key}`")]
    MissingContext { key: &'static str },

    /// A stage wrote a capability that was already present.
    #[error("context value `{key}` already set")]
    OccupiedContext { key: &'static str },

    /// An `Enforced` route was reached without a valid authenticated
    /// session.
    #[error("unauthenticated: {reason}")]
    Unauthenticated { reason: String },

    /// A subsystem gate found its dependency unreachable or uninitialized.
    #[error("{subsystem} unavailable")]
    Unavailable {
        subsystem: &'static str,
        #[source]
        source: SubsystemError,
    },

    /// The configured listen address does not parse as `host:port`.
    #[error("invalid listen address `{addr}`")]
    ListenAddr { addr: String },

    /// Binding the listener failed. Start-up fatal.
    #[error("bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading a request body failed mid-stream.
    #[error("read body")]
    Body(#[from] hyper::Error),
}

impl Error {
    /// Converts a request-path error into the response the client sees.
    ///
    /// `wants_html` is whether the request's `accept` header asked for
    /// HTML: browser navigations get a redirect to the provider-selection
    /// surface so the login flow stays discoverable, API clients get a
    /// structured status body.
    pub(crate) fn into_response(self, wants_html: bool) -> Response {
        match &self {
            Error::Unauthenticated { reason } => {
                warn!(%reason, "rejecting unauthenticated request");
                if wants_html {
                    Response::redirect("/provider")
                } else {
                    status_body(StatusCode::UNAUTHORIZED, &self)
                }
            }
            Error::Unavailable { subsystem, source } => {
                warn!(subsystem, %source, "subsystem gate closed");
                status_body(StatusCode::SERVICE_UNAVAILABLE, &self)
            }
            Error::MissingContext { key } | Error::OccupiedContext { key } => {
                error!(key, "pipeline context violation: {self}");
                status_body(StatusCode::INTERNAL_SERVER_ERROR, &self)
            }
            Error::Body(source) => {
                warn!(%source, "failed to read request body");
                status_body(StatusCode::BAD_REQUEST, &self)
            }
            // Configuration errors never reach the request path; if one
            // does, answer 500 rather than panic.
            _ => {
                error!("configuration error on request path: {self}");
                Response::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

fn status_body(status: StatusCode, err: &Error) -> Response {
    let body = serde_json::json!({ "error": err.to_string() });
    Response::builder()
        .status(status)
        .json(serde_json::to_vec(&body).unwrap_or_default())
}
