//! # portico
//!
//! The request-dispatch layer of a multi-tenant management API gateway:
//! a route table mapping paths and methods to handler chains, and a
//! middleware pipeline composing each chain from cross-cutting stages —
//! provider resolution, authentication enforcement, session injection,
//! subsystem gating.
//!
//! ## The contract
//!
//! portico owns *reaching* an endpoint. Business handlers, authentication
//! providers, and downstream subsystems are collaborators behind traits
//! ([`gateway::ApiHandlers`], [`Provider`], [`middleware::gate::Subsystem`]);
//! portico decides whether a request gets to them, and with what context.
//!
//! - **Route table** — built once at start-up, validated as a whole
//!   (duplicate or malformed registrations refuse to start), immutable
//!   after. Dispatch always yields matched, method-not-allowed, or
//!   not-found; never a panic.
//! - **Pipeline** — an explicit ordered stage list plus terminal handler
//!   per route. Order is data: it can be inspected, tested, and audited.
//! - **Enforcement policy** — `Open` / `SoftAuth` / `Enforced`, fixed per
//!   route at registration. An `Enforced` route is unreachable without a
//!   session its provider accepted.
//! - **Request context** — typed, append-only, per-request. Stages write
//!   capabilities (provider, auth outcome, session, path parameters);
//!   reading one before it is written is a detected failure, not a
//!   default.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use portico::{Method, Pipeline, Policy, Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), portico::Error> {
//!     let router = Router::builder()
//!         .route(
//!             "/api/system/version",
//!             &[Method::Get],
//!             Pipeline::handler(Policy::Open, version),
//!         )
//!         .build()?;
//!
//!     Server::bind("0.0.0.0:9081").serve(router).await
//! }
//!
//! async fn version(_req: Request) -> Response {
//!     Response::json(br#"{"build":"v0.1.0"}"#.to_vec())
//! }
//! ```
//!
//! The full gateway chart — every route, policy, and chain the management
//! API serves — lives in [`gateway`].

mod context;
mod error;
mod handler;
mod method;
mod policy;
mod provider;
mod request;
mod response;
mod router;
mod server;

pub mod gateway;
pub mod middleware;

pub use context::{Capability, Context};
pub use error::Error;
pub use handler::{BoxFuture, Handler};
pub use method::Method;
pub use middleware::{Middleware, Next, Pipeline};
pub use policy::Policy;
pub use provider::{Preference, Provider, ProviderError, ProviderRegistry, Session, User};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{Dispatch, Params, RouteInfo, Router, RouterBuilder};
pub use server::Server;
