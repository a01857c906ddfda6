//! The management gateway's route chart.
//!
//! This module is the one place the whole HTTP surface is declared:
//! pattern, methods, enforcement policy, and stage chain for every route,
//! composed over collaborators supplied at start-up. Because each
//! registration names its policy and stages as data, the security posture
//! of the gateway is reviewable by reading this file (or
//! [`Router::routes`] at runtime) — no route can be more open than its
//! row says.
//!
//! Terminal handlers live behind [`ApiHandlers`]: the gateway owns
//! *reaching* an endpoint, collaborators own what it does once reached.
//! Handlers take the request (context included) as their single argument —
//! path parameters, the resolved provider, and the injected session all
//! arrive through the context.

use std::sync::Arc;

use crate::error::Error;
use crate::handler::{BoxFuture, Handler};
use crate::method::Method::{Delete, Get, Post};
use crate::middleware::auth::Authenticator;
use crate::middleware::gate::{Subsystem, SubsystemGate};
use crate::middleware::provider::{ProviderResolver, ResolvedProvider};
use crate::middleware::session::SessionInjector;
use crate::middleware::{Middleware, Pipeline};
use crate::policy::Policy;
use crate::provider::ProviderRegistry;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// The business-logic endpoints the chart binds, one method per terminal
/// handler. Implementations are external to this crate; the gateway calls
/// them only after a route's whole chain has passed.
///
/// Endpoints serving several verbs on one pattern either get separate
/// registrations per verb (`/api/pattern/{id}`) or one registration and a
/// handler that inspects `req.method()` (`/api/user/prefs`).
pub trait ApiHandlers: Send + Sync + 'static {
    // System.
    fn server_version(&self, req: Request) -> BoxFuture<'_, Response>;

    // Provider discovery and selection surface.
    fn providers(&self, req: Request) -> BoxFuture<'_, Response>;
    fn provider(&self, req: Request) -> BoxFuture<'_, Response>;
    fn provider_capabilities(&self, req: Request) -> BoxFuture<'_, Response>;
    fn provider_ui(&self, req: Request) -> BoxFuture<'_, Response>;

    // User and preferences.
    fn user(&self, req: Request) -> BoxFuture<'_, Response>;
    fn user_prefs(&self, req: Request) -> BoxFuture<'_, Response>;

    // Performance profiles.
    fn performance_profiles(&self, req: Request) -> BoxFuture<'_, Response>;
    fn save_performance_profile(&self, req: Request) -> BoxFuture<'_, Response>;
    fn performance_profile(&self, req: Request) -> BoxFuture<'_, Response>;
    fn delete_performance_profile(&self, req: Request) -> BoxFuture<'_, Response>;
    fn run_performance_profile(&self, req: Request) -> BoxFuture<'_, Response>;

    // Pattern files.
    fn patterns(&self, req: Request) -> BoxFuture<'_, Response>;
    fn pattern_catalog(&self, req: Request) -> BoxFuture<'_, Response>;
    fn pattern(&self, req: Request) -> BoxFuture<'_, Response>;
    fn delete_pattern(&self, req: Request) -> BoxFuture<'_, Response>;
    fn deploy_pattern(&self, req: Request) -> BoxFuture<'_, Response>;

    // Cluster contexts.
    fn kubernetes_contexts(&self, req: Request) -> BoxFuture<'_, Response>;
    fn kubernetes_context(&self, req: Request) -> BoxFuture<'_, Response>;
    fn delete_kubernetes_context(&self, req: Request) -> BoxFuture<'_, Response>;

    // Telemetry.
    fn metrics_config(&self, req: Request) -> BoxFuture<'_, Response>;
    fn metrics_scan(&self, req: Request) -> BoxFuture<'_, Response>;

    // Component registry (anonymous-capable).
    fn oam_register(&self, req: Request) -> BoxFuture<'_, Response>;
    fn oam_component(&self, req: Request) -> BoxFuture<'_, Response>;
    fn components(&self, req: Request) -> BoxFuture<'_, Response>;
    fn component_types(&self, req: Request) -> BoxFuture<'_, Response>;
    fn components_for_type(&self, req: Request) -> BoxFuture<'_, Response>;

    // Session lifecycle — run with provider resolution only; the chart
    // redirects to the selection surface when no provider resolves.
    fn login(&self, req: Request) -> BoxFuture<'_, Response>;
    fn logout(&self, req: Request) -> BoxFuture<'_, Response>;
    fn token(&self, req: Request) -> BoxFuture<'_, Response>;

    // File-serving collaborators.
    fn favicon(&self, req: Request) -> BoxFuture<'_, Response>;
    fn docs(&self, req: Request) -> BoxFuture<'_, Response>;

    // Catch-all UI asset fallback.
    fn serve_ui(&self, req: Request) -> BoxFuture<'_, Response>;
}

/// Start-up collaborators the chart composes pipelines over.
pub struct Gateway {
    pub handlers: Arc<dyn ApiHandlers>,
    pub registry: Arc<ProviderRegistry>,
    /// Cluster connection gating scan/deploy/run routes.
    pub cluster: Arc<dyn Subsystem>,
    /// Controller set gating telemetry scans.
    pub controllers: Arc<dyn Subsystem>,
}

impl Gateway {
    /// Builds the full route table. Fails fast on any configuration
    /// error; the caller gets either the complete chart or nothing.
    pub fn router(&self) -> Result<Router, Error> {
        let resolve: Arc<dyn Middleware> =
            Arc::new(ProviderResolver::new(Arc::clone(&self.registry)));
        let auth: Arc<dyn Middleware> = Arc::new(Authenticator::new());
        let session: Arc<dyn Middleware> = Arc::new(SessionInjector::new());
        let cluster: Arc<dyn Middleware> =
            Arc::new(SubsystemGate::new(Arc::clone(&self.cluster)));
        let controllers: Arc<dyn Middleware> =
            Arc::new(SubsystemGate::new(Arc::clone(&self.controllers)));

        // The three chain shapes the chart uses. Stage instances are
        // shared; the policy rides on each pipeline.
        let enforced = || vec![Arc::clone(&resolve), Arc::clone(&auth), Arc::clone(&session)];
        let soft = || vec![Arc::clone(&resolve), Arc::clone(&auth)];
        let resolve_only = || vec![Arc::clone(&resolve)];

        let h = &self.handlers;

        Router::builder()
            // System.
            .route(
                "/api/system/version",
                &[Get],
                Pipeline::handler(Policy::Open, call(h, |h, req| h.server_version(req))),
            )
            // Provider discovery stays open: a logged-out browser must be
            // able to learn what it can log in to.
            .route(
                "/api/providers",
                &[Get],
                Pipeline::handler(Policy::Open, call(h, |h, req| h.providers(req))),
            )
            .route(
                "/api/provider",
                &[],
                Pipeline::handler(Policy::Open, call(h, |h, req| h.provider(req))),
            )
            .route(
                "/api/provider/capabilities",
                &[Get],
                Pipeline::new(Policy::Enforced, enforced(), call(h, |h, req| h.provider_capabilities(req))),
            )
            .prefix(
                "/provider",
                &[Get],
                Pipeline::handler(Policy::Open, call(h, |h, req| h.provider_ui(req))),
            )
            .route(
                "/auth/login",
                &[Get],
                Pipeline::handler(Policy::Open, call(h, |h, req| h.provider_ui(req))),
            )
            // User and preferences.
            .route(
                "/api/user",
                &[Get],
                Pipeline::new(Policy::Enforced, enforced(), call(h, |h, req| h.user(req))),
            )
            .route(
                "/api/user/prefs",
                &[Get, Post],
                Pipeline::new(Policy::Enforced, enforced(), call(h, |h, req| h.user_prefs(req))),
            )
            // Performance profiles.
            .route(
                "/api/user/performance/profiles",
                &[Get],
                Pipeline::new(Policy::Enforced, enforced(), call(h, |h, req| h.performance_profiles(req))),
            )
            .route(
                "/api/user/performance/profiles",
                &[Post],
                Pipeline::new(Policy::Enforced, enforced(), call(h, |h, req| h.save_performance_profile(req))),
            )
            .route(
                "/api/user/performance/profiles/{id}",
                &[Get],
                Pipeline::new(Policy::Enforced, enforced(), call(h, |h, req| h.performance_profile(req))),
            )
            .route(
                "/api/user/performance/profiles/{id}",
                &[Delete],
                Pipeline::new(Policy::Enforced, enforced(), call(h, |h, req| h.delete_performance_profile(req))),
            )
            .route(
                "/api/user/performance/profiles/{id}/run",
                &[Get],
                Pipeline::new(
                    Policy::Enforced,
                    with_gate(enforced(), &cluster),
                    call(h, |h, req| h.run_performance_profile(req)),
                ),
            )
            // Pattern files.
            .route(
                "/api/pattern",
                &[Get, Post],
                Pipeline::new(Policy::Enforced, enforced(), call(h, |h, req| h.patterns(req))),
            )
            .route(
                "/api/pattern/catalog",
                &[Get],
                Pipeline::new(Policy::Enforced, enforced(), call(h, |h, req| h.pattern_catalog(req))),
            )
            .route(
                "/api/pattern/{id}",
                &[Get],
                Pipeline::new(Policy::Enforced, enforced(), call(h, |h, req| h.pattern(req))),
            )
            .route(
                "/api/pattern/{id}",
                &[Delete],
                Pipeline::new(Policy::Enforced, enforced(), call(h, |h, req| h.delete_pattern(req))),
            )
            .route(
                "/api/pattern/deploy",
                &[Post, Delete],
                Pipeline::new(
                    Policy::Enforced,
                    with_gate(enforced(), &cluster),
                    call(h, |h, req| h.deploy_pattern(req)),
                ),
            )
            // Cluster contexts.
            .route(
                "/api/system/kubernetes/contexts",
                &[Get],
                Pipeline::new(Policy::Enforced, enforced(), call(h, |h, req| h.kubernetes_contexts(req))),
            )
            .route(
                "/api/system/kubernetes/contexts/{id}",
                &[Get],
                Pipeline::new(Policy::Enforced, enforced(), call(h, |h, req| h.kubernetes_context(req))),
            )
            .route(
                "/api/system/kubernetes/contexts/{id}",
                &[Delete],
                Pipeline::new(Policy::Enforced, enforced(), call(h, |h, req| h.delete_kubernetes_context(req))),
            )
            // Telemetry.
            .route(
                "/api/telemetry/metrics/config",
                &[Get, Post, Delete],
                Pipeline::new(Policy::Enforced, enforced(), call(h, |h, req| h.metrics_config(req))),
            )
            .route(
                "/api/telemetry/metrics/scan",
                &[Get],
                Pipeline::new(
                    Policy::Enforced,
                    with_gate(with_gate(enforced(), &cluster), &controllers),
                    call(h, |h, req| h.metrics_scan(req)),
                ),
            )
            // Component registry: anonymous access tolerated, handlers
            // decide what a missing session means.
            .route(
                "/api/oam/{type}",
                &[Get, Post],
                Pipeline::new(Policy::SoftAuth, soft(), call(h, |h, req| h.oam_register(req))),
            )
            .route(
                "/api/oam/{type}/{name}",
                &[Get],
                Pipeline::new(Policy::SoftAuth, soft(), call(h, |h, req| h.oam_component(req))),
            )
            .route(
                "/api/components",
                &[Get],
                Pipeline::new(Policy::SoftAuth, soft(), call(h, |h, req| h.components(req))),
            )
            .route(
                "/api/components/types",
                &[Get],
                Pipeline::new(Policy::SoftAuth, soft(), call(h, |h, req| h.component_types(req))),
            )
            .route(
                "/api/components/{type}",
                &[Get],
                Pipeline::new(Policy::SoftAuth, soft(), call(h, |h, req| h.components_for_type(req))),
            )
            // Session lifecycle: provider resolution only, custom
            // terminal logic.
            .route(
                "/user/login",
                &[Get],
                Pipeline::new(Policy::Open, resolve_only(), with_provider(h, |h, req| h.login(req))),
            )
            .route(
                "/user/logout",
                &[Get],
                Pipeline::new(Policy::Open, resolve_only(), with_provider(h, |h, req| h.logout(req))),
            )
            .route(
                "/api/user/token",
                &[Get, Post],
                Pipeline::new(Policy::Open, resolve_only(), with_provider(h, |h, req| h.token(req))),
            )
            // File-serving collaborators.
            .route(
                "/favicon.ico",
                &[Get],
                Pipeline::handler(Policy::Open, call(h, |h, req| h.favicon(req))),
            )
            .route(
                "/docs",
                &[Get],
                Pipeline::handler(Policy::Open, call(h, |h, req| h.docs(req))),
            )
            // Everything else that is a GET serves UI assets, behind the
            // same enforcement as any other enforced route.
            .fallback(Pipeline::new(
                Policy::Enforced,
                soft(),
                call(h, |h, req| h.serve_ui(req)),
            ))
            .build()
    }
}

fn with_gate(mut stages: Vec<Arc<dyn Middleware>>, gate: &Arc<dyn Middleware>) -> Vec<Arc<dyn Middleware>> {
    stages.push(Arc::clone(gate));
    stages
}

/// One `ApiHandlers` method, as the chart names it per registration.
type Endpoint = for<'a> fn(&'a dyn ApiHandlers, Request) -> BoxFuture<'a, Response>;

/// Adapts one `ApiHandlers` method into a terminal [`Handler`].
fn call(handlers: &Arc<dyn ApiHandlers>, endpoint: Endpoint) -> impl Handler {
    let handlers = Arc::clone(handlers);
    move |req: Request| {
        let handlers = Arc::clone(&handlers);
        async move { endpoint(handlers.as_ref(), req).await }
    }
}

/// Like [`call`], but redirects to the provider-selection surface when
/// the chain resolved no provider — the login/logout/token endpoints are
/// meaningless without one.
fn with_provider(handlers: &Arc<dyn ApiHandlers>, endpoint: Endpoint) -> impl Handler {
    let handlers = Arc::clone(handlers);
    move |req: Request| {
        let handlers = Arc::clone(&handlers);
        async move {
            let resolved = req
                .context()
                .get::<ResolvedProvider>()
                .is_some_and(|r| r.get().is_some());
            if resolved {
                endpoint(handlers.as_ref(), req).await
            } else {
                Response::redirect("/provider")
            }
        }
    }
}
