//! Minimal portico gateway — the full route chart over stub collaborators.
//!
//! Run with:
//!   RUST_LOG=debug PORT=9081 cargo run --example gateway
//!
//! Try:
//!   curl http://localhost:9081/api/system/version
//!   curl http://localhost:9081/api/user                        # 401
//!   curl -H 'accept: text/html' http://localhost:9081/api/user # 302 /provider
//!   curl -b portico-token=any http://localhost:9081/api/user   # local provider accepts
//!   curl http://localhost:9081/api/components                  # soft-auth, anonymous ok

use std::sync::Arc;

use http::StatusCode;
use portico::gateway::{ApiHandlers, Gateway};
use portico::middleware::gate::{Subsystem, SubsystemError};
use portico::{
    BoxFuture, Preference, Provider, ProviderError, ProviderRegistry, Request, Response, Server,
    Session, User,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut registry = ProviderRegistry::new();
    registry
        .register(Arc::new(LocalProvider))
        .expect("register local provider");
    registry.set_default("local").expect("default provider");

    let gateway = Gateway {
        handlers: Arc::new(StubHandlers),
        registry: Arc::new(registry),
        cluster: Arc::new(AlwaysReady("cluster")),
        controllers: Arc::new(AlwaysReady("controllers")),
    };
    let router = gateway.router().expect("route chart");

    let port = std::env::var("PORT").unwrap_or_else(|_| "9081".to_owned());
    Server::bind(format!("0.0.0.0:{port}"))
        .serve(router)
        .await
        .expect("server error");
}

// ── Collaborator stubs ────────────────────────────────────────────────────────

/// Single-user deployment mode: every token is its own valid session.
struct LocalProvider;

impl Provider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn authenticate<'a>(&'a self, _token: &'a str) -> BoxFuture<'a, Result<(), ProviderError>> {
        Box::pin(async { Ok(()) })
    }

    fn fetch_session<'a>(&'a self, _token: &'a str) -> BoxFuture<'a, Result<Session, ProviderError>> {
        Box::pin(async {
            Ok(Session {
                user: User {
                    id: "local-admin".to_owned(),
                    name: "Local Admin".to_owned(),
                    email: None,
                },
                preferences: Preference::default(),
            })
        })
    }
}

struct AlwaysReady(&'static str);

impl Subsystem for AlwaysReady {
    fn name(&self) -> &'static str {
        self.0
    }

    fn ready(&self) -> BoxFuture<'_, Result<(), SubsystemError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Answers every endpoint with a small JSON document naming it — enough
/// to watch the chart, policies, and gates behave from curl.
struct StubHandlers;

fn endpoint(name: &str, req: &Request) -> BoxFuture<'static, Response> {
    let body = match req.session() {
        Some(session) => format!(r#"{{"endpoint":"{name}","user":"{}"}}"#, session.user.id),
        None => format!(r#"{{"endpoint":"{name}"}}"#),
    };
    Box::pin(async move { Response::json(body.into_bytes()) })
}

impl ApiHandlers for StubHandlers {
    fn server_version(&self, _req: Request) -> BoxFuture<'_, Response> {
        Box::pin(async { Response::json(br#"{"build":"v0.1.0","commitsha":"dev"}"#.to_vec()) })
    }

    fn providers(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("providers", &req)
    }

    fn provider(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("provider", &req)
    }

    fn provider_capabilities(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("provider_capabilities", &req)
    }

    fn provider_ui(&self, _req: Request) -> BoxFuture<'_, Response> {
        Box::pin(async {
            Response::builder()
                .bytes(portico::ContentType::Html, b"<html>pick a provider</html>".to_vec())
        })
    }

    fn user(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("user", &req)
    }

    fn user_prefs(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("user_prefs", &req)
    }

    fn performance_profiles(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("performance_profiles", &req)
    }

    fn save_performance_profile(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("save_performance_profile", &req)
    }

    fn performance_profile(&self, req: Request) -> BoxFuture<'_, Response> {
        let id = req.param("id").unwrap_or("?").to_owned();
        Box::pin(async move { Response::json(format!(r#"{{"profile":"{id}"}}"#).into_bytes()) })
    }

    fn delete_performance_profile(&self, _req: Request) -> BoxFuture<'_, Response> {
        Box::pin(async { Response::status(StatusCode::NO_CONTENT) })
    }

    fn run_performance_profile(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("run_performance_profile", &req)
    }

    fn patterns(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("patterns", &req)
    }

    fn pattern_catalog(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("pattern_catalog", &req)
    }

    fn pattern(&self, req: Request) -> BoxFuture<'_, Response> {
        let id = req.param("id").unwrap_or("?").to_owned();
        Box::pin(async move { Response::json(format!(r#"{{"pattern":"{id}"}}"#).into_bytes()) })
    }

    fn delete_pattern(&self, _req: Request) -> BoxFuture<'_, Response> {
        Box::pin(async { Response::status(StatusCode::NO_CONTENT) })
    }

    fn deploy_pattern(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("deploy_pattern", &req)
    }

    fn kubernetes_contexts(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("kubernetes_contexts", &req)
    }

    fn kubernetes_context(&self, req: Request) -> BoxFuture<'_, Response> {
        let id = req.param("id").unwrap_or("?").to_owned();
        Box::pin(async move { Response::json(format!(r#"{{"context":"{id}"}}"#).into_bytes()) })
    }

    fn delete_kubernetes_context(&self, _req: Request) -> BoxFuture<'_, Response> {
        Box::pin(async { Response::status(StatusCode::NO_CONTENT) })
    }

    fn metrics_config(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("metrics_config", &req)
    }

    fn metrics_scan(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("metrics_scan", &req)
    }

    fn oam_register(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("oam_register", &req)
    }

    fn oam_component(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("oam_component", &req)
    }

    fn components(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("components", &req)
    }

    fn component_types(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("component_types", &req)
    }

    fn components_for_type(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("components_for_type", &req)
    }

    fn login(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("login", &req)
    }

    fn logout(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("logout", &req)
    }

    fn token(&self, req: Request) -> BoxFuture<'_, Response> {
        endpoint("token", &req)
    }

    fn favicon(&self, _req: Request) -> BoxFuture<'_, Response> {
        Box::pin(async { Response::status(StatusCode::NOT_FOUND) })
    }

    fn docs(&self, _req: Request) -> BoxFuture<'_, Response> {
        Box::pin(async {
            Response::builder()
                .bytes(portico::ContentType::Html, b"<html>api docs</html>".to_vec())
        })
    }

    fn serve_ui(&self, req: Request) -> BoxFuture<'_, Response> {
        let path = req.path().to_owned();
        Box::pin(async move {
            Response::builder().bytes(
                portico::ContentType::Html,
                format!("<html>ui asset for {path}</html>").into_bytes(),
            )
        })
    }
}
