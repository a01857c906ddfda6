//! Radix-tree route table and dispatch.
//!
//! One tree per HTTP method, built once at start-up and immutable for the
//! server's lifetime. Lookup is O(path-length) via [`matchit`], whose
//! static-over-parameter precedence supplies the specificity contract:
//! `/api/pattern/catalog` wins over `/api/pattern/{id}` for the concrete
//! path they both match. Identical (pattern, method) pairs are rejected
//! when the table is built — a collision is always a configuration bug,
//! and refusing to start beats resolving it silently by registration
//! order at request time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use http::StatusCode;
use matchit::Router as PatternTree;
use tracing::debug;

use crate::context::Capability;
use crate::error::Error;
use crate::method::Method;
use crate::middleware::Pipeline;
use crate::policy::Policy;
use crate::request::Request;
use crate::response::Response;

// ── Params ───────────────────────────────────────────────────────────────────

/// Named path parameters extracted during dispatch.
///
/// Exposed to stages and terminal handlers through the request context
/// (and the [`Request::param`](crate::Request::param) shorthand), not as
/// extra handler arguments — handlers keep a single input surface.
#[derive(Clone, Debug, Default)]
pub struct Params(HashMap<String, String>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Capability for Params {
    const NAME: &'static str = "path_params";
}

// ── Dispatch outcome ─────────────────────────────────────────────────────────

/// What the route table concluded for one (method, path).
///
/// Exactly one of these comes back for every request; dispatch never
/// panics on unmatched input.
pub enum Dispatch {
    /// A registered route matched.
    Matched {
        pipeline: Arc<Pipeline>,
        params: Params,
    },
    /// Some pattern matches the path, but not with this method. Distinct
    /// from `NotFound` so clients can tell the two apart; `allow` lists
    /// the methods that would have matched.
    MethodNotAllowed { allow: Vec<Method> },
    /// No pattern matches the path at all.
    NotFound,
}

// ── Route table ──────────────────────────────────────────────────────────────

/// One row of the built table, for inspection and audit.
#[derive(Clone, Debug)]
pub struct RouteInfo {
    pub pattern: String,
    /// Empty = any method.
    pub methods: Vec<Method>,
    pub policy: Policy,
}

/// The immutable route table.
///
/// Build with [`Router::builder`]; share via `Arc` — concurrent dispatch
/// needs no synchronization because nothing mutates after `build`.
pub struct Router {
    trees: HashMap<Method, PatternTree<Arc<Pipeline>>>,
    any: PatternTree<Arc<Pipeline>>,
    fallback: Option<Arc<Pipeline>>,
    manifest: Vec<RouteInfo>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder {
            registrations: Vec::new(),
            fallback: None,
        }
    }

    /// Resolves one request to its pipeline, a method-not-allowed, or a
    /// not-found. Method-specific registrations are consulted before
    /// any-method ones for the same path.
    pub fn dispatch(&self, method: Method, path: &str) -> Dispatch {
        if let Some(tree) = self.trees.get(&method) {
            if let Ok(matched) = tree.at(path) {
                return Dispatch::Matched {
                    pipeline: Arc::clone(matched.value),
                    params: collect_params(&matched.params),
                };
            }
        }
        if let Ok(matched) = self.any.at(path) {
            return Dispatch::Matched {
                pipeline: Arc::clone(matched.value),
                params: collect_params(&matched.params),
            };
        }

        let mut allow: Vec<Method> = self
            .trees
            .iter()
            .filter(|(other, tree)| **other != method && tree.at(path).is_ok())
            .map(|(other, _)| *other)
            .collect();
        if !allow.is_empty() {
            allow.sort_unstable_by_key(|m| m.as_str());
            return Dispatch::MethodNotAllowed { allow };
        }
        Dispatch::NotFound
    }

    /// The catch-all pipeline, if one was configured.
    pub fn fallback(&self) -> Option<&Arc<Pipeline>> {
        self.fallback.as_ref()
    }

    /// Dispatches one request end to end: lookup, then the matched
    /// pipeline, the catch-all (unmatched GETs), a 405 with its `allow`
    /// set, or a bare 404. This is the whole request path minus the
    /// listener — the server calls it per request, and tests drive it
    /// directly with [`Request::new`].
    pub async fn respond(&self, req: Request) -> Response {
        match self.dispatch(req.method(), req.path()) {
            Dispatch::Matched { pipeline, params } => {
                debug!(method = %req.method(), path = req.path(), policy = %pipeline.policy(), "dispatching");
                pipeline.handle(req, params).await
            }
            Dispatch::MethodNotAllowed { allow } => {
                let allow = allow
                    .iter()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                Response::builder()
                    .status(StatusCode::METHOD_NOT_ALLOWED)
                    .header(http::header::ALLOW.as_str(), &allow)
                    .empty()
            }
            // The catch-all serves UI assets for unmatched GETs; anything
            // else unmatched is a plain 404.
            Dispatch::NotFound => match (req.method(), &self.fallback) {
                (Method::Get, Some(fallback)) => {
                    debug!(path = req.path(), "falling back to catch-all");
                    fallback.handle(req, Params::default()).await
                }
                _ => Response::status(StatusCode::NOT_FOUND),
            },
        }
    }

    /// Every registration, in registration order — the table's security
    /// posture is auditable from here without dispatching anything.
    pub fn routes(&self) -> &[RouteInfo] {
        &self.manifest
    }
}

fn collect_params(params: &matchit::Params<'_, '_>) -> Params {
    params
        .iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

// ── Builder ──────────────────────────────────────────────────────────────────

struct Registration {
    pattern: String,
    methods: Vec<Method>,
    pipeline: Arc<Pipeline>,
}

/// Collects registrations, then validates the whole table at once.
///
/// Nothing is inserted until [`build`](RouterBuilder::build), so a
/// configuration error cannot leave a half-populated table behind — the
/// server either starts with the full chart or not at all.
pub struct RouterBuilder {
    registrations: Vec<Registration>,
    fallback: Option<Arc<Pipeline>>,
}

impl RouterBuilder {
    /// Registers `pipeline` for `pattern` and `methods`. An empty method
    /// slice accepts any method. Path parameters use `{name}` syntax.
    ///
    /// The same pattern may be registered again with different methods
    /// (`GET /api/pattern/{id}` and `DELETE /api/pattern/{id}` are
    /// independent routes); the identical (pattern, method) pair may not.
    pub fn route(
        mut self,
        pattern: impl Into<String>,
        methods: &[Method],
        pipeline: Pipeline,
    ) -> Self {
        self.registrations.push(Registration {
            pattern: pattern.into(),
            methods: methods.to_vec(),
            pipeline: Arc::new(pipeline),
        });
        self
    }

    /// Registers `pipeline` for `pattern` and every path below it — the
    /// bare pattern plus a `{*rest}` tail, sharing one pipeline.
    pub fn prefix(
        mut self,
        pattern: &str,
        methods: &[Method],
        pipeline: Pipeline,
    ) -> Self {
        let pipeline = Arc::new(pipeline);
        let base = pattern.trim_end_matches('/');
        self.registrations.push(Registration {
            pattern: base.to_owned(),
            methods: methods.to_vec(),
            pipeline: Arc::clone(&pipeline),
        });
        self.registrations.push(Registration {
            pattern: format!("{base}/{{*rest}}"),
            methods: methods.to_vec(),
            pipeline,
        });
        self
    }

    /// Configures the catch-all pipeline run for GET requests no pattern
    /// matches (the UI asset fallback).
    pub fn fallback(mut self, pipeline: Pipeline) -> Self {
        self.fallback = Some(Arc::new(pipeline));
        self
    }

    /// Validates every registration and produces the immutable table.
    ///
    /// Fails fast on the first malformed pattern or duplicate
    /// (pattern, method) pair; no partial table is observable.
    pub fn build(self) -> Result<Router, Error> {
        let mut trees: HashMap<Method, PatternTree<Arc<Pipeline>>> = HashMap::new();
        let mut any = PatternTree::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut manifest = Vec::with_capacity(self.registrations.len());

        for reg in self.registrations {
            manifest.push(RouteInfo {
                pattern: reg.pattern.clone(),
                methods: reg.methods.clone(),
                policy: reg.pipeline.policy(),
            });

            if reg.methods.is_empty() {
                claim(&mut seen, "*", &reg.pattern)?;
                insert(&mut any, &reg.pattern, Arc::clone(&reg.pipeline))?;
                continue;
            }
            for method in &reg.methods {
                claim(&mut seen, method.as_str(), &reg.pattern)?;
                insert(
                    trees.entry(*method).or_default(),
                    &reg.pattern,
                    Arc::clone(&reg.pipeline),
                )?;
            }
        }

        Ok(Router {
            trees,
            any,
            fallback: self.fallback,
            manifest,
        })
    }
}

fn claim(
    seen: &mut HashSet<(String, String)>,
    method: &str,
    pattern: &str,
) -> Result<(), Error> {
    if seen.insert((method.to_owned(), pattern.to_owned())) {
        Ok(())
    } else {
        Err(Error::DuplicateRoute {
            pattern: pattern.to_owned(),
            method: method.to_owned(),
        })
    }
}

fn insert(
    tree: &mut PatternTree<Arc<Pipeline>>,
    pattern: &str,
    pipeline: Arc<Pipeline>,
) -> Result<(), Error> {
    tree.insert(pattern, pipeline).map_err(|err| Error::InvalidPattern {
        pattern: pattern.to_owned(),
        reason: err.to_string(),
    })
}
