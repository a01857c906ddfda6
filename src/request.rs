//! Incoming HTTP request type.
//!
//! One [`Request`] is the single input surface for every middleware stage
//! and terminal handler: the HTTP head, the (lazily buffered) body, and the
//! per-request [`Context`] travel together. Path parameters, the resolved
//! provider, and the injected session are all read through the context
//! rather than through extra handler arguments.

use bytes::Bytes;
use http::header;
use http::request::Parts;
use http_body_util::BodyExt;

use crate::context::Context;
use crate::error::Error;
use crate::method::Method;
use crate::router::Params;

/// An incoming HTTP request plus its accumulated per-request context.
pub struct Request {
    method: Method,
    parts: Parts,
    raw_body: Option<hyper::body::Incoming>,
    buffered: Option<Bytes>,
    context: Context,
}

impl Request {
    /// Wraps a request hyper accepted off the wire. The body stays
    /// unbuffered until a handler asks for it.
    pub(crate) fn from_hyper(
        method: Method,
        req: hyper::Request<hyper::body::Incoming>,
    ) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method,
            parts,
            raw_body: Some(body),
            buffered: None,
            context: Context::new(),
        }
    }

    /// Builds an in-process request with an empty body — the entry point
    /// for driving the dispatch path without a listener (see
    /// [`Router::respond`](crate::Router::respond)).
    ///
    /// # Panics
    ///
    /// Panics if `uri` is not a valid request target.
    pub fn new(method: Method, uri: &str) -> Self {
        let (parts, ()) = http::Request::builder()
            .method(method.as_str())
            .uri(uri)
            .body(())
            .expect("invalid request uri")
            .into_parts();
        Self {
            method,
            parts,
            raw_body: None,
            buffered: None,
            context: Context::new(),
        }
    }

    /// Adds a header to an in-process request. Chains like the builder it
    /// stands in for.
    ///
    /// # Panics
    ///
    /// Panics if the name or value is not a valid header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let name: header::HeaderName = name.parse().expect("invalid header name");
        let value: header::HeaderValue = value.parse().expect("invalid header value");
        self.parts.headers.append(name, value);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn uri(&self) -> &http::Uri {
        &self.parts.uri
    }

    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.parts.uri.query()
    }

    pub fn headers(&self) -> &http::HeaderMap {
        &self.parts.headers
    }

    /// Returns a header value as UTF-8, `None` if absent or non-textual.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name)?.to_str().ok()
    }

    /// Returns a cookie value from however many `cookie` headers the
    /// client sent.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    /// Returns a named path parameter extracted by the dispatcher.
    ///
    /// For a route `/api/pattern/{id}`, `req.param("id")` on
    /// `/api/pattern/42` returns `Some("42")`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.context.get::<Params>()?.get(name)
    }

    /// The session injected for this request, if its chain loaded one.
    pub fn session(&self) -> Option<&crate::provider::Session> {
        self.context.get()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Whether the client's `accept` header asks for HTML — a browser
    /// navigation rather than an API call. Drives redirect-vs-401 on
    /// authentication failure.
    pub fn prefers_html(&self) -> bool {
        self.header(header::ACCEPT.as_str())
            .is_some_and(|accept| accept.contains("text/html"))
    }

    /// Reads the whole body, buffering it on first call. Later calls are
    /// free. This layer never parses the bytes — that is the terminal
    /// handler's business.
    pub async fn body(&mut self) -> Result<&Bytes, Error> {
        if self.buffered.is_none() {
            let bytes = match self.raw_body.take() {
                Some(incoming) => incoming.collect().await?.to_bytes(),
                None => Bytes::new(),
            };
            self.buffered = Some(bytes);
        }
        Ok(self.buffered.get_or_insert_with(Bytes::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_lookup_handles_multiple_pairs() {
        let req = Request::new(Method::Get, "/api/user")
            .with_header("cookie", "theme=dark; portico-provider=local; portico-token=t1");
        assert_eq!(req.cookie("portico-provider"), Some("local"));
        assert_eq!(req.cookie("portico-token"), Some("t1"));
        assert_eq!(req.cookie("absent"), None);
    }

    #[test]
    fn prefers_html_follows_accept() {
        let browser = Request::new(Method::Get, "/")
            .with_header("accept", "text/html,application/xhtml+xml");
        let api = Request::new(Method::Get, "/api/user")
            .with_header("accept", "application/json");
        assert!(browser.prefers_html());
        assert!(!api.prefers_html());
        assert!(!Request::new(Method::Get, "/").prefers_html());
    }

    #[tokio::test]
    async fn synthetic_body_is_empty() {
        let mut req = Request::new(Method::Post, "/api/pattern");
        assert!(req.body().await.unwrap().is_empty());
    }
}
