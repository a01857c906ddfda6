//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Handlers build a [`Response`] and return it; this layer never inspects
//! what a terminal handler produced. The server converts to hyper's
//! `http::Response<Full<Bytes>>` only at write time, so tests can assert
//! on status, headers, and body without a connection.

use bytes::Bytes;
use http::{HeaderMap, StatusCode, header};
use http_body_util::Full;
use tracing::error;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    Html,        // text/html; charset=utf-8
    Json,        // application/json
    OctetStream, // application/octet-stream
    Text,        // text/plain; charset=utf-8
    Yaml,        // application/yaml
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Yaml        => "application/yaml",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts (200 OK, no custom headers needed)
///
/// ```rust
/// use http::StatusCode;
/// use portico::Response;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// Response::redirect("/provider");
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use http::StatusCode;
/// use portico::Response;
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/api/pattern/42")
///     .json(br#"{"id":"42"}"#.to_vec());
/// ```
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// `200 OK` — `application/json`. Pass bytes straight from your
    /// serialiser: `serde_json::to_vec(&val)?`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK` — `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self::builder().status(code).empty()
    }

    /// `302 Found` to `location`.
    pub fn redirect(location: &str) -> Self {
        Self::builder()
            .status(StatusCode::FOUND)
            .header(header::LOCATION.as_str(), location)
            .empty()
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value as UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut inner = http::Response::new(Full::new(self.body));
        *inner.status_mut() = self.status;
        *inner.headers_mut() = self.headers;
        inner
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`]. Defaults to `200 OK`; terminated by a
/// typed body method.
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Appends a header. A name or value that fails to parse is dropped
    /// and logged rather than corrupting the response head.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            name.parse::<header::HeaderName>(),
            value.parse::<header::HeaderValue>(),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => error!(name, "dropping malformed response header"),
        }
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish(ContentType::Json.as_str(), body)
    }

    /// Terminate with a plain-text body.
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Text.as_str(), body.into().into_bytes())
    }

    /// Terminate with a typed body. Use this for HTML, YAML, binary, etc.
    pub fn bytes(self, content_type: ContentType, body: Vec<u8>) -> Response {
        self.finish(content_type.as_str(), body)
    }

    /// Terminate with no body and no content type.
    pub fn empty(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            body: Bytes::new(),
        }
    }

    fn finish(mut self, content_type: &'static str, body: Vec<u8>) -> Response {
        self.headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static(content_type),
        );
        Response {
            status: self.status,
            headers: self.headers,
            body: Bytes::from(body),
        }
    }
}

// ── IntoResponse ─────────────────────────────────────────────────────────────

/// Types a terminal handler may return.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response {
        self
    }
}

/// Bare status codes convert to empty responses, so
/// `async fn delete_pattern(..) -> StatusCode` is a valid handler.
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response {
        Response::status(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_sets_location_and_found() {
        let resp = Response::redirect("/provider");
        assert_eq!(resp.status_code(), StatusCode::FOUND);
        assert_eq!(resp.header("location"), Some("/provider"));
    }

    #[test]
    fn json_sets_content_type() {
        let resp = Response::json(b"{}".to_vec());
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.header("content-type"), Some("application/json"));
        assert_eq!(resp.body(), b"{}");
    }

    #[test]
    fn malformed_header_is_dropped_not_fatal() {
        let resp = Response::builder().header("bad\nname", "x").text("ok");
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.headers().len(), 1); // content-type only
    }
}
