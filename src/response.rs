//! Outgoing HTTP response type.
//!
//! Build a [`Response`] in your stage and return it. Headers picked up along
//! the pipeline (security headers, rate-limit counters, compression) are
//! merged in afterwards by the [`App`](crate::App), so a stage never needs to
//! think about them.

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use tracing::warn;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content-type values used by [`ResponseBuilder::bytes`].
#[derive(Clone, Copy, Debug)]
pub enum ContentType {
    Css,          // text/css; charset=utf-8
    Html,         // text/html; charset=utf-8
    Javascript,   // application/javascript; charset=utf-8
    Json,         // application/json; charset=utf-8
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
}

impl ContentType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Css         => "text/css; charset=utf-8",
            Self::Html        => "text/html; charset=utf-8",
            Self::Javascript  => "application/javascript; charset=utf-8",
            Self::Json        => "application/json; charset=utf-8",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts (200 OK)
///
/// ```rust
/// use trailhead::Response;
/// use serde_json::json;
///
/// Response::json(&json!({ "status": "success" }));
/// Response::html("<h1>All Tours</h1>");
/// Response::text("ok");
/// ```
///
/// # Builder
///
/// ```rust
/// use http::StatusCode;
/// use trailhead::{ContentType, Response};
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header(http::header::LOCATION, "/tours/7")
///     .bytes(ContentType::Json, br#"{"id":7}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl Response {
    /// `200 OK` with a serialised JSON body.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::builder().json(value)
    }

    /// `200 OK` — `text/html; charset=utf-8`.
    pub fn html(body: impl Into<String>) -> Self {
        Self::builder().html(body)
    }

    /// `200 OK` — `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// `302 Found` pointing at `location`.
    pub fn redirect(location: &str) -> Self {
        Self::builder()
            .status(StatusCode::FOUND)
            .header(header::LOCATION, location)
            .no_body()
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body parsed as JSON. Handy in tests.
    pub fn body_json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub(crate) fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    /// Copies `extra` in without overriding anything the stage set itself.
    pub(crate) fn merge_headers(&mut self, extra: &HeaderMap) {
        for (name, value) in extra {
            if !self.headers.contains_key(name) {
                self.headers.insert(name.clone(), value.clone());
            }
        }
    }

    /// Converts into the type hyper writes to the wire.
    pub fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
#[derive(Debug)]
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Adds a header. Values that are not valid header text are dropped
    /// with a warning.
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                self.headers.append(name, v);
            }
            Err(_) => warn!(header = %name, "dropping invalid header value"),
        }
        self
    }

    pub fn json(self, value: &serde_json::Value) -> Response {
        self.finish(ContentType::Json, Bytes::from(value.to_string()))
    }

    pub fn html(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Html, Bytes::from(body.into()))
    }

    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Text, Bytes::from(body.into()))
    }

    /// Terminate with a typed body.
    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.finish(content_type, body.into())
    }

    /// Terminate with no body (e.g. `204`, `302`).
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Bytes::new() }
    }

    fn finish(mut self, content_type: ContentType, body: Bytes) -> Response {
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(content_type.as_str()),
        );
        Response { status: self.status, headers: self.headers, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_sets_location() {
        let res = Response::redirect("/");
        assert_eq!(res.code(), StatusCode::FOUND);
        assert_eq!(res.header(header::LOCATION), Some("/"));
        assert!(res.body().is_empty());
    }

    #[test]
    fn merge_keeps_stage_headers() {
        let mut res = Response::builder()
            .header(header::CACHE_CONTROL, "no-store")
            .text("x");
        let mut extra = HeaderMap::new();
        extra.insert(header::CACHE_CONTROL, HeaderValue::from_static("public"));
        extra.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
        res.merge_headers(&extra);
        assert_eq!(res.header(header::CACHE_CONTROL), Some("no-store"));
        assert_eq!(res.header(header::X_FRAME_OPTIONS), Some("SAMEORIGIN"));
    }

    #[test]
    fn invalid_header_value_is_dropped() {
        let res = Response::builder().header(header::LOCATION, "/a\nb").no_body();
        assert!(res.header(header::LOCATION).is_none());
    }
}
