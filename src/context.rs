//! The per-request state threaded through the pipeline.
//!
//! A [`Context`] is created once per exchange, handed by value from stage to
//! stage, and dropped when the response is produced. Stages that parse or
//! enrich the request (cookies, body, query normalisation, the authenticated
//! user) write into it; later stages read from it.

use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{self, HeaderMap};
use http::{Extensions, Method, Uri};

use crate::middleware::compression::Encoding;

// ── Query values ──────────────────────────────────────────────────────────────

/// One query-string key's value(s). Repeated keys start out as `Many`; the
/// parameter-pollution stage collapses them unless whitelisted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum QueryValue {
    One(String),
    Many(Vec<String>),
}

impl QueryValue {
    /// The last value given for the key.
    pub fn last(&self) -> &str {
        match self {
            Self::One(v) => v,
            Self::Many(vs) => vs.last().map(String::as_str).unwrap_or(""),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::One(v) => vec![v.as_str()],
            Self::Many(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_many(&self) -> bool {
        matches!(self, Self::Many(_))
    }

    fn push(&mut self, value: String) {
        match self {
            Self::One(first) => *self = Self::Many(vec![std::mem::take(first), value]),
            Self::Many(vs) => vs.push(value),
        }
    }
}

pub type Query = BTreeMap<String, QueryValue>;

/// Groups `k=v` pairs, turning repeated keys into `Many` in order of appearance.
pub(crate) fn group_pairs(pairs: Vec<(String, String)>) -> Query {
    let mut query = Query::new();
    for (k, v) in pairs {
        match query.get_mut(&k) {
            Some(existing) => existing.push(v),
            None => {
                query.insert(k, QueryValue::One(v));
            }
        }
    }
    query
}

fn parse_query(raw: Option<&str>) -> Query {
    let pairs: Vec<(String, String)> = raw
        .and_then(|q| serde_urlencoded::from_str(q).ok())
        .unwrap_or_default();
    group_pairs(pairs)
}

// ── Body ──────────────────────────────────────────────────────────────────────

/// The request body as read off the connection.
#[derive(Clone, Debug)]
pub enum RequestBody {
    Buffered(Bytes),
    /// The peer sent (or declared) more than the server was willing to read.
    Oversized,
}

// ── Outgoing decorations ──────────────────────────────────────────────────────

/// Things stages decide about the eventual response before it exists.
///
/// Applied to whichever response ends the exchange, error responses included.
#[derive(Clone, Debug, Default)]
pub struct Outgoing {
    pub headers: HeaderMap,
    pub encoding: Option<Encoding>,
    pub compress_threshold: usize,
    /// Set by the access-log stage; the response is logged when present.
    pub access_log: Option<Instant>,
}

// ── Context ───────────────────────────────────────────────────────────────────

/// One in-flight HTTP exchange.
#[derive(Debug)]
pub struct Context {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    raw_body: RequestBody,
    body: serde_json::Value,
    query: Query,
    query_polluted: BTreeMap<String, Vec<String>>,
    cookies: HashMap<String, String>,
    params: HashMap<String, String>,
    request_time: Option<DateTime<Utc>>,
    extensions: Extensions,
    pub(crate) outgoing: Outgoing,
}

impl Context {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        let query = parse_query(uri.query());
        Self {
            method,
            uri,
            headers,
            remote_addr: None,
            raw_body: RequestBody::Buffered(Bytes::new()),
            body: serde_json::Value::Null,
            query,
            query_polluted: BTreeMap::new(),
            cookies: HashMap::new(),
            params: HashMap::new(),
            request_time: None,
            extensions: Extensions::new(),
            outgoing: Outgoing::default(),
        }
    }

    /// Shorthand used by tests and tools: `Context::get("/api/v1/tours?price=10")`.
    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri.parse().unwrap_or_else(|_| Uri::from_static("/")), HeaderMap::new())
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.raw_body = RequestBody::Buffered(body.into());
        self
    }

    pub fn with_raw_body(mut self, body: RequestBody) -> Self {
        self.raw_body = body;
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn with_header(mut self, name: header::HeaderName, value: &str) -> Self {
        if let Ok(v) = header::HeaderValue::from_str(value) {
            self.headers.append(name, v);
        }
        self
    }

    // ── Request line and headers ──────────────────────────────────────────────

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Path plus query string, exactly as requested.
    pub fn original_url(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| self.uri.path())
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The caller's address. With `trust_proxy`, the left-most
    /// `X-Forwarded-For` entry wins over the socket peer.
    pub fn client_ip(&self, trust_proxy: bool) -> Option<IpAddr> {
        if trust_proxy {
            let forwarded = self
                .header("x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .and_then(|v| v.trim().parse().ok());
            if forwarded.is_some() {
                return forwarded;
            }
        }
        self.remote_addr.map(|a| a.ip())
    }

    // ── Body ──────────────────────────────────────────────────────────────────

    pub fn raw_body(&self) -> &RequestBody { &self.raw_body }

    /// Parsed body. `Null` until the body parser has run.
    pub fn body(&self) -> &serde_json::Value { &self.body }
    pub fn body_mut(&mut self) -> &mut serde_json::Value { &mut self.body }

    /// A string field of the parsed body.
    pub fn body_str(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(|v| v.as_str())
    }

    // ── Query, params, cookies ────────────────────────────────────────────────

    pub fn query(&self) -> &Query { &self.query }
    pub fn query_mut(&mut self) -> &mut Query { &mut self.query }

    /// Last value given for `key`.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(QueryValue::last)
    }

    /// Values the parameter-pollution stage collapsed away.
    pub fn query_polluted(&self) -> &BTreeMap<String, Vec<String>> { &self.query_polluted }
    pub(crate) fn query_polluted_mut(&mut self) -> &mut BTreeMap<String, Vec<String>> {
        &mut self.query_polluted
    }

    /// A named path parameter: for `/tour/{slug}`, `param("slug")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
    pub fn params(&self) -> &HashMap<String, String> { &self.params }
    pub(crate) fn params_mut(&mut self) -> &mut HashMap<String, String> { &mut self.params }
    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
    pub fn cookies(&self) -> &HashMap<String, String> { &self.cookies }
    pub(crate) fn set_cookies(&mut self, cookies: HashMap<String, String>) {
        self.cookies = cookies;
    }

    // ── Request-scoped values ─────────────────────────────────────────────────

    pub fn request_time(&self) -> Option<DateTime<Utc>> { self.request_time }
    pub(crate) fn set_request_time(&mut self, at: DateTime<Utc>) {
        self.request_time = Some(at);
    }

    /// Typed bag for values later stages attach, e.g. the current user.
    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    /// Response decorations collected so far.
    pub fn outgoing(&self) -> &Outgoing { &self.outgoing }
    pub fn outgoing_mut(&mut self) -> &mut Outgoing { &mut self.outgoing }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_query_keys_become_many() {
        let ctx = Context::get("/api/v1/tours?price=10&price=20&page=1");
        assert_eq!(
            ctx.query().get("price"),
            Some(&QueryValue::Many(vec!["10".into(), "20".into()]))
        );
        assert_eq!(ctx.query_value("page"), Some("1"));
    }

    #[test]
    fn original_url_keeps_query() {
        let ctx = Context::get("/tour/the-forest-hiker?x=1");
        assert_eq!(ctx.path(), "/tour/the-forest-hiker");
        assert_eq!(ctx.original_url(), "/tour/the-forest-hiker?x=1");
    }

    #[test]
    fn forwarded_ip_only_when_trusted() {
        let ctx = Context::get("/")
            .with_remote_addr("10.0.0.1:5000".parse().unwrap())
            .with_header(header::HeaderName::from_static("x-forwarded-for"), "203.0.113.9, 10.0.0.1");
        assert_eq!(ctx.client_ip(true), Some("203.0.113.9".parse().unwrap()));
        assert_eq!(ctx.client_ip(false), Some("10.0.0.1".parse().unwrap()));
    }
}
