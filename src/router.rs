//! Request router.
//!
//! Routes are kept in registration order and the first match wins, the way
//! a stack of mounted routers reads top to bottom. Each entry compiles its
//! own [`matchit`] pattern so path parameters use `{name}` syntax.
//!
//! ```rust
//! use trailhead::{Chain, Context, Response, Router};
//!
//! async fn list(_ctx: Context) -> Response { Response::text("all tours") }
//! async fn one(ctx: Context) -> Response {
//!     Response::text(ctx.param("id").unwrap_or_default().to_owned())
//! }
//!
//! let tours = Router::new()
//!     .get("/", Chain::of(list))
//!     .get("/{id}", Chain::of(one));
//!
//! let app = Router::new().nest("/api/v1/tours", tours);
//! assert_eq!(app.len(), 2);
//! ```

use std::collections::HashMap;

use http::Method;
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::context::{Context, Outgoing};
use crate::failure::Failure;
use crate::middleware::sanitize;
use crate::stage::{self, Chain, Halt};

/// Returns the remainder of `path` below `prefix`, or `None` when `path` is
/// not under it. Matching is on segment boundaries: `/api` covers `/api` and
/// `/api/x`, not `/apiary`.
pub(crate) fn strip_mount<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    match rest {
        "" => Some("/"),
        r if r.starts_with('/') => Some(r),
        _ => None,
    }
}

fn join(prefix: &str, inner: &str) -> String {
    let joined = format!("{}{}", prefix.trim_end_matches('/'), inner.trim_end_matches('/'));
    if joined.is_empty() { "/".to_owned() } else { joined }
}

/// One registered `(method, prefix + pattern) → chain` mapping.
struct RouteEntry {
    method: Method,
    prefix: String,
    pattern: String,
    matcher: MatchitRouter<()>,
    chain: Chain,
}

impl RouteEntry {
    fn new(method: Method, prefix: String, pattern: &str, chain: Chain) -> Self {
        let mut matcher = MatchitRouter::new();
        matcher
            .insert(pattern, ())
            .unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"));
        Self { method, prefix, pattern: pattern.to_owned(), matcher, chain }
    }

    fn method_matches(&self, method: &Method) -> bool {
        self.method == *method || (*method == Method::HEAD && self.method == Method::GET)
    }

    fn params(&self, path: &str) -> Option<HashMap<String, String>> {
        let rest = strip_mount(path, &self.prefix)?;
        let matched = self.matcher.at(rest).ok().or_else(|| {
            let trimmed = rest.trim_end_matches('/');
            (trimmed.len() < rest.len() && !trimmed.is_empty())
                .then(|| self.matcher.at(trimmed).ok())
                .flatten()
        })?;
        Some(
            matched
                .params
                .iter()
                .map(|(k, v)| {
                    let value = urlencoding::decode(v).map_or_else(|_| v.to_owned(), |d| d.into_owned());
                    (k.to_owned(), value)
                })
                .collect(),
        )
    }
}

/// The application router.
///
/// Build it once at startup. Each registration returns `self` so calls chain.
#[derive(Default)]
pub struct Router {
    entries: Vec<RouteEntry>,
}

impl Router {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Register a chain for a method + path pair.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid pattern.
    pub fn route(mut self, method: Method, path: &str, chain: Chain) -> Self {
        self.entries.push(RouteEntry::new(method, String::new(), path, chain));
        self
    }

    pub fn get(self, path: &str, chain: Chain) -> Self {
        self.route(Method::GET, path, chain)
    }

    pub fn post(self, path: &str, chain: Chain) -> Self {
        self.route(Method::POST, path, chain)
    }

    pub fn patch(self, path: &str, chain: Chain) -> Self {
        self.route(Method::PATCH, path, chain)
    }

    pub fn delete(self, path: &str, chain: Chain) -> Self {
        self.route(Method::DELETE, path, chain)
    }

    /// Appends every route of `other` below `prefix`, after the routes
    /// already registered.
    pub fn nest(mut self, prefix: &str, other: Router) -> Self {
        for mut entry in other.entries {
            entry.prefix = join(prefix, &entry.prefix);
            self.entries.push(entry);
        }
        self
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// `METHOD /full/pattern` for every route, in match order.
    pub fn describe(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| format!("{} {}", e.method, join(&e.prefix, &e.pattern)))
            .collect()
    }

    /// First route matching `method` and `path`, with its extracted params.
    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(&Chain, HashMap<String, String>)> {
        self.entries
            .iter()
            .filter(|e| e.method_matches(method))
            .find_map(|e| e.params(path).map(|params| (&e.chain, params)))
    }

    /// Runs the matched route's chain.
    ///
    /// Always ends the exchange: with the route's response, with the
    /// route's failure, or with a not-found failure naming the original URL.
    pub(crate) async fn dispatch(&self, mut ctx: Context) -> (Halt, Outgoing) {
        let Some((chain, params)) = self.lookup(ctx.method(), ctx.path()) else {
            debug!(method = %ctx.method(), url = ctx.original_url(), "no route matched");
            let failure = Failure::not_found(ctx.original_url());
            return (Halt::Fail(failure), ctx.outgoing);
        };

        ctx.set_params(params);
        if let Err(failure) = sanitize::sanitize_params(&mut ctx) {
            return (Halt::Fail(failure), ctx.outgoing);
        }
        match stage::run(chain.stages(), ctx).await {
            Ok(ctx) => {
                let failure = Failure::fault(format!(
                    "route for {} {} finished without a response",
                    ctx.method(),
                    ctx.path()
                ));
                (Halt::Fail(failure), ctx.outgoing)
            }
            Err(halt) => halt,
        }
    }
}
