//! Error interceptor.
//!
//! The single place a [`Failure`] becomes a response. Every failure from
//! every stage, the fallback route, and captured panics end up here, so error
//! responses have one shape across the whole surface:
//!
//! - under the API prefix: JSON, `{"status": "fail" | "error", "message": …}`
//! - everywhere else: the `error` view, falling back to a fixed page if the
//!   renderer itself fails
//!
//! Unexpected faults keep their detail out of production responses and log
//! it instead.

use std::sync::Arc;

use http::{Method, StatusCode};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::config::Environment;
use crate::context::Context;
use crate::failure::Failure;
use crate::response::Response;
use crate::router::strip_mount;
use crate::view::ViewRenderer;

const GENERIC_MESSAGE: &str = "Something went very wrong!";
const ERROR_TITLE: &str = "Something went wrong!";

/// What the interceptor needs to know about a request whose context is
/// already gone.
#[derive(Clone, Debug)]
pub struct RequestInfo {
    pub method: Method,
    pub path: String,
    pub original_url: String,
}

impl RequestInfo {
    pub fn of(ctx: &Context) -> Self {
        Self {
            method: ctx.method().clone(),
            path: ctx.path().to_owned(),
            original_url: ctx.original_url().to_owned(),
        }
    }
}

pub struct ErrorInterceptor {
    env: Environment,
    api_prefix: String,
    renderer: Option<Arc<dyn ViewRenderer>>,
}

impl ErrorInterceptor {
    pub fn new(env: Environment) -> Self {
        Self { env, api_prefix: "/api".to_owned(), renderer: None }
    }

    /// Requests under this prefix get JSON errors. Defaults to `/api`.
    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    /// Renderer for the HTML error page.
    pub fn renderer(mut self, renderer: Arc<dyn ViewRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn env(&self) -> Environment { self.env }

    /// Turns `failure` into exactly one response.
    pub fn intercept(&self, failure: Failure, req: &RequestInfo) -> Response {
        let status = failure.status();
        self.report(&failure, req, status);

        let message = if failure.is_operational() || self.env.is_development() {
            failure.message().to_owned()
        } else {
            GENERIC_MESSAGE.to_owned()
        };

        let mut res = if strip_mount(&req.path, &self.api_prefix).is_some() {
            self.json(&failure, status, &message)
        } else {
            self.page(status, &message)
        };
        res.merge_headers(failure.headers());
        res
    }

    fn report(&self, failure: &Failure, req: &RequestInfo, status: StatusCode) {
        if !failure.is_operational() {
            error!(
                method = %req.method,
                url = %req.original_url,
                detail = failure.detail().unwrap_or(failure.message()),
                "unexpected fault"
            );
        } else if status.is_server_error() {
            warn!(method = %req.method, url = %req.original_url, %status, "{}", failure.message());
        } else {
            debug!(method = %req.method, url = %req.original_url, %status, "{}", failure.message());
        }
    }

    fn json(&self, failure: &Failure, status: StatusCode, message: &str) -> Response {
        let label = status_label(status);
        let body = if self.env.is_development() {
            json!({
                "status": label,
                "kind": failure.kind().as_str(),
                "message": message,
                "detail": failure.detail(),
            })
        } else {
            json!({ "status": label, "message": message })
        };
        Response::builder().status(status).json(&body)
    }

    fn page(&self, status: StatusCode, message: &str) -> Response {
        let locals = json!({ "title": ERROR_TITLE, "msg": message });
        let rendered = self.renderer.as_ref().map(|r| r.render("error", &locals));
        let html = match rendered {
            Some(Ok(html)) => html,
            Some(Err(e)) => {
                error!("error view failed to render: {}", e.detail().unwrap_or(e.message()));
                fallback_page(message)
            }
            None => fallback_page(message),
        };
        Response::builder().status(status).html(html)
    }
}

/// `"fail"` for caller mistakes, `"error"` for ours.
fn status_label(status: StatusCode) -> &'static str {
    if status.is_client_error() { "fail" } else { "error" }
}

fn fallback_page(message: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>{ERROR_TITLE}</title></head>\
         <body><h2>{ERROR_TITLE}</h2><p>{}</p></body></html>",
        escape_html(message)
    )
}

pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
