//! Classified request failures.
//!
//! A [`Failure`] is what a stage returns when it cannot let the request go
//! any further. It travels out-of-band to the
//! [`ErrorInterceptor`](crate::ErrorInterceptor), which is the only place a
//! failure is turned into a response.
//!
//! ```rust
//! use http::StatusCode;
//! use trailhead::{Failure, FailureKind};
//!
//! let f = Failure::not_found("/api/v1/nonexistent");
//! assert_eq!(f.kind(), FailureKind::Client);
//! assert_eq!(f.status(), StatusCode::NOT_FOUND);
//! assert!(f.message().contains("/api/v1/nonexistent"));
//! ```

use std::fmt;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use thiserror::Error;

/// Broad classification used by the interceptor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// Bad input from the caller: oversized body, rate limit, unknown route.
    Client,
    /// Authentication or authorization, usually raised by a collaborator.
    Auth,
    /// Anything unexpected. The message is never shown in production.
    Fault,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Auth   => "auth",
            Self::Fault  => "fault",
        }
    }

    fn default_status(self) -> StatusCode {
        match self {
            Self::Client => StatusCode::BAD_REQUEST,
            Self::Auth   => StatusCode::UNAUTHORIZED,
            Self::Fault  => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure signalled by a stage.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct Failure {
    kind: FailureKind,
    status: Option<StatusCode>,
    message: String,
    detail: Option<String>,
    headers: HeaderMap,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            detail: None,
            headers: HeaderMap::new(),
        }
    }

    /// Operational client error with an explicit status.
    pub fn client(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(FailureKind::Client, message).with_status(status)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::client(StatusCode::BAD_REQUEST, message)
    }

    /// The fallback route's failure. `original_url` is echoed verbatim.
    pub fn not_found(original_url: &str) -> Self {
        Self::client(
            StatusCode::NOT_FOUND,
            format!("Can't find {original_url} on this server!"),
        )
    }

    pub fn payload_too_large() -> Self {
        Self::client(StatusCode::PAYLOAD_TOO_LARGE, "request entity too large")
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::client(StatusCode::TOO_MANY_REQUESTS, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Auth, message).with_status(StatusCode::UNAUTHORIZED)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Auth, message).with_status(StatusCode::FORBIDDEN)
    }

    /// A session token that could not be verified.
    pub fn invalid_token() -> Self {
        Self::unauthorized("Invalid token. Please log in again!")
    }

    pub fn token_expired() -> Self {
        Self::unauthorized("Your token has expired! Please log in again.")
    }

    /// An unexpected fault. `detail` goes to the diagnostic log only.
    pub fn fault(detail: impl fmt::Display) -> Self {
        let detail = detail.to_string();
        Self {
            kind: FailureKind::Fault,
            status: None,
            message: detail.clone(),
            detail: Some(detail),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Extra header for the error response, e.g. `Retry-After`.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn kind(&self) -> FailureKind { self.kind }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn message(&self) -> &str { &self.message }
    pub fn detail(&self) -> Option<&str> { self.detail.as_deref() }

    /// Status carried by the failure, or the default for its kind.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or_else(|| self.kind.default_status())
    }

    /// Expected failures whose message is safe to show to the caller.
    pub fn is_operational(&self) -> bool {
        self.kind != FailureKind::Fault
    }
}

impl From<std::io::Error> for Failure {
    fn from(e: std::io::Error) -> Self {
        Self::fault(format!("io: {e}"))
    }
}

impl From<serde_json::Error> for Failure {
    fn from(e: serde_json::Error) -> Self {
        Self::fault(format!("json: {e}"))
    }
}
