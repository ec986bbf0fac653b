//! Security response headers.

use http::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::context::Context;
use crate::stage::{BoxFuture, Flow, Stage};

/// Adds a fixed set of hardening headers to whatever response is produced.
///
/// The set matches what browsers commonly expect from a server-rendered site:
/// no DNS prefetch, same-origin framing, HSTS, no MIME sniffing.
#[derive(Clone, Debug)]
pub struct SecurityHeaders {
    headers: HeaderMap,
}

impl SecurityHeaders {
    pub fn new() -> Self {
        let pairs: [(HeaderName, &'static str); 7] = [
            (header::X_DNS_PREFETCH_CONTROL, "off"),
            (header::X_FRAME_OPTIONS, "SAMEORIGIN"),
            (header::STRICT_TRANSPORT_SECURITY, "max-age=15552000; includeSubDomains"),
            (HeaderName::from_static("x-download-options"), "noopen"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            (header::X_XSS_PROTECTION, "1; mode=block"),
            (header::REFERRER_POLICY, "no-referrer"),
        ];
        let mut headers = HeaderMap::with_capacity(pairs.len());
        for (name, value) in pairs {
            headers.insert(name, HeaderValue::from_static(value));
        }
        Self { headers }
    }
}

impl Default for SecurityHeaders {
    fn default() -> Self { Self::new() }
}

impl Stage for SecurityHeaders {
    fn call(&self, mut ctx: Context) -> BoxFuture {
        for (name, value) in &self.headers {
            ctx.outgoing_mut().headers.insert(name.clone(), value.clone());
        }
        Box::pin(std::future::ready(Flow::Continue(ctx)))
    }

    fn name(&self) -> &'static str { "security_headers" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_headers_for_the_response() {
        let Flow::Continue(ctx) = SecurityHeaders::new().call(Context::get("/")).await else {
            panic!("security headers must continue");
        };
        let out = &ctx.outgoing().headers;
        assert_eq!(out.get(header::X_FRAME_OPTIONS).unwrap(), "SAMEORIGIN");
        assert_eq!(out.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert!(out.contains_key(header::STRICT_TRANSPORT_SECURITY));
    }
}
