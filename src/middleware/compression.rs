//! Response compression.
//!
//! The stage only negotiates: it reads `Accept-Encoding` and records the
//! choice in the context's outgoing decorations. The body is compressed once
//! the final response exists, whichever stage produced it.

use std::io::Write;

use flate2::write::{DeflateEncoder, GzEncoder};
use http::header::{self, HeaderValue};
use tracing::warn;

use crate::context::Context;
use crate::response::Response;
use crate::stage::{BoxFuture, Flow, Stage};

/// Bodies smaller than this are sent as-is.
pub const DEFAULT_THRESHOLD: usize = 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Encoding {
    Gzip,
    Deflate,
}

impl Encoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gzip    => "gzip",
            Self::Deflate => "deflate",
        }
    }

    /// Picks the best supported coding from an `Accept-Encoding` value.
    /// Gzip wins ties; `q=0` excludes a coding.
    pub fn negotiate(accept: &str) -> Option<Self> {
        let mut best: Option<(Self, f32)> = None;
        for item in accept.split(',') {
            let mut parts = item.split(';');
            let coding = parts.next().unwrap_or("").trim().to_ascii_lowercase();
            let q = parts
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            if q <= 0.0 {
                continue;
            }
            let candidate = match coding.as_str() {
                "gzip" | "x-gzip" | "*" => Self::Gzip,
                "deflate" => Self::Deflate,
                _ => continue,
            };
            let better = match best {
                None => true,
                Some((current, best_q)) => {
                    q > best_q || (q == best_q && candidate == Self::Gzip && current != Self::Gzip)
                }
            };
            if better {
                best = Some((candidate, q));
            }
        }
        best.map(|(e, _)| e)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Compression {
    threshold: usize,
}

impl Compression {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }
}

impl Default for Compression {
    fn default() -> Self { Self::new(DEFAULT_THRESHOLD) }
}

impl Stage for Compression {
    fn call(&self, mut ctx: Context) -> BoxFuture {
        let encoding = ctx.header(header::ACCEPT_ENCODING).and_then(Encoding::negotiate);
        let out = ctx.outgoing_mut();
        out.encoding = encoding;
        out.compress_threshold = self.threshold;
        Box::pin(std::future::ready(Flow::Continue(ctx)))
    }

    fn name(&self) -> &'static str { "compression" }
}

fn compressible(res: &Response) -> bool {
    let Some(ct) = res.header(header::CONTENT_TYPE) else { return false };
    ct.starts_with("text/")
        || ct.contains("json")
        || ct.contains("javascript")
        || ct.contains("xml")
        || ct.starts_with("image/svg")
}

/// Compresses `res` in place when it is worth it.
pub(crate) fn apply(res: &mut Response, encoding: Encoding, threshold: usize) {
    if !compressible(res) || res.headers().contains_key(header::CONTENT_ENCODING) {
        return;
    }
    res.headers_mut()
        .append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
    if res.body.len() < threshold {
        return;
    }

    let encoded = match encoding {
        Encoding::Gzip => {
            let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
            enc.write_all(&res.body).and_then(|_| enc.finish())
        }
        Encoding::Deflate => {
            let mut enc = DeflateEncoder::new(Vec::new(), flate2::Compression::default());
            enc.write_all(&res.body).and_then(|_| enc.finish())
        }
    };

    match encoded {
        Ok(bytes) => {
            res.body = bytes.into();
            res.headers_mut().insert(
                header::CONTENT_ENCODING,
                HeaderValue::from_static(encoding.as_str()),
            );
            res.headers_mut().remove(header::CONTENT_LENGTH);
        }
        Err(e) => warn!("compression failed, sending identity: {e}"),
    }
}
