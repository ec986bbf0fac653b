//! Development access log.

use std::time::Instant;

use http::{Method, StatusCode};
use tracing::info;

use crate::context::Context;
use crate::stage::{BoxFuture, Flow, Stage};

/// Marks the request for logging; the line itself is written once the
/// response exists, so it carries the final status and latency.
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessLog;

impl Stage for AccessLog {
    fn call(&self, mut ctx: Context) -> BoxFuture {
        ctx.outgoing_mut().access_log = Some(Instant::now());
        Box::pin(std::future::ready(Flow::Continue(ctx)))
    }

    fn name(&self) -> &'static str { "access_log" }
}

/// `GET /api/v1/tours 200 1.204 ms - 5120`
pub(crate) fn log_response(
    method: &Method,
    url: &str,
    status: StatusCode,
    started: Instant,
    body_len: usize,
) {
    let elapsed = started.elapsed().as_secs_f64() * 1000.0;
    info!(
        target: "trailhead::access",
        "{method} {url} {} {elapsed:.3} ms - {body_len}",
        status.as_u16()
    );
}
