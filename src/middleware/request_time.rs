//! Request arrival timestamp.

use chrono::Utc;

use crate::context::Context;
use crate::stage::{BoxFuture, Flow, Stage};

#[derive(Clone, Copy, Debug, Default)]
pub struct RequestTime;

impl Stage for RequestTime {
    fn call(&self, mut ctx: Context) -> BoxFuture {
        ctx.set_request_time(Utc::now());
        Box::pin(std::future::ready(Flow::Continue(ctx)))
    }

    fn name(&self) -> &'static str { "request_time" }
}
