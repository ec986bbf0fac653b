//! The assembled application: static files, pipeline, router, interceptor.
//!
//! ```text
//! RECEIVING → static hit? ──────────────────────────────────────→ RESPONDING
//!           → GLOBAL_STAGES → ROUTE_DISPATCH → ROUTE_STAGES* ──→ RESPONDING
//!                 └── any failure ──→ ERROR_INTERCEPT ─────────→ RESPONDING
//! ```
//!
//! [`App::handle`] produces exactly one [`Response`] per [`Context`].

use http::Method;

use crate::context::{Context, Outgoing};
use crate::interceptor::{ErrorInterceptor, RequestInfo};
use crate::middleware::{access_log, compression};
use crate::pipeline::Pipeline;
use crate::response::Response;
use crate::router::Router;
use crate::stage::Halt;
use crate::static_files::StaticFiles;

pub struct App {
    pipeline: Pipeline,
    router: Router,
    interceptor: ErrorInterceptor,
    statics: Option<StaticFiles>,
}

impl App {
    pub fn new(pipeline: Pipeline, router: Router, interceptor: ErrorInterceptor) -> Self {
        Self { pipeline, router, interceptor, statics: None }
    }

    pub fn with_static_files(mut self, statics: StaticFiles) -> Self {
        self.statics = Some(statics);
        self
    }

    pub fn pipeline(&self) -> &Pipeline { &self.pipeline }
    pub fn router(&self) -> &Router { &self.router }

    /// How many body bytes the server should buffer before giving up.
    pub fn read_limit(&self) -> usize {
        self.pipeline.body_limit()
    }

    /// Runs one exchange to completion.
    pub async fn handle(&self, ctx: Context) -> Response {
        if let Some(res) = self.serve_static(&ctx).await {
            return res;
        }

        let info = RequestInfo::of(&ctx);
        let (halt, outgoing) = match self.pipeline.run(ctx).await {
            Ok(ctx) => self.router.dispatch(ctx).await,
            Err(halted) => halted,
        };

        let res = match halt {
            Halt::Respond(res) => res,
            Halt::Fail(failure) => self.interceptor.intercept(failure, &info),
        };
        finish(res, &outgoing, &info)
    }

    async fn serve_static(&self, ctx: &Context) -> Option<Response> {
        let statics = self.statics.as_ref()?;
        if *ctx.method() != Method::GET && *ctx.method() != Method::HEAD {
            return None;
        }
        statics.serve(ctx.path()).await
    }
}

/// Applies the decorations stages recorded along the way.
fn finish(mut res: Response, outgoing: &Outgoing, info: &RequestInfo) -> Response {
    res.merge_headers(&outgoing.headers);
    if let Some(encoding) = outgoing.encoding {
        compression::apply(&mut res, encoding, outgoing.compress_threshold);
    }
    if let Some(started) = outgoing.access_log {
        access_log::log_response(&info.method, &info.original_url, res.code(), started, res.body().len());
    }
    res
}
