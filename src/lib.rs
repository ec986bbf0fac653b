//! # trailhead
//!
//! A tour-booking web service on a small hyper-based request pipeline.
//!
//! ## How a request moves
//!
//! Every request is a [`Context`] handed from [`Stage`] to [`Stage`]. A stage
//! answers with a [`Flow`]: continue with the (possibly enriched) context,
//! respond, or fail. There is no `next` callback to forget or call twice.
//!
//! 1. A [`Pipeline`] of global stages runs first: security headers, access
//!    log, rate limit, body parser, cookies, sanitisation, parameter
//!    pollution, compression, request time.
//! 2. The [`Router`] picks the first matching route and runs its [`Chain`].
//! 3. Any [`Failure`] on the way, including an unmatched route or a
//!    panicking stage, goes to the [`ErrorInterceptor`], which owns every
//!    error response.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use trailhead::tours::{build_app, memory::MemoryServices};
//! use trailhead::{AppConfig, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), trailhead::Error> {
//!     let config = AppConfig::default();
//!     let services = MemoryServices::seeded().services(config.public_url.clone());
//!     let app = build_app(&config, services);
//!     Server::bind(config.addr()?).serve(app).await
//! }
//! ```
//!
//! ## Writing a stage
//!
//! ```rust
//! use trailhead::{Chain, Context, Failure, Response, Router};
//!
//! async fn require_json(ctx: Context) -> Result<Context, Failure> {
//!     match ctx.header(http::header::CONTENT_TYPE) {
//!         Some(ct) if ct.starts_with("application/json") => Ok(ctx),
//!         _ => Err(Failure::bad_request("expected JSON")),
//!     }
//! }
//!
//! async fn create(ctx: Context) -> Response {
//!     Response::json(ctx.body())
//! }
//!
//! let router = Router::new().post("/things", Chain::new().then(require_json).then(create));
//! assert_eq!(router.len(), 1);
//! ```

mod app;
mod config;
mod context;
mod error;
mod failure;
mod interceptor;
mod logging;
mod pipeline;
mod response;
mod router;
mod server;
mod stage;
mod static_files;
mod view;

pub mod middleware;
pub mod tours;

pub use app::App;
pub use config::{
    AppConfig, CompressionConfig, Environment, PipelineConfig, RateLimitConfig, SanitizeConfig,
};
pub use context::{Context, Outgoing, Query, QueryValue, RequestBody};
pub use error::Error;
pub use failure::{Failure, FailureKind};
pub use interceptor::{ErrorInterceptor, RequestInfo};
pub use logging::init_logging;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use response::{ContentType, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use stage::{BoxFuture, BoxedStage, Chain, Flow, IntoFlow, Stage, boxed};
pub use static_files::StaticFiles;
pub use view::ViewRenderer;
