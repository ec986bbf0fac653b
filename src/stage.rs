//! Stages, their outcomes, and the loop that runs them.
//!
//! # What a stage is
//!
//! A stage takes the in-flight [`Context`] by value and answers with a
//! [`Flow`]: hand the context on, answer the request, or fail. There is no
//! `next` callback; the dispatch loop looks at the returned variant and
//! decides what happens.
//!
//! ```text
//! async fn is_logged_in(ctx: Context) -> Flow { … }   ← user writes this
//!        ↓ Chain::new().then(is_logged_in)
//! Arc::new(is_logged_in)                             ← BoxedStage
//!        ↓  at request time
//! stage.call(ctx)                                    ← one vtable dispatch
//!        ↓
//! Box::pin(async { is_logged_in(ctx).await.into_flow() })
//! ```
//!
//! Any `async fn(Context) -> impl IntoFlow` is a stage. Stages that carry
//! configuration (the rate limiter, the body parser) implement [`Stage`]
//! directly.

use std::any::type_name;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{error, trace};

use crate::context::{Context, Outgoing};
use crate::failure::Failure;
use crate::response::Response;

/// A heap-allocated, type-erased future that resolves to a [`Flow`].
pub type BoxFuture = Pin<Box<dyn Future<Output = Flow> + Send + 'static>>;

/// A stage shared across concurrent requests.
pub type BoxedStage = Arc<dyn Stage>;

// ── Flow ──────────────────────────────────────────────────────────────────────

/// What a stage decided.
#[derive(Debug)]
pub enum Flow {
    /// Pass the (possibly enriched) context to the next stage.
    Continue(Context),
    /// Answer the request; nothing after this stage runs.
    Respond(Response),
    /// Abort and hand the failure to the interceptor.
    Fail(Failure),
}

/// Conversion into a [`Flow`], so stages can return whatever reads best.
pub trait IntoFlow {
    fn into_flow(self) -> Flow;
}

impl IntoFlow for Flow {
    fn into_flow(self) -> Flow { self }
}

impl IntoFlow for Context {
    fn into_flow(self) -> Flow { Flow::Continue(self) }
}

impl IntoFlow for Response {
    fn into_flow(self) -> Flow { Flow::Respond(self) }
}

impl IntoFlow for Failure {
    fn into_flow(self) -> Flow { Flow::Fail(self) }
}

impl<T: IntoFlow> IntoFlow for Result<T, Failure> {
    fn into_flow(self) -> Flow {
        match self {
            Ok(v) => v.into_flow(),
            Err(f) => Flow::Fail(f),
        }
    }
}

// ── Stage ─────────────────────────────────────────────────────────────────────

/// One unit of request processing.
pub trait Stage: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> BoxFuture;

    /// Used in logs. Defaults to the implementing type's path.
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }
}

impl<F, Fut, R> Stage for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoFlow + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture {
        let fut = (self)(ctx);
        Box::pin(async move { fut.await.into_flow() })
    }
}

/// Box a stage for storage in a [`Chain`] or pipeline.
pub fn boxed(stage: impl Stage) -> BoxedStage {
    Arc::new(stage)
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// An ordered list of stages, run strictly one after the other.
///
/// ```rust
/// use trailhead::{Chain, Context, Failure, Response};
///
/// async fn check(ctx: Context) -> Context { ctx }
/// async fn render(_ctx: Context) -> Result<Response, Failure> {
///     Ok(Response::html("<h1>hi</h1>"))
/// }
///
/// let chain = Chain::new().then(check).then(render);
/// assert_eq!(chain.len(), 2);
/// ```
#[derive(Clone, Default)]
pub struct Chain {
    stages: Vec<BoxedStage>,
}

impl Chain {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// A chain with a single stage.
    pub fn of(stage: impl Stage) -> Self {
        Self::new().then(stage)
    }

    pub fn then(mut self, stage: impl Stage) -> Self {
        self.stages.push(boxed(stage));
        self
    }

    pub fn then_boxed(mut self, stage: BoxedStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn len(&self) -> usize { self.stages.len() }
    pub fn is_empty(&self) -> bool { self.stages.is_empty() }

    /// Stage names in execution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub(crate) fn stages(&self) -> &[BoxedStage] { &self.stages }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

// ── Running a chain ───────────────────────────────────────────────────────────

/// Why a chain stopped before running out of stages.
#[derive(Debug)]
pub(crate) enum Halt {
    Respond(Response),
    Fail(Failure),
}

/// Runs `stages` in order.
///
/// Returns the context if every stage continued. Otherwise returns the halt
/// together with the response decorations as they stood when the halting
/// stage was entered. A panicking stage becomes a fault.
pub(crate) async fn run(
    stages: &[BoxedStage],
    mut ctx: Context,
) -> Result<Context, (Halt, Outgoing)> {
    for stage in stages {
        let snapshot = ctx.outgoing.clone();
        trace!(stage = stage.name(), "entering stage");

        let flow = match std::panic::catch_unwind(AssertUnwindSafe(|| stage.call(ctx))) {
            Ok(fut) => match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(flow) => flow,
                Err(panic) => Flow::Fail(panic_failure(stage.name(), &panic)),
            },
            Err(panic) => Flow::Fail(panic_failure(stage.name(), &panic)),
        };

        match flow {
            Flow::Continue(next) => ctx = next,
            Flow::Respond(res) => return Err((Halt::Respond(res), snapshot)),
            Flow::Fail(f) => return Err((Halt::Fail(f), snapshot)),
        }
    }
    Ok(ctx)
}

fn panic_failure(stage: &str, panic: &Box<dyn std::any::Any + Send>) -> Failure {
    let msg = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned());
    error!(stage, panic = %msg, "stage panicked");
    Failure::fault(format!("stage `{stage}` panicked: {msg}"))
}
