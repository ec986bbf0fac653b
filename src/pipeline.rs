//! The ordered global stages applied to every request before routing.
//!
//! [`Pipeline::from_config`] always produces the same order:
//!
//! 1. security headers
//! 2. access log (development only)
//! 3. rate limit (API prefix only)
//! 4. body parser (size-capped)
//! 5. cookie parser
//! 6. sanitisation
//! 7. parameter-pollution normalisation
//! 8. compression
//! 9. request-time stamp
//!
//! Disabled stages are left out; the relative order of the rest never
//! changes. A failing stage skips everything after it, routing included.

use std::sync::Arc;

use tracing::info;

use crate::config::{Environment, PipelineConfig};
use crate::context::{Context, Outgoing};
use crate::middleware::{
    AccessLog, BodyParser, Compression, CookieParser, ParameterPollution, RateLimit,
    RateLimiter, RequestTime, Sanitize, SecurityHeaders,
};
use crate::stage::{self, Chain, Halt, Stage};

pub struct Pipeline {
    chain: Chain,
    body_limit: usize,
    limiter: Option<Arc<RateLimiter>>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder {
            chain: Chain::new(),
            body_limit: crate::middleware::body::DEFAULT_LIMIT,
            limiter: None,
        }
    }

    /// An empty pipeline: requests go straight to routing.
    pub fn empty() -> Self {
        Self::builder().build()
    }

    /// Builds the standard stage order from configuration.
    ///
    /// `limiter` is the counting service behind the rate-limit stage. Pass
    /// the same instance to every pipeline that should share counters.
    pub fn from_config(config: &PipelineConfig, env: Environment, limiter: Arc<RateLimiter>) -> Self {
        let mut builder = Self::builder();

        if config.security_headers {
            builder = builder.stage(SecurityHeaders::new());
        }
        if env.is_development() {
            builder = builder.stage(AccessLog);
        }
        if config.rate_limit.enabled {
            builder = builder.rate_limit(
                RateLimit::new(
                    Arc::clone(&limiter),
                    config.rate_limit.prefix.clone(),
                    config.rate_limit.message.clone(),
                )
                .trust_proxy(config.trust_proxy),
                limiter,
            );
        }
        builder = builder.body_parser(BodyParser::new(config.body_limit)).stage(CookieParser);
        if config.sanitize.enabled {
            builder = builder.stage(Sanitize::new().reject_injection(config.sanitize.reject_injection));
        }
        builder = builder.stage(ParameterPollution::new(config.hpp_whitelist.iter().cloned()));
        if config.compression.enabled {
            builder = builder.stage(Compression::new(config.compression.threshold));
        }

        let pipeline = builder.stage(RequestTime).build();
        info!(stages = ?pipeline.names(), "pipeline assembled");
        pipeline
    }

    /// Stage names in execution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.chain.names()
    }

    /// Largest body the server should buffer for this pipeline.
    pub fn body_limit(&self) -> usize { self.body_limit }

    pub fn limiter(&self) -> Option<&Arc<RateLimiter>> { self.limiter.as_ref() }

    pub(crate) async fn run(&self, ctx: Context) -> Result<Context, (Halt, Outgoing)> {
        stage::run(self.chain.stages(), ctx).await
    }
}

/// Appends global stages in the order they should run.
pub struct PipelineBuilder {
    chain: Chain,
    body_limit: usize,
    limiter: Option<Arc<RateLimiter>>,
}

impl PipelineBuilder {
    pub fn stage(mut self, stage: impl Stage) -> Self {
        self.chain = self.chain.then(stage);
        self
    }

    /// Adds a body parser and records its cap for the server's read limit.
    pub fn body_parser(mut self, parser: BodyParser) -> Self {
        self.body_limit = parser.limit();
        self.stage(parser)
    }

    /// Adds a rate-limit stage and keeps a handle on its counters.
    pub fn rate_limit(mut self, stage: RateLimit, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self.stage(stage)
    }

    pub fn build(self) -> Pipeline {
        Pipeline { chain: self.chain, body_limit: self.body_limit, limiter: self.limiter }
    }
}
