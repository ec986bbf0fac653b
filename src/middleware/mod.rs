//! The global stages every request passes through before routing.
//!
//! Each submodule is one cross-cutting concern. The
//! [`Pipeline`](crate::Pipeline) decides their order; none of them know
//! about each other.
//!
//! | Stage | Effect |
//! |---|---|
//! | [`SecurityHeaders`] | hardening headers on every response |
//! | [`AccessLog`] | one log line per response (development only) |
//! | [`RateLimit`] | per-IP window on the API prefix |
//! | [`BodyParser`] | JSON / form bodies, size-capped |
//! | [`CookieParser`] | `Cookie` header → map |
//! | [`Sanitize`] | strips operator keys, escapes markup |
//! | [`ParameterPollution`] | collapses repeated query keys |
//! | [`Compression`] | gzip / deflate negotiation |
//! | [`RequestTime`] | stamps the arrival time |

pub mod access_log;
pub mod body;
pub mod compression;
pub mod cookies;
pub mod hpp;
pub mod rate_limit;
pub mod request_time;
pub mod sanitize;
pub mod security;

pub use access_log::AccessLog;
pub use body::BodyParser;
pub use compression::{Compression, Encoding};
pub use cookies::CookieParser;
pub use hpp::ParameterPollution;
pub use rate_limit::{Decision, RateLimit, RateLimiter};
pub use request_time::RequestTime;
pub use sanitize::Sanitize;
pub use security::SecurityHeaders;
