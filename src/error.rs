//! Unified error type.

use thiserror::Error;

/// The error type returned by trailhead's fallible infrastructure operations.
///
/// Request-level problems (404, 413, 429, etc.) are expressed as
/// [`Failure`](crate::Failure) values and turned into responses by the
/// interceptor. This type surfaces startup failures: loading configuration,
/// binding to a port, accepting a connection.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid address `{0}`")]
    Addr(String),
}
