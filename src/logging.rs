//! Log subscriber setup for the binary.

use tracing_subscriber::EnvFilter;

use crate::config::Environment;

/// Installs a `fmt` subscriber. `RUST_LOG` wins; otherwise development logs
/// at `debug` and everything else at `info`.
///
/// Safe to call more than once: later calls are ignored.
pub fn init_logging(env: Environment) {
    let default = if env.is_development() { "trailhead=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(!env.is_development())
        .try_init();
}
