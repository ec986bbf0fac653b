//! Application configuration.
//!
//! Every field has a default, so an empty TOML file (or none at all) yields
//! the stock setup: 10 KB bodies, 50 API requests per IP per hour, the tour
//! filter keys allowed to repeat in query strings.
//!
//! ```toml
//! env = "production"
//! port = 8080
//! static_dir = "public"
//!
//! [pipeline.rate_limit]
//! max = 100
//! window_secs = 900
//! ```
//!
//! `APP_ENV`, `HOST` and `PORT` override the file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;
use crate::middleware::body::DEFAULT_LIMIT;
use crate::middleware::compression::DEFAULT_THRESHOLD;

/// Deployment environment. Controls access logging and error detail.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(format!("unknown environment `{other}`")),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub env: Environment,
    pub host: String,
    pub port: u16,
    /// Directory served byte-for-byte ahead of the pipeline.
    pub static_dir: Option<PathBuf>,
    /// Base URL used to build checkout redirect targets.
    pub public_url: String,
    pub pipeline: PipelineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: Environment::default(),
            host: "127.0.0.1".to_owned(),
            port: 3000,
            static_dir: None,
            public_url: "http://localhost:3000".to_owned(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Applies `APP_ENV`, `HOST` and `PORT` from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(env) = lookup("APP_ENV").and_then(|v| v.parse().ok()) {
            self.env = env;
        }
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT").and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        self
    }

    pub fn addr(&self) -> Result<SocketAddr, Error> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| Error::Addr(raw))
    }
}

/// Which global stages run and with what parameters.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub security_headers: bool,
    /// Trust `X-Forwarded-For` for the client address.
    ///
    /// The rate limiter then keys on the left-most entry, which the client
    /// controls. Only safe behind a proxy that overwrites the header; turn it
    /// off when the service is reachable directly.
    pub trust_proxy: bool,
    pub body_limit: usize,
    pub rate_limit: RateLimitConfig,
    pub sanitize: SanitizeConfig,
    /// Query keys allowed to keep several values.
    pub hpp_whitelist: Vec<String>,
    pub compression: CompressionConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            security_headers: true,
            trust_proxy: true,
            body_limit: DEFAULT_LIMIT,
            rate_limit: RateLimitConfig::default(),
            sanitize: SanitizeConfig::default(),
            hpp_whitelist: [
                "duration",
                "ratingsQuantity",
                "ratingsAverage",
                "maxGroupSize",
                "difficulty",
                "price",
            ]
            .map(String::from)
            .to_vec(),
            compression: CompressionConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub prefix: String,
    pub max: u32,
    pub window_secs: u64,
    pub message: String,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: "/api".to_owned(),
            max: 50,
            window_secs: 60 * 60,
            message: "Too many request from this IP, try again in an hour".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SanitizeConfig {
    pub enabled: bool,
    /// Reject requests carrying operator keys instead of stripping them.
    pub reject_injection: bool,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self { enabled: true, reject_injection: false }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub threshold: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { enabled: true, threshold: DEFAULT_THRESHOLD }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.pipeline.body_limit, 10 * 1024);
        assert_eq!(cfg.pipeline.rate_limit.max, 50);
        assert_eq!(cfg.pipeline.rate_limit.window(), Duration::from_secs(3600));
        assert!(cfg.pipeline.hpp_whitelist.contains(&"ratingsAverage".to_owned()));
    }

    #[test]
    fn nested_tables_override() {
        let cfg = AppConfig::from_toml_str(
            r#"
            env = "production"
            [pipeline.rate_limit]
            max = 5
            [pipeline.sanitize]
            reject_injection = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.env, Environment::Production);
        assert_eq!(cfg.pipeline.rate_limit.max, 5);
        assert_eq!(cfg.pipeline.rate_limit.prefix, "/api");
        assert!(cfg.pipeline.sanitize.reject_injection);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        assert!(matches!(AppConfig::from_toml_str("port = \"x\""), Err(Error::Config(_))));
    }

    #[test]
    fn environment_overrides_apply() {
        let cfg = AppConfig::default().with_overrides(|k| match k {
            "APP_ENV" => Some("prod".into()),
            "PORT" => Some("8081".into()),
            _ => None,
        });
        assert_eq!(cfg.env, Environment::Production);
        assert_eq!(cfg.addr().unwrap(), "127.0.0.1:8081".parse().unwrap());
    }
}
