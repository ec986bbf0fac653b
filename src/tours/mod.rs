//! The tour-booking application built on the pipeline.
//!
//! [`build_app`] wires the standard pipeline, the route table and the error
//! interceptor around a set of [`Services`].

pub mod api;
pub mod auth;
pub mod bookings;
pub mod memory;
pub mod model;
pub mod routes;
pub mod services;
pub mod views;

use std::sync::Arc;

use crate::app::App;
use crate::config::AppConfig;
use crate::interceptor::ErrorInterceptor;
use crate::middleware::RateLimiter;
use crate::pipeline::Pipeline;
use crate::static_files::StaticFiles;

pub use services::Services;

/// Assembles the tour app from configuration and collaborators.
pub fn build_app(config: &AppConfig, services: Services) -> App {
    let limits = &config.pipeline.rate_limit;
    let limiter = Arc::new(RateLimiter::new(limits.max, limits.window()));
    let pipeline = Pipeline::from_config(&config.pipeline, config.env, limiter);

    let interceptor = ErrorInterceptor::new(config.env).renderer(Arc::clone(&services.views));
    let app = App::new(pipeline, routes::router(&services), interceptor);

    match &config.static_dir {
        Some(dir) => app.with_static_files(StaticFiles::new(dir.clone())),
        None => app,
    }
}
