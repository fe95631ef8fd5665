//! Threadscope HTTP Service
//!
//! This is the thin service shell that wires the scraper, the governors and
//! the HTTP routes together. Core logic lives in the `crates/` directory.

#![warn(clippy::all)]

pub mod error;
pub mod routes;
pub mod state;

use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

/// Build the application router.
pub fn build_app(state: Arc<AppState>, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/scrape", post(routes::scrape))
        .route("/health", get(routes::health))
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Initialize tracing subscriber for logging
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,threadscope=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}
