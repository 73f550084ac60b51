//! # bbl-api — Axum API Service for the Binary Baseline License Gate
//!
//! The license gate sits between Binary Baseline subscribers and the
//! desktop application artifact. Subscribers file a download request,
//! operators review the queue and issue (or revoke) license keys, and the
//! download endpoint re-checks eligibility server-side before redirecting
//! to the artifact.
//!
//! ## API Surface
//!
//! | Prefix                          | Module                | Domain              |
//! |---------------------------------|-----------------------|---------------------|
//! | `/v1/download-requests`         | [`routes::intake`]    | Request intake      |
//! | `/v1/admin/*`                   | [`routes::admin`]     | Operator console    |
//! | `/v1/download/latest`           | [`routes::download`]  | Gated retrieval     |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → RateLimitMiddleware → Handler
//! ```
//!
//! ## OpenAPI
//!
//! Auto-generated OpenAPI 3.1 spec via utoipa derive macros at `/openapi.json`.

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::State;
use axum::middleware::from_fn;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::error::AppError;
use crate::middleware::metrics::ApiMetrics;
use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) are mounted outside the auth middleware
/// so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics = ApiMetrics::new();
    let limiter = RateLimiter::new(RateLimitConfig::default());

    // Authenticated API routes.
    let api = Router::new()
        .merge(routes::intake::router())
        .merge(routes::admin::router())
        .merge(routes::download::router())
        .merge(openapi::router())
        .layer(from_fn(middleware::rate_limit::rate_limit_middleware))
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .layer(axum::Extension(metrics))
        .layer(axum::Extension(limiter))
        .with_state(state.clone());

    // Unauthenticated health probes.
    let health = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness))
        .with_state(state);

    Router::new().merge(health).merge(api)
}

/// Liveness probe — always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe — returns 200 when the application is ready to serve.
/// When a database is configured, readiness includes a connection check.
async fn readiness(State(state): State<AppState>) -> Result<&'static str, AppError> {
    if let Some(pool) = &state.db_pool {
        sqlx::query("SELECT 1").execute(pool).await.map_err(|e| {
            tracing::warn!(error = %e, "readiness probe failed database check");
            AppError::ServiceUnavailable("database unavailable".to_string())
        })?;
    }
    Ok("ready")
}
