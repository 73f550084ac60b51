//! # Database Persistence Layer
//!
//! Provides Postgres persistence for download-access records via SQLx.
//!
//! ## Architecture
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, the API
//! persists download requests and issued keys to PostgreSQL. When absent,
//! the API operates in in-memory-only mode (suitable for development and
//! testing).
//!
//! The in-memory store is the read path; every write goes through to the
//! database first where it matters for correctness (key issuance uses a
//! conditional UPDATE as the authoritative compare-and-set, and the unique
//! index on `license_key` is the collision backstop).

pub mod download_requests;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set — running in-memory only mode. \
                 State will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    // Run embedded migrations.
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Whether a SQLx error is a unique-constraint violation.
///
/// Used to distinguish license-key collisions (regenerate and retry) and
/// duplicate emails (conflict) from genuine database failures.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err)
            if matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation)
    )
}
