//! # Gated Artifact Retrieval
//!
//! The download gate. Eligibility is re-checked against the server-side
//! record on every call — nothing the client sends can substitute for the
//! check, and a revoked key locks the gate immediately.

use axum::extract::State;
use axum::response::Redirect;
use axum::routing::get;
use axum::Router;

use crate::auth::{require_user_binding, CallerIdentity};
use crate::error::AppError;
use crate::state::AppState;

/// Build the download router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/download/latest", get(download_latest))
}

/// GET /v1/download/latest — Redirect eligible callers to the artifact.
#[utoipa::path(
    get,
    path = "/v1/download/latest",
    responses(
        (status = 303, description = "Redirect to the latest artifact"),
        (status = 403, description = "Caller is not download-eligible", body = crate::error::ErrorBody),
        (status = 503, description = "No artifact URL configured", body = crate::error::ErrorBody),
    ),
    tag = "download"
)]
pub async fn download_latest(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Redirect, AppError> {
    let user_id = require_user_binding(&caller)?;

    let eligible = state
        .requests
        .get(&user_id)
        .map(|r| r.is_eligible())
        .unwrap_or(false);

    if !eligible {
        tracing::warn!(user_id = %user_id, "download blocked for ineligible caller");
        return Err(AppError::Forbidden(
            "download access has not been granted; submit a download request and await approval"
                .to_string(),
        ));
    }

    let url = state.config.artifact_url.as_deref().ok_or_else(|| {
        AppError::ServiceUnavailable("no download artifact configured".to_string())
    })?;

    tracing::info!(user_id = %user_id, "download redirect served");
    Ok(Redirect::to(url))
}
