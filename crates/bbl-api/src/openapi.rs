//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI 3.1 spec.
//! Serves at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Binary Baseline API — License Gate",
        version = "0.3.2",
        description = "Download request intake, license key issuance and revocation, and gated artifact retrieval for the Binary Baseline desktop application.",
        license(name = "BUSL-1.1")
    ),
    paths(
        // Intake
        crate::routes::intake::submit_download_request,
        // Admin
        crate::routes::admin::review_queue,
        crate::routes::admin::issue_license_key,
        crate::routes::admin::revoke_license_key,
        // Download
        crate::routes::download::download_latest,
    ),
    components(schemas(
        // Error types
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        // Intake DTOs
        crate::routes::intake::DownloadRequestInput,
        crate::routes::intake::DownloadRequestResponse,
        // Admin DTOs
        crate::routes::admin::RequestDetail,
        crate::routes::admin::ReviewQueueResponse,
        crate::routes::admin::IssueKeyRequest,
        crate::routes::admin::IssueKeyResponse,
        crate::routes::admin::RevokeKeyRequest,
        crate::routes::admin::RevokeKeyResponse,
    )),
    tags(
        (name = "intake", description = "Download request intake"),
        (name = "admin", description = "Operator console — review queue, key issuance, revocation"),
        (name = "download", description = "Gated artifact retrieval"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
///
/// Serves the OpenAPI JSON spec at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json — Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
