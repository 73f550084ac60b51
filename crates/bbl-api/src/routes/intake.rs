//! # Download Request Intake
//!
//! Subscriber-facing submission of the download request form. The request
//! is bound to the caller's user id from the bearer token, never to an id
//! in the body, so one account can hold at most one record and nobody can
//! file a request on someone else's behalf.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use bbl_core::SubscriptionTier;
use bbl_state::{AccessRecord, AccessStatus, ContactInfo};

use crate::auth::{require_user_binding, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

const MAX_FIELD_LEN: usize = 255;

/// Download request submission body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DownloadRequestInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    /// One of `new_trader`, `pro_trader`, `elite_trader`.
    pub subscription_tier: String,
}

impl Validate for DownloadRequestInput {
    fn validate(&self) -> Result<(), String> {
        let fields = [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("email", &self.email),
            ("phone", &self.phone),
            ("address", &self.address),
            ("subscription_tier", &self.subscription_tier),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(format!("{field} must not be empty"));
            }
            if value.len() > MAX_FIELD_LEN {
                return Err(format!("{field} must not exceed {MAX_FIELD_LEN} characters"));
            }
        }
        bbl_core::validate_email(&self.email).map_err(|e| e.to_string())?;
        self.subscription_tier
            .parse::<SubscriptionTier>()
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Download request state as returned to the subscriber.
///
/// Deliberately omits the license key and issuance metadata — those are
/// operator-facing and handed out through support channels, not echoed
/// back through the intake endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct DownloadRequestResponse {
    pub user_id: Uuid,
    #[schema(value_type = String)]
    pub status: AccessStatus,
    pub download_eligible: bool,
    #[schema(value_type = String)]
    pub subscription_tier: SubscriptionTier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AccessRecord> for DownloadRequestResponse {
    fn from(record: AccessRecord) -> Self {
        Self {
            user_id: record.user_id,
            status: record.status(),
            download_eligible: record.download_eligible,
            subscription_tier: record.tier,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Build the intake router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/download-requests", post(submit_download_request))
}

/// POST /v1/download-requests — Submit or refresh a download request.
#[utoipa::path(
    post,
    path = "/v1/download-requests",
    request_body = DownloadRequestInput,
    responses(
        (status = 201, description = "Request created, pending review", body = DownloadRequestResponse),
        (status = 200, description = "Existing request updated", body = DownloadRequestResponse),
        (status = 422, description = "Validation failure", body = crate::error::ErrorBody),
        (status = 409, description = "Email belongs to another account", body = crate::error::ErrorBody),
    ),
    tag = "intake"
)]
pub async fn submit_download_request(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<DownloadRequestInput>, JsonRejection>,
) -> Result<(StatusCode, Json<DownloadRequestResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let user_id = require_user_binding(&caller)?;
    let tier: SubscriptionTier = req.subscription_tier.parse()?;

    // Emails are stored lowercased so uniqueness is case-insensitive in both
    // the store and the database (LOWER(email) expression index).
    let contact = ContactInfo {
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        email: req.email.trim().to_lowercase(),
        phone: req.phone.trim().to_string(),
        address: req.address.trim().to_string(),
    };

    // The email-uniqueness check and the write run under one write lock:
    // two concurrent submissions claiming the same address cannot both pass
    // the scan before either commits.
    let now = Utc::now();
    let email = contact.email.clone();
    let (record, previous) = state.requests.check_and_upsert(
        user_id,
        |other| {
            if other.contact.email.eq_ignore_ascii_case(&email) {
                Err(AppError::Conflict(
                    "email is already registered to another account".to_string(),
                ))
            } else {
                Ok(())
            }
        },
        |existing| match existing {
            Some(existing) => {
                let mut updated = existing.clone();
                updated.update_contact(contact.clone(), tier, now);
                updated
            }
            None => AccessRecord::new(user_id, contact.clone(), tier, now),
        },
    )?;
    let created = previous.is_none();

    // Persist to database (write-through). Failure is surfaced to the client
    // because the in-memory record would be lost on restart, causing silent
    // data loss — and the store is restored to its prior state so it never
    // holds a record the database rejected.
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::download_requests::upsert(pool, &record).await {
            match previous {
                Some(prev) => {
                    state.requests.insert(user_id, prev);
                }
                None => {
                    state.requests.remove(&user_id);
                }
            }
            if crate::db::is_unique_violation(&e) {
                return Err(AppError::Conflict(
                    "email is already registered to another account".to_string(),
                ));
            }
            tracing::error!(user_id = %user_id, error = %e, "failed to persist download request");
            return Err(AppError::Internal(
                "download request could not be persisted".to_string(),
            ));
        }
    }

    tracing::info!(
        user_id = %user_id,
        tier = %tier,
        created,
        "download request received"
    );

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(record.into())))
}
