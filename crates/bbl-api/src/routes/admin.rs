//! # Operator Console API
//!
//! Admin-only endpoints: the review queue partitioned by eligibility,
//! license key issuance, and revocation.
//!
//! Issuance is a guarded transition, not a blind write. The in-memory
//! compare-and-set runs under a single write lock, and when a database is
//! configured the conditional UPDATE (`WHERE license_key IS NULL`) is the
//! authoritative check — exactly one winner commits under concurrency.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use bbl_core::{LicenseKey, SubscriptionTier};
use bbl_state::{AccessError, AccessRecord, AccessStatus, RevokeOutcome};

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::{AppState, Store};

/// How many fresh keys to try when a collision is detected — by the store's
/// in-memory uniqueness scan or by the database unique index — before giving
/// up. With 75 bits of randomness per key a single collision is already
/// extraordinary.
const MAX_KEY_ATTEMPTS: u32 = 3;

// ── DTOs ─────────────────────────────────────────────────────────────

/// Full record detail for the review queue.
#[derive(Debug, Serialize, ToSchema)]
pub struct RequestDetail {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    #[schema(value_type = String)]
    pub subscription_tier: SubscriptionTier,
    #[schema(value_type = String)]
    pub status: AccessStatus,
    pub download_eligible: bool,
    #[schema(value_type = Option<String>)]
    pub license_key: Option<LicenseKey>,
    pub key_issued_at: Option<DateTime<Utc>>,
    pub key_issued_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AccessRecord> for RequestDetail {
    fn from(record: AccessRecord) -> Self {
        Self {
            user_id: record.user_id,
            first_name: record.contact.first_name,
            last_name: record.contact.last_name,
            email: record.contact.email,
            phone: record.contact.phone,
            address: record.contact.address,
            subscription_tier: record.tier,
            status: if record.download_eligible {
                AccessStatus::Approved
            } else {
                AccessStatus::Pending
            },
            download_eligible: record.download_eligible,
            license_key: record.license_key,
            key_issued_at: record.key_issued_at,
            key_issued_by: record.key_issued_by,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Review queue, partitioned by eligibility.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewQueueResponse {
    pub pending: Vec<RequestDetail>,
    pub approved: Vec<RequestDetail>,
}

/// Key issuance request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct IssueKeyRequest {
    pub user_id: Uuid,
}

impl Validate for IssueKeyRequest {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Key issuance response.
#[derive(Debug, Serialize, ToSchema)]
pub struct IssueKeyResponse {
    pub user_id: Uuid,
    pub license_key: String,
    pub issued_at: DateTime<Utc>,
    pub issued_by: Uuid,
}

/// Key revocation request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeKeyRequest {
    pub user_id: Uuid,
}

impl Validate for RevokeKeyRequest {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Key revocation response. `revoked` is `false` when the record already
/// held no key (idempotent no-op).
#[derive(Debug, Serialize, ToSchema)]
pub struct RevokeKeyResponse {
    pub user_id: Uuid,
    pub revoked: bool,
}

// ── Router ───────────────────────────────────────────────────────────

/// Build the admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/download-requests", get(review_queue))
        .route("/v1/admin/license-keys", post(issue_license_key))
        .route("/v1/admin/license-keys/revoke", post(revoke_license_key))
}

// ── Issuance ─────────────────────────────────────────────────────────

/// Outcome of one in-memory issuance attempt.
#[derive(Debug, PartialEq, Eq)]
enum IssueAttempt {
    /// The record transitioned to eligible with the candidate key.
    Issued,
    /// No record exists for that user.
    NotFound,
    /// The record already holds a key.
    Refused(AccessError),
    /// Another record already holds the candidate key; regenerate.
    KeyTaken,
}

/// One compare-and-set issuance attempt against the in-memory store.
///
/// The key-uniqueness scan and the transition run under the same write
/// lock, so a candidate key cannot be claimed by another record between
/// the check and the write. This is the uniqueness backstop when no
/// database (and thus no unique index) is configured.
fn try_issue_in_memory(
    requests: &Store<AccessRecord>,
    user_id: Uuid,
    key: &LicenseKey,
    issued_by: Uuid,
    now: DateTime<Utc>,
) -> IssueAttempt {
    match requests.try_update_where(
        &user_id,
        |other| {
            if other.license_key.as_ref() == Some(key) {
                Err(IssueAttempt::KeyTaken)
            } else {
                Ok(())
            }
        },
        |r| {
            r.issue(key.clone(), issued_by, now)
                .map_err(IssueAttempt::Refused)
        },
    ) {
        None => IssueAttempt::NotFound,
        Some(Err(outcome)) => outcome,
        Some(Ok(())) => IssueAttempt::Issued,
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET /v1/admin/download-requests — Review queue.
#[utoipa::path(
    get,
    path = "/v1/admin/download-requests",
    responses(
        (status = 200, description = "Requests partitioned by eligibility", body = ReviewQueueResponse),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn review_queue(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<ReviewQueueResponse>, AppError> {
    require_role(&caller, Role::Admin)?;

    let mut records = state.requests.list();
    records.sort_by_key(|r| r.created_at);

    let (approved, pending): (Vec<_>, Vec<_>) =
        records.into_iter().partition(|r| r.download_eligible);

    Ok(Json(ReviewQueueResponse {
        pending: pending.into_iter().map(RequestDetail::from).collect(),
        approved: approved.into_iter().map(RequestDetail::from).collect(),
    }))
}

/// POST /v1/admin/license-keys — Issue a license key.
///
/// Stamps the issuing admin's user id onto the record. Admins acting
/// through a legacy unbound token are recorded as the nil UUID.
#[utoipa::path(
    post,
    path = "/v1/admin/license-keys",
    request_body = IssueKeyRequest,
    responses(
        (status = 200, description = "Key issued", body = IssueKeyResponse),
        (status = 404, description = "No download request for that user", body = crate::error::ErrorBody),
        (status = 409, description = "User already holds a key", body = crate::error::ErrorBody),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn issue_license_key(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<IssueKeyRequest>, JsonRejection>,
) -> Result<Json<IssueKeyResponse>, AppError> {
    let req = extract_validated_json(body)?;
    require_role(&caller, Role::Admin)?;
    let issued_by = caller.user_id.unwrap_or(Uuid::nil());
    let now = Utc::now();

    // Each cycle wins the in-process race first (key-uniqueness scan and
    // transition under one write lock), then runs the authoritative
    // database compare-and-set. A unique-index hit on license_key means a
    // key collision against another instance's row: roll back the
    // in-memory grant, regenerate, and go around again.
    let mut key = LicenseKey::generate();
    let mut attempt: u32 = 0;
    loop {
        match try_issue_in_memory(&state.requests, req.user_id, &key, issued_by, now) {
            IssueAttempt::Issued => {}
            IssueAttempt::NotFound => {
                return Err(AppError::NotFound(format!(
                    "no download request for user {}",
                    req.user_id
                )));
            }
            IssueAttempt::Refused(e) => return Err(e.into()),
            IssueAttempt::KeyTaken => {
                attempt += 1;
                if attempt > MAX_KEY_ATTEMPTS {
                    return Err(AppError::Internal(
                        "could not generate a unique license key".to_string(),
                    ));
                }
                tracing::warn!(
                    user_id = %req.user_id,
                    attempt,
                    "license key collision, regenerating"
                );
                key = LicenseKey::generate();
                continue;
            }
        }

        let pool = match &state.db_pool {
            Some(pool) => pool,
            None => break,
        };
        match crate::db::download_requests::issue_key(pool, req.user_id, &key, issued_by, now)
            .await
        {
            Ok(true) => break,
            Ok(false) => {
                // The database row is missing or already keyed: another
                // instance won. Undo the in-memory grant.
                state.requests.update(&req.user_id, |r| {
                    r.revoke(now);
                });
                return Err(AppError::Conflict(format!(
                    "user {} already holds a license key; revoke it before issuing another",
                    req.user_id
                )));
            }
            Err(e) if crate::db::is_unique_violation(&e) && attempt < MAX_KEY_ATTEMPTS => {
                attempt += 1;
                tracing::warn!(
                    user_id = %req.user_id,
                    attempt,
                    "license key collision, regenerating"
                );
                state.requests.update(&req.user_id, |r| {
                    r.revoke(now);
                });
                key = LicenseKey::generate();
            }
            Err(e) => {
                state.requests.update(&req.user_id, |r| {
                    r.revoke(now);
                });
                tracing::error!(
                    user_id = %req.user_id,
                    error = %e,
                    "failed to persist license key issuance"
                );
                return Err(AppError::Internal(
                    "license key issuance could not be persisted".to_string(),
                ));
            }
        }
    }

    tracing::info!(
        user_id = %req.user_id,
        issued_by = %issued_by,
        "license key issued"
    );

    Ok(Json(IssueKeyResponse {
        user_id: req.user_id,
        license_key: key.to_string(),
        issued_at: now,
        issued_by,
    }))
}

/// POST /v1/admin/license-keys/revoke — Revoke a license key.
#[utoipa::path(
    post,
    path = "/v1/admin/license-keys/revoke",
    request_body = RevokeKeyRequest,
    responses(
        (status = 200, description = "Revocation applied (or no-op)", body = RevokeKeyResponse),
        (status = 404, description = "No download request for that user", body = crate::error::ErrorBody),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn revoke_license_key(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<RevokeKeyRequest>, JsonRejection>,
) -> Result<Json<RevokeKeyResponse>, AppError> {
    let req = extract_validated_json(body)?;
    require_role(&caller, Role::Admin)?;
    let now = Utc::now();

    let mut outcome = RevokeOutcome::AlreadyInactive;
    let updated = state.requests.update(&req.user_id, |r| {
        outcome = r.revoke(now);
    });
    if updated.is_none() {
        return Err(AppError::NotFound(format!(
            "no download request for user {}",
            req.user_id
        )));
    }

    // Write-through. The database statement is idempotent in the same way
    // the in-memory transition is, so a repeat call is harmless.
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::download_requests::revoke_key(pool, req.user_id, now).await {
            tracing::error!(
                user_id = %req.user_id,
                error = %e,
                "failed to persist license key revocation"
            );
            return Err(AppError::Internal(
                "license key revocation could not be persisted".to_string(),
            ));
        }
    }

    if outcome.revoked() {
        tracing::info!(user_id = %req.user_id, "license key revoked");
    }

    Ok(Json(RevokeKeyResponse {
        user_id: req.user_id,
        revoked: outcome.revoked(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbl_state::ContactInfo;

    fn pending_record(user_id: Uuid) -> AccessRecord {
        AccessRecord::new(
            user_id,
            ContactInfo {
                first_name: "Jane".to_string(),
                last_name: "Doe".to_string(),
                email: format!("{user_id}@example.com"),
                phone: "+1 555 0100".to_string(),
                address: "1 Market St".to_string(),
            },
            SubscriptionTier::ProTrader,
            Utc::now(),
        )
    }

    #[test]
    fn issue_attempt_succeeds_on_fresh_key() {
        let store = Store::new();
        let user_id = Uuid::new_v4();
        store.insert(user_id, pending_record(user_id));

        let key = LicenseKey::generate();
        let outcome =
            try_issue_in_memory(&store, user_id, &key, Uuid::new_v4(), Utc::now());

        assert_eq!(outcome, IssueAttempt::Issued);
        let record = store.get(&user_id).unwrap();
        assert!(record.is_eligible());
        assert_eq!(record.license_key, Some(key));
    }

    #[test]
    fn issue_attempt_unknown_user() {
        let store: Store<AccessRecord> = Store::new();
        let outcome = try_issue_in_memory(
            &store,
            Uuid::new_v4(),
            &LicenseKey::generate(),
            Uuid::new_v4(),
            Utc::now(),
        );
        assert_eq!(outcome, IssueAttempt::NotFound);
    }

    #[test]
    fn issue_attempt_refuses_already_keyed_record() {
        let store = Store::new();
        let user_id = Uuid::new_v4();
        let mut record = pending_record(user_id);
        record
            .issue(LicenseKey::generate(), Uuid::new_v4(), Utc::now())
            .unwrap();
        store.insert(user_id, record);

        let outcome = try_issue_in_memory(
            &store,
            user_id,
            &LicenseKey::generate(),
            Uuid::new_v4(),
            Utc::now(),
        );
        assert!(matches!(outcome, IssueAttempt::Refused(_)));
    }

    #[test]
    fn issue_attempt_detects_key_already_in_circulation() {
        // A key held by one record cannot be issued to another; the handler
        // regenerates when it sees this outcome.
        let store = Store::new();
        let holder = Uuid::new_v4();
        let key = LicenseKey::generate();
        let mut record = pending_record(holder);
        record.issue(key.clone(), Uuid::new_v4(), Utc::now()).unwrap();
        store.insert(holder, record);

        let candidate = Uuid::new_v4();
        store.insert(candidate, pending_record(candidate));

        let outcome =
            try_issue_in_memory(&store, candidate, &key, Uuid::new_v4(), Utc::now());

        assert_eq!(outcome, IssueAttempt::KeyTaken);
        // The colliding attempt leaves the candidate record untouched.
        let record = store.get(&candidate).unwrap();
        assert!(!record.is_eligible());
        assert!(record.license_key.is_none());

        // A fresh key goes through.
        let outcome = try_issue_in_memory(
            &store,
            candidate,
            &LicenseKey::generate(),
            Uuid::new_v4(),
            Utc::now(),
        );
        assert_eq!(outcome, IssueAttempt::Issued);
    }
}
