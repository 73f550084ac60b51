//! Download request persistence operations.
//!
//! All functions take a `&PgPool` and operate on the `download_requests`
//! table. The conditional UPDATEs in [`issue_key`] and [`revoke_key`] are
//! the authoritative compare-and-set for the eligibility transitions: zero
//! rows affected means the precondition did not hold.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use bbl_core::{LicenseKey, SubscriptionTier};
use bbl_state::{AccessRecord, ContactInfo};

/// Insert or refresh a download request.
///
/// On conflict (repeat submission from the same account) only the contact
/// fields, tier, and `updated_at` are touched — eligibility and key columns
/// are never written by intake.
pub async fn upsert(pool: &PgPool, record: &AccessRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO download_requests (user_id, first_name, last_name, email, phone, address,
         tier, download_eligible, license_key, key_issued_at, key_issued_by, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
         ON CONFLICT (user_id) DO UPDATE SET
             first_name = EXCLUDED.first_name,
             last_name = EXCLUDED.last_name,
             email = EXCLUDED.email,
             phone = EXCLUDED.phone,
             address = EXCLUDED.address,
             tier = EXCLUDED.tier,
             updated_at = EXCLUDED.updated_at",
    )
    .bind(record.user_id)
    .bind(&record.contact.first_name)
    .bind(&record.contact.last_name)
    .bind(&record.contact.email)
    .bind(&record.contact.phone)
    .bind(&record.contact.address)
    .bind(record.tier.as_str())
    .bind(record.download_eligible)
    .bind(record.license_key.as_ref().map(|k| k.as_str().to_string()))
    .bind(record.key_issued_at)
    .bind(record.key_issued_by)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Atomically issue a key onto a record that holds none.
///
/// The `license_key IS NULL` guard makes this a compare-and-set: under
/// concurrent issuance exactly one UPDATE matches the row. Returns `false`
/// when zero rows were affected (row missing or already keyed).
pub async fn issue_key(
    pool: &PgPool,
    user_id: Uuid,
    key: &LicenseKey,
    issued_by: Uuid,
    issued_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE download_requests
         SET download_eligible = TRUE, license_key = $2, key_issued_at = $3,
             key_issued_by = $4, updated_at = $3
         WHERE user_id = $1 AND license_key IS NULL",
    )
    .bind(user_id)
    .bind(key.as_str())
    .bind(issued_at)
    .bind(issued_by)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Atomically revoke a record's key and eligibility.
///
/// All three key columns and the flag are nulled in a single statement, so
/// a partially-revoked row cannot exist. Returns `false` when the record
/// held no key (idempotent no-op) or does not exist.
pub async fn revoke_key(
    pool: &PgPool,
    user_id: Uuid,
    revoked_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE download_requests
         SET download_eligible = FALSE, license_key = NULL, key_issued_at = NULL,
             key_issued_by = NULL, updated_at = $2
         WHERE user_id = $1 AND license_key IS NOT NULL",
    )
    .bind(user_id)
    .bind(revoked_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load all download requests from the database into the in-memory store
/// on startup.
pub async fn load_all(pool: &PgPool) -> Result<Vec<AccessRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DownloadRequestRow>(
        "SELECT user_id, first_name, last_name, email, phone, address, tier,
         download_eligible, license_key, key_issued_at, key_issued_by, created_at, updated_at
         FROM download_requests ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        match row.into_record() {
            Some(record) => records.push(record),
            None => {
                // into_record() already logs a warning with the specifics
                tracing::error!("skipping invalid download request row during load_all");
            }
        }
    }
    Ok(records)
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct DownloadRequestRow {
    user_id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    address: String,
    tier: String,
    download_eligible: bool,
    license_key: Option<String>,
    key_issued_at: Option<DateTime<Utc>>,
    key_issued_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DownloadRequestRow {
    fn into_record(self) -> Option<AccessRecord> {
        let tier = match self.tier.parse::<SubscriptionTier>() {
            Ok(t) => t,
            Err(_) => {
                tracing::warn!(
                    user_id = %self.user_id,
                    tier = %self.tier,
                    "skipping download request row with unknown tier"
                );
                return None;
            }
        };

        let license_key = match self.license_key {
            Some(raw) => match LicenseKey::parse(&raw) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!(
                        user_id = %self.user_id,
                        error = %e,
                        "skipping download request row with malformed license key"
                    );
                    return None;
                }
            },
            None => None,
        };

        let record = AccessRecord {
            user_id: self.user_id,
            contact: ContactInfo {
                first_name: self.first_name,
                last_name: self.last_name,
                email: self.email,
                phone: self.phone,
                address: self.address,
            },
            tier,
            download_eligible: self.download_eligible,
            license_key,
            key_issued_at: self.key_issued_at,
            key_issued_by: self.key_issued_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };

        // The CHECK constraint should make this unreachable; refuse to load
        // a row where the flag and key disagree rather than serve bad state.
        if !record.eligibility_consistent() {
            tracing::warn!(
                user_id = %record.user_id,
                "skipping download request row with inconsistent eligibility"
            );
            return None;
        }

        Some(record)
    }
}
