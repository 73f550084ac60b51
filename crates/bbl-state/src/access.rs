//! # Access Record State Machine
//!
//! Models one subscriber's standing in the download-gating workflow, from
//! the intake form through key issuance and revocation.
//!
//! ## States
//!
//! ```text
//! Pending ──issue──▶ Approved
//!    ▲                  │
//!    └─────revoke───────┘
//! ```
//!
//! Neither state is terminal. A revoked record returns to Pending and sits
//! in the review queue again; re-approval issues a fresh key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use bbl_core::{LicenseKey, SubscriptionTier};

// ─── Access Status ───────────────────────────────────────────────────

/// The review status of an access record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    /// Request received, awaiting operator review.
    Pending,
    /// Key issued, downloads permitted.
    Approved,
}

impl std::fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
        };
        f.write_str(s)
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors that can occur during access record transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// A key is already issued on this record.
    #[error("user {user_id} already holds a license key; revoke it before issuing another")]
    AlreadyEligible {
        /// The subscriber whose record refused the transition.
        user_id: Uuid,
    },
}

// ─── Revocation Outcome ──────────────────────────────────────────────

/// What a revocation call actually did.
///
/// Revocation is idempotent, so calling it on a record with no key is not
/// an error. The outcome tells the caller (and the audit log) whether this
/// call was the one that pulled the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// The record held a key and it was removed.
    Revoked,
    /// The record held no key; nothing changed.
    AlreadyInactive,
}

impl RevokeOutcome {
    /// Whether this call removed a key.
    pub fn revoked(&self) -> bool {
        matches!(self, Self::Revoked)
    }
}

// ─── Contact Info ────────────────────────────────────────────────────

/// Contact details captured on the intake form.
///
/// Validation (non-empty names, email shape) happens at the API boundary;
/// this layer treats the fields as already-vetted data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Email address, used as the support contact channel.
    pub email: String,
    /// Phone number, free-form.
    pub phone: String,
    /// Postal address, free-form.
    pub address: String,
}

// ─── Access Record ───────────────────────────────────────────────────

/// One subscriber's download-access standing.
///
/// The core invariant: `download_eligible` is `true` exactly when
/// `license_key` is `Some`. All transitions update both fields in the same
/// call, and `key_issued_at` / `key_issued_by` follow the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    /// The subscriber this record belongs to. One record per user.
    pub user_id: Uuid,
    /// Contact details from the latest intake submission.
    pub contact: ContactInfo,
    /// Subscription tier at the latest submission, shown in the review queue.
    pub tier: SubscriptionTier,
    /// Whether the download gate is open for this subscriber.
    pub download_eligible: bool,
    /// The issued key, if any.
    pub license_key: Option<LicenseKey>,
    /// When the current key was issued.
    pub key_issued_at: Option<DateTime<Utc>>,
    /// The operator who issued the current key.
    pub key_issued_by: Option<Uuid>,
    /// When the record was first created.
    pub created_at: DateTime<Utc>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

impl AccessRecord {
    /// Create a fresh pending record from an intake submission.
    pub fn new(
        user_id: Uuid,
        contact: ContactInfo,
        tier: SubscriptionTier,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            contact,
            tier,
            download_eligible: false,
            license_key: None,
            key_issued_at: None,
            key_issued_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Absorb a repeat intake submission.
    ///
    /// Contact details and tier are refreshed; eligibility and any issued
    /// key are untouched, so re-submitting the form can never open or close
    /// the gate.
    pub fn update_contact(
        &mut self,
        contact: ContactInfo,
        tier: SubscriptionTier,
        now: DateTime<Utc>,
    ) {
        self.contact = contact;
        self.tier = tier;
        self.updated_at = now;
        debug_assert!(self.eligibility_consistent());
    }

    /// Issue a key (Pending → Approved).
    ///
    /// Refused if the record already holds a key: an issued key may already
    /// be circulating, so the operator must revoke before re-issuing.
    pub fn issue(
        &mut self,
        key: LicenseKey,
        issued_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), AccessError> {
        if self.download_eligible {
            return Err(AccessError::AlreadyEligible {
                user_id: self.user_id,
            });
        }
        self.download_eligible = true;
        self.license_key = Some(key);
        self.key_issued_at = Some(now);
        self.key_issued_by = Some(issued_by);
        self.updated_at = now;
        debug_assert!(self.eligibility_consistent());
        Ok(())
    }

    /// Revoke the key (Approved → Pending), idempotently.
    ///
    /// Clears the key, the issuance stamp, and eligibility in one step, so
    /// a partially-revoked record cannot exist.
    pub fn revoke(&mut self, now: DateTime<Utc>) -> RevokeOutcome {
        if !self.download_eligible {
            debug_assert!(self.eligibility_consistent());
            return RevokeOutcome::AlreadyInactive;
        }
        self.download_eligible = false;
        self.license_key = None;
        self.key_issued_at = None;
        self.key_issued_by = None;
        self.updated_at = now;
        debug_assert!(self.eligibility_consistent());
        RevokeOutcome::Revoked
    }

    /// Whether the download gate is open for this subscriber.
    pub fn is_eligible(&self) -> bool {
        self.download_eligible
    }

    /// The review status derived from eligibility.
    pub fn status(&self) -> AccessStatus {
        if self.download_eligible {
            AccessStatus::Approved
        } else {
            AccessStatus::Pending
        }
    }

    /// Whether the eligibility flag and the key agree.
    ///
    /// Always true for records built through this module's transitions;
    /// exposed so the persistence layer can reject corrupt rows on load.
    pub fn eligibility_consistent(&self) -> bool {
        self.download_eligible == self.license_key.is_some()
            && self.license_key.is_some() == self.key_issued_at.is_some()
            && self.license_key.is_some() == self.key_issued_by.is_some()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(email: &str) -> ContactInfo {
        ContactInfo {
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            email: email.to_string(),
            phone: "+1 555 0100".to_string(),
            address: "1 Market St".to_string(),
        }
    }

    fn make_pending() -> AccessRecord {
        AccessRecord::new(
            Uuid::new_v4(),
            contact("jane@example.com"),
            SubscriptionTier::ProTrader,
            Utc::now(),
        )
    }

    fn make_approved() -> AccessRecord {
        let mut rec = make_pending();
        rec.issue(LicenseKey::generate(), Uuid::new_v4(), Utc::now())
            .unwrap();
        rec
    }

    // ── Happy-path lifecycle tests ───────────────────────────────────

    #[test]
    fn test_new_record_is_pending() {
        let rec = make_pending();
        assert_eq!(rec.status(), AccessStatus::Pending);
        assert!(!rec.is_eligible());
        assert!(rec.license_key.is_none());
        assert!(rec.key_issued_at.is_none());
        assert!(rec.key_issued_by.is_none());
        assert!(rec.eligibility_consistent());
    }

    #[test]
    fn test_issue_opens_the_gate() {
        let mut rec = make_pending();
        let admin = Uuid::new_v4();
        let now = Utc::now();
        rec.issue(LicenseKey::generate(), admin, now).unwrap();

        assert_eq!(rec.status(), AccessStatus::Approved);
        assert!(rec.is_eligible());
        assert!(rec.license_key.is_some());
        assert_eq!(rec.key_issued_at, Some(now));
        assert_eq!(rec.key_issued_by, Some(admin));
        assert_eq!(rec.updated_at, now);
        assert!(rec.eligibility_consistent());
    }

    #[test]
    fn test_revoke_clears_everything_together() {
        let mut rec = make_approved();
        let outcome = rec.revoke(Utc::now());

        assert_eq!(outcome, RevokeOutcome::Revoked);
        assert!(outcome.revoked());
        assert_eq!(rec.status(), AccessStatus::Pending);
        assert!(!rec.is_eligible());
        assert!(rec.license_key.is_none());
        assert!(rec.key_issued_at.is_none());
        assert!(rec.key_issued_by.is_none());
        assert!(rec.eligibility_consistent());
    }

    #[test]
    fn test_revoke_then_reissue() {
        let mut rec = make_approved();
        let first_key = rec.license_key.clone().unwrap();
        rec.revoke(Utc::now());
        rec.issue(LicenseKey::generate(), Uuid::new_v4(), Utc::now())
            .unwrap();

        assert!(rec.is_eligible());
        assert_ne!(rec.license_key, Some(first_key));
    }

    // ── Refused transitions ──────────────────────────────────────────

    #[test]
    fn test_cannot_issue_onto_approved_record() {
        let mut rec = make_approved();
        let original_key = rec.license_key.clone();
        let original_issued_at = rec.key_issued_at;

        let result = rec.issue(LicenseKey::generate(), Uuid::new_v4(), Utc::now());
        assert_eq!(
            result,
            Err(AccessError::AlreadyEligible {
                user_id: rec.user_id
            })
        );
        // Refusal leaves the record untouched.
        assert_eq!(rec.license_key, original_key);
        assert_eq!(rec.key_issued_at, original_issued_at);
        assert!(rec.eligibility_consistent());
    }

    #[test]
    fn test_revoke_is_idempotent() {
        let mut rec = make_approved();
        assert_eq!(rec.revoke(Utc::now()), RevokeOutcome::Revoked);
        assert_eq!(rec.revoke(Utc::now()), RevokeOutcome::AlreadyInactive);
        assert!(rec.eligibility_consistent());
    }

    #[test]
    fn test_revoke_on_pending_record_is_a_noop() {
        let mut rec = make_pending();
        let before = rec.updated_at;
        let outcome = rec.revoke(Utc::now());

        assert_eq!(outcome, RevokeOutcome::AlreadyInactive);
        assert!(!outcome.revoked());
        assert_eq!(rec.updated_at, before);
    }

    // ── Contact updates ──────────────────────────────────────────────

    #[test]
    fn test_update_contact_refreshes_details_only() {
        let mut rec = make_pending();
        rec.update_contact(
            contact("jane.new@example.com"),
            SubscriptionTier::EliteTrader,
            Utc::now(),
        );

        assert_eq!(rec.contact.email, "jane.new@example.com");
        assert_eq!(rec.tier, SubscriptionTier::EliteTrader);
        assert_eq!(rec.status(), AccessStatus::Pending);
    }

    #[test]
    fn test_update_contact_never_touches_eligibility() {
        let mut rec = make_approved();
        let key = rec.license_key.clone();
        rec.update_contact(
            contact("moved@example.com"),
            SubscriptionTier::NewTrader,
            Utc::now(),
        );

        assert!(rec.is_eligible());
        assert_eq!(rec.license_key, key);
        assert!(rec.eligibility_consistent());
    }

    // ── Consistency checks ───────────────────────────────────────────

    #[test]
    fn test_eligibility_consistent_detects_corrupt_rows() {
        let mut rec = make_approved();
        rec.license_key = None;
        assert!(!rec.eligibility_consistent());

        let mut rec = make_pending();
        rec.download_eligible = true;
        assert!(!rec.eligibility_consistent());

        let mut rec = make_approved();
        rec.key_issued_by = None;
        assert!(!rec.eligibility_consistent());
    }

    // ── Display tests ────────────────────────────────────────────────

    #[test]
    fn test_access_status_display() {
        assert_eq!(AccessStatus::Pending.to_string(), "PENDING");
        assert_eq!(AccessStatus::Approved.to_string(), "APPROVED");
    }

    // ── Serialization tests ──────────────────────────────────────────

    #[test]
    fn test_record_serialization() {
        let rec = make_approved();
        let json = serde_json::to_string(&rec).unwrap();
        let parsed: AccessRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rec);

        let pending = make_pending();
        let json = serde_json::to_string(&pending).unwrap();
        assert!(json.contains("\"license_key\":null"));
        assert!(json.contains("\"download_eligible\":false"));
    }
}
