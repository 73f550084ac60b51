//! # Validation Errors
//!
//! Structured validation errors for domain primitives, built with
//! `thiserror`. Each variant names the field it concerns so the API layer
//! can surface field-level errors without string surgery.

use thiserror::Error;

/// Validation failure for a domain primitive or request field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was empty or missing.
    #[error("{field} must not be empty")]
    MissingField {
        /// The offending field name, as it appears in the JSON surface.
        field: &'static str,
    },

    /// A field exceeded its maximum length.
    #[error("{field} must not exceed {max} characters")]
    TooLong {
        /// The offending field name.
        field: &'static str,
        /// The maximum permitted length.
        max: usize,
    },

    /// The email field does not look like an address.
    #[error("email is not a valid address: {0:?}")]
    InvalidEmail(String),

    /// The subscription tier is not one of the enumerated values.
    #[error(
        "subscription_tier must be one of new_trader, pro_trader, elite_trader; got {0:?}"
    )]
    UnknownTier(String),

    /// A license key string failed format or checksum validation.
    #[error("license key is malformed: {0}")]
    MalformedKey(String),
}

/// Validate an email address for the intake surface.
///
/// This is a shape check, not RFC 5322 conformance: exactly one `@` with a
/// non-empty local part and a domain containing a dot. Deliverability is
/// not this layer's concern.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::MissingField { field: "email" });
    }
    if email.len() > 255 {
        return Err(ValidationError::TooLong {
            field: "email",
            max: 255,
        });
    }
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next().unwrap_or("");
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || domain.contains('@') {
        return Err(ValidationError::InvalidEmail(email.to_string()));
    }
    Ok(())
}
