//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware with role-based access control.
//!
//! ## Token Format
//!
//! **Phase 1** (current): Bearer tokens encode role and user identity:
//!
//! ```text
//! Bearer {role}:{user_id}:{secret}   — new format
//! Bearer {secret}                    — legacy format (treated as admin)
//! ```
//!
//! **Phase 2** (future): JWT claims replace the token format. The
//! `CallerIdentity` extractor stays the same — only parsing changes.
//!
//! ## CallerIdentity
//!
//! Every authenticated request gets a [`CallerIdentity`] injected into the
//! request extensions. Handlers extract it via the `FromRequestParts` impl.
//! The user binding is what ties intake submissions and download attempts
//! to a specific access record.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── Role ────────────────────────────────────────────────────────────────────

/// Roles on the platform, ordered by privilege level.
///
/// The `Ord` derivation respects variant declaration order:
/// `Subscriber < Admin`. This enables `>=` comparison for role-based
/// access checks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Can submit a download request and fetch the artifact once approved.
    Subscriber,
    /// Full access: review queue, key issuance, revocation.
    Admin,
}

impl Role {
    /// Return the string representation of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscriber => "subscriber",
            Self::Admin => "admin",
        }
    }
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller, extracted from the auth context
/// and available to all route handlers via Axum's `FromRequestParts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// The caller's role in the system.
    pub role: Role,
    /// The caller's user account id. Required for subscriber operations
    /// (intake, download); admins acting through a legacy unbound token
    /// carry `None`.
    pub user_id: Option<Uuid>,
}

impl CallerIdentity {
    /// Check if the caller has at least the given minimum role.
    ///
    /// Since `Role` derives `Ord` with `Subscriber < Admin`, this is a
    /// single comparison.
    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }
}

/// Axum `FromRequestParts` implementation for `CallerIdentity`.
///
/// Extracts the identity that the auth middleware injected into extensions.
/// Returns 401 if no identity is present (middleware didn't run or failed).
#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller has at least the required role.
/// Returns 403 Forbidden if the caller's role is insufficient.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

/// Return the caller's user binding, or 403 if the token carries none.
///
/// Intake and download operations act on the caller's own access record,
/// so a token without a user binding cannot perform them.
pub fn require_user_binding(caller: &CallerIdentity) -> Result<Uuid, AppError> {
    caller.user_id.ok_or_else(|| {
        AppError::Forbidden(
            "bearer token carries no user binding; use the {role}:{user_id}:{secret} format"
                .to_string(),
        )
    })
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value to prevent credential leakage in logs.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer tokens.
///
/// Prevents timing side-channels that could reveal token length or prefix.
/// When lengths differ, performs a dummy comparison to avoid leaking length
/// information through timing variance.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        // Dummy comparison to keep timing constant regardless of length match.
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse the bearer token in format `{role}:{user_id}:{secret}` or `{secret}` (legacy).
///
/// Legacy tokens (without role prefix) are treated as `Admin` for backward
/// compatibility with existing deployments; they carry no user binding.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();

    match parts.len() {
        // Legacy format: just the secret. Treated as admin for backward compat.
        1 => {
            if constant_time_token_eq(provided, expected_secret) {
                Ok(CallerIdentity {
                    role: Role::Admin,
                    user_id: None,
                })
            } else {
                Err("invalid bearer token".into())
            }
        }
        // New format: role:user_id:secret (user_id may be empty)
        3 => {
            let role_str = parts[0];
            let user_str = parts[1];
            let secret = parts[2];

            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid bearer token".into());
            }

            let role = match role_str {
                "admin" => Role::Admin,
                "subscriber" => Role::Subscriber,
                other => return Err(format!("unknown role: {other}")),
            };

            let user_id = if user_str.is_empty() {
                None
            } else {
                Some(
                    user_str
                        .parse::<Uuid>()
                        .map_err(|e| format!("invalid user_id: {e}"))?,
                )
            };

            Ok(CallerIdentity { role, user_id })
        }
        _ => Err("invalid token format — expected {role}:{user_id}:{secret} or {secret}".into()),
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Extract and validate the Bearer token from the Authorization header.
///
/// Parses the token to extract `CallerIdentity` (role + user binding) and
/// injects it into request extensions for downstream handlers.
///
/// When `AuthConfig.token` is `None`, all requests are allowed with an
/// unbound `Admin` identity (auth disabled / development mode).
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected_token = request.extensions().get::<AuthConfig>().cloned();

    match expected_token {
        Some(AuthConfig {
            token: Some(ref expected),
        }) => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            match auth_header {
                Some(header_value) if header_value.starts_with("Bearer ") => {
                    let provided = &header_value[7..];
                    match parse_bearer_token(provided, expected) {
                        Ok(identity) => {
                            request.extensions_mut().insert(identity);
                            next.run(request).await
                        }
                        Err(msg) => {
                            tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                            unauthorized_response(&msg)
                        }
                    }
                }
                Some(_) => {
                    tracing::warn!("authentication failed: non-Bearer authorization scheme");
                    unauthorized_response("authorization header must use Bearer scheme")
                }
                None => {
                    tracing::warn!("authentication failed: missing authorization header");
                    unauthorized_response("missing authorization header")
                }
            }
        }
        _ => {
            // Auth disabled — inject an unbound admin identity for full access.
            request.extensions_mut().insert(CallerIdentity {
                role: Role::Admin,
                user_id: None,
            });
            next.run(request).await
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
