//! # API Route Modules
//!
//! Route modules for the download-gate API surface:
//!
//! - `intake` — subscriber-facing download request submission
//!   (`/v1/download-requests`).
//! - `admin` — operator console: review queue, license key issuance,
//!   revocation (`/v1/admin/*`).
//! - `download` — the gated artifact endpoint (`/v1/download/latest`),
//!   eligibility re-checked server-side on every call.

pub mod admin;
pub mod download;
pub mod intake;
