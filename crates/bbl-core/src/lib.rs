#![deny(missing_docs)]

//! # bbl-core — Foundational Types for the Binary Baseline Platform
//!
//! This crate defines the domain primitives that every other crate in the
//! workspace depends on. It has no internal crate dependencies — only
//! `serde`, `thiserror`, `sha2`, and `rand_core` from the external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** A license key is a
//!    [`LicenseKey`], not a bare `String` — well-formedness is checked at
//!    the boundary via [`LicenseKey::parse`].
//!
//! 2. **Closed enums for closed sets.** [`SubscriptionTier`] admits exactly
//!    the three tiers the platform sells; parsing anything else is a
//!    structured [`ValidationError`] naming the offending field.
//!
//! 3. **[`ValidationError`] hierarchy.** Structured errors with `thiserror` —
//!    no `Box<dyn Error>`, no `.unwrap()` outside tests.

pub mod error;
pub mod key;
pub mod tier;

pub use error::{validate_email, ValidationError};
pub use key::LicenseKey;
pub use tier::SubscriptionTier;
