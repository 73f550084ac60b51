#![deny(missing_docs)]

//! # bbl-state — Download Access Lifecycle
//!
//! Implements the state machine behind the Binary Baseline download gate.
//! Each subscriber has at most one [`AccessRecord`], keyed by user id, that
//! moves between two states:
//!
//! ```text
//! Pending ──issue──▶ Approved
//!    ▲                  │
//!    └─────revoke───────┘
//! ```
//!
//! ## Core Invariant
//!
//! A record is download-eligible exactly when it holds a license key. The
//! two facts are stored separately (the flag drives the gate, the key is
//! what support hands to the subscriber) but every transition updates both
//! together, so they can never disagree.
//!
//! ## Design
//!
//! Transitions are methods on [`AccessRecord`] returning structured errors.
//! Issuing a key onto an already-approved record is a refused transition,
//! not a silent overwrite: a key may be circulating, so the operator must
//! revoke explicitly before re-issuing. Revocation is idempotent and
//! reports whether it changed anything via [`RevokeOutcome`].

pub mod access;

pub use access::{AccessError, AccessRecord, AccessStatus, ContactInfo, RevokeOutcome};
