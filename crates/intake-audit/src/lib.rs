//! # intake-audit
//!
//! Append-only, SHA-256 hash-chained processing activity log.
//!
//! ## Overview
//!
//! Every stage outcome the pipeline records is wrapped in an `ActivityEntry`
//! that links to the previous entry of the same referral via its SHA-256
//! hash. Tampering with any entry breaks the chain and is detected by
//! `verify_chain`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use intake_audit::InMemoryActivityLog;
//! use intake_core::traits::ActivityRecorder;
//!
//! let log = InMemoryActivityLog::new();
//! log.record(&activity)?;
//! assert!(log.verify_integrity(referral_id)?);
//! ```

pub mod chain;
pub mod entry;
pub mod memory;

pub use chain::{hash_entry, verify_chain};
pub use entry::{ActivityEntry, ActivityLog};
pub use memory::InMemoryActivityLog;

// ── Tests ─────────────────────────────────────────────────────────────────────
