//! # intake-core
//!
//! The seams of the referral intake pipeline.
//!
//! This crate provides:
//! - The capability traits the pipeline calls out through (blob storage,
//!   OCR, and the classification, extraction and scoring capabilities)
//! - The trusted `ReferralStore` and `ActivityRecorder` traits
//! - `RetryPolicy`, `with_timeout` and `call_with_retry`, used for every
//!   external call
//!
//! ## Usage
//!
//! ```rust,ignore
//! use intake_core::{traits::{OcrProvider, ReferralStore}, retry::RetryPolicy};
//! ```

pub mod retry;
pub mod traits;

pub use retry::{call_with_retry, with_timeout, RetryPolicy};
