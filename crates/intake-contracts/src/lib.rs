//! # intake-contracts
//!
//! Shared types, job payloads, and error contracts for the referral intake
//! pipeline.
//!
//! All crates in the workspace import from here. No pipeline logic lives in
//! this crate, only data definitions, the small state-machine helpers on the
//! status enums, and error types.

pub mod activity;
pub mod criteria;
pub mod error;
pub mod ids;
pub mod jobs;
pub mod patient;
pub mod referral;
pub mod risk;
pub mod scoring;
