//! # intake-verify
//!
//! Verification of raw capability output before the pipeline trusts it.
//!
//! This crate provides [`engine::SchemaVerifier`], which checks a JSON
//! payload in two phases:
//!
//! 1. **Structural**: JSON Schema validation via the `jsonschema` crate.
//! 2. **Semantic**: domain rules (`RequiredField`, `AllowedValues`,
//!    `NumberRange`, `ForbiddenPattern`, `Custom`) evaluated against the
//!    payload.
//!
//! [`outputs`] holds the schema for every capability the pipeline calls and
//! [`outputs::capability_verifier`] builds a verifier with the custom rules
//! those schemas reference.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use intake_verify::outputs;
//!
//! let verifier = outputs::capability_verifier();
//! let assessment: ClinicalAssessment =
//!     verifier.decode("clinical", raw, &outputs::clinical())?;
//! ```

pub mod engine;
pub mod outputs;
pub mod schema;

pub use engine::{CustomVerifierFn, SchemaVerifier};
pub use schema::{OutputSchema, VerificationFailure, VerificationReport, VerificationRule, VerificationRuleType};
