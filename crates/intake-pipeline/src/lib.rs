//! # intake-pipeline
//!
//! The stages of the referral intake pipeline and the coordinator that
//! drives documents through them.
//!
//! ```text
//! upload ─► OCR ─► classification ─┬─► extraction ─► scoring
//!                                  │   (once every document is classified)
//! ```
//!
//! This crate provides:
//! - [`ClassificationStage`], [`ExtractionStage`] and [`ScoringOrchestrator`],
//!   each of which degrades to a safe default instead of failing
//! - The coordinator: one priority queue and worker pool per stage, an OCR
//!   rate limiter, bounded retry with backoff, and dead letters
//! - [`IntakeService`], the request-facing facade
//! - [`PipelineConfig`], loaded from TOML
//!
//! ## Usage
//!
//! ```rust,ignore
//! let service = IntakeService::start(config, store, activity, capabilities)?;
//! let referral = service.create_referral(FacilityId::new("sunrise"))?;
//! service.upload_document(referral.id, "discharge.pdf", bytes, "application/pdf").await?;
//! service.wait_idle().await;
//! let recommendation = service.recommendation(referral.id)?;
//! ```

pub mod capabilities;
pub mod classification;
pub mod config;
pub mod coordinator;
pub mod extraction;
pub mod scoring;

pub use capabilities::Capabilities;
pub use classification::{Classification, ClassificationStage};
pub use config::PipelineConfig;
pub use coordinator::{FailedJob, IntakeService};
pub use extraction::{Extraction, ExtractionStage};
pub use scoring::{ScoringOrchestrator, ScoringOutcome, ScoringRequest};
