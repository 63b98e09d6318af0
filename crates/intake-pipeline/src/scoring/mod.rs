//! Scoring Orchestrator: four independent agents and their deterministic
//! aggregation into one recommendation.

pub mod agents;
pub mod aggregate;
pub mod orchestrator;
pub mod rationale;

pub use orchestrator::{ScoringOrchestrator, ScoringOutcome, ScoringRequest};
