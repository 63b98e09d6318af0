//! # intake-ref
//!
//! Reference runtime for the referral intake pipeline.
//!
//! Wires the real pipeline (store, activity log, criteria engine, stages and
//! coordinator) to deterministic in-memory capabilities and runs four
//! end-to-end scenarios against a fictional skilled-nursing facility:
//!
//! 1. **Standard Intake**: a three-document packet is read, classified,
//!    extracted once and scored to a strong accept.
//! 2. **Facility Deal-Breaker**: a ventilator-dependent patient is declined
//!    by a facility rule despite good agent scores.
//! 3. **Degraded Processing**: with every AI model down, the referral still
//!    completes on default values and is flagged for manual review.
//! 4. **Document Retry**: an OCR outage dead-letters a document; a manual
//!    retry recovers it.
//!
//! All data is hardcoded and fictional. No external API calls are made.

pub mod capabilities;
pub mod mock_data;
pub mod scenarios;
