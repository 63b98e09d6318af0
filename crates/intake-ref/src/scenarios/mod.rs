//! End-to-end intake scenarios.
//!
//! Each scenario starts a real [`IntakeService`] over the in-memory store and
//! activity log, wires it to the reference capabilities, submits a fictional
//! referral packet and prints what the pipeline produced.

pub mod deal_breaker;
pub mod degraded_processing;
pub mod document_retry;
pub mod standard_intake;

use std::sync::Arc;

use intake_audit::InMemoryActivityLog;
use intake_contracts::{
    error::IntakeResult,
    ids::{FacilityId, ReferralId},
};
use intake_criteria::CriteriaSet;
use intake_pipeline::{config::RateLimitConfig, Capabilities, IntakeService, PipelineConfig};
use intake_store::InMemoryReferralStore;

use crate::mock_data::{MockDocument, SUNRISE_CRITERIA, SUNRISE_FACILITY};

/// A running pipeline plus direct handles on its state, for inspection.
pub struct Harness {
    pub service: IntakeService,
    pub store: InMemoryReferralStore,
    pub activity: InMemoryActivityLog,
    pub facility: FacilityId,
}

impl Harness {
    /// Start a pipeline with the Sunrise facility's criteria loaded.
    pub fn start(config: PipelineConfig, capabilities: Capabilities) -> IntakeResult<Self> {
        let store = InMemoryReferralStore::new();
        let activity = InMemoryActivityLog::new();
        let service = IntakeService::start(
            config,
            Arc::new(store.clone()),
            Arc::new(activity.clone()),
            capabilities,
        )?;

        let facility = FacilityId::new(SUNRISE_FACILITY);
        let criteria = CriteriaSet::from_toml_str(SUNRISE_CRITERIA)?;
        service.set_facility_criteria(&facility, criteria.active())?;

        Ok(Self {
            service,
            store,
            activity,
            facility,
        })
    }

    /// Create a referral and upload every document of the packet.
    pub async fn submit(&self, packet: &[MockDocument]) -> IntakeResult<ReferralId> {
        let referral = self.service.create_referral(self.facility.clone())?;
        for document in packet {
            self.service
                .upload_document(referral.id, document.filename, document.bytes(), document.content_type)
                .await?;
        }
        Ok(referral.id)
    }

    pub async fn shutdown(self) {
        self.service.shutdown().await;
    }
}

/// Defaults with millisecond backoffs so retries settle quickly.
pub fn fast_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.ocr.backoff_base_ms = 1;
    config.ocr.rate_limit = RateLimitConfig {
        max_jobs: 100,
        window_ms: 1_000,
    };
    config.classification.backoff_base_ms = 1;
    config.extraction.backoff_base_ms = 1;
    config.scoring.backoff_base_ms = 1;
    config.capabilities.timeout_ms = 2_000;
    config.capabilities.backoff_base_ms = 1;
    config
}

/// Print a short per-referral summary shared by every scenario.
pub(crate) fn print_outcome(harness: &Harness, referral_id: ReferralId) -> IntakeResult<()> {
    let referral = harness.service.referral(referral_id)?;
    println!("  Referral status:        {:?}", referral.status);
    println!("  AI processing status:   {:?}", referral.ai_processing_status);
    if let Some(error) = &referral.ai_processing_error {
        println!("  AI processing error:    {}", error);
    }

    if let Some(recommendation) = harness.service.recommendation(referral_id)? {
        println!("  Recommendation:         {}", recommendation.recommendation);
        println!(
            "  Scores:                 overall {} (fit {}, financial {}, operational {})",
            recommendation.overall_score,
            recommendation.clinical_fit_score,
            recommendation.financial_fit_score,
            recommendation.operational_fit_score
        );
        println!("  Confidence:             {:.3}", recommendation.confidence_score);
    }

    let flags = harness.service.latest_risk_flags(referral_id)?;
    println!("  Risk flags:             {}", flags.len());
    for flag in &flags {
        println!(
            "    [{}] {}{}",
            flag.finding.severity,
            flag.finding.title,
            if flag.finding.is_deal_breaker { " (deal-breaker)" } else { "" }
        );
    }

    let log = harness.activity.export(referral_id)?;
    println!(
        "  Activity chain:         {} ({} entries)",
        if harness.activity.verify_integrity(referral_id)? { "VERIFIED" } else { "FAILED" },
        log.entries.len()
    );
    Ok(())
}
