//! Scenario 3: Degraded processing
//!
//! Storage, OCR and classification work, but every AI model behind
//! extraction and scoring is down. No stage fails the referral: extraction
//! stores the empty record, each scoring agent falls back to its defaults,
//! and the gaps are surfaced as low-severity processing-error flags for a
//! human reviewer.

use intake_contracts::error::IntakeResult;

use crate::capabilities::models_unavailable;
use crate::mock_data::hip_fracture_referral;
use crate::scenarios::{fast_config, print_outcome, Harness};

pub async fn run_scenario() -> IntakeResult<()> {
    println!("=== Scenario 3: Degraded Processing ===");
    println!();
    println!("  Extraction model:  UNAVAILABLE");
    println!("  Scoring agents:    UNAVAILABLE (admissions, reimbursement, clinical, documentation)");
    println!();

    let harness = Harness::start(fast_config(), models_unavailable())?;
    let referral_id = harness.submit(&hip_fracture_referral()).await?;
    harness.service.wait_idle().await;

    if let Some(extracted) = harness.service.extracted_data(referral_id)? {
        println!(
            "  Extraction:             {} ({} source documents)",
            if extracted.degraded { "DEGRADED, empty record stored" } else { "OK" },
            extracted.source_document_ids.len()
        );
    }
    print_outcome(&harness, referral_id)?;
    println!();
    println!("  Scenario 3 complete.");
    println!();

    harness.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use intake_contracts::{
        referral::{AiProcessingStatus, ReferralStatus},
        risk::{RiskSeverity, ScoringAgent},
        scoring::Recommendation,
    };

    use super::*;

    #[tokio::test]
    async fn unavailable_models_degrade_without_failing_the_referral() {
        let harness = Harness::start(fast_config(), models_unavailable()).unwrap();
        let referral_id = harness.submit(&hip_fracture_referral()).await.unwrap();
        harness.service.wait_idle().await;

        let extracted = harness.service.extracted_data(referral_id).unwrap().unwrap();
        assert!(extracted.degraded);
        assert_eq!(extracted.source_document_ids.len(), 3);
        assert!(extracted.data.medications.is_empty());

        let referral = harness.service.referral(referral_id).unwrap();
        assert_eq!(referral.ai_processing_status, AiProcessingStatus::Completed);
        assert_eq!(referral.status, ReferralStatus::ReadyForDecision);
        assert!(referral.patient_first_name.is_none());

        let recommendation = harness.service.recommendation(referral_id).unwrap().unwrap();
        assert_eq!(recommendation.clinical_fit_score, 75);
        assert_eq!(recommendation.financial_fit_score, 50);
        assert_eq!(recommendation.operational_fit_score, 50);
        assert_eq!(recommendation.overall_score, 60);
        assert_eq!(recommendation.recommendation, Recommendation::AcceptWithConditions);

        let flags = harness.service.latest_risk_flags(referral_id).unwrap();
        let mut agents: Vec<ScoringAgent> = flags
            .iter()
            .filter(|f| f.finding.flag_type == "ai_processing_error")
            .filter_map(|f| f.finding.source_agent)
            .collect();
        agents.sort_by_key(|agent| agent.as_str());
        assert_eq!(
            agents,
            vec![
                ScoringAgent::Admissions,
                ScoringAgent::Clinical,
                ScoringAgent::Documentation,
                ScoringAgent::Reimbursement,
            ]
        );
        assert!(flags.iter().all(|f| f.finding.severity == RiskSeverity::Low));

        let degraded = harness
            .service
            .activity_log(referral_id)
            .unwrap()
            .into_iter()
            .filter(|record| record.action == "extraction_degraded")
            .count();
        assert_eq!(degraded, 1);
        assert!(harness.service.dead_letters().is_empty());

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn scenario_runs_to_completion() {
        run_scenario().await.unwrap();
    }
}
