//! Scenario 1: Standard intake
//!
//! A three-document packet (face sheet, discharge summary, medication list)
//! for a post-hip-fracture rehab candidate goes through every stage with
//! healthy capabilities.
//!
//!   1. Each upload enqueues OCR; the keyword classifier types each document
//!   2. Once all three are classified, one extraction covers all of them
//!   3. Insulin Lispro is flagged high-cost even though the extractor did not
//!   4. The four agents score the referral: fit 88, financial 95, operational 90
//!   5. A reviewer resolves a flag, then processing is re-triggered; the
//!      resolution survives and the new attempt gets its own flag set

use intake_contracts::error::IntakeResult;

use crate::capabilities::{reference_capabilities, CannedAgents};
use crate::mock_data::{hip_fracture_record, hip_fracture_referral};
use crate::scenarios::{fast_config, print_outcome, Harness};

pub async fn run_scenario() -> IntakeResult<()> {
    println!("=== Scenario 1: Standard Intake ===");
    println!();

    let harness = Harness::start(
        fast_config(),
        reference_capabilities(hip_fracture_record(), CannedAgents::hip_fracture()),
    )?;

    let packet = hip_fracture_referral();
    println!("  Facility:  {}", harness.facility);
    println!("  Packet:    {} documents", packet.len());
    for document in &packet {
        println!("    - {}", document.filename);
    }
    println!();

    let referral_id = harness.submit(&packet).await?;
    harness.service.wait_idle().await;

    // ── Documents and extraction ──────────────────────────────────────────────

    for document in harness.service.documents(referral_id)? {
        println!(
            "  {:<24} OCR {:?}, type {}",
            document.original_filename,
            document.ocr_status,
            document.document_type.map_or("-", |t| t.as_str())
        );
    }

    if let Some(extracted) = harness.service.extracted_data(referral_id)? {
        let high_cost: Vec<&str> = extracted
            .data
            .medications
            .iter()
            .filter(|m| m.is_high_cost)
            .map(|m| m.name.as_str())
            .collect();
        println!(
            "  Extraction:             {} source documents, model {}",
            extracted.source_document_ids.len(),
            extracted.model_used.as_deref().unwrap_or("-")
        );
        println!("  High-cost medications:  {}", high_cost.join(", "));
    }

    let referral = harness.service.referral(referral_id)?;
    println!(
        "  Patient:                {} {}",
        referral.patient_first_name.as_deref().unwrap_or("?"),
        referral.patient_last_name.as_deref().unwrap_or("?")
    );
    print_outcome(&harness, referral_id)?;
    println!();

    // ── Review and re-trigger ─────────────────────────────────────────────────

    if let Some(flag) = harness.service.latest_risk_flags(referral_id)?.first() {
        harness
            .service
            .resolve_risk_flag(flag.id, "admissions.coordinator", Some("Bed alarm ordered"))?;
        println!("  Resolved flag:          {}", flag.finding.title);
    }

    harness.service.trigger_processing(referral_id)?;
    harness.service.wait_idle().await;

    let all_flags = harness.service.risk_flags(referral_id)?;
    let resolved = all_flags.iter().filter(|f| f.is_resolved()).count();
    println!(
        "  After re-trigger:       {} flags total, {} resolved, {} in latest attempt",
        all_flags.len(),
        resolved,
        harness.service.latest_risk_flags(referral_id)?.len()
    );
    println!();
    println!("  Scenario 1 complete.");
    println!();

    harness.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::NaiveDate;

    use intake_contracts::{
        ids::ReferralId,
        jobs::Stage,
        referral::{AiProcessingStatus, DocumentType, OcrStatus, ReferralStatus},
        scoring::Recommendation,
    };

    use crate::capabilities::CannedExtractor;

    use super::*;

    async fn processed() -> (Harness, ReferralId) {
        let harness = Harness::start(
            fast_config(),
            reference_capabilities(hip_fracture_record(), CannedAgents::hip_fracture()),
        )
        .unwrap();
        let referral_id = harness.submit(&hip_fracture_referral()).await.unwrap();
        harness.service.wait_idle().await;
        (harness, referral_id)
    }

    fn count_actions(harness: &Harness, referral_id: ReferralId, action: &str) -> usize {
        harness
            .service
            .activity_log(referral_id)
            .unwrap()
            .iter()
            .filter(|record| record.action == action)
            .count()
    }

    // ── Documents ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn every_document_is_read_and_typed() {
        let (harness, referral_id) = processed().await;

        let documents = harness.service.documents(referral_id).unwrap();
        let types: Vec<Option<DocumentType>> = documents.iter().map(|d| d.document_type).collect();
        assert!(documents.iter().all(|d| d.ocr_status == OcrStatus::Completed));
        assert_eq!(
            types,
            vec![
                Some(DocumentType::FaceSheet),
                Some(DocumentType::DischargeSummary),
                Some(DocumentType::MedicationList),
            ]
        );
        assert_eq!(count_actions(&harness, referral_id, "ocr_completed"), 3);

        harness.shutdown().await;
    }

    // ── Extraction ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn one_extraction_covers_the_whole_packet() {
        let (harness, referral_id) = processed().await;

        let extracted = harness.service.extracted_data(referral_id).unwrap().unwrap();
        assert_eq!(extracted.source_document_ids.len(), 3);
        assert!(!extracted.degraded);
        assert_eq!(count_actions(&harness, referral_id, "patient_data_extracted"), 1);

        let lispro = extracted
            .data
            .medications
            .iter()
            .find(|m| m.name == "Insulin Lispro")
            .unwrap();
        assert!(lispro.is_high_cost);
        let apixaban = extracted.data.medications.iter().find(|m| m.name == "Apixaban").unwrap();
        assert!(!apixaban.is_high_cost);

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn patient_identity_is_copied_to_the_referral() {
        let (harness, referral_id) = processed().await;

        let referral = harness.service.referral(referral_id).unwrap();
        assert_eq!(referral.patient_first_name.as_deref(), Some("Margaret"));
        assert_eq!(referral.patient_last_name.as_deref(), Some("Ellison"));
        assert_eq!(referral.patient_dob, NaiveDate::from_ymd_opt(1942, 3, 14));
        assert_eq!(referral.patient_gender.as_deref(), Some("female"));

        harness.shutdown().await;
    }

    // ── Scoring ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn healthy_agents_produce_a_strong_accept() {
        let (harness, referral_id) = processed().await;

        let referral = harness.service.referral(referral_id).unwrap();
        assert_eq!(referral.ai_processing_status, AiProcessingStatus::Completed);
        assert_eq!(referral.status, ReferralStatus::ReadyForDecision);

        let recommendation = harness.service.recommendation(referral_id).unwrap().unwrap();
        assert_eq!(recommendation.clinical_fit_score, 88);
        assert_eq!(recommendation.financial_fit_score, 95);
        assert_eq!(recommendation.operational_fit_score, 90);
        assert_eq!(recommendation.overall_score, 91);
        assert_eq!(recommendation.recommendation, Recommendation::StrongAccept);
        assert!((recommendation.confidence_score - 0.919).abs() < 1e-9);
        assert_eq!(recommendation.missing_info, vec!["Recent lab results".to_string()]);
        assert_eq!(recommendation.attempt_id, referral.current_attempt.unwrap());

        let flags = harness.service.latest_risk_flags(referral_id).unwrap();
        assert!(flags.iter().any(|f| f.finding.flag_type == "high_fall_risk"));
        assert!(flags.iter().all(|f| !f.finding.is_deal_breaker));

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn activity_chain_covers_every_stage_and_verifies() {
        let (harness, referral_id) = processed().await;

        let stages: Vec<Stage> = harness
            .service
            .activity_log(referral_id)
            .unwrap()
            .iter()
            .map(|record| record.stage)
            .collect();
        for stage in [Stage::Upload, Stage::Ocr, Stage::Classification, Stage::Extraction, Stage::Scoring] {
            assert!(stages.contains(&stage), "no activity for {stage:?}");
        }
        assert!(harness.activity.verify_integrity(referral_id).unwrap());

        harness.shutdown().await;
    }

    // ── Re-trigger ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn retrigger_keeps_resolutions_and_appends_a_fresh_flag_set() {
        let (harness, referral_id) = processed().await;

        let first = harness.service.latest_risk_flags(referral_id).unwrap();
        assert!(!first.is_empty());
        let resolved_id = first[0].id;
        harness
            .service
            .resolve_risk_flag(resolved_id, "coordinator", Some("reviewed"))
            .unwrap();

        harness.service.trigger_processing(referral_id).unwrap();
        harness.service.wait_idle().await;

        let latest = harness.service.latest_risk_flags(referral_id).unwrap();
        assert_eq!(latest.len(), first.len());
        assert!(latest.iter().all(|f| f.id != resolved_id && !f.is_resolved()));

        let all = harness.service.risk_flags(referral_id).unwrap();
        assert_eq!(all.len(), first.len() * 2);
        let kept = all.iter().find(|f| f.id == resolved_id).unwrap();
        assert_eq!(kept.resolution.as_ref().unwrap().resolved_by, "coordinator");

        assert_eq!(count_actions(&harness, referral_id, "patient_data_extracted"), 2);
        assert_eq!(
            harness.service.referral(referral_id).unwrap().ai_processing_status,
            AiProcessingStatus::Completed
        );

        harness.shutdown().await;
    }

    // ── Late upload ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn document_uploaded_during_extraction_is_merged() {
        let extractor = Arc::new(CannedExtractor::with_delay(hip_fracture_record(), Duration::from_millis(50)));
        let mut capabilities = reference_capabilities(hip_fracture_record(), CannedAgents::hip_fracture());
        capabilities.extractor = extractor.clone();
        let harness = Harness::start(fast_config(), capabilities).unwrap();

        let mut packet = hip_fracture_referral();
        let late = packet.pop().unwrap();
        let referral_id = harness.submit(&packet).await.unwrap();

        for _ in 0..500 {
            if !extractor.document_counts().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(extractor.document_counts(), vec![2], "first extraction under way");

        harness
            .service
            .upload_document(referral_id, late.filename, late.bytes(), late.content_type)
            .await
            .unwrap();
        harness.service.wait_idle().await;

        assert_eq!(extractor.document_counts().last(), Some(&3));
        let extracted = harness.service.extracted_data(referral_id).unwrap().unwrap();
        assert_eq!(extracted.source_document_ids.len(), 3);

        let referral = harness.service.referral(referral_id).unwrap();
        assert_eq!(referral.ai_processing_status, AiProcessingStatus::Completed);
        assert_eq!(referral.status, ReferralStatus::ReadyForDecision);
        let recommendation = harness.service.recommendation(referral_id).unwrap().unwrap();
        assert_eq!(Some(recommendation.attempt_id), referral.current_attempt);

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn download_url_points_at_the_stored_object() {
        let (harness, referral_id) = processed().await;

        let document = harness.service.documents(referral_id).unwrap().remove(0);
        let url = harness.service.document_download_url(document.id).await.unwrap();
        assert!(url.contains(&document.locator.key));
        assert!(url.contains("?expires="));

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn scenario_runs_to_completion() {
        run_scenario().await.unwrap();
    }
}
