//! # intake-store
//!
//! In-memory `ReferralStore` for the referral intake pipeline.
//!
//! The pipeline tolerates at-least-once job delivery because the store turns
//! every racy write into one of three idempotent shapes:
//!
//! - **Upserts** for the extracted record and the recommendation: the latest
//!   write wins and replaces the whole value.
//! - **Guarded appends** for risk flags: one batch per processing attempt.
//! - **Atomic claims** for extraction: at most one claim per document-set
//!   revision, and only once every document is OCR-complete and classified.

pub mod memory;

pub use memory::InMemoryReferralStore;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use intake_contracts::{
        criteria::FacilityCriteria,
        error::IntakeError,
        ids::{AttemptId, DocumentId, FacilityId, ReferralId},
        patient::{ExtractedPatientData, ExtractedRecord},
        referral::{
            AiProcessingStatus, BlobLocator, Document, DocumentType, OcrStatus, PatientIdentity,
            Referral, ReferralStatus,
        },
        risk::{RiskFinding, RiskFlag, RiskSeverity},
    };
    use intake_core::traits::ReferralStore;

    use super::InMemoryReferralStore;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn store_with_referral() -> (InMemoryReferralStore, ReferralId) {
        let store = InMemoryReferralStore::new();
        let referral = Referral::new(FacilityId::new("facility-1"));
        let id = referral.id;
        store.create_referral(referral).unwrap();
        (store, id)
    }

    fn add_document(store: &InMemoryReferralStore, referral_id: ReferralId) -> DocumentId {
        let id = DocumentId::new();
        let locator = BlobLocator {
            bucket: "test".to_string(),
            key: format!("referrals/{referral_id}/documents/{id}.pdf"),
        };
        store
            .insert_document(Document::new_pending(id, referral_id, "doc.pdf", "application/pdf", 10, locator))
            .unwrap();
        id
    }

    fn finish_document(store: &InMemoryReferralStore, id: DocumentId, document_type: DocumentType) {
        store.complete_ocr(id, "text".to_string(), 0.95).unwrap();
        assert!(store.set_classification(id, document_type, 0.9).unwrap());
    }

    fn finding(title: &str) -> RiskFinding {
        RiskFinding {
            category: "clinical".to_string(),
            flag_type: "warning".to_string(),
            severity: RiskSeverity::Medium,
            is_deal_breaker: false,
            title: title.to_string(),
            description: String::new(),
            recommendation: None,
            source_agent: None,
        }
    }

    fn flags_for(referral_id: ReferralId, attempt_id: AttemptId, titles: &[&str]) -> Vec<RiskFlag> {
        titles
            .iter()
            .map(|t| RiskFlag::from_finding(referral_id, attempt_id, finding(t)))
            .collect()
    }

    fn criterion(id: &str, priority: i32, active: bool) -> FacilityCriteria {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": id,
            "category": "clinical",
            "rule": { "field": "careRequirements.requiresDialysis", "operator": "equals", "value": true },
            "priority": priority,
            "is_active": active,
        }))
        .unwrap()
    }

    // ── Referral status ───────────────────────────────────────────────────────

    #[test]
    fn begin_attempt_resets_status_and_error() {
        let (store, id) = store_with_referral();
        let first = store.begin_attempt(id).unwrap();
        assert!(store.advance_ai_status(id, AiProcessingStatus::Processing).unwrap());
        assert!(store
            .fail_referral(id, AiProcessingStatus::ExtractionFailed, "boom", None)
            .unwrap());

        let second = store.begin_attempt(id).unwrap();
        let referral = store.referral(id).unwrap();
        assert_ne!(first, second);
        assert_eq!(referral.current_attempt, Some(second));
        assert_eq!(referral.ai_processing_status, AiProcessingStatus::Queued);
        assert_eq!(referral.status, ReferralStatus::Processing);
        assert!(referral.ai_processing_error.is_none());
    }

    #[test]
    fn ai_status_never_moves_backwards() {
        let (store, id) = store_with_referral();
        store.begin_attempt(id).unwrap();
        assert!(store.advance_ai_status(id, AiProcessingStatus::Extracted).unwrap());
        assert!(!store.advance_ai_status(id, AiProcessingStatus::Processing).unwrap());
        assert!(store.advance_ai_status(id, AiProcessingStatus::Completed).unwrap());
        assert!(
            !store
                .fail_referral(id, AiProcessingStatus::Failed, "late", Some(ReferralStatus::PendingReview))
                .unwrap(),
            "a completed attempt cannot be failed"
        );

        let referral = store.referral(id).unwrap();
        assert_eq!(referral.ai_processing_status, AiProcessingStatus::Completed);
        assert!(referral.ai_processing_completed_at.is_some());
        assert_eq!(referral.status, ReferralStatus::Processing);
    }

    #[test]
    fn fail_referral_sets_error_and_lifecycle() {
        let (store, id) = store_with_referral();
        store.begin_attempt(id).unwrap();
        assert!(store
            .fail_referral(id, AiProcessingStatus::Failed, "scoring failed", Some(ReferralStatus::PendingReview))
            .unwrap());

        let referral = store.referral(id).unwrap();
        assert_eq!(referral.ai_processing_status, AiProcessingStatus::Failed);
        assert_eq!(referral.ai_processing_error.as_deref(), Some("scoring failed"));
        assert_eq!(referral.status, ReferralStatus::PendingReview);
    }

    #[test]
    fn unknown_referral_is_not_found() {
        let store = InMemoryReferralStore::new();
        let err = store.referral(ReferralId::new()).unwrap_err();
        assert!(matches!(err, IntakeError::ReferralNotFound { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn patient_identity_is_copied_onto_referral() {
        let (store, id) = store_with_referral();
        let identity = PatientIdentity {
            first_name: "Margaret".to_string(),
            last_name: "Thompson".to_string(),
            dob: None,
            gender: Some("female".to_string()),
        };
        store.update_patient_identity(id, &identity).unwrap();

        let referral = store.referral(id).unwrap();
        assert_eq!(referral.patient_first_name.as_deref(), Some("Margaret"));
        assert_eq!(referral.patient_gender.as_deref(), Some("female"));
    }

    // ── Documents ─────────────────────────────────────────────────────────────

    #[test]
    fn documents_keep_upload_order() {
        let (store, id) = store_with_referral();
        let a = add_document(&store, id);
        let b = add_document(&store, id);
        let ids: Vec<DocumentId> = store.documents(id).unwrap().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn classification_is_written_once() {
        let (store, id) = store_with_referral();
        let doc = add_document(&store, id);
        assert!(store.set_classification(doc, DocumentType::Labs, 0.9).unwrap());
        assert!(!store.set_classification(doc, DocumentType::Other, 0.1).unwrap());
        assert_eq!(store.document(doc).unwrap().document_type, Some(DocumentType::Labs));
    }

    #[test]
    fn reset_document_clears_results() {
        let (store, id) = store_with_referral();
        let doc = add_document(&store, id);
        finish_document(&store, doc, DocumentType::FaceSheet);

        let reset = store.reset_document(doc).unwrap();
        assert_eq!(reset.ocr_status, OcrStatus::Pending);
        assert!(reset.ocr_text.is_none());
        assert!(reset.document_type.is_none());
    }

    // ── Extraction claim ──────────────────────────────────────────────────────

    #[test]
    fn claim_requires_every_document_ready() {
        let (store, id) = store_with_referral();
        let docs: Vec<DocumentId> = (0..3).map(|_| add_document(&store, id)).collect();

        finish_document(&store, docs[0], DocumentType::FaceSheet);
        assert!(store.try_claim_extraction(id).unwrap().is_none());
        finish_document(&store, docs[1], DocumentType::HAndP);
        assert!(store.try_claim_extraction(id).unwrap().is_none());

        store.complete_ocr(docs[2], "text".to_string(), 0.9).unwrap();
        assert!(
            store.try_claim_extraction(id).unwrap().is_none(),
            "OCR-complete but unclassified must not pass the gate"
        );

        store.set_classification(docs[2], DocumentType::Other, 0.1).unwrap();
        let claimed = store.try_claim_extraction(id).unwrap().expect("all three ready");
        assert_eq!(claimed.documents.len(), 3);
        assert_eq!(claimed.revision, store.document_revision(id).unwrap());
    }

    #[test]
    fn claim_succeeds_once_per_revision() {
        let (store, id) = store_with_referral();
        let doc = add_document(&store, id);
        finish_document(&store, doc, DocumentType::Labs);

        assert!(store.try_claim_extraction(id).unwrap().is_some());
        assert!(store.try_claim_extraction(id).unwrap().is_none(), "second claim at same revision");

        let late = add_document(&store, id);
        finish_document(&store, late, DocumentType::Labs);
        assert!(store.try_claim_extraction(id).unwrap().is_some(), "new document opens a new revision");
    }

    #[test]
    fn claim_keeps_a_live_attempt() {
        let (store, id) = store_with_referral();
        let doc = add_document(&store, id);
        let attempt = store.begin_attempt(id).unwrap();
        assert!(store.advance_ai_status(id, AiProcessingStatus::Processing).unwrap());
        finish_document(&store, doc, DocumentType::Labs);

        let claim = store.try_claim_extraction(id).unwrap().unwrap();
        assert_eq!(claim.attempt_id, attempt);
        assert_eq!(store.referral(id).unwrap().ai_processing_status, AiProcessingStatus::Processing);
    }

    #[test]
    fn claim_after_finished_attempt_starts_a_new_one() {
        let (store, id) = store_with_referral();
        let first = add_document(&store, id);
        let attempt = store.begin_attempt(id).unwrap();
        finish_document(&store, first, DocumentType::Labs);
        assert!(store.try_claim_extraction(id).unwrap().is_some());
        assert!(store.advance_ai_status(id, AiProcessingStatus::Completed).unwrap());
        store.set_lifecycle_status(id, ReferralStatus::ReadyForDecision).unwrap();

        // Arrives while the first pass is finishing; no attempt was started for it.
        let late = add_document(&store, id);
        finish_document(&store, late, DocumentType::MedicationList);
        let revision = store.document_revision(id).unwrap();

        let claim = store.try_claim_extraction(id).unwrap().unwrap();
        assert_ne!(claim.attempt_id, attempt);
        assert_eq!(claim.revision, revision, "restart does not invalidate the claim");
        assert_eq!(claim.documents.len(), 2);

        let referral = store.referral(id).unwrap();
        assert_eq!(referral.current_attempt, Some(claim.attempt_id));
        assert_eq!(referral.ai_processing_status, AiProcessingStatus::Queued);
        assert_eq!(referral.status, ReferralStatus::Processing);
    }

    #[test]
    fn claim_without_documents_fails() {
        let (store, id) = store_with_referral();
        assert!(store.try_claim_extraction(id).unwrap().is_none());
    }

    // ── Results ───────────────────────────────────────────────────────────────

    #[test]
    fn extracted_record_upsert_replaces_whole_record() {
        let (store, id) = store_with_referral();
        let record = |version: &str, degraded: bool| ExtractedRecord {
            referral_id: id,
            data: ExtractedPatientData::default(),
            source_document_ids: Vec::new(),
            extraction_version: version.to_string(),
            model_used: None,
            degraded,
            extracted_at: chrono::Utc::now(),
        };

        store.upsert_extracted_data(record("v1", true)).unwrap();
        store.upsert_extracted_data(record("v2", false)).unwrap();

        let stored = store.extracted_data(id).unwrap().unwrap();
        assert_eq!(stored.extraction_version, "v2");
        assert!(!stored.degraded);
    }

    // ── Risk flags ────────────────────────────────────────────────────────────

    #[test]
    fn flags_append_once_per_attempt() {
        let (store, id) = store_with_referral();
        let attempt = store.begin_attempt(id).unwrap();

        assert_eq!(store.append_risk_flags(id, attempt, flags_for(id, attempt, &["a", "b"])).unwrap(), 2);
        assert_eq!(
            store.append_risk_flags(id, attempt, flags_for(id, attempt, &["a", "b"])).unwrap(),
            0,
            "redelivered scoring must not duplicate flags"
        );
        assert_eq!(store.risk_flags(id).unwrap().len(), 2);
    }

    #[test]
    fn flags_accumulate_across_attempts() {
        let (store, id) = store_with_referral();
        let first = store.begin_attempt(id).unwrap();
        store.append_risk_flags(id, first, flags_for(id, first, &["old"])).unwrap();
        let second = store.begin_attempt(id).unwrap();
        store.append_risk_flags(id, second, flags_for(id, second, &["new-1", "new-2"])).unwrap();

        assert_eq!(store.risk_flags(id).unwrap().len(), 3);
        let latest = store.latest_risk_flags(id).unwrap();
        assert_eq!(latest.len(), 2);
        assert!(latest.iter().all(|f| f.attempt_id == second));
    }

    #[test]
    fn resolution_survives_later_attempts() {
        let (store, id) = store_with_referral();
        let first = store.begin_attempt(id).unwrap();
        let flags = flags_for(id, first, &["needs review"]);
        let flag_id = flags[0].id;
        store.append_risk_flags(id, first, flags).unwrap();

        let resolved = store.resolve_risk_flag(flag_id, "nurse.jones", Some("confirmed")).unwrap();
        assert!(resolved.is_resolved());

        let second = store.begin_attempt(id).unwrap();
        store.append_risk_flags(id, second, flags_for(id, second, &["needs review"])).unwrap();

        let original = store
            .risk_flags(id)
            .unwrap()
            .into_iter()
            .find(|f| f.id == flag_id)
            .unwrap();
        let resolution = original.resolution.expect("resolution kept");
        assert_eq!(resolution.resolved_by, "nurse.jones");
        assert_eq!(resolution.notes.as_deref(), Some("confirmed"));

        assert!(!store.unresolve_risk_flag(flag_id).unwrap().is_resolved());
    }

    // ── Facility criteria ─────────────────────────────────────────────────────

    #[test]
    fn active_criteria_sorted_by_priority() {
        let store = InMemoryReferralStore::new();
        let facility = FacilityId::new("facility-1");
        store
            .put_facility_criteria(
                &facility,
                vec![criterion("c", 30, true), criterion("a", 10, true), criterion("off", 0, false)],
            )
            .unwrap();

        let ids: Vec<String> = store.active_criteria(&facility).unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, ["a", "c"]);
        assert!(store.active_criteria(&FacilityId::new("other")).unwrap().is_empty());
    }
}
