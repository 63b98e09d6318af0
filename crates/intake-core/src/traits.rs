//! Trait seams between the pipeline and everything it does not own.
//!
//! Two kinds of collaborator sit behind these traits:
//!
//! - **Capabilities** (`BlobStorage`, `OcrProvider`, the classification,
//!   extraction and scoring capabilities) are external and **untrusted**.
//!   They are async, may be slow, may fail, and the AI capabilities return
//!   raw JSON that the pipeline verifies before decoding.
//! - **The referral store** (`ReferralStore`) and the activity log
//!   (`ActivityRecorder`) are **trusted** and synchronous. Every write that
//!   can race between workers is expressed as an upsert, a guarded append or
//!   an atomic claim, so at-least-once job delivery never corrupts state.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use intake_contracts::{
    activity::ActivityRecord,
    criteria::FacilityCriteria,
    error::IntakeResult,
    ids::{AttemptId, DocumentId, FacilityId, ReferralId, RiskFlagId},
    patient::{DocumentText, ExtractedPatientData, ExtractedRecord},
    referral::{
        AiProcessingStatus, BlobLocator, Document, DocumentType, PatientIdentity, Referral,
        ReferralStatus,
    },
    risk::RiskFlag,
    scoring::AiRecommendation,
};

// ── External capabilities ─────────────────────────────────────────────────────

/// Object storage holding the uploaded document bytes.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn put(&self, locator: &BlobLocator, bytes: Vec<u8>, content_type: &str) -> IntakeResult<()>;

    async fn get(&self, locator: &BlobLocator) -> IntakeResult<Vec<u8>>;

    /// A time-limited download URL for `locator`.
    async fn presigned_get(&self, locator: &BlobLocator, ttl: Duration) -> IntakeResult<String>;
}

/// Text recognised in a document, with the provider's mean confidence in 0..=1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrOutput {
    pub text: String,
    pub confidence: f64,
}

/// An OCR service. Treated as opaque: bytes in, text and confidence out.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    async fn analyze(&self, bytes: &[u8], mime_type: &str) -> IntakeResult<OcrOutput>;
}

/// Assigns a document type to OCR text.
///
/// Returns raw JSON of the shape `{"type": "...", "confidence": 0.9,
/// "reasoning": "..."}`; the classification stage verifies and decodes it.
#[async_trait]
pub trait ClassificationCapability: Send + Sync {
    async fn classify(&self, text: &str) -> IntakeResult<Value>;
}

/// Merges all of a referral's documents into one patient record, returned
/// as raw JSON in the camelCase record shape.
#[async_trait]
pub trait ExtractionCapability: Send + Sync {
    /// Model identifier recorded alongside the extraction.
    fn model(&self) -> &str;

    async fn extract(&self, documents: &[DocumentText]) -> IntakeResult<Value>;
}

/// Holistic admissions judgment against a facility's criteria.
#[async_trait]
pub trait AdmissionsCapability: Send + Sync {
    async fn assess(
        &self,
        record: &ExtractedPatientData,
        criteria: &[FacilityCriteria],
    ) -> IntakeResult<Value>;
}

/// PDPM reimbursement projection and payer risk.
#[async_trait]
pub trait ReimbursementCapability: Send + Sync {
    async fn assess(&self, record: &ExtractedPatientData) -> IntakeResult<Value>;
}

/// Clinical complexity and operational load.
#[async_trait]
pub trait ClinicalCapability: Send + Sync {
    async fn assess(&self, record: &ExtractedPatientData) -> IntakeResult<Value>;
}

/// Patient summary and documentation completeness.
#[async_trait]
pub trait DocumentationCapability: Send + Sync {
    async fn assess(
        &self,
        record: &ExtractedPatientData,
        document_types: &[DocumentType],
    ) -> IntakeResult<Value>;
}

// ── Trusted state ─────────────────────────────────────────────────────────────

/// A won extraction claim.
#[derive(Debug, Clone)]
pub struct ExtractionClaim {
    /// The attempt the extraction runs under.
    pub attempt_id: AttemptId,
    /// The document-set revision the claim was taken at. Extraction output
    /// is only persisted while this is still current.
    pub revision: u64,
    pub documents: Vec<Document>,
}

/// The persistence boundary for referrals and everything they own.
///
/// Every method is atomic with respect to the others. Implementations must
/// uphold the contracts documented per method; the workers rely on them for
/// idempotence.
pub trait ReferralStore: Send + Sync {
    // Referrals

    fn create_referral(&self, referral: Referral) -> IntakeResult<()>;

    fn referral(&self, id: ReferralId) -> IntakeResult<Referral>;

    /// Start a new processing attempt: assign a fresh `AttemptId`, reset
    /// `ai_processing_status` to `queued`, clear the error slot and move the
    /// lifecycle status to `processing`. The only non-monotonic transition.
    fn begin_attempt(&self, id: ReferralId) -> IntakeResult<AttemptId>;

    /// Advance the pipeline sub-status. Returns `false`, leaving the referral
    /// untouched, when the move would go backwards within the attempt.
    fn advance_ai_status(&self, id: ReferralId, next: AiProcessingStatus) -> IntakeResult<bool>;

    /// Move to a failure status with a human-readable error, optionally also
    /// setting the lifecycle status. Same monotonic guard as
    /// [`advance_ai_status`](Self::advance_ai_status).
    fn fail_referral(
        &self,
        id: ReferralId,
        status: AiProcessingStatus,
        error: &str,
        lifecycle: Option<ReferralStatus>,
    ) -> IntakeResult<bool>;

    fn set_lifecycle_status(&self, id: ReferralId, status: ReferralStatus) -> IntakeResult<()>;

    fn update_patient_identity(&self, id: ReferralId, identity: &PatientIdentity) -> IntakeResult<()>;

    // Documents

    /// Insert a new document and return how many documents the referral now
    /// owns. Bumps the referral's document-set revision.
    fn insert_document(&self, document: Document) -> IntakeResult<usize>;

    fn document(&self, id: DocumentId) -> IntakeResult<Document>;

    /// All documents of a referral in upload order.
    fn documents(&self, referral_id: ReferralId) -> IntakeResult<Vec<Document>>;

    fn mark_ocr_processing(&self, id: DocumentId) -> IntakeResult<()>;

    fn complete_ocr(&self, id: DocumentId, text: String, confidence: f64) -> IntakeResult<()>;

    fn fail_ocr(&self, id: DocumentId) -> IntakeResult<()>;

    /// Record the document type. Writes only while the type is unset, so a
    /// redelivered classification job cannot overwrite it; returns whether
    /// this call wrote.
    fn set_classification(
        &self,
        id: DocumentId,
        document_type: DocumentType,
        confidence: f64,
    ) -> IntakeResult<bool>;

    /// Clear OCR and classification results back to `pending`. Bumps the
    /// document-set revision.
    fn reset_document(&self, id: DocumentId) -> IntakeResult<Document>;

    /// Atomically claim the right to enqueue extraction.
    ///
    /// Succeeds at most once per document-set revision, and only when every
    /// document of the referral is OCR-complete and classified. When the
    /// current attempt has already moved past `processing`, the claim starts
    /// a fresh attempt in the same step without bumping the revision, so a
    /// document that arrived late is merged instead of dropped.
    fn try_claim_extraction(&self, referral_id: ReferralId) -> IntakeResult<Option<ExtractionClaim>>;

    /// The referral's current document-set revision.
    fn document_revision(&self, referral_id: ReferralId) -> IntakeResult<u64>;

    // Results

    /// Replace the referral's extracted record wholesale.
    fn upsert_extracted_data(&self, record: ExtractedRecord) -> IntakeResult<()>;

    fn extracted_data(&self, referral_id: ReferralId) -> IntakeResult<Option<ExtractedRecord>>;

    /// Replace the referral's recommendation wholesale.
    fn upsert_recommendation(&self, recommendation: AiRecommendation) -> IntakeResult<()>;

    fn recommendation(&self, referral_id: ReferralId) -> IntakeResult<Option<AiRecommendation>>;

    /// Append flags raised by `attempt_id`. A no-op returning `0` when that
    /// attempt already has flags on record. Existing flags are never touched.
    fn append_risk_flags(
        &self,
        referral_id: ReferralId,
        attempt_id: AttemptId,
        flags: Vec<RiskFlag>,
    ) -> IntakeResult<usize>;

    /// Every flag ever raised for the referral, oldest first.
    fn risk_flags(&self, referral_id: ReferralId) -> IntakeResult<Vec<RiskFlag>>;

    /// Flags raised by the most recent attempt that raised any.
    fn latest_risk_flags(&self, referral_id: ReferralId) -> IntakeResult<Vec<RiskFlag>>;

    fn resolve_risk_flag(
        &self,
        id: RiskFlagId,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> IntakeResult<RiskFlag>;

    fn unresolve_risk_flag(&self, id: RiskFlagId) -> IntakeResult<RiskFlag>;

    // Facility criteria

    /// Replace a facility's criteria set.
    fn put_facility_criteria(&self, facility_id: &FacilityId, criteria: Vec<FacilityCriteria>) -> IntakeResult<()>;

    /// Active criteria for the facility, ascending by priority.
    fn active_criteria(&self, facility_id: &FacilityId) -> IntakeResult<Vec<FacilityCriteria>>;
}

/// The processing activity log: one append-only record per stage outcome.
pub trait ActivityRecorder: Send + Sync {
    /// Append one record. Records are never modified or deleted.
    fn record(&self, record: &ActivityRecord) -> IntakeResult<()>;

    /// All records for a referral, oldest first.
    fn activity(&self, referral_id: ReferralId) -> IntakeResult<Vec<ActivityRecord>>;
}
