//! Referral and document entities with their status state machines.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AttemptId, DocumentId, FacilityId, ReferralId};

/// Lifecycle status of a referral as seen by admissions staff.
///
/// The pipeline only ever sets `Processing`, `ReadyForDecision` and
/// `PendingReview`; the rest belong to the decision workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    New,
    Processing,
    ReadyForDecision,
    PendingReview,
    UnderReview,
    Accepted,
    Declined,
    PendingInfo,
}

/// Pipeline sub-status of a referral, independent of [`ReferralStatus`].
///
/// ```text
/// pending → queued → processing → extracted → completed
///              └──────────┴────────────┴──→ failed | extraction_failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiProcessingStatus {
    Pending,
    Queued,
    Processing,
    Extracted,
    Completed,
    Failed,
    ExtractionFailed,
}

impl AiProcessingStatus {
    /// Position on the forward path, `None` for the failure states.
    fn rank(self) -> Option<u8> {
        match self {
            AiProcessingStatus::Pending => Some(0),
            AiProcessingStatus::Queued => Some(1),
            AiProcessingStatus::Processing => Some(2),
            AiProcessingStatus::Extracted => Some(3),
            AiProcessingStatus::Completed => Some(4),
            AiProcessingStatus::Failed | AiProcessingStatus::ExtractionFailed => None,
        }
    }

    /// True for states the pipeline is actively moving through.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            AiProcessingStatus::Queued
                | AiProcessingStatus::Processing
                | AiProcessingStatus::Extracted
        )
    }

    /// True once the current attempt can make no further progress.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AiProcessingStatus::Completed
                | AiProcessingStatus::Failed
                | AiProcessingStatus::ExtractionFailed
        )
    }

    /// Whether moving from `self` to `next` respects the within-attempt
    /// monotonic ordering.
    ///
    /// Forward moves along the happy path are allowed, failure states are
    /// reachable from any in-flight state, and nothing leaves a terminal
    /// state. Resetting for a new attempt bypasses this check.
    pub fn can_advance_to(self, next: AiProcessingStatus) -> bool {
        match (self.rank(), next.rank()) {
            (Some(current), Some(target)) => target > current,
            (Some(_), None) => self.is_in_flight(),
            (None, _) => false,
        }
    }
}

/// OCR status of a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// The closed set of document types the classifier may assign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    FaceSheet,
    HAndP,
    DischargeSummary,
    MedicationList,
    Labs,
    ConsultNotes,
    NursingNotes,
    InsuranceCard,
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 9] = [
        DocumentType::FaceSheet,
        DocumentType::HAndP,
        DocumentType::DischargeSummary,
        DocumentType::MedicationList,
        DocumentType::Labs,
        DocumentType::ConsultNotes,
        DocumentType::NursingNotes,
        DocumentType::InsuranceCard,
        DocumentType::Other,
    ];

    /// Parse a classifier label. Accepts the snake_case wire form as well as
    /// upper-case labels such as `H_AND_P` or `DISCHARGE_SUMMARY`.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        let parsed = match normalized.as_str() {
            "face_sheet" | "facesheet" => DocumentType::FaceSheet,
            "h_and_p" | "h&p" | "history_and_physical" => DocumentType::HAndP,
            "discharge_summary" => DocumentType::DischargeSummary,
            "medication_list" | "mar" => DocumentType::MedicationList,
            "labs" | "lab_results" => DocumentType::Labs,
            "consult_notes" => DocumentType::ConsultNotes,
            "nursing_notes" => DocumentType::NursingNotes,
            "insurance_card" => DocumentType::InsuranceCard,
            "other" => DocumentType::Other,
            _ => return None,
        };
        Some(parsed)
    }

    /// The snake_case wire label.
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::FaceSheet => "face_sheet",
            DocumentType::HAndP => "h_and_p",
            DocumentType::DischargeSummary => "discharge_summary",
            DocumentType::MedicationList => "medication_list",
            DocumentType::Labs => "labs",
            DocumentType::ConsultNotes => "consult_notes",
            DocumentType::NursingNotes => "nursing_notes",
            DocumentType::InsuranceCard => "insurance_card",
            DocumentType::Other => "other",
        }
    }
}

/// Where a document's bytes live in blob storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobLocator {
    pub bucket: String,
    pub key: String,
}

/// One uploaded artifact belonging to a referral.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub referral_id: ReferralId,
    pub original_filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub locator: BlobLocator,
    pub ocr_status: OcrStatus,
    pub ocr_text: Option<String>,
    pub ocr_confidence: Option<f64>,
    pub ocr_completed_at: Option<DateTime<Utc>>,
    pub document_type: Option<DocumentType>,
    pub document_type_confidence: Option<f64>,
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    /// Build a freshly uploaded, not yet processed document.
    pub fn new_pending(
        id: DocumentId,
        referral_id: ReferralId,
        original_filename: impl Into<String>,
        mime_type: impl Into<String>,
        size_bytes: u64,
        locator: BlobLocator,
    ) -> Self {
        Self {
            id,
            referral_id,
            original_filename: original_filename.into(),
            mime_type: mime_type.into(),
            size_bytes,
            locator,
            ocr_status: OcrStatus::Pending,
            ocr_text: None,
            ocr_confidence: None,
            ocr_completed_at: None,
            document_type: None,
            document_type_confidence: None,
            uploaded_at: Utc::now(),
        }
    }

    /// OCR finished and a type (possibly `other`) has been assigned.
    pub fn is_ready_for_extraction(&self) -> bool {
        self.ocr_status == OcrStatus::Completed && self.document_type.is_some()
    }

    /// Clear OCR and classification results so the document can run again.
    pub fn reset_processing(&mut self) {
        self.ocr_status = OcrStatus::Pending;
        self.ocr_text = None;
        self.ocr_confidence = None;
        self.ocr_completed_at = None;
        self.document_type = None;
        self.document_type_confidence = None;
    }
}

/// The referral aggregate root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    pub id: ReferralId,
    pub facility_id: FacilityId,
    pub status: ReferralStatus,
    pub ai_processing_status: AiProcessingStatus,
    pub ai_processing_error: Option<String>,
    /// The processing attempt currently in progress or last completed.
    pub current_attempt: Option<AttemptId>,
    pub patient_first_name: Option<String>,
    pub patient_last_name: Option<String>,
    pub patient_dob: Option<NaiveDate>,
    pub patient_gender: Option<String>,
    pub ai_processing_started_at: Option<DateTime<Utc>>,
    pub ai_processing_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Referral {
    pub fn new(facility_id: FacilityId) -> Self {
        let now = Utc::now();
        Self {
            id: ReferralId::new(),
            facility_id,
            status: ReferralStatus::New,
            ai_processing_status: AiProcessingStatus::Pending,
            ai_processing_error: None,
            current_attempt: None,
            patient_first_name: None,
            patient_last_name: None,
            patient_dob: None,
            patient_gender: None,
            ai_processing_started_at: None,
            ai_processing_completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Patient identity copied onto the referral once extraction finds a name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientIdentity {
    pub first_name: String,
    pub last_name: String,
    pub dob: Option<NaiveDate>,
    pub gender: Option<String>,
}
