//! Extraction stage: every classified document of a referral → one canonical
//! patient record.
//!
//! Like classification, the stage never fails. When the capability cannot
//! produce a verifiable record the empty record is returned and marked
//! degraded, and the referral still moves on to scoring.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, warn};

use intake_contracts::{
    error::IntakeResult,
    patient::{DocumentText, ExtractedPatientData, Gender},
    referral::{Document, PatientIdentity},
};
use intake_core::{call_with_retry, traits::ExtractionCapability, RetryPolicy};
use intake_verify::{outputs, OutputSchema, SchemaVerifier};

use crate::classification::truncate_chars;
use crate::config::PipelineConfig;

/// Medications that trigger the high-cost flag, matched case-insensitively as
/// substrings of the medication name.
pub const HIGH_COST_MEDICATIONS: &[&str] = &[
    "daptomycin",
    "ceftaroline",
    "oritavancin",
    "dalbavancin",
    "epoetin alfa",
    "darbepoetin alfa",
    "filgrastim",
    "pegfilgrastim",
    "rituximab",
    "infliximab",
    "adalimumab",
    "etanercept",
    "insulin",
    "lantus",
    "humalog",
    "novolog",
];

pub fn is_high_cost_medication(name: &str) -> bool {
    let name = name.to_lowercase();
    HIGH_COST_MEDICATIONS.iter().any(|drug| name.contains(drug))
}

/// OR the list match into every medication's `is_high_cost` flag. A flag
/// already set by the extractor is never cleared.
pub fn flag_high_cost_medications(data: &mut ExtractedPatientData) {
    for medication in &mut data.medications {
        medication.is_high_cost = medication.is_high_cost || is_high_cost_medication(&medication.name);
    }
}

/// Build the extractor input from a referral's documents, in upload order.
///
/// Documents without OCR text or a type are skipped; each text is truncated
/// to `per_document_chars`.
pub fn document_texts(documents: &[Document], per_document_chars: usize) -> Vec<DocumentText> {
    documents
        .iter()
        .filter_map(|document| {
            let text = document.ocr_text.as_deref()?;
            let document_type = document.document_type?;
            Some(DocumentText {
                document_id: document.id,
                document_type,
                text: truncate_chars(text, per_document_chars).to_string(),
            })
        })
        .collect()
}

/// The identity to copy onto the referral, when extraction found both names.
pub fn patient_identity(data: &ExtractedPatientData) -> Option<PatientIdentity> {
    let demographics = &data.demographics;
    let first_name = demographics.first_name.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    let last_name = demographics.last_name.as_deref().map(str::trim).filter(|s| !s.is_empty())?;

    Some(PatientIdentity {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        dob: demographics.dob.as_deref().and_then(parse_dob),
        gender: demographics.gender.map(|gender| {
            match gender {
                Gender::Male => "male",
                Gender::Female => "female",
                Gender::Other => "other",
            }
            .to_string()
        }),
    })
}

fn parse_dob(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    ["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

/// Outcome of one extraction pass.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub data: ExtractedPatientData,
    pub model_used: Option<String>,
    /// Why the empty record was used, when it was.
    pub degraded: Option<String>,
}

pub struct ExtractionStage {
    capability: Arc<dyn ExtractionCapability>,
    verifier: SchemaVerifier,
    schema: OutputSchema,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ExtractionStage {
    pub fn new(capability: Arc<dyn ExtractionCapability>, config: &PipelineConfig) -> Self {
        Self {
            capability,
            verifier: outputs::capability_verifier(),
            schema: outputs::extraction(),
            timeout: config.capabilities.timeout(),
            retry: config.capabilities.retry(),
        }
    }

    /// Merge `documents` into one record. Always returns a record.
    pub async fn extract(&self, documents: &[DocumentText]) -> Extraction {
        let result =
            call_with_retry("extraction", self.timeout, &self.retry, || self.extract_once(documents)).await;

        match result {
            Ok(mut data) => {
                flag_high_cost_medications(&mut data);
                debug!(
                    documents = documents.len(),
                    diagnoses = data.diagnoses.len(),
                    medications = data.medications.len(),
                    "patient record extracted"
                );
                Extraction {
                    data,
                    model_used: Some(self.capability.model().to_string()),
                    degraded: None,
                }
            }
            Err(err) => {
                warn!(documents = documents.len(), error = %err, "extraction failed; using empty record");
                Extraction {
                    data: ExtractedPatientData::default(),
                    model_used: None,
                    degraded: Some(err.to_string()),
                }
            }
        }
    }

    async fn extract_once(&self, documents: &[DocumentText]) -> IntakeResult<ExtractedPatientData> {
        let raw = self.capability.extract(documents).await?;
        self.verifier.decode("extraction", raw, &self.schema)
    }
}
