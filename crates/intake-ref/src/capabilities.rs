//! Deterministic stand-ins for every external capability.
//!
//! None of these contact an external system. Each one answers from memory
//! or from canned data in [`crate::mock_data`], and a few can be told to
//! fail so scenarios can exercise retry and degradation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use intake_contracts::{
    criteria::FacilityCriteria,
    error::{IntakeError, IntakeResult},
    patient::{DocumentText, ExtractedPatientData},
    referral::{BlobLocator, DocumentType},
};
use intake_core::traits::{
    AdmissionsCapability, BlobStorage, ClassificationCapability, ClinicalCapability,
    DocumentationCapability, ExtractionCapability, OcrOutput, OcrProvider, ReimbursementCapability,
};
use intake_pipeline::Capabilities;

use crate::mock_data;

fn provider_error(provider: &str, reason: &str) -> IntakeError {
    IntakeError::Provider {
        provider: provider.to_string(),
        reason: reason.to_string(),
    }
}

// ── Blob storage ──────────────────────────────────────────────────────────────

/// Object storage held in a map keyed by `bucket/key`.
#[derive(Default)]
pub struct InMemoryBlobStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn path(locator: &BlobLocator) -> String {
        format!("{}/{}", locator.bucket, locator.key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStorage for InMemoryBlobStorage {
    async fn put(&self, locator: &BlobLocator, bytes: Vec<u8>, content_type: &str) -> IntakeResult<()> {
        let path = Self::path(locator);
        debug!(path = %path, size = bytes.len(), content_type, "blob stored");
        self.objects
            .lock()
            .map_err(|_| provider_error("blob", "object map lock poisoned"))?
            .insert(path, bytes);
        Ok(())
    }

    async fn get(&self, locator: &BlobLocator) -> IntakeResult<Vec<u8>> {
        let path = Self::path(locator);
        self.objects
            .lock()
            .map_err(|_| provider_error("blob", "object map lock poisoned"))?
            .get(&path)
            .cloned()
            .ok_or_else(|| provider_error("blob", &format!("no object at '{path}'")))
    }

    async fn presigned_get(&self, locator: &BlobLocator, ttl: Duration) -> IntakeResult<String> {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(format!(
            "https://{}.blob.local/{}?expires={expires}",
            locator.bucket, locator.key
        ))
    }
}

// ── OCR ───────────────────────────────────────────────────────────────────────

/// Reads the bytes back as UTF-8 text. Can be told to fail its first calls.
pub struct ScriptedOcr {
    confidence: f64,
    failures_left: AtomicU32,
    calls: AtomicU32,
}

impl ScriptedOcr {
    pub fn new() -> Self {
        Self::failing_first(0)
    }

    /// Fail the first `failures` calls with a provider error.
    pub fn failing_first(failures: u32) -> Self {
        Self {
            confidence: 0.96,
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedOcr {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrProvider for ScriptedOcr {
    async fn analyze(&self, bytes: &[u8], _mime_type: &str) -> IntakeResult<OcrOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(provider_error("ocr", "page could not be read"));
        }
        Ok(OcrOutput {
            text: String::from_utf8_lossy(bytes).into_owned(),
            confidence: self.confidence,
        })
    }
}

// ── Classification ────────────────────────────────────────────────────────────

/// Heading keywords, checked in order.
const KEYWORDS: &[(&str, &str)] = &[
    ("FACE SHEET", "FACE_SHEET"),
    ("HISTORY AND PHYSICAL", "H_AND_P"),
    ("DISCHARGE SUMMARY", "DISCHARGE_SUMMARY"),
    ("MEDICATION LIST", "MEDICATION_LIST"),
    ("LAB RESULTS", "LABS"),
    ("CONSULT", "CONSULT_NOTES"),
    ("NURSING NOTE", "NURSING_NOTES"),
    ("INSURANCE CARD", "INSURANCE_CARD"),
];

/// Classifies by the first heading keyword found in the text.
#[derive(Default)]
pub struct KeywordClassifier;

#[async_trait]
impl ClassificationCapability for KeywordClassifier {
    async fn classify(&self, text: &str) -> IntakeResult<Value> {
        let upper = text.to_uppercase();
        let answer = match KEYWORDS.iter().find(|(keyword, _)| upper.contains(keyword)) {
            Some((keyword, label)) => json!({
                "type": label,
                "confidence": 0.93,
                "reasoning": format!("heading '{keyword}' found")
            }),
            None => json!({
                "type": "OTHER",
                "confidence": 0.4,
                "reasoning": "no known heading found"
            }),
        };
        Ok(answer)
    }
}

// ── Extraction ────────────────────────────────────────────────────────────────

/// Returns the same record whatever documents it is given, optionally after
/// a delay. Remembers how many documents each call received.
pub struct CannedExtractor {
    record: Value,
    delay: Duration,
    document_counts: Mutex<Vec<usize>>,
}

impl CannedExtractor {
    pub fn new(record: Value) -> Self {
        Self::with_delay(record, Duration::ZERO)
    }

    pub fn with_delay(record: Value, delay: Duration) -> Self {
        Self {
            record,
            delay,
            document_counts: Mutex::new(Vec::new()),
        }
    }

    /// Documents passed to each call so far, in call order.
    pub fn document_counts(&self) -> Vec<usize> {
        self.document_counts
            .lock()
            .map(|counts| counts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ExtractionCapability for CannedExtractor {
    fn model(&self) -> &str {
        "canned-extractor-v1"
    }

    async fn extract(&self, documents: &[DocumentText]) -> IntakeResult<Value> {
        if let Ok(mut counts) = self.document_counts.lock() {
            counts.push(documents.len());
        }
        if documents.is_empty() {
            return Err(provider_error("extraction", "no documents supplied"));
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.record.clone())
    }
}

// ── Scoring agents ────────────────────────────────────────────────────────────

/// Fixed answers for the four scoring agents.
pub struct CannedAgents {
    pub admissions: Value,
    pub reimbursement: Value,
    pub clinical: Value,
    pub documentation: Value,
}

impl CannedAgents {
    /// Answers for the hip-fracture referral: fit 76, financial 95,
    /// operational 90.
    pub fn hip_fracture() -> Self {
        Self {
            admissions: mock_data::admissions_answer(),
            reimbursement: mock_data::reimbursement_answer(),
            clinical: mock_data::clinical_answer(),
            documentation: mock_data::documentation_answer(),
        }
    }
}

#[async_trait]
impl AdmissionsCapability for CannedAgents {
    async fn assess(&self, _record: &ExtractedPatientData, _criteria: &[FacilityCriteria]) -> IntakeResult<Value> {
        Ok(self.admissions.clone())
    }
}

#[async_trait]
impl ReimbursementCapability for CannedAgents {
    async fn assess(&self, _record: &ExtractedPatientData) -> IntakeResult<Value> {
        Ok(self.reimbursement.clone())
    }
}

#[async_trait]
impl ClinicalCapability for CannedAgents {
    async fn assess(&self, _record: &ExtractedPatientData) -> IntakeResult<Value> {
        Ok(self.clinical.clone())
    }
}

#[async_trait]
impl DocumentationCapability for CannedAgents {
    async fn assess(&self, _record: &ExtractedPatientData, _document_types: &[DocumentType]) -> IntakeResult<Value> {
        Ok(self.documentation.clone())
    }
}

/// An AI provider that is down: every call fails with a provider error.
#[derive(Default)]
pub struct UnavailableModel;

#[async_trait]
impl ExtractionCapability for UnavailableModel {
    fn model(&self) -> &str {
        "unavailable"
    }

    async fn extract(&self, _documents: &[DocumentText]) -> IntakeResult<Value> {
        Err(provider_error("extraction", "model endpoint unavailable"))
    }
}

#[async_trait]
impl AdmissionsCapability for UnavailableModel {
    async fn assess(&self, _record: &ExtractedPatientData, _criteria: &[FacilityCriteria]) -> IntakeResult<Value> {
        Err(provider_error("admissions", "model endpoint unavailable"))
    }
}

#[async_trait]
impl ReimbursementCapability for UnavailableModel {
    async fn assess(&self, _record: &ExtractedPatientData) -> IntakeResult<Value> {
        Err(provider_error("reimbursement", "model endpoint unavailable"))
    }
}

#[async_trait]
impl ClinicalCapability for UnavailableModel {
    async fn assess(&self, _record: &ExtractedPatientData) -> IntakeResult<Value> {
        Err(provider_error("clinical", "model endpoint unavailable"))
    }
}

#[async_trait]
impl DocumentationCapability for UnavailableModel {
    async fn assess(&self, _record: &ExtractedPatientData, _document_types: &[DocumentType]) -> IntakeResult<Value> {
        Err(provider_error("documentation", "model endpoint unavailable"))
    }
}

// ── Wiring ────────────────────────────────────────────────────────────────────

/// Healthy capabilities that extract `record` and score with `agents`.
pub fn reference_capabilities(record: Value, agents: CannedAgents) -> Capabilities {
    let agents = Arc::new(agents);
    Capabilities {
        blobs: Arc::new(InMemoryBlobStorage::new()),
        ocr: Arc::new(ScriptedOcr::new()),
        classifier: Arc::new(KeywordClassifier),
        extractor: Arc::new(CannedExtractor::new(record)),
        admissions: agents.clone(),
        reimbursement: agents.clone(),
        clinical: agents.clone(),
        documentation: agents,
    }
}

/// Storage, OCR and classification work; every AI model behind extraction
/// and scoring is down.
pub fn models_unavailable() -> Capabilities {
    let down = Arc::new(UnavailableModel);
    Capabilities {
        blobs: Arc::new(InMemoryBlobStorage::new()),
        ocr: Arc::new(ScriptedOcr::new()),
        classifier: Arc::new(KeywordClassifier),
        extractor: down.clone(),
        admissions: down.clone(),
        reimbursement: down.clone(),
        clinical: down.clone(),
        documentation: down,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator(key: &str) -> BlobLocator {
        BlobLocator {
            bucket: "test-bucket".to_string(),
            key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn blob_round_trip_and_presign() {
        let blobs = InMemoryBlobStorage::new();
        blobs.put(&locator("a.pdf"), b"hello".to_vec(), "application/pdf").await.unwrap();

        assert_eq!(blobs.get(&locator("a.pdf")).await.unwrap(), b"hello");
        assert!(blobs.get(&locator("missing.pdf")).await.is_err());

        let url = blobs.presigned_get(&locator("a.pdf"), Duration::from_secs(3600)).await.unwrap();
        assert!(url.starts_with("https://test-bucket.blob.local/a.pdf?expires="));
    }

    #[tokio::test]
    async fn ocr_fails_only_the_scripted_number_of_times() {
        let ocr = ScriptedOcr::failing_first(2);
        assert!(ocr.analyze(b"text", "application/pdf").await.is_err());
        assert!(ocr.analyze(b"text", "application/pdf").await.is_err());

        let output = ocr.analyze(b"text", "application/pdf").await.unwrap();
        assert_eq!(output.text, "text");
        assert_eq!(ocr.calls(), 3);
    }

    #[tokio::test]
    async fn classifier_reads_headings() {
        let classifier = KeywordClassifier;
        for document in mock_data::hip_fracture_referral() {
            let answer = classifier.classify(document.text).await.unwrap();
            assert_ne!(answer["type"], "OTHER", "{} should be recognised", document.filename);
        }
        let answer = classifier.classify("handwritten note").await.unwrap();
        assert_eq!(answer["type"], "OTHER");
    }
}
