//! Classification stage: OCR text → document type.
//!
//! The stage never fails. Capability errors and unverifiable output are
//! retried under the capability policy and then degrade to
//! [`DocumentType::Other`] with a low confidence, so one unreadable document
//! cannot hold up the rest of its referral.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use intake_contracts::{
    error::{IntakeError, IntakeResult},
    referral::DocumentType,
};
use intake_core::{call_with_retry, traits::ClassificationCapability, RetryPolicy};
use intake_verify::{outputs, OutputSchema, SchemaVerifier};

use crate::config::PipelineConfig;

/// Confidence reported when classification fell back to `other`.
pub const FALLBACK_CONFIDENCE: f64 = 0.1;

/// Outcome of classifying one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub document_type: DocumentType,
    pub confidence: f64,
    pub reasoning: Option<String>,
    /// Why the fallback was used, when it was.
    pub degraded: Option<String>,
}

impl Classification {
    fn fallback(reason: String) -> Self {
        Self {
            document_type: DocumentType::Other,
            confidence: FALLBACK_CONFIDENCE,
            reasoning: None,
            degraded: Some(reason),
        }
    }
}

#[derive(Deserialize)]
struct RawClassification {
    #[serde(rename = "type")]
    label: String,
    confidence: f64,
    #[serde(default)]
    reasoning: Option<String>,
}

/// The longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

pub struct ClassificationStage {
    capability: Arc<dyn ClassificationCapability>,
    verifier: SchemaVerifier,
    schema: OutputSchema,
    prefix_chars: usize,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ClassificationStage {
    pub fn new(capability: Arc<dyn ClassificationCapability>, config: &PipelineConfig) -> Self {
        Self {
            capability,
            verifier: outputs::capability_verifier(),
            schema: outputs::classification(),
            prefix_chars: config.classification.prefix_chars,
            timeout: config.capabilities.timeout(),
            retry: config.capabilities.retry(),
        }
    }

    /// Classify `text`. Always returns a classification.
    pub async fn classify(&self, text: &str) -> Classification {
        let prefix = truncate_chars(text, self.prefix_chars);
        match self.try_classify(prefix).await {
            Ok(classification) => {
                debug!(
                    document_type = classification.document_type.as_str(),
                    confidence = classification.confidence,
                    "document classified"
                );
                classification
            }
            Err(err) => {
                warn!(error = %err, "classification failed; falling back to other");
                Classification::fallback(err.to_string())
            }
        }
    }

    async fn try_classify(&self, prefix: &str) -> IntakeResult<Classification> {
        call_with_retry("classification", self.timeout, &self.retry, || self.classify_once(prefix)).await
    }

    async fn classify_once(&self, prefix: &str) -> IntakeResult<Classification> {
        let raw = self.capability.classify(prefix).await?;
        let decoded: RawClassification = self.verifier.decode("classification", raw, &self.schema)?;
        let document_type =
            DocumentType::from_label(&decoded.label).ok_or_else(|| IntakeError::MalformedOutput {
                capability: "classification".to_string(),
                reason: format!("unknown document type '{}'", decoded.label),
            })?;
        Ok(Classification {
            document_type,
            confidence: decoded.confidence,
            reasoning: decoded.reasoning,
            degraded: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Replays scripted answers in order, repeating the last one.
    struct Scripted {
        answers: Vec<IntakeResult<Value>>,
        calls: AtomicU32,
        seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(answers: Vec<IntakeResult<Value>>) -> Arc<Self> {
            Arc::new(Self {
                answers,
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ClassificationCapability for Scripted {
        async fn classify(&self, text: &str) -> IntakeResult<Value> {
            self.seen.lock().unwrap().push(text.to_string());
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            self.answers[n.min(self.answers.len() - 1)].clone()
        }
    }

    fn fast_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.capabilities.max_attempts = 2;
        config.capabilities.backoff_base_ms = 1;
        config
    }

    fn unavailable() -> IntakeError {
        IntakeError::Provider {
            provider: "classifier".to_string(),
            reason: "unavailable".to_string(),
        }
    }

    // ── Truncation ────────────────────────────────────────────────────────────

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[tokio::test]
    async fn only_the_prefix_is_sent() {
        let capability = Scripted::new(vec![Ok(json!({ "type": "labs", "confidence": 0.9 }))]);
        let mut config = fast_config();
        config.classification.prefix_chars = 5;
        let stage = ClassificationStage::new(capability.clone(), &config);

        stage.classify("0123456789").await;
        assert_eq!(capability.seen.lock().unwrap()[0], "01234");
    }

    // ── Outcomes ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn upper_case_labels_are_accepted() {
        let capability = Scripted::new(vec![Ok(json!({
            "type": "DISCHARGE_SUMMARY",
            "confidence": 0.92,
            "reasoning": "Header reads Discharge Summary"
        }))]);
        let stage = ClassificationStage::new(capability, &fast_config());

        let result = stage.classify("DISCHARGE SUMMARY ...").await;
        assert_eq!(result.document_type, DocumentType::DischargeSummary);
        assert_eq!(result.confidence, 0.92);
        assert!(result.degraded.is_none());
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let capability = Scripted::new(vec![
            Err(unavailable()),
            Ok(json!({ "type": "face_sheet", "confidence": 0.8 })),
        ]);
        let stage = ClassificationStage::new(capability.clone(), &fast_config());

        let result = stage.classify("FACE SHEET").await;
        assert_eq!(result.document_type, DocumentType::FaceSheet);
        assert_eq!(capability.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_failure_falls_back_to_other() {
        let capability = Scripted::new(vec![Err(unavailable())]);
        let stage = ClassificationStage::new(capability, &fast_config());

        let result = stage.classify("???").await;
        assert_eq!(result.document_type, DocumentType::Other);
        assert_eq!(result.confidence, 0.1);
        assert!(result.degraded.is_some());
    }

    #[tokio::test]
    async fn label_outside_closed_set_falls_back() {
        let capability = Scripted::new(vec![Ok(json!({ "type": "radiology", "confidence": 0.99 }))]);
        let stage = ClassificationStage::new(capability, &fast_config());

        let result = stage.classify("CT CHEST").await;
        assert_eq!(result.document_type, DocumentType::Other);
        assert!(result.degraded.unwrap().contains("radiology"));
    }

    #[tokio::test]
    async fn out_of_range_confidence_falls_back() {
        let capability = Scripted::new(vec![Ok(json!({ "type": "labs", "confidence": 7 }))]);
        let stage = ClassificationStage::new(capability, &fast_config());

        let result = stage.classify("CBC").await;
        assert_eq!(result.document_type, DocumentType::Other);
    }
}
