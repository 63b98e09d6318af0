//! Job payloads carried by the stage queues.
//!
//! Payloads are identifiers only. Workers always re-read current state from
//! the store, so a job delivered twice or late acts on what is true now.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{AttemptId, DocumentId, ReferralId};

/// A pipeline stage, used for logging and the activity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Upload,
    Ocr,
    Classification,
    Extraction,
    Scoring,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Ocr => "ocr",
            Stage::Classification => "classification",
            Stage::Extraction => "extraction",
            Stage::Scoring => "scoring",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dequeue priority. `High` jobs are taken before any ready `Normal` job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    #[default]
    Normal,
    High,
}

/// Document jobs belong to the attempt that enqueued them and do nothing
/// once a newer attempt has taken over the referral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrJob {
    pub referral_id: ReferralId,
    pub document_id: DocumentId,
    pub attempt_id: AttemptId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationJob {
    pub referral_id: ReferralId,
    pub document_id: DocumentId,
    pub attempt_id: AttemptId,
}

/// Enqueued once per claimed document-set revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionJob {
    pub referral_id: ReferralId,
    pub attempt_id: AttemptId,
    /// The revision the claim was taken at.
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringJob {
    pub referral_id: ReferralId,
    pub attempt_id: AttemptId,
}
