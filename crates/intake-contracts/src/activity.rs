//! Processing activity records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ReferralId;
use crate::jobs::Stage;

/// One stage outcome for a referral, written after every job attempt that
/// changes pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub referral_id: ReferralId,
    pub stage: Stage,
    /// Short verb phrase, e.g. `ocr_completed` or `document_uploaded`.
    pub action: String,
    pub success: bool,
    pub summary: String,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn success(
        referral_id: ReferralId,
        stage: Stage,
        action: impl Into<String>,
        summary: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            referral_id,
            stage,
            action: action.into(),
            success: true,
            summary: summary.into(),
            duration_ms,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn failure(
        referral_id: ReferralId,
        stage: Stage,
        action: impl Into<String>,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        let error = error.into();
        Self {
            referral_id,
            stage,
            action: action.into(),
            success: false,
            summary: format!("{} failed", stage),
            duration_ms,
            error: Some(error),
            recorded_at: Utc::now(),
        }
    }
}
