//! Scoring agent outputs and the aggregated admission recommendation.
//!
//! The `*Assessment` types are what each scoring capability returns once its
//! raw output has been verified and decoded. List fields default to empty so
//! a capability may omit what it has nothing to say about.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::criteria::CriteriaMatch;
use crate::ids::{AttemptId, ReferralId};
use crate::risk::RiskFinding;

/// Final admission recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongAccept,
    Accept,
    AcceptWithConditions,
    ReviewRequired,
    Decline,
}

impl Recommendation {
    pub fn as_str(self) -> &'static str {
        match self {
            Recommendation::StrongAccept => "strong_accept",
            Recommendation::Accept => "accept",
            Recommendation::AcceptWithConditions => "accept_with_conditions",
            Recommendation::ReviewRequired => "review_required",
            Recommendation::Decline => "decline",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Admissions ────────────────────────────────────────────────────────────────

/// The holistic judgment half of admissions scoring, as returned by the
/// admissions capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionsJudgment {
    pub fit_score: u8,
    #[serde(default)]
    pub deal_breakers: Vec<RiskFinding>,
    #[serde(default)]
    pub warnings: Vec<RiskFinding>,
    #[serde(default)]
    pub positive_factors: Vec<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Admissions/clinical-fit result: rule engine and AI judgment combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionsAssessment {
    /// Combined clinical-fit score, 0–100.
    pub fit_score: u8,
    /// The rule engine's clamped total.
    pub criteria_score: u8,
    /// The AI judgment's fit score, or the mid-range default when it failed.
    pub judgment_score: u8,
    pub criteria_matches: Vec<CriteriaMatch>,
    pub deal_breakers: Vec<RiskFinding>,
    pub warnings: Vec<RiskFinding>,
    pub positive_factors: Vec<String>,
}

// ── Reimbursement ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdpmComponent {
    pub category: String,
    pub daily_rate: f64,
}

impl PdpmComponent {
    pub fn unknown(daily_rate: f64) -> Self {
        Self {
            category: "Unknown".to_string(),
            daily_rate,
        }
    }
}

/// PDPM-style per-component daily rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdpmComponents {
    pub nursing: PdpmComponent,
    pub pt: PdpmComponent,
    pub ot: PdpmComponent,
    pub slp: PdpmComponent,
    pub nta: PdpmComponent,
}

impl PdpmComponents {
    pub fn total_daily_rate(&self) -> f64 {
        self.nursing.daily_rate
            + self.pt.daily_rate
            + self.ot.daily_rate
            + self.slp.daily_rate
            + self.nta.daily_rate
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayerAnalysis {
    pub payer_type: String,
    pub risk_level: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReimbursementAssessment {
    pub pdpm_components: PdpmComponents,
    pub estimated_daily_rate: f64,
    pub estimated_los_days: u32,
    pub estimated_total_revenue: f64,
    pub financial_score: u8,
    #[serde(default)]
    pub financial_flags: Vec<RiskFinding>,
    pub payer_analysis: PayerAnalysis,
}

// ── Clinical complexity ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalAssessment {
    /// 1–10, where 10 is most complex.
    pub clinical_complexity_score: u8,
    pub operational_score: u8,
    #[serde(default)]
    pub special_care_needs: Vec<String>,
    #[serde(default)]
    pub comorbidity_risks: Vec<RiskFinding>,
    #[serde(default)]
    pub equipment_needs: Vec<String>,
    #[serde(default)]
    pub staffing_considerations: Vec<String>,
    pub estimated_nursing_hours_per_day: f64,
}

// ── Documentation quality ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceCitation {
    pub claim: String,
    pub source: String,
    #[serde(default)]
    pub excerpt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentQuality {
    pub completeness: u8,
    pub legibility: u8,
    pub recency: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentationAssessment {
    pub patient_summary: String,
    #[serde(default)]
    pub missing_documents: Vec<String>,
    #[serde(default)]
    pub evidence_citations: Vec<EvidenceCitation>,
    pub document_quality: DocumentQuality,
    #[serde(default)]
    pub key_findings: Vec<String>,
}

// ── Aggregate ─────────────────────────────────────────────────────────────────

/// The one authoritative recommendation for a referral. Upserted.
///
/// `overall_score`, `recommendation` and `confidence_score` are pure
/// functions of the three component scores and the presence of deal-breakers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiRecommendation {
    pub referral_id: ReferralId,
    pub attempt_id: AttemptId,
    pub recommendation: Recommendation,
    pub confidence_score: f64,
    pub overall_score: u8,
    pub clinical_fit_score: u8,
    pub financial_fit_score: u8,
    pub operational_fit_score: u8,
    pub pdpm_components: PdpmComponents,
    pub estimated_daily_rate: f64,
    pub estimated_los_days: u32,
    pub estimated_total_revenue: f64,
    pub clinical_complexity_score: u8,
    pub estimated_nursing_hours_per_day: f64,
    /// Patient summary from documentation analysis.
    pub summary: String,
    /// Markdown rationale assembled from all four agents.
    pub detailed_rationale: String,
    pub positive_factors: Vec<String>,
    pub missing_info: Vec<String>,
    /// Special care needs surfaced for the admissions reviewer.
    pub review_questions: Vec<String>,
    pub model_version: String,
    pub processing_time_ms: u64,
    pub generated_at: DateTime<Utc>,
}
