//! Risk findings raised by scoring and the persisted flags built from them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AttemptId, ReferralId, RiskFlagId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskSeverity::Low => "low",
            RiskSeverity::Medium => "medium",
            RiskSeverity::High => "high",
            RiskSeverity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Which part of scoring raised a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringAgent {
    /// Deterministic facility criteria evaluation.
    CriteriaEngine,
    Admissions,
    Reimbursement,
    Clinical,
    Documentation,
}

impl ScoringAgent {
    pub fn as_str(self) -> &'static str {
        match self {
            ScoringAgent::CriteriaEngine => "criteria_engine",
            ScoringAgent::Admissions => "admissions",
            ScoringAgent::Reimbursement => "reimbursement",
            ScoringAgent::Clinical => "clinical",
            ScoringAgent::Documentation => "documentation",
        }
    }
}

impl fmt::Display for ScoringAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A risk raised during scoring, before it is persisted.
///
/// This is also the shape scoring capabilities return for their flag lists;
/// `source_agent` is stamped by the orchestrator, not by the capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFinding {
    pub category: String,
    pub flag_type: String,
    pub severity: RiskSeverity,
    #[serde(default)]
    pub is_deal_breaker: bool,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub source_agent: Option<ScoringAgent>,
}

/// Manual resolution of a flag by admissions staff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagResolution {
    pub resolved_by: String,
    pub notes: Option<String>,
    pub resolved_at: DateTime<Utc>,
}

/// A persisted risk flag.
///
/// Flags are appended, never replaced. Each carries the processing attempt
/// that produced it; only resolution fields change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFlag {
    pub id: RiskFlagId,
    pub referral_id: ReferralId,
    pub attempt_id: AttemptId,
    #[serde(flatten)]
    pub finding: RiskFinding,
    pub resolution: Option<FlagResolution>,
    pub created_at: DateTime<Utc>,
}

impl RiskFlag {
    pub fn from_finding(referral_id: ReferralId, attempt_id: AttemptId, finding: RiskFinding) -> Self {
        Self {
            id: RiskFlagId::new(),
            referral_id,
            attempt_id,
            finding,
            resolution: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}
