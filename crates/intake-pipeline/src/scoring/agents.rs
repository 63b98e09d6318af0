//! Per-agent defaults and finding construction.
//!
//! A scoring agent that cannot produce verified output is replaced by a
//! conservative default: mid-range scores, empty lists and one low-severity
//! `ai_processing_error` finding naming the agent.

use intake_contracts::{
    criteria::{CriteriaEvaluation, CriteriaMatch},
    error::IntakeError,
    risk::{RiskFinding, RiskSeverity, ScoringAgent},
    scoring::{
        AdmissionsAssessment, AdmissionsJudgment, ClinicalAssessment, DocumentQuality,
        DocumentationAssessment, PayerAnalysis, PdpmComponent, PdpmComponents,
        ReimbursementAssessment,
    },
};

/// Score used for any agent output that is unavailable.
pub const DEFAULT_SCORE: u8 = 50;

/// The informational finding raised when an agent falls back to defaults.
pub fn processing_error(agent: ScoringAgent, error: &IntakeError) -> RiskFinding {
    RiskFinding {
        category: "system".to_string(),
        flag_type: "ai_processing_error".to_string(),
        severity: RiskSeverity::Low,
        is_deal_breaker: false,
        title: format!("{} analysis unavailable", agent_title(agent)),
        description: format!("{error}. Default values were used for this part of the assessment."),
        recommendation: Some("Review this part of the referral manually.".to_string()),
        source_agent: Some(agent),
    }
}

fn agent_title(agent: ScoringAgent) -> &'static str {
    match agent {
        ScoringAgent::CriteriaEngine => "Criteria",
        ScoringAgent::Admissions => "Admissions",
        ScoringAgent::Reimbursement => "Reimbursement",
        ScoringAgent::Clinical => "Clinical complexity",
        ScoringAgent::Documentation => "Documentation",
    }
}

/// Stamp `agent` onto findings returned by a capability.
pub fn tag(findings: Vec<RiskFinding>, agent: ScoringAgent) -> Vec<RiskFinding> {
    findings
        .into_iter()
        .map(|finding| RiskFinding {
            source_agent: Some(agent),
            ..finding
        })
        .collect()
}

fn criteria_finding(m: &CriteriaMatch) -> RiskFinding {
    let flag_type = if m.is_deal_breaker {
        "criteria_deal_breaker"
    } else {
        "criteria_warning"
    };
    RiskFinding {
        category: m.category.clone(),
        flag_type: flag_type.to_string(),
        severity: m.severity,
        is_deal_breaker: m.is_deal_breaker,
        title: m.criteria_name.clone(),
        description: m.reason.clone().unwrap_or_default(),
        recommendation: None,
        source_agent: Some(ScoringAgent::CriteriaEngine),
    }
}

// ── Admissions ────────────────────────────────────────────────────────────────

/// Combine the rule engine with the AI judgment.
///
/// The fit score is the rounded mean of the rule total and the judgment's
/// fit score, with [`DEFAULT_SCORE`] standing in for a missing judgment.
/// Rule-engine deal-breakers and warnings are always kept; everything the
/// judgment lists as a deal-breaker is treated as one.
pub fn combine_admissions(
    evaluation: CriteriaEvaluation,
    judgment: Option<AdmissionsJudgment>,
) -> AdmissionsAssessment {
    let judgment_score = judgment.as_ref().map_or(DEFAULT_SCORE, |j| j.fit_score.min(100));
    let fit_score = ((f64::from(evaluation.total_score) + f64::from(judgment_score)) / 2.0).round() as u8;

    let mut deal_breakers: Vec<RiskFinding> = evaluation.deal_breakers.iter().map(criteria_finding).collect();
    let mut warnings: Vec<RiskFinding> = evaluation.warnings.iter().map(criteria_finding).collect();
    let mut positive_factors = Vec::new();

    if let Some(judgment) = judgment {
        deal_breakers.extend(
            tag(judgment.deal_breakers, ScoringAgent::Admissions)
                .into_iter()
                .map(|finding| RiskFinding {
                    is_deal_breaker: true,
                    ..finding
                }),
        );
        warnings.extend(tag(judgment.warnings, ScoringAgent::Admissions));
        positive_factors = judgment.positive_factors;
    }

    AdmissionsAssessment {
        fit_score,
        criteria_score: evaluation.total_score,
        judgment_score,
        criteria_matches: evaluation.matches,
        deal_breakers,
        warnings,
        positive_factors,
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

pub fn default_reimbursement() -> ReimbursementAssessment {
    ReimbursementAssessment {
        pdpm_components: PdpmComponents {
            nursing: PdpmComponent::unknown(200.0),
            pt: PdpmComponent::unknown(50.0),
            ot: PdpmComponent::unknown(40.0),
            slp: PdpmComponent::unknown(20.0),
            nta: PdpmComponent::unknown(50.0),
        },
        estimated_daily_rate: 360.0,
        estimated_los_days: 20,
        estimated_total_revenue: 7_200.0,
        financial_score: DEFAULT_SCORE,
        financial_flags: Vec::new(),
        payer_analysis: PayerAnalysis {
            payer_type: "Unknown".to_string(),
            risk_level: "medium".to_string(),
            notes: "Reimbursement analysis unavailable".to_string(),
        },
    }
}

pub fn default_clinical() -> ClinicalAssessment {
    ClinicalAssessment {
        clinical_complexity_score: 5,
        operational_score: DEFAULT_SCORE,
        special_care_needs: Vec::new(),
        comorbidity_risks: Vec::new(),
        equipment_needs: Vec::new(),
        staffing_considerations: Vec::new(),
        estimated_nursing_hours_per_day: 2.0,
    }
}

pub fn default_documentation() -> DocumentationAssessment {
    DocumentationAssessment {
        patient_summary: "Patient summary unavailable.".to_string(),
        missing_documents: Vec::new(),
        evidence_citations: Vec::new(),
        document_quality: DocumentQuality {
            completeness: DEFAULT_SCORE,
            legibility: DEFAULT_SCORE,
            recency: DEFAULT_SCORE,
        },
        key_findings: Vec::new(),
    }
}
