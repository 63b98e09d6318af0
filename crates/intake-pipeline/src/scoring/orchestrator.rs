//! Fan-out/fan-in over the four scoring agents.
//!
//! ```text
//!                 ┌─ admissions (rule engine + judgment) ─┐
//! record ─────────┼─ reimbursement ───────────────────────┼──► aggregate ──► recommendation
//!                 ├─ clinical complexity ─────────────────┤                 + findings
//!                 └─ documentation ───────────────────────┘
//! ```
//!
//! The four agents run concurrently. Each one is isolated: a failure is
//! retried under the capability policy and then replaced by that agent's
//! default, so the other three always contribute.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use intake_contracts::{
    criteria::FacilityCriteria,
    error::IntakeResult,
    ids::{AttemptId, ReferralId},
    patient::ExtractedPatientData,
    referral::DocumentType,
    risk::{RiskFinding, ScoringAgent},
    scoring::{
        AdmissionsAssessment, AdmissionsJudgment, AiRecommendation, ClinicalAssessment,
        DocumentationAssessment, ReimbursementAssessment,
    },
};
use intake_core::{
    call_with_retry,
    traits::{AdmissionsCapability, ClinicalCapability, DocumentationCapability, ReimbursementCapability},
    RetryPolicy,
};
use intake_verify::{outputs, OutputSchema, SchemaVerifier};

use crate::capabilities::Capabilities;
use crate::config::PipelineConfig;
use crate::scoring::{agents, aggregate, rationale};

/// Everything scoring needs about one referral.
#[derive(Debug, Clone, Copy)]
pub struct ScoringRequest<'a> {
    pub referral_id: ReferralId,
    pub attempt_id: AttemptId,
    pub record: &'a ExtractedPatientData,
    /// The facility's active criteria, ascending by priority.
    pub criteria: &'a [FacilityCriteria],
    pub document_types: &'a [DocumentType],
}

/// The aggregated result plus every agent's assessment.
#[derive(Debug, Clone)]
pub struct ScoringOutcome {
    pub recommendation: AiRecommendation,
    /// Findings from every agent, to be persisted as risk flags.
    pub findings: Vec<RiskFinding>,
    pub admissions: AdmissionsAssessment,
    pub reimbursement: ReimbursementAssessment,
    pub clinical: ClinicalAssessment,
    pub documentation: DocumentationAssessment,
    /// Agents that fell back to defaults.
    pub degraded: Vec<ScoringAgent>,
}

pub struct ScoringOrchestrator {
    admissions: Arc<dyn AdmissionsCapability>,
    reimbursement: Arc<dyn ReimbursementCapability>,
    clinical: Arc<dyn ClinicalCapability>,
    documentation: Arc<dyn DocumentationCapability>,
    verifier: SchemaVerifier,
    admissions_schema: OutputSchema,
    reimbursement_schema: OutputSchema,
    clinical_schema: OutputSchema,
    documentation_schema: OutputSchema,
    timeout: Duration,
    retry: RetryPolicy,
    model_version: String,
}

/// Await one raw capability answer and decode it against `schema`.
async fn verified<T, F>(verifier: &SchemaVerifier, capability: &str, schema: &OutputSchema, raw: F) -> IntakeResult<T>
where
    T: DeserializeOwned,
    F: Future<Output = IntakeResult<Value>>,
{
    verifier.decode(capability, raw.await?, schema)
}

impl ScoringOrchestrator {
    pub fn new(capabilities: &Capabilities, config: &PipelineConfig) -> Self {
        Self {
            admissions: capabilities.admissions.clone(),
            reimbursement: capabilities.reimbursement.clone(),
            clinical: capabilities.clinical.clone(),
            documentation: capabilities.documentation.clone(),
            verifier: outputs::capability_verifier(),
            admissions_schema: outputs::admissions(),
            reimbursement_schema: outputs::reimbursement(),
            clinical_schema: outputs::clinical(),
            documentation_schema: outputs::documentation(),
            timeout: config.capabilities.timeout(),
            retry: config.capabilities.retry(),
            model_version: config.scoring.model_version.clone(),
        }
    }

    /// Score one referral. Never fails; degraded agents are reported in the
    /// outcome and as `ai_processing_error` findings.
    pub async fn score(&self, request: ScoringRequest<'_>) -> ScoringOutcome {
        let started = Instant::now();
        let record = request.record;

        // ── Fan out ──────────────────────────────────────────────────────────
        let evaluation = intake_criteria::evaluate(record, request.criteria);
        let (judgment, reimbursement, clinical, documentation) = tokio::join!(
            self.judge(record, request.criteria),
            self.assess_reimbursement(record),
            self.assess_clinical(record),
            self.assess_documentation(record, request.document_types),
        );

        // ── Fan in ───────────────────────────────────────────────────────────
        let mut findings = Vec::new();
        let mut degraded = Vec::new();

        let judgment = match judgment {
            Ok(judgment) => Some(judgment),
            Err(err) => {
                warn!(referral_id = %request.referral_id, agent = "admissions", error = %err, "agent degraded");
                findings.push(agents::processing_error(ScoringAgent::Admissions, &err));
                degraded.push(ScoringAgent::Admissions);
                None
            }
        };
        let admissions = agents::combine_admissions(evaluation, judgment);
        findings.extend(admissions.deal_breakers.iter().cloned());
        findings.extend(admissions.warnings.iter().cloned());

        let reimbursement = match reimbursement {
            Ok(assessment) => assessment,
            Err(err) => {
                warn!(referral_id = %request.referral_id, agent = "reimbursement", error = %err, "agent degraded");
                findings.push(agents::processing_error(ScoringAgent::Reimbursement, &err));
                degraded.push(ScoringAgent::Reimbursement);
                agents::default_reimbursement()
            }
        };
        findings.extend(agents::tag(reimbursement.financial_flags.clone(), ScoringAgent::Reimbursement));

        let clinical = match clinical {
            Ok(assessment) => assessment,
            Err(err) => {
                warn!(referral_id = %request.referral_id, agent = "clinical", error = %err, "agent degraded");
                findings.push(agents::processing_error(ScoringAgent::Clinical, &err));
                degraded.push(ScoringAgent::Clinical);
                agents::default_clinical()
            }
        };
        findings.extend(agents::tag(clinical.comorbidity_risks.clone(), ScoringAgent::Clinical));

        let documentation = match documentation {
            Ok(assessment) => assessment,
            Err(err) => {
                warn!(referral_id = %request.referral_id, agent = "documentation", error = %err, "agent degraded");
                findings.push(agents::processing_error(ScoringAgent::Documentation, &err));
                degraded.push(ScoringAgent::Documentation);
                agents::default_documentation()
            }
        };

        // ── Aggregate ────────────────────────────────────────────────────────
        let overall = aggregate::overall_score(
            admissions.fit_score,
            reimbursement.financial_score,
            clinical.operational_score,
        );
        let has_deal_breaker = findings.iter().any(|f| f.is_deal_breaker);
        let recommendation = aggregate::recommendation_for(overall, has_deal_breaker);
        let detailed_rationale =
            rationale::detailed_rationale(recommendation, &admissions, &reimbursement, &clinical, &documentation);

        info!(
            referral_id = %request.referral_id,
            recommendation = %recommendation,
            overall,
            findings = findings.len(),
            degraded = degraded.len(),
            "referral scored"
        );

        let recommendation = AiRecommendation {
            referral_id: request.referral_id,
            attempt_id: request.attempt_id,
            recommendation,
            confidence_score: aggregate::confidence_for(overall),
            overall_score: overall,
            clinical_fit_score: admissions.fit_score,
            financial_fit_score: reimbursement.financial_score,
            operational_fit_score: clinical.operational_score,
            pdpm_components: reimbursement.pdpm_components.clone(),
            estimated_daily_rate: reimbursement.estimated_daily_rate,
            estimated_los_days: reimbursement.estimated_los_days,
            estimated_total_revenue: reimbursement.estimated_total_revenue,
            clinical_complexity_score: clinical.clinical_complexity_score,
            estimated_nursing_hours_per_day: clinical.estimated_nursing_hours_per_day,
            summary: documentation.patient_summary.clone(),
            detailed_rationale,
            positive_factors: admissions.positive_factors.clone(),
            missing_info: documentation.missing_documents.clone(),
            review_questions: clinical.special_care_needs.clone(),
            model_version: self.model_version.clone(),
            processing_time_ms: started.elapsed().as_millis() as u64,
            generated_at: Utc::now(),
        };

        ScoringOutcome {
            recommendation,
            findings,
            admissions,
            reimbursement,
            clinical,
            documentation,
            degraded,
        }
    }

    // ── Agents ────────────────────────────────────────────────────────────────

    async fn judge(
        &self,
        record: &ExtractedPatientData,
        criteria: &[FacilityCriteria],
    ) -> IntakeResult<AdmissionsJudgment> {
        call_with_retry("admissions", self.timeout, &self.retry, || {
            verified(
                &self.verifier,
                "admissions",
                &self.admissions_schema,
                self.admissions.assess(record, criteria),
            )
        })
        .await
    }

    async fn assess_reimbursement(&self, record: &ExtractedPatientData) -> IntakeResult<ReimbursementAssessment> {
        call_with_retry("reimbursement", self.timeout, &self.retry, || {
            verified(
                &self.verifier,
                "reimbursement",
                &self.reimbursement_schema,
                self.reimbursement.assess(record),
            )
        })
        .await
    }

    async fn assess_clinical(&self, record: &ExtractedPatientData) -> IntakeResult<ClinicalAssessment> {
        call_with_retry("clinical", self.timeout, &self.retry, || {
            verified(&self.verifier, "clinical", &self.clinical_schema, self.clinical.assess(record))
        })
        .await
    }

    async fn assess_documentation(
        &self,
        record: &ExtractedPatientData,
        document_types: &[DocumentType],
    ) -> IntakeResult<DocumentationAssessment> {
        call_with_retry("documentation", self.timeout, &self.retry, || {
            verified(
                &self.verifier,
                "documentation",
                &self.documentation_schema,
                self.documentation.assess(record, document_types),
            )
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use intake_contracts::{
        error::IntakeError, patient::DocumentText, referral::BlobLocator, risk::RiskSeverity,
        scoring::Recommendation,
    };
    use intake_core::traits::{
        BlobStorage, ClassificationCapability, ExtractionCapability, OcrOutput, OcrProvider,
    };

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Answers every agent call with a fixed value.
    struct Agents {
        admissions: IntakeResult<Value>,
        reimbursement: IntakeResult<Value>,
        clinical: IntakeResult<Value>,
        documentation: IntakeResult<Value>,
    }

    #[async_trait]
    impl AdmissionsCapability for Agents {
        async fn assess(&self, _: &ExtractedPatientData, _: &[FacilityCriteria]) -> IntakeResult<Value> {
            self.admissions.clone()
        }
    }

    #[async_trait]
    impl ReimbursementCapability for Agents {
        async fn assess(&self, _: &ExtractedPatientData) -> IntakeResult<Value> {
            self.reimbursement.clone()
        }
    }

    #[async_trait]
    impl ClinicalCapability for Agents {
        async fn assess(&self, _: &ExtractedPatientData) -> IntakeResult<Value> {
            self.clinical.clone()
        }
    }

    #[async_trait]
    impl DocumentationCapability for Agents {
        async fn assess(&self, _: &ExtractedPatientData, _: &[DocumentType]) -> IntakeResult<Value> {
            self.documentation.clone()
        }
    }

    /// Stands in for the capabilities scoring never calls.
    struct Unused;

    fn unused() -> IntakeError {
        IntakeError::InvalidRequest {
            reason: "not used by scoring".to_string(),
        }
    }

    #[async_trait]
    impl BlobStorage for Unused {
        async fn put(&self, _: &BlobLocator, _: Vec<u8>, _: &str) -> IntakeResult<()> {
            Err(unused())
        }
        async fn get(&self, _: &BlobLocator) -> IntakeResult<Vec<u8>> {
            Err(unused())
        }
        async fn presigned_get(&self, _: &BlobLocator, _: Duration) -> IntakeResult<String> {
            Err(unused())
        }
    }

    #[async_trait]
    impl OcrProvider for Unused {
        async fn analyze(&self, _: &[u8], _: &str) -> IntakeResult<OcrOutput> {
            Err(unused())
        }
    }

    #[async_trait]
    impl ClassificationCapability for Unused {
        async fn classify(&self, _: &str) -> IntakeResult<Value> {
            Err(unused())
        }
    }

    #[async_trait]
    impl ExtractionCapability for Unused {
        fn model(&self) -> &str {
            "unused"
        }
        async fn extract(&self, _: &[DocumentText]) -> IntakeResult<Value> {
            Err(unused())
        }
    }

    fn orchestrator(agents: Agents) -> ScoringOrchestrator {
        let agents = Arc::new(agents);
        let unused = Arc::new(Unused);
        let capabilities = Capabilities {
            blobs: unused.clone(),
            ocr: unused.clone(),
            classifier: unused.clone(),
            extractor: unused,
            admissions: agents.clone(),
            reimbursement: agents.clone(),
            clinical: agents.clone(),
            documentation: agents,
        };
        let mut config = PipelineConfig::default();
        config.capabilities.backoff_base_ms = 1;
        ScoringOrchestrator::new(&capabilities, &config)
    }

    fn healthy() -> Agents {
        let component = |rate: f64| json!({ "category": "TA", "dailyRate": rate });
        Agents {
            admissions: Ok(json!({
                "fitScore": 76,
                "positiveFactors": ["Motivated for rehab"],
                "warnings": [{
                    "category": "clinical", "flagType": "fall_risk", "severity": "medium",
                    "title": "High fall risk"
                }]
            })),
            reimbursement: Ok(json!({
                "pdpmComponents": {
                    "nursing": component(250.0), "pt": component(90.0), "ot": component(85.0),
                    "slp": component(30.0), "nta": component(80.0)
                },
                "estimatedDailyRate": 535.0,
                "estimatedLosDays": 21,
                "estimatedTotalRevenue": 11235.0,
                "financialScore": 95,
                "payerAnalysis": { "payerType": "Medicare A", "riskLevel": "low" }
            })),
            clinical: Ok(json!({
                "clinicalComplexityScore": 4,
                "operationalScore": 90,
                "specialCareNeeds": ["Insulin sliding scale"],
                "estimatedNursingHoursPerDay": 3.5
            })),
            documentation: Ok(json!({
                "patientSummary": "82-year-old after hip ORIF, good rehab candidate.",
                "missingDocuments": ["Recent labs"],
                "documentQuality": { "completeness": 80, "legibility": 90, "recency": 85 }
            })),
        }
    }

    fn provider_down() -> IntakeResult<Value> {
        Err(IntakeError::Provider {
            provider: "agent".to_string(),
            reason: "unavailable".to_string(),
        })
    }

    fn criterion(json: Value) -> FacilityCriteria {
        serde_json::from_value(json).unwrap()
    }

    async fn score(orchestrator: &ScoringOrchestrator, criteria: &[FacilityCriteria]) -> ScoringOutcome {
        let record = ExtractedPatientData::default();
        orchestrator
            .score(ScoringRequest {
                referral_id: ReferralId::new(),
                attempt_id: AttemptId::new(),
                record: &record,
                criteria,
                document_types: &[DocumentType::DischargeSummary],
            })
            .await
    }

    // ── Aggregation ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn healthy_agents_aggregate_to_strong_accept() {
        let outcome = score(&orchestrator(healthy()), &[]).await;
        let rec = &outcome.recommendation;

        assert_eq!(rec.clinical_fit_score, 88, "round((100 + 76) / 2)");
        assert_eq!(rec.financial_fit_score, 95);
        assert_eq!(rec.operational_fit_score, 90);
        assert_eq!(rec.overall_score, 91);
        assert_eq!(rec.recommendation, Recommendation::StrongAccept);
        assert!((rec.confidence_score - 0.919).abs() < 1e-9);

        assert_eq!(rec.summary, "82-year-old after hip ORIF, good rehab candidate.");
        assert_eq!(rec.missing_info, vec!["Recent labs".to_string()]);
        assert_eq!(rec.review_questions, vec!["Insulin sliding scale".to_string()]);
        assert_eq!(rec.positive_factors, vec!["Motivated for rehab".to_string()]);
        assert!(rec.detailed_rationale.starts_with("## Recommendation: STRONG_ACCEPT"));
        assert!(outcome.degraded.is_empty());
    }

    #[tokio::test]
    async fn findings_are_tagged_by_agent() {
        let outcome = score(&orchestrator(healthy()), &[]).await;
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].source_agent, Some(ScoringAgent::Admissions));
        assert_eq!(outcome.findings[0].title, "High fall risk");
    }

    #[tokio::test]
    async fn criteria_deal_breaker_forces_decline() {
        let criteria = [criterion(json!({
            "id": "no-dialysis",
            "name": "No dialysis",
            "category": "clinical",
            "rule": { "field": "careRequirements.requiresDialysis", "operator": "is_not_null" },
            "is_deal_breaker": true
        }))];

        let outcome = score(&orchestrator(healthy()), &criteria).await;
        assert_eq!(outcome.recommendation.recommendation, Recommendation::Decline);
        assert!(outcome.findings.iter().any(|f| f.is_deal_breaker
            && f.source_agent == Some(ScoringAgent::CriteriaEngine)
            && f.severity == RiskSeverity::Critical));
    }

    // ── Degradation ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn one_failing_agent_does_not_abort_the_others() {
        let mut agents = healthy();
        agents.reimbursement = provider_down();
        let outcome = score(&orchestrator(agents), &[]).await;

        assert_eq!(outcome.degraded, vec![ScoringAgent::Reimbursement]);
        assert_eq!(outcome.recommendation.financial_fit_score, agents::DEFAULT_SCORE);
        assert_eq!(outcome.recommendation.estimated_daily_rate, 360.0);
        assert_eq!(outcome.recommendation.operational_fit_score, 90);

        let error_flags: Vec<&RiskFinding> = outcome
            .findings
            .iter()
            .filter(|f| f.flag_type == "ai_processing_error")
            .collect();
        assert_eq!(error_flags.len(), 1);
        assert_eq!(error_flags[0].source_agent, Some(ScoringAgent::Reimbursement));
    }

    #[tokio::test]
    async fn all_agents_failing_yields_mid_range_defaults() {
        let agents = Agents {
            admissions: provider_down(),
            reimbursement: provider_down(),
            clinical: provider_down(),
            documentation: Ok(json!({ "patientSummary": "  ", "documentQuality": {
                "completeness": 1, "legibility": 1, "recency": 1 } })),
        };
        let outcome = score(&orchestrator(agents), &[]).await;
        let rec = &outcome.recommendation;

        assert_eq!(outcome.degraded.len(), 4, "blank summary fails verification");
        assert_eq!(rec.clinical_fit_score, 75, "round((100 + 50) / 2)");
        assert_eq!(rec.overall_score, 60);
        assert_eq!(rec.recommendation, Recommendation::AcceptWithConditions);
        assert_eq!(
            outcome.findings.iter().filter(|f| f.flag_type == "ai_processing_error").count(),
            4
        );
        assert!(outcome.findings.iter().all(|f| !f.is_deal_breaker));
    }
}
