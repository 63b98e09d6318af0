//! The four stage workers.
//!
//! Each worker re-reads current state from the store before acting, so a
//! job that is delivered twice, late, or after a newer processing attempt
//! started acts on what is true now. Workers advance exactly one status
//! field on success and enqueue exactly one downstream job.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use intake_contracts::{
    activity::ActivityRecord,
    error::{IntakeError, IntakeResult},
    ids::{AttemptId, ReferralId},
    jobs::{ClassificationJob, ExtractionJob, JobPriority, OcrJob, ScoringJob, Stage},
    patient::ExtractedRecord,
    referral::{AiProcessingStatus, DocumentType, OcrStatus, ReferralStatus},
    risk::RiskFlag,
};
use intake_core::{
    traits::{ActivityRecorder, ReferralStore},
    with_timeout,
};

use crate::capabilities::Capabilities;
use crate::classification::ClassificationStage;
use crate::config::PipelineConfig;
use crate::coordinator::pool::StageHandler;
use crate::coordinator::queue::JobQueue;
use crate::extraction::{document_texts, patient_identity, ExtractionStage};
use crate::scoring::{ScoringOrchestrator, ScoringRequest};

/// One queue per stage.
pub struct StageQueues {
    pub ocr: Arc<JobQueue<OcrJob>>,
    pub classification: Arc<JobQueue<ClassificationJob>>,
    pub extraction: Arc<JobQueue<ExtractionJob>>,
    pub scoring: Arc<JobQueue<ScoringJob>>,
}

impl StageQueues {
    pub fn new() -> Self {
        Self {
            ocr: Arc::new(JobQueue::new("ocr")),
            classification: Arc::new(JobQueue::new("classification")),
            extraction: Arc::new(JobQueue::new("extraction")),
            scoring: Arc::new(JobQueue::new("scoring")),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.ocr.outstanding()
            + self.classification.outstanding()
            + self.extraction.outstanding()
            + self.scoring.outstanding()
    }

    /// Resolve once every queue is drained.
    ///
    /// Workers push downstream before completing their own job, so once a
    /// stage is idle everything it produced is already counted downstream.
    pub async fn wait_idle(&self) {
        loop {
            self.ocr.wait_idle().await;
            self.classification.wait_idle().await;
            self.extraction.wait_idle().await;
            self.scoring.wait_idle().await;
            if self.outstanding() == 0 {
                return;
            }
        }
    }
}

impl Default for StageQueues {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a worker needs, constructed once per service.
pub struct PipelineContext {
    pub store: Arc<dyn ReferralStore>,
    pub activity: Arc<dyn ActivityRecorder>,
    pub capabilities: Capabilities,
    pub queues: StageQueues,
    pub config: PipelineConfig,
}

impl PipelineContext {
    /// Append to the activity log. A failed append is logged and dropped;
    /// it never fails the stage that produced it.
    pub fn record(&self, record: ActivityRecord) {
        if let Err(e) = self.activity.record(&record) {
            warn!(
                referral_id = %record.referral_id,
                stage = %record.stage,
                action = %record.action,
                error = %e,
                "activity record dropped"
            );
        }
    }

    /// True when a newer attempt has taken over the referral, so an
    /// exhausted job from the old one must leave it alone. A failed read
    /// counts as current.
    fn superseded(&self, stage: Stage, referral_id: ReferralId, attempt_id: AttemptId) -> bool {
        match self.store.referral(referral_id) {
            Ok(referral) if referral.current_attempt != Some(attempt_id) => {
                debug!(
                    referral_id = %referral_id,
                    attempt_id = %attempt_id,
                    stage = %stage,
                    "exhausted job belongs to a superseded attempt; ignoring"
                );
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(referral_id = %referral_id, stage = %stage, error = %e, "could not read referral");
                false
            }
        }
    }

    /// Mark the referral failed after a stage gave up on it.
    fn fail(
        &self,
        stage: Stage,
        referral_id: ReferralId,
        status: AiProcessingStatus,
        lifecycle: Option<ReferralStatus>,
        message: &str,
    ) {
        match self.store.fail_referral(referral_id, status, message, lifecycle) {
            Ok(true) => {}
            Ok(false) => debug!(referral_id = %referral_id, stage = %stage, "referral already past this stage"),
            Err(e) => warn!(referral_id = %referral_id, stage = %stage, error = %e, "could not record failure"),
        }
        self.record(ActivityRecord::failure(
            referral_id,
            stage,
            format!("{stage}_failed"),
            message,
            0,
        ));
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

// ── OCR ───────────────────────────────────────────────────────────────────────

pub struct OcrWorker {
    ctx: Arc<PipelineContext>,
}

impl OcrWorker {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StageHandler for OcrWorker {
    type Job = OcrJob;

    fn stage(&self) -> Stage {
        Stage::Ocr
    }

    async fn handle(&self, job: &OcrJob) -> IntakeResult<()> {
        let started = Instant::now();
        let store = &self.ctx.store;
        let document = store.document(job.document_id)?;

        if store.referral(job.referral_id)?.current_attempt != Some(job.attempt_id) {
            debug!(document_id = %document.id, attempt_id = %job.attempt_id, "stale OCR job; skipping");
            return Ok(());
        }

        if document.ocr_status == OcrStatus::Completed {
            debug!(document_id = %document.id, "OCR already completed");
            if document.document_type.is_none() {
                self.ctx.queues.classification.push(
                    ClassificationJob {
                        referral_id: job.referral_id,
                        document_id: job.document_id,
                        attempt_id: job.attempt_id,
                    },
                    JobPriority::Normal,
                );
            }
            return Ok(());
        }

        store.mark_ocr_processing(document.id)?;
        store.advance_ai_status(job.referral_id, AiProcessingStatus::Processing)?;

        let timeout = self.ctx.config.capabilities.timeout();
        let bytes = with_timeout("blob_get", timeout, self.ctx.capabilities.blobs.get(&document.locator)).await?;
        let output = with_timeout(
            "ocr",
            timeout,
            self.ctx.capabilities.ocr.analyze(&bytes, &document.mime_type),
        )
        .await?;

        let characters = output.text.chars().count();
        let confidence = output.confidence;
        store.complete_ocr(document.id, output.text, confidence)?;

        info!(
            referral_id = %job.referral_id,
            document_id = %document.id,
            characters,
            confidence,
            "OCR completed"
        );
        self.ctx.record(ActivityRecord::success(
            job.referral_id,
            Stage::Ocr,
            "ocr_completed",
            format!(
                "Extracted {characters} characters from {} (confidence {confidence:.2})",
                document.original_filename
            ),
            elapsed_ms(started),
        ));

        self.ctx.queues.classification.push(
            ClassificationJob {
                referral_id: job.referral_id,
                document_id: job.document_id,
                attempt_id: job.attempt_id,
            },
            JobPriority::Normal,
        );
        Ok(())
    }

    fn on_exhausted(&self, job: &OcrJob, error: &IntakeError) {
        if self.ctx.superseded(Stage::Ocr, job.referral_id, job.attempt_id) {
            return;
        }
        if let Err(e) = self.ctx.store.fail_ocr(job.document_id) {
            warn!(document_id = %job.document_id, error = %e, "could not mark document failed");
        }
        let message = format!("OCR failed for document {}: {error}", job.document_id);
        self.ctx.fail(Stage::Ocr, job.referral_id, AiProcessingStatus::Failed, None, &message);
    }
}

// ── Classification ────────────────────────────────────────────────────────────

pub struct ClassificationWorker {
    ctx: Arc<PipelineContext>,
    stage: ClassificationStage,
}

impl ClassificationWorker {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        let stage = ClassificationStage::new(ctx.capabilities.classifier.clone(), &ctx.config);
        Self { ctx, stage }
    }
}

#[async_trait]
impl StageHandler for ClassificationWorker {
    type Job = ClassificationJob;

    fn stage(&self) -> Stage {
        Stage::Classification
    }

    async fn handle(&self, job: &ClassificationJob) -> IntakeResult<()> {
        let started = Instant::now();
        let store = &self.ctx.store;
        let document = store.document(job.document_id)?;

        if store.referral(job.referral_id)?.current_attempt != Some(job.attempt_id) {
            debug!(document_id = %document.id, attempt_id = %job.attempt_id, "stale classification job; skipping");
            return Ok(());
        }
        if document.ocr_status != OcrStatus::Completed {
            // Reset by a retry after this job was enqueued.
            debug!(document_id = %document.id, status = ?document.ocr_status, "document not OCR-complete; skipping");
            return Ok(());
        }

        if document.document_type.is_none() {
            let text = document.ocr_text.as_deref().ok_or_else(|| IntakeError::InvariantViolation {
                reason: format!("document {} is OCR-complete without text", document.id),
            })?;

            let classification = self.stage.classify(text).await;
            let written = store.set_classification(
                document.id,
                classification.document_type,
                classification.confidence,
            )?;

            if written {
                info!(
                    referral_id = %job.referral_id,
                    document_id = %document.id,
                    document_type = classification.document_type.as_str(),
                    confidence = classification.confidence,
                    "document classified"
                );
                let record = match &classification.degraded {
                    None => ActivityRecord::success(
                        job.referral_id,
                        Stage::Classification,
                        "document_classified",
                        format!(
                            "{} classified as {} ({:.0}% confidence)",
                            document.original_filename,
                            classification.document_type.as_str(),
                            classification.confidence * 100.0
                        ),
                        elapsed_ms(started),
                    ),
                    Some(reason) => ActivityRecord::failure(
                        job.referral_id,
                        Stage::Classification,
                        "classification_degraded",
                        format!("{} defaulted to other: {reason}", document.original_filename),
                        elapsed_ms(started),
                    ),
                };
                self.ctx.record(record);
            }
        }

        // Only the worker that observes the complete set wins the claim.
        if let Some(claim) = store.try_claim_extraction(job.referral_id)? {
            info!(
                referral_id = %job.referral_id,
                attempt_id = %claim.attempt_id,
                revision = claim.revision,
                documents = claim.documents.len(),
                "all documents classified; extraction enqueued"
            );
            self.ctx.queues.extraction.push(
                ExtractionJob {
                    referral_id: job.referral_id,
                    attempt_id: claim.attempt_id,
                    revision: claim.revision,
                },
                JobPriority::Normal,
            );
        }
        Ok(())
    }

    fn on_exhausted(&self, job: &ClassificationJob, error: &IntakeError) {
        if self.ctx.superseded(Stage::Classification, job.referral_id, job.attempt_id) {
            return;
        }
        let message = format!("classification failed for document {}: {error}", job.document_id);
        self.ctx.fail(
            Stage::Classification,
            job.referral_id,
            AiProcessingStatus::Failed,
            None,
            &message,
        );
    }
}

// ── Extraction ────────────────────────────────────────────────────────────────

pub struct ExtractionWorker {
    ctx: Arc<PipelineContext>,
    stage: ExtractionStage,
}

impl ExtractionWorker {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        let stage = ExtractionStage::new(ctx.capabilities.extractor.clone(), &ctx.config);
        Self { ctx, stage }
    }
}

#[async_trait]
impl StageHandler for ExtractionWorker {
    type Job = ExtractionJob;

    fn stage(&self) -> Stage {
        Stage::Extraction
    }

    async fn handle(&self, job: &ExtractionJob) -> IntakeResult<()> {
        let started = Instant::now();
        let store = &self.ctx.store;
        let referral = store.referral(job.referral_id)?;

        // ── Gate ─────────────────────────────────────────────────────────────
        if referral.current_attempt != Some(job.attempt_id) {
            debug!(referral_id = %referral.id, attempt_id = %job.attempt_id, "stale extraction job; skipping");
            return Ok(());
        }
        if store.document_revision(referral.id)? != job.revision {
            // A document arrived or was reset after the claim; the claim for
            // the new set enqueues its own extraction.
            debug!(referral_id = %referral.id, revision = job.revision, "document set changed since claim; skipping");
            return Ok(());
        }
        if !matches!(
            referral.ai_processing_status,
            AiProcessingStatus::Queued | AiProcessingStatus::Processing
        ) {
            // Redelivered after this claim was already extracted.
            debug!(
                referral_id = %referral.id,
                status = ?referral.ai_processing_status,
                "extraction already ran for this claim; skipping"
            );
            return Ok(());
        }

        let documents = store.documents(referral.id)?;
        if documents.is_empty() {
            return Err(IntakeError::InvariantViolation {
                reason: format!("extraction reached for referral {} with no documents", referral.id),
            });
        }

        // ── Extract ──────────────────────────────────────────────────────────
        store.advance_ai_status(referral.id, AiProcessingStatus::Processing)?;
        let texts = document_texts(&documents, self.ctx.config.extraction.per_document_chars);
        let extraction = self.stage.extract(&texts).await;

        // ── Persist ──────────────────────────────────────────────────────────
        if store.document_revision(referral.id)? != job.revision {
            info!(
                referral_id = %referral.id,
                revision = job.revision,
                "document set changed during extraction; result discarded"
            );
            return Ok(());
        }
        let identity = patient_identity(&extraction.data);
        store.upsert_extracted_data(ExtractedRecord {
            referral_id: referral.id,
            data: extraction.data,
            source_document_ids: documents.iter().map(|d| d.id).collect(),
            extraction_version: self.ctx.config.extraction.extraction_version.clone(),
            model_used: extraction.model_used,
            degraded: extraction.degraded.is_some(),
            extracted_at: Utc::now(),
        })?;
        if let Some(identity) = identity {
            store.update_patient_identity(referral.id, &identity)?;
        }
        store.advance_ai_status(referral.id, AiProcessingStatus::Extracted)?;

        let record = match &extraction.degraded {
            None => ActivityRecord::success(
                referral.id,
                Stage::Extraction,
                "patient_data_extracted",
                format!("Merged {} documents into the patient record", documents.len()),
                elapsed_ms(started),
            ),
            Some(reason) => ActivityRecord::failure(
                referral.id,
                Stage::Extraction,
                "extraction_degraded",
                format!("empty patient record used: {reason}"),
                elapsed_ms(started),
            ),
        };
        self.ctx.record(record);

        info!(
            referral_id = %referral.id,
            documents = documents.len(),
            degraded = extraction.degraded.is_some(),
            "extraction completed; scoring enqueued"
        );
        self.ctx.queues.scoring.push(
            ScoringJob {
                referral_id: referral.id,
                attempt_id: job.attempt_id,
            },
            JobPriority::Normal,
        );
        Ok(())
    }

    fn on_exhausted(&self, job: &ExtractionJob, error: &IntakeError) {
        if self.ctx.superseded(Stage::Extraction, job.referral_id, job.attempt_id) {
            return;
        }
        if matches!(self.ctx.store.document_revision(job.referral_id), Ok(revision) if revision != job.revision) {
            debug!(referral_id = %job.referral_id, revision = job.revision, "exhausted extraction was for an older document set");
            return;
        }
        let message = format!("extraction failed: {error}");
        self.ctx.fail(
            Stage::Extraction,
            job.referral_id,
            AiProcessingStatus::ExtractionFailed,
            None,
            &message,
        );
    }
}

// ── Scoring ───────────────────────────────────────────────────────────────────

pub struct ScoringWorker {
    ctx: Arc<PipelineContext>,
    orchestrator: ScoringOrchestrator,
}

impl ScoringWorker {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        let orchestrator = ScoringOrchestrator::new(&ctx.capabilities, &ctx.config);
        Self { ctx, orchestrator }
    }
}

#[async_trait]
impl StageHandler for ScoringWorker {
    type Job = ScoringJob;

    fn stage(&self) -> Stage {
        Stage::Scoring
    }

    async fn handle(&self, job: &ScoringJob) -> IntakeResult<()> {
        let started = Instant::now();
        let store = &self.ctx.store;
        let referral = store.referral(job.referral_id)?;

        if referral.current_attempt != Some(job.attempt_id) || referral.ai_processing_status.is_terminal() {
            debug!(
                referral_id = %referral.id,
                attempt_id = %job.attempt_id,
                status = ?referral.ai_processing_status,
                "scoring not needed; skipping"
            );
            return Ok(());
        }

        let extracted = store.extracted_data(referral.id)?.ok_or_else(|| IntakeError::InvariantViolation {
            reason: format!("scoring reached for referral {} without extracted data", referral.id),
        })?;
        let criteria = store.active_criteria(&referral.facility_id)?;
        let document_types: Vec<DocumentType> = store
            .documents(referral.id)?
            .iter()
            .filter_map(|d| d.document_type)
            .collect();

        let outcome = self
            .orchestrator
            .score(ScoringRequest {
                referral_id: referral.id,
                attempt_id: job.attempt_id,
                record: &extracted.data,
                criteria: &criteria,
                document_types: &document_types,
            })
            .await;

        let recommendation = outcome.recommendation;
        let summary = format!(
            "{} with overall score {} ({:.0}% confidence)",
            recommendation.recommendation.as_str(),
            recommendation.overall_score,
            recommendation.confidence_score * 100.0
        );
        store.upsert_recommendation(recommendation)?;

        let flags: Vec<RiskFlag> = outcome
            .findings
            .into_iter()
            .map(|finding| RiskFlag::from_finding(referral.id, job.attempt_id, finding))
            .collect();
        let appended = store.append_risk_flags(referral.id, job.attempt_id, flags)?;

        if store.advance_ai_status(referral.id, AiProcessingStatus::Completed)? {
            store.set_lifecycle_status(referral.id, ReferralStatus::ReadyForDecision)?;
        }

        info!(
            referral_id = %referral.id,
            flags = appended,
            degraded_agents = outcome.degraded.len(),
            "scoring completed"
        );
        self.ctx.record(ActivityRecord::success(
            referral.id,
            Stage::Scoring,
            "scoring_completed",
            summary,
            elapsed_ms(started),
        ));
        Ok(())
    }

    fn on_exhausted(&self, job: &ScoringJob, error: &IntakeError) {
        if self.ctx.superseded(Stage::Scoring, job.referral_id, job.attempt_id) {
            return;
        }
        let message = format!("scoring failed: {error}");
        self.ctx.fail(
            Stage::Scoring,
            job.referral_id,
            AiProcessingStatus::Failed,
            Some(ReferralStatus::PendingReview),
            &message,
        );
    }
}
