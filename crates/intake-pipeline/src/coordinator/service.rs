//! `IntakeService`: the operations the rest of the system calls.
//!
//! The service owns the pipeline context, one worker pool per stage, and
//! the shutdown signal. Every request handler is a short synchronous write
//! plus the enqueues it implies; the heavy lifting happens in the workers.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info};

use intake_contracts::{
    activity::ActivityRecord,
    criteria::FacilityCriteria,
    error::{IntakeError, IntakeResult},
    ids::{AttemptId, DocumentId, FacilityId, ReferralId, RiskFlagId},
    jobs::{ClassificationJob, ExtractionJob, JobPriority, OcrJob, Stage},
    patient::ExtractedRecord,
    referral::{AiProcessingStatus, BlobLocator, Document, OcrStatus, Referral},
    risk::RiskFlag,
    scoring::AiRecommendation,
};
use intake_core::{
    traits::{ActivityRecorder, ReferralStore},
    with_timeout,
};

use crate::capabilities::Capabilities;
use crate::config::PipelineConfig;
use crate::coordinator::pool::{RateLimiter, WorkerPool};
use crate::coordinator::queue::JobQueue;
use crate::coordinator::workers::{
    ClassificationWorker, ExtractionWorker, OcrWorker, PipelineContext, ScoringWorker, StageQueues,
};

/// A dead-lettered job from any stage.
#[derive(Debug, Clone)]
pub struct FailedJob {
    pub stage: Stage,
    pub referral_id: ReferralId,
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

pub struct IntakeService {
    ctx: Arc<PipelineContext>,
    shutdown: watch::Sender<bool>,
    pools: Vec<WorkerPool>,
}

impl IntakeService {
    /// Validate `config` and spawn the worker pools on the current tokio
    /// runtime.
    pub fn start(
        config: PipelineConfig,
        store: Arc<dyn ReferralStore>,
        activity: Arc<dyn ActivityRecorder>,
        capabilities: Capabilities,
    ) -> IntakeResult<Self> {
        config.validate()?;

        let ctx = Arc::new(PipelineContext {
            store,
            activity,
            capabilities,
            queues: StageQueues::new(),
            config,
        });
        let (shutdown, rx) = watch::channel(false);
        let config = &ctx.config;

        let ocr_limiter = Arc::new(RateLimiter::new(
            config.ocr.rate_limit.max_jobs,
            config.ocr.rate_limit.window(),
        ));
        let pools = vec![
            WorkerPool::spawn(
                Arc::new(OcrWorker::new(ctx.clone())),
                ctx.queues.ocr.clone(),
                config.ocr.pool(),
                Some(ocr_limiter),
                rx.clone(),
            ),
            WorkerPool::spawn(
                Arc::new(ClassificationWorker::new(ctx.clone())),
                ctx.queues.classification.clone(),
                config.classification.pool(),
                None,
                rx.clone(),
            ),
            WorkerPool::spawn(
                Arc::new(ExtractionWorker::new(ctx.clone())),
                ctx.queues.extraction.clone(),
                config.extraction.pool(),
                None,
                rx.clone(),
            ),
            WorkerPool::spawn(
                Arc::new(ScoringWorker::new(ctx.clone())),
                ctx.queues.scoring.clone(),
                config.scoring.pool(),
                None,
                rx,
            ),
        ];

        info!(
            ocr = config.ocr.concurrency,
            classification = config.classification.concurrency,
            extraction = config.extraction.concurrency,
            scoring = config.scoring.concurrency,
            "intake pipeline started"
        );
        Ok(Self { ctx, shutdown, pools })
    }

    fn store(&self) -> &dyn ReferralStore {
        self.ctx.store.as_ref()
    }

    // ── Referrals and documents ───────────────────────────────────────────────

    pub fn create_referral(&self, facility_id: FacilityId) -> IntakeResult<Referral> {
        let referral = Referral::new(facility_id);
        self.store().create_referral(referral.clone())?;
        info!(referral_id = %referral.id, facility_id = %referral.facility_id, "referral created");
        Ok(referral)
    }

    /// Replace a facility's criteria set.
    pub fn set_facility_criteria(&self, facility_id: &FacilityId, criteria: Vec<FacilityCriteria>) -> IntakeResult<()> {
        self.store().put_facility_criteria(facility_id, criteria)
    }

    /// Store the bytes, register a pending document and enqueue OCR.
    ///
    /// Starts a processing attempt unless one is already running, so the
    /// first upload and any upload after a finished or failed run both kick
    /// off a fresh pass over the whole document set. Documents that failed
    /// OCR in the earlier run are reset and read again.
    pub async fn upload_document(
        &self,
        referral_id: ReferralId,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> IntakeResult<Document> {
        let started = Instant::now();
        self.store().referral(referral_id)?;
        if bytes.is_empty() {
            return Err(IntakeError::InvalidRequest {
                reason: format!("document '{filename}' is empty"),
            });
        }

        let document_id = DocumentId::new();
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("bin")
            .to_ascii_lowercase();
        let locator = BlobLocator {
            bucket: self.ctx.config.storage.bucket.clone(),
            key: format!("referrals/{referral_id}/documents/{document_id}.{extension}"),
        };
        let size_bytes = bytes.len() as u64;

        with_timeout(
            "blob_put",
            self.ctx.config.capabilities.timeout(),
            self.ctx.capabilities.blobs.put(&locator, bytes, content_type),
        )
        .await?;

        let document = Document::new_pending(document_id, referral_id, filename, content_type, size_bytes, locator);
        let count = self.store().insert_document(document.clone())?;
        self.ctx.record(ActivityRecord::success(
            referral_id,
            Stage::Upload,
            "document_uploaded",
            format!("Uploaded {filename} ({size_bytes} bytes)"),
            started.elapsed().as_millis() as u64,
        ));

        let referral = self.store().referral(referral_id)?;
        let running = matches!(
            referral.ai_processing_status,
            AiProcessingStatus::Queued | AiProcessingStatus::Processing
        );
        let attempt_id = match referral.current_attempt.filter(|_| running) {
            Some(attempt_id) => {
                self.enqueue_ocr(&document, attempt_id, JobPriority::Normal);
                attempt_id
            }
            None => {
                let attempt_id = self.store().begin_attempt(referral_id)?;
                let documents = self.store().documents(referral_id)?;
                self.resume_documents(&documents, attempt_id)?;
                attempt_id
            }
        };

        info!(
            referral_id = %referral_id,
            document_id = %document_id,
            attempt_id = %attempt_id,
            documents = count,
            "document uploaded; OCR enqueued"
        );
        Ok(document)
    }

    /// A time-limited download URL for the document's bytes.
    pub async fn document_download_url(&self, document_id: DocumentId) -> IntakeResult<String> {
        let document = self.store().document(document_id)?;
        with_timeout(
            "blob_presign",
            self.ctx.config.capabilities.timeout(),
            self.ctx
                .capabilities
                .blobs
                .presigned_get(&document.locator, self.ctx.config.storage.presign_ttl()),
        )
        .await
    }

    // ── Manual triggers ───────────────────────────────────────────────────────

    /// Start a new processing attempt over the referral's current documents.
    ///
    /// Failed documents are reset and re-OCR'd, unclassified ones are
    /// re-classified, and when everything is already ready extraction is
    /// enqueued directly.
    pub fn trigger_processing(&self, referral_id: ReferralId) -> IntakeResult<()> {
        let store = self.store();
        if store.documents(referral_id)?.is_empty() {
            return Err(IntakeError::InvalidRequest {
                reason: format!("referral {referral_id} has no documents to process"),
            });
        }

        let attempt_id = store.begin_attempt(referral_id)?;
        let documents = store.documents(referral_id)?;
        self.resume_documents(&documents, attempt_id)?;

        if let Some(claim) = store.try_claim_extraction(referral_id)? {
            self.ctx.queues.extraction.push(
                ExtractionJob {
                    referral_id,
                    attempt_id: claim.attempt_id,
                    revision: claim.revision,
                },
                JobPriority::Normal,
            );
        }

        self.ctx.record(ActivityRecord::success(
            referral_id,
            Stage::Upload,
            "processing_triggered",
            format!("Processing restarted over {} documents", documents.len()),
            0,
        ));
        info!(referral_id = %referral_id, attempt_id = %attempt_id, "processing triggered");
        Ok(())
    }

    /// Reset one document and run it through OCR again ahead of other work.
    ///
    /// The current extracted record and recommendation stay as they are
    /// until the next extraction pass replaces them. Other unfinished
    /// documents move to the new attempt at normal priority.
    pub fn retry_document(&self, document_id: DocumentId) -> IntakeResult<Document> {
        let store = self.store();
        let document = store.reset_document(document_id)?;
        let attempt_id = store.begin_attempt(document.referral_id)?;
        self.enqueue_ocr(&document, attempt_id, JobPriority::High);

        let others: Vec<Document> = store
            .documents(document.referral_id)?
            .into_iter()
            .filter(|other| other.id != document.id)
            .collect();
        self.resume_documents(&others, attempt_id)?;

        self.ctx.record(ActivityRecord::success(
            document.referral_id,
            Stage::Upload,
            "document_retry_requested",
            format!("Retrying {}", document.original_filename),
            0,
        ));
        info!(
            referral_id = %document.referral_id,
            document_id = %document.id,
            attempt_id = %attempt_id,
            "document retry enqueued"
        );
        Ok(document)
    }

    /// Enqueue whatever each unfinished document still needs under
    /// `attempt_id`. Jobs queued by an earlier attempt skip themselves once
    /// it is superseded, so nothing is left waiting on them.
    fn resume_documents(&self, documents: &[Document], attempt_id: AttemptId) -> IntakeResult<()> {
        for document in documents {
            match document.ocr_status {
                OcrStatus::Failed => {
                    let reset = self.store().reset_document(document.id)?;
                    self.enqueue_ocr(&reset, attempt_id, JobPriority::Normal);
                }
                OcrStatus::Pending | OcrStatus::Processing => {
                    self.enqueue_ocr(document, attempt_id, JobPriority::Normal)
                }
                OcrStatus::Completed if document.document_type.is_none() => {
                    self.ctx.queues.classification.push(
                        ClassificationJob {
                            referral_id: document.referral_id,
                            document_id: document.id,
                            attempt_id,
                        },
                        JobPriority::Normal,
                    );
                }
                OcrStatus::Completed => {}
            }
        }
        Ok(())
    }

    fn enqueue_ocr(&self, document: &Document, attempt_id: AttemptId, priority: JobPriority) {
        self.ctx.queues.ocr.push(
            OcrJob {
                referral_id: document.referral_id,
                document_id: document.id,
                attempt_id,
            },
            priority,
        );
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    pub fn referral(&self, referral_id: ReferralId) -> IntakeResult<Referral> {
        self.store().referral(referral_id)
    }

    pub fn documents(&self, referral_id: ReferralId) -> IntakeResult<Vec<Document>> {
        self.store().documents(referral_id)
    }

    pub fn extracted_data(&self, referral_id: ReferralId) -> IntakeResult<Option<ExtractedRecord>> {
        self.store().extracted_data(referral_id)
    }

    pub fn recommendation(&self, referral_id: ReferralId) -> IntakeResult<Option<AiRecommendation>> {
        self.store().recommendation(referral_id)
    }

    pub fn risk_flags(&self, referral_id: ReferralId) -> IntakeResult<Vec<RiskFlag>> {
        self.store().risk_flags(referral_id)
    }

    pub fn latest_risk_flags(&self, referral_id: ReferralId) -> IntakeResult<Vec<RiskFlag>> {
        self.store().latest_risk_flags(referral_id)
    }

    pub fn resolve_risk_flag(&self, flag_id: RiskFlagId, resolved_by: &str, notes: Option<&str>) -> IntakeResult<RiskFlag> {
        let flag = self.store().resolve_risk_flag(flag_id, resolved_by, notes)?;
        debug!(flag_id = %flag_id, resolved_by, "risk flag resolved");
        Ok(flag)
    }

    pub fn unresolve_risk_flag(&self, flag_id: RiskFlagId) -> IntakeResult<RiskFlag> {
        self.store().unresolve_risk_flag(flag_id)
    }

    pub fn activity_log(&self, referral_id: ReferralId) -> IntakeResult<Vec<ActivityRecord>> {
        self.ctx.activity.activity(referral_id)
    }

    /// Every dead-lettered job across the four stages.
    pub fn dead_letters(&self) -> Vec<FailedJob> {
        let queues = &self.ctx.queues;
        let mut failed = Vec::new();
        failed.extend(failed_jobs(Stage::Ocr, &queues.ocr, |job| job.referral_id));
        failed.extend(failed_jobs(Stage::Classification, &queues.classification, |job| job.referral_id));
        failed.extend(failed_jobs(Stage::Extraction, &queues.extraction, |job| job.referral_id));
        failed.extend(failed_jobs(Stage::Scoring, &queues.scoring, |job| job.referral_id));
        failed.sort_by_key(|job| job.failed_at);
        failed
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Resolve once no job is queued, delayed or in flight on any stage.
    pub async fn wait_idle(&self) {
        self.ctx.queues.wait_idle().await;
    }

    /// Stop every worker after its current job and wait for them to exit.
    /// Jobs still queued are dropped.
    pub async fn shutdown(self) {
        // Every receiver lives in a worker; if all of them are gone already
        // there is nothing to signal.
        let _ = self.shutdown.send(true);
        for pool in self.pools {
            pool.join().await;
        }
        info!("intake pipeline stopped");
    }
}

fn failed_jobs<J: Clone>(
    stage: Stage,
    queue: &JobQueue<J>,
    referral_id: impl Fn(&J) -> ReferralId,
) -> Vec<FailedJob> {
    queue
        .dead_letters()
        .into_iter()
        .map(|dead| FailedJob {
            stage,
            referral_id: referral_id(&dead.job),
            attempts: dead.attempts,
            error: dead.error,
            failed_at: dead.failed_at,
        })
        .collect()
}
