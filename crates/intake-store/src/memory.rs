//! In-memory implementation of `ReferralStore`.
//!
//! All state lives in one `InMemoryState` behind a single `Mutex`, which
//! makes every trait method atomic with respect to the others. The guarded
//! writes (`set_classification`, `try_claim_extraction`, `append_risk_flags`)
//! check and mutate under the same lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::debug;

use intake_contracts::{
    criteria::FacilityCriteria,
    error::{IntakeError, IntakeResult},
    ids::{AttemptId, DocumentId, FacilityId, ReferralId, RiskFlagId},
    patient::ExtractedRecord,
    referral::{
        AiProcessingStatus, Document, DocumentType, OcrStatus, PatientIdentity, Referral,
        ReferralStatus,
    },
    risk::{FlagResolution, RiskFlag},
    scoring::AiRecommendation,
};
use intake_core::traits::{ExtractionClaim, ReferralStore};

// ── Internal mutable state ────────────────────────────────────────────────────

/// A referral together with everything it owns.
pub(crate) struct ReferralEntry {
    pub(crate) referral: Referral,
    /// Owned documents in upload order.
    pub(crate) document_ids: Vec<DocumentId>,
    /// Bumped on every document insert or reset and on every new attempt.
    pub(crate) revision: u64,
    /// The revision at which extraction was last claimed.
    pub(crate) claimed_revision: Option<u64>,
    pub(crate) extracted: Option<ExtractedRecord>,
    pub(crate) recommendation: Option<AiRecommendation>,
    /// Every flag ever raised, in append order.
    pub(crate) flags: Vec<RiskFlag>,
}

impl ReferralEntry {
    fn new(referral: Referral) -> Self {
        Self {
            referral,
            document_ids: Vec::new(),
            revision: 0,
            claimed_revision: None,
            extracted: None,
            recommendation: None,
            flags: Vec::new(),
        }
    }

    fn touch(&mut self) {
        self.referral.updated_at = Utc::now();
    }

    /// Put the referral on a fresh attempt. Leaves the revision alone.
    fn start_attempt(&mut self) -> AttemptId {
        let attempt_id = AttemptId::new();
        self.referral.current_attempt = Some(attempt_id);
        self.referral.ai_processing_status = AiProcessingStatus::Queued;
        self.referral.ai_processing_error = None;
        self.referral.ai_processing_started_at = Some(Utc::now());
        self.referral.ai_processing_completed_at = None;
        self.referral.status = ReferralStatus::Processing;
        self.touch();
        attempt_id
    }
}

#[derive(Default)]
pub(crate) struct InMemoryState {
    pub(crate) referrals: HashMap<ReferralId, ReferralEntry>,
    pub(crate) documents: HashMap<DocumentId, Document>,
    /// Which referral owns each flag.
    pub(crate) flag_owners: HashMap<RiskFlagId, ReferralId>,
    pub(crate) criteria: HashMap<FacilityId, Vec<FacilityCriteria>>,
}

impl InMemoryState {
    fn entry(&self, id: ReferralId) -> IntakeResult<&ReferralEntry> {
        self.referrals.get(&id).ok_or_else(|| referral_not_found(id))
    }

    fn entry_mut(&mut self, id: ReferralId) -> IntakeResult<&mut ReferralEntry> {
        self.referrals.get_mut(&id).ok_or_else(|| referral_not_found(id))
    }

    fn document_mut(&mut self, id: DocumentId) -> IntakeResult<&mut Document> {
        self.documents.get_mut(&id).ok_or_else(|| document_not_found(id))
    }

    fn flag_mut(&mut self, id: RiskFlagId) -> IntakeResult<&mut RiskFlag> {
        let owner = self
            .flag_owners
            .get(&id)
            .copied()
            .ok_or_else(|| IntakeError::InvalidRequest {
                reason: format!("risk flag '{}' not found", id),
            })?;
        self.entry_mut(owner)?
            .flags
            .iter_mut()
            .find(|flag| flag.id == id)
            .ok_or_else(|| IntakeError::Storage {
                reason: format!("risk flag '{}' indexed but missing", id),
            })
    }
}

fn referral_not_found(id: ReferralId) -> IntakeError {
    IntakeError::ReferralNotFound {
        referral_id: id.to_string(),
    }
}

fn document_not_found(id: DocumentId) -> IntakeError {
    IntakeError::DocumentNotFound {
        document_id: id.to_string(),
    }
}

// ── Public store ──────────────────────────────────────────────────────────────

/// An in-memory `ReferralStore`. Clones share the same state.
#[derive(Clone, Default)]
pub struct InMemoryReferralStore {
    pub(crate) state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryReferralStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> IntakeResult<MutexGuard<'_, InMemoryState>> {
        self.state.lock().map_err(|e| IntakeError::Storage {
            reason: format!("referral store lock poisoned: {}", e),
        })
    }
}

impl ReferralStore for InMemoryReferralStore {
    // ── Referrals ─────────────────────────────────────────────────────────────

    fn create_referral(&self, referral: Referral) -> IntakeResult<()> {
        let mut state = self.lock()?;
        if state.referrals.contains_key(&referral.id) {
            return Err(IntakeError::InvalidRequest {
                reason: format!("referral '{}' already exists", referral.id),
            });
        }
        state.referrals.insert(referral.id, ReferralEntry::new(referral));
        Ok(())
    }

    fn referral(&self, id: ReferralId) -> IntakeResult<Referral> {
        let state = self.lock()?;
        Ok(state.entry(id)?.referral.clone())
    }

    fn begin_attempt(&self, id: ReferralId) -> IntakeResult<AttemptId> {
        let mut state = self.lock()?;
        let entry = state.entry_mut(id)?;
        entry.revision += 1;
        let attempt_id = entry.start_attempt();

        debug!(referral_id = %id, attempt_id = %attempt_id, "processing attempt started");
        Ok(attempt_id)
    }

    fn advance_ai_status(&self, id: ReferralId, next: AiProcessingStatus) -> IntakeResult<bool> {
        let mut state = self.lock()?;
        let entry = state.entry_mut(id)?;
        if !entry.referral.ai_processing_status.can_advance_to(next) {
            return Ok(false);
        }

        entry.referral.ai_processing_status = next;
        if next == AiProcessingStatus::Completed {
            entry.referral.ai_processing_completed_at = Some(Utc::now());
        }
        entry.touch();
        Ok(true)
    }

    fn fail_referral(
        &self,
        id: ReferralId,
        status: AiProcessingStatus,
        error: &str,
        lifecycle: Option<ReferralStatus>,
    ) -> IntakeResult<bool> {
        let mut state = self.lock()?;
        let entry = state.entry_mut(id)?;
        if !entry.referral.ai_processing_status.can_advance_to(status) {
            return Ok(false);
        }

        entry.referral.ai_processing_status = status;
        entry.referral.ai_processing_error = Some(error.to_string());
        if let Some(lifecycle) = lifecycle {
            entry.referral.status = lifecycle;
        }
        entry.touch();
        Ok(true)
    }

    fn set_lifecycle_status(&self, id: ReferralId, status: ReferralStatus) -> IntakeResult<()> {
        let mut state = self.lock()?;
        let entry = state.entry_mut(id)?;
        entry.referral.status = status;
        entry.touch();
        Ok(())
    }

    fn update_patient_identity(&self, id: ReferralId, identity: &PatientIdentity) -> IntakeResult<()> {
        let mut state = self.lock()?;
        let entry = state.entry_mut(id)?;
        entry.referral.patient_first_name = Some(identity.first_name.clone());
        entry.referral.patient_last_name = Some(identity.last_name.clone());
        entry.referral.patient_dob = identity.dob;
        entry.referral.patient_gender = identity.gender.clone();
        entry.touch();
        Ok(())
    }

    // ── Documents ─────────────────────────────────────────────────────────────

    fn insert_document(&self, document: Document) -> IntakeResult<usize> {
        let mut state = self.lock()?;
        if state.documents.contains_key(&document.id) {
            return Err(IntakeError::InvalidRequest {
                reason: format!("document '{}' already exists", document.id),
            });
        }

        let document_id = document.id;
        let entry = state.entry_mut(document.referral_id)?;
        entry.document_ids.push(document_id);
        entry.revision += 1;
        entry.touch();
        let count = entry.document_ids.len();

        state.documents.insert(document_id, document);
        Ok(count)
    }

    fn document(&self, id: DocumentId) -> IntakeResult<Document> {
        let state = self.lock()?;
        state.documents.get(&id).cloned().ok_or_else(|| document_not_found(id))
    }

    fn documents(&self, referral_id: ReferralId) -> IntakeResult<Vec<Document>> {
        let state = self.lock()?;
        state
            .entry(referral_id)?
            .document_ids
            .iter()
            .map(|id| state.documents.get(id).cloned().ok_or_else(|| document_not_found(*id)))
            .collect()
    }

    fn mark_ocr_processing(&self, id: DocumentId) -> IntakeResult<()> {
        let mut state = self.lock()?;
        state.document_mut(id)?.ocr_status = OcrStatus::Processing;
        Ok(())
    }

    fn complete_ocr(&self, id: DocumentId, text: String, confidence: f64) -> IntakeResult<()> {
        let mut state = self.lock()?;
        let document = state.document_mut(id)?;
        document.ocr_status = OcrStatus::Completed;
        document.ocr_text = Some(text);
        document.ocr_confidence = Some(confidence);
        document.ocr_completed_at = Some(Utc::now());
        Ok(())
    }

    fn fail_ocr(&self, id: DocumentId) -> IntakeResult<()> {
        let mut state = self.lock()?;
        state.document_mut(id)?.ocr_status = OcrStatus::Failed;
        Ok(())
    }

    fn set_classification(
        &self,
        id: DocumentId,
        document_type: DocumentType,
        confidence: f64,
    ) -> IntakeResult<bool> {
        let mut state = self.lock()?;
        let document = state.document_mut(id)?;
        if document.document_type.is_some() {
            return Ok(false);
        }
        document.document_type = Some(document_type);
        document.document_type_confidence = Some(confidence);
        Ok(true)
    }

    fn reset_document(&self, id: DocumentId) -> IntakeResult<Document> {
        let mut state = self.lock()?;
        let document = state.document_mut(id)?;
        document.reset_processing();
        let reset = document.clone();

        let entry = state.entry_mut(reset.referral_id)?;
        entry.revision += 1;
        entry.touch();
        Ok(reset)
    }

    fn try_claim_extraction(&self, referral_id: ReferralId) -> IntakeResult<Option<ExtractionClaim>> {
        let mut state = self.lock()?;
        let entry = state.entry(referral_id)?;
        if entry.document_ids.is_empty() || entry.claimed_revision == Some(entry.revision) {
            return Ok(None);
        }

        let mut documents = Vec::with_capacity(entry.document_ids.len());
        for id in &entry.document_ids {
            let document = state.documents.get(id).ok_or_else(|| document_not_found(*id))?;
            if !document.is_ready_for_extraction() {
                return Ok(None);
            }
            documents.push(document.clone());
        }

        let entry = state.entry_mut(referral_id)?;
        entry.claimed_revision = Some(entry.revision);
        let live = matches!(
            entry.referral.ai_processing_status,
            AiProcessingStatus::Queued | AiProcessingStatus::Processing
        );
        let attempt_id = match entry.referral.current_attempt.filter(|_| live) {
            Some(attempt_id) => attempt_id,
            None => {
                let attempt_id = entry.start_attempt();
                debug!(
                    referral_id = %referral_id,
                    attempt_id = %attempt_id,
                    "document set changed after extraction; new attempt started"
                );
                attempt_id
            }
        };
        debug!(
            referral_id = %referral_id,
            revision = entry.revision,
            documents = documents.len(),
            "extraction claimed"
        );
        Ok(Some(ExtractionClaim {
            attempt_id,
            revision: entry.revision,
            documents,
        }))
    }

    fn document_revision(&self, referral_id: ReferralId) -> IntakeResult<u64> {
        let state = self.lock()?;
        Ok(state.entry(referral_id)?.revision)
    }

    // ── Results ───────────────────────────────────────────────────────────────

    fn upsert_extracted_data(&self, record: ExtractedRecord) -> IntakeResult<()> {
        let mut state = self.lock()?;
        let entry = state.entry_mut(record.referral_id)?;
        entry.extracted = Some(record);
        entry.touch();
        Ok(())
    }

    fn extracted_data(&self, referral_id: ReferralId) -> IntakeResult<Option<ExtractedRecord>> {
        let state = self.lock()?;
        Ok(state.entry(referral_id)?.extracted.clone())
    }

    fn upsert_recommendation(&self, recommendation: AiRecommendation) -> IntakeResult<()> {
        let mut state = self.lock()?;
        let entry = state.entry_mut(recommendation.referral_id)?;
        entry.recommendation = Some(recommendation);
        entry.touch();
        Ok(())
    }

    fn recommendation(&self, referral_id: ReferralId) -> IntakeResult<Option<AiRecommendation>> {
        let state = self.lock()?;
        Ok(state.entry(referral_id)?.recommendation.clone())
    }

    fn append_risk_flags(
        &self,
        referral_id: ReferralId,
        attempt_id: AttemptId,
        flags: Vec<RiskFlag>,
    ) -> IntakeResult<usize> {
        let mut state = self.lock()?;
        let entry = state.entry_mut(referral_id)?;
        if entry.flags.iter().any(|flag| flag.attempt_id == attempt_id) {
            debug!(
                referral_id = %referral_id,
                attempt_id = %attempt_id,
                "attempt already has risk flags, append skipped"
            );
            return Ok(0);
        }

        let ids: Vec<RiskFlagId> = flags.iter().map(|flag| flag.id).collect();
        let appended = flags.len();
        entry.flags.extend(flags);
        for id in ids {
            state.flag_owners.insert(id, referral_id);
        }
        Ok(appended)
    }

    fn risk_flags(&self, referral_id: ReferralId) -> IntakeResult<Vec<RiskFlag>> {
        let state = self.lock()?;
        Ok(state.entry(referral_id)?.flags.clone())
    }

    fn latest_risk_flags(&self, referral_id: ReferralId) -> IntakeResult<Vec<RiskFlag>> {
        let state = self.lock()?;
        let flags = &state.entry(referral_id)?.flags;
        let Some(latest) = flags.last().map(|flag| flag.attempt_id) else {
            return Ok(Vec::new());
        };
        Ok(flags
            .iter()
            .filter(|flag| flag.attempt_id == latest)
            .cloned()
            .collect())
    }

    fn resolve_risk_flag(
        &self,
        id: RiskFlagId,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> IntakeResult<RiskFlag> {
        let mut state = self.lock()?;
        let flag = state.flag_mut(id)?;
        flag.resolution = Some(FlagResolution {
            resolved_by: resolved_by.to_string(),
            notes: notes.map(str::to_string),
            resolved_at: Utc::now(),
        });
        Ok(flag.clone())
    }

    fn unresolve_risk_flag(&self, id: RiskFlagId) -> IntakeResult<RiskFlag> {
        let mut state = self.lock()?;
        let flag = state.flag_mut(id)?;
        flag.resolution = None;
        Ok(flag.clone())
    }

    // ── Facility criteria ─────────────────────────────────────────────────────

    fn put_facility_criteria(&self, facility_id: &FacilityId, criteria: Vec<FacilityCriteria>) -> IntakeResult<()> {
        let mut state = self.lock()?;
        state.criteria.insert(facility_id.clone(), criteria);
        Ok(())
    }

    fn active_criteria(&self, facility_id: &FacilityId) -> IntakeResult<Vec<FacilityCriteria>> {
        let state = self.lock()?;
        let mut active: Vec<FacilityCriteria> = state
            .criteria
            .get(facility_id)
            .map(|all| all.iter().filter(|c| c.is_active).cloned().collect())
            .unwrap_or_default();
        active.sort_by_key(|c| c.priority);
        Ok(active)
    }
}
