//! In-memory implementation of `ActivityRecorder`.
//!
//! `InMemoryActivityLog` keeps one hash chain per referral in a `HashMap`
//! behind a `Mutex`, so stage workers on different tasks can record into it
//! concurrently. Use `export` to snapshot a referral's chain and
//! `verify_integrity` to confirm it has not been tampered with in memory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::debug;

use intake_contracts::{
    activity::ActivityRecord,
    error::{IntakeError, IntakeResult},
    ids::ReferralId,
};
use intake_core::traits::ActivityRecorder;

use crate::{
    chain::{hash_entry, verify_chain},
    entry::{ActivityEntry, ActivityLog},
};

// ── Internal mutable state ────────────────────────────────────────────────────

/// One referral's chain.
pub(crate) struct Chain {
    pub(crate) entries: Vec<ActivityEntry>,
    /// `this_hash` of the last entry, or `GENESIS_HASH` before any entry.
    pub(crate) last_hash: String,
}

impl Chain {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            last_hash: ActivityEntry::GENESIS_HASH.to_string(),
        }
    }
}

pub(crate) struct InMemoryState {
    pub(crate) chains: HashMap<ReferralId, Chain>,
}

// ── Public log ────────────────────────────────────────────────────────────────

/// An in-memory, append-only activity log with a SHA-256 chain per referral.
#[derive(Clone)]
pub struct InMemoryActivityLog {
    pub(crate) state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryActivityLog {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryState {
                chains: HashMap::new(),
            })),
        }
    }

    fn lock(&self) -> IntakeResult<std::sync::MutexGuard<'_, InMemoryState>> {
        self.state.lock().map_err(|e| IntakeError::Storage {
            reason: format!("activity log lock poisoned: {}", e),
        })
    }

    /// Every entry recorded for `referral_id`, in chain order.
    pub fn entries(&self, referral_id: ReferralId) -> IntakeResult<Vec<ActivityEntry>> {
        let state = self.lock()?;
        Ok(state
            .chains
            .get(&referral_id)
            .map(|chain| chain.entries.clone())
            .unwrap_or_default())
    }

    /// Snapshot one referral's chain.
    pub fn export(&self, referral_id: ReferralId) -> IntakeResult<ActivityLog> {
        let entries = self.entries(referral_id)?;
        let terminal_hash = entries
            .last()
            .map(|e| e.this_hash.clone())
            .unwrap_or_default();
        Ok(ActivityLog {
            referral_id,
            entries,
            exported_at: Utc::now(),
            terminal_hash,
        })
    }

    /// Whether `referral_id`'s chain is intact. A referral with no activity
    /// has a trivially valid chain.
    pub fn verify_integrity(&self, referral_id: ReferralId) -> IntakeResult<bool> {
        let state = self.lock()?;
        Ok(state
            .chains
            .get(&referral_id)
            .map(|chain| verify_chain(&chain.entries))
            .unwrap_or(true))
    }
}

impl Default for InMemoryActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

// ── ActivityRecorder impl ─────────────────────────────────────────────────────

impl ActivityRecorder for InMemoryActivityLog {
    /// Append one record to its referral's chain.
    fn record(&self, record: &ActivityRecord) -> IntakeResult<()> {
        let mut state = self.lock()?;
        let chain = state.chains.entry(record.referral_id).or_insert_with(Chain::new);

        let sequence = chain.entries.len() as u64;
        let prev_hash = chain.last_hash.clone();
        let this_hash = hash_entry(record.referral_id, sequence, record, &prev_hash)?;

        debug!(
            referral_id = %record.referral_id,
            stage = %record.stage,
            action = %record.action,
            success = record.success,
            sequence,
            "activity recorded"
        );

        chain.entries.push(ActivityEntry {
            sequence,
            referral_id: record.referral_id,
            record: record.clone(),
            prev_hash,
            this_hash: this_hash.clone(),
        });
        chain.last_hash = this_hash;

        Ok(())
    }

    fn activity(&self, referral_id: ReferralId) -> IntakeResult<Vec<ActivityRecord>> {
        Ok(self
            .entries(referral_id)?
            .into_iter()
            .map(|entry| entry.record)
            .collect())
    }
}
