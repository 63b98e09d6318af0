//! Hash-chain primitives: hashing and chain integrity verification.
//!
//! Hash input layout (bytes, in order):
//!   1. referral id as UTF-8 bytes
//!   2. sequence as 8-byte little-endian
//!   3. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   4. compact JSON of the activity record

use sha2::{Digest, Sha256};

use intake_contracts::{
    activity::ActivityRecord,
    error::{IntakeError, IntakeResult},
    ids::ReferralId,
};

use crate::entry::ActivityEntry;

/// Compute the SHA-256 hash for one activity entry.
///
/// Commits to the entry's position (`sequence`), owning referral, link to
/// the previous entry (`prev_hash`) and the full record. Returns a
/// lowercase 64-character hex string.
pub fn hash_entry(
    referral_id: ReferralId,
    sequence: u64,
    record: &ActivityRecord,
    prev_hash: &str,
) -> IntakeResult<String> {
    let record_json = serde_json::to_vec(record).map_err(|e| IntakeError::Storage {
        reason: format!("activity record not serializable: {e}"),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(referral_id.to_string().as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Verify the integrity of one referral's chain.
///
/// Valid when every entry's `prev_hash` equals the previous entry's
/// `this_hash` (or `GENESIS_HASH` for the first) and every `this_hash`
/// matches the value recomputed from the entry's own fields. An empty chain
/// is valid.
pub fn verify_chain(entries: &[ActivityEntry]) -> bool {
    let mut expected_prev = ActivityEntry::GENESIS_HASH.to_string();

    for entry in entries {
        if entry.prev_hash != expected_prev {
            return false;
        }

        match hash_entry(entry.referral_id, entry.sequence, &entry.record, &entry.prev_hash) {
            Ok(recomputed) if recomputed == entry.this_hash => {}
            _ => return false,
        }

        expected_prev = entry.this_hash.clone();
    }

    true
}
