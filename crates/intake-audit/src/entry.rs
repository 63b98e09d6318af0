//! Activity entry and exported log types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use intake_contracts::{activity::ActivityRecord, ids::ReferralId};

/// One link in a referral's activity chain.
///
/// Modifying any field, including those of the embedded record, invalidates
/// `this_hash` and every later `prev_hash`, which `verify_chain` detects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Position in the referral's chain, starting at 0.
    pub sequence: u64,
    pub referral_id: ReferralId,
    pub record: ActivityRecord,
    /// `this_hash` of the previous entry, or `GENESIS_HASH` for the first.
    pub prev_hash: String,
    pub this_hash: String,
}

impl ActivityEntry {
    /// The `prev_hash` of the first entry in every chain: 64 hex zeros.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// A snapshot of one referral's chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLog {
    pub referral_id: ReferralId,
    pub entries: Vec<ActivityEntry>,
    pub exported_at: DateTime<Utc>,
    /// `this_hash` of the last entry. Empty when there are no entries.
    pub terminal_hash: String,
}
