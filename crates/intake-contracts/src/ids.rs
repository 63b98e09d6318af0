//! Strongly typed identifiers.
//!
//! Every entity in the pipeline is addressed by a newtype so a document id can
//! never be passed where a referral id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new, random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Identity of a referral, the aggregate root of the pipeline.
    ReferralId
);

uuid_id!(
    /// Identity of one uploaded document.
    DocumentId
);

uuid_id!(
    /// Identity of one processing attempt on a referral.
    ///
    /// A new attempt starts on first upload, on manual trigger, and on
    /// document retry. Risk flags are tagged with the attempt that raised them.
    AttemptId
);

uuid_id!(
    /// Identity of a persisted risk flag.
    RiskFlagId
);

/// Identity of a facility. Facilities are managed outside the pipeline, so
/// this is an opaque string rather than a generated UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FacilityId(pub String);

impl FacilityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
