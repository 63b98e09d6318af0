//! Output schema and verification report types.
//!
//! Raw capability output is checked against an `OutputSchema` before it is
//! decoded into a typed result. Only a passing `VerificationReport` lets the
//! payload through.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a capability's raw output is checked against.
///
/// Combines a JSON Schema document with domain rules that go beyond what
/// JSON Schema expresses comfortably.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSchema {
    /// Unique identifier, e.g. `"classification-v1"`.
    pub schema_id: String,
    /// JSON Schema document for structural validation. `Null` skips it.
    pub json_schema: Value,
    /// Domain rules evaluated after structural validation.
    pub rules: Vec<VerificationRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRule {
    /// Referenced in failure reports.
    pub rule_id: String,
    pub description: String,
    pub rule_type: VerificationRuleType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VerificationRuleType {
    /// The field at `field_path` must be present and non-null.
    RequiredField {
        /// Dotted path, e.g. `"documentQuality.completeness"`.
        field_path: String,
    },

    /// The field at `field_path` must equal one of `allowed`.
    AllowedValues { field_path: String, allowed: Vec<Value> },

    /// The number at `field_path` must lie in `min..=max`. Absent fields pass.
    NumberRange { field_path: String, min: f64, max: f64 },

    /// The string at `field_path` must not contain `pattern`.
    ForbiddenPattern { field_path: String, pattern: String },

    /// Delegate to a function registered on the verifier by name.
    Custom { function_name: String },
}

/// The result of running an `OutputSchema` against one payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// True only if every check passed.
    pub passed: bool,
    /// Every failure found. Empty on pass.
    pub failures: Vec<VerificationFailure>,
}

impl VerificationReport {
    /// All failure messages joined into one line.
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("[{}] {}", f.rule_id, f.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationFailure {
    pub rule_id: String,
    pub message: String,
}
