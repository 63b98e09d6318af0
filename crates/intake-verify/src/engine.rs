//! Schema-based verifier for raw capability output.
//!
//! Verification runs in two phases:
//!
//! 1. **Structural**: the payload is validated against
//!    `OutputSchema::json_schema` using the `jsonschema` crate.
//! 2. **Semantic**: each `VerificationRule` is evaluated in order. All
//!    failures are collected before returning so the error names every
//!    problem in one pass.
//!
//! [`SchemaVerifier::decode`] runs both phases and then deserializes the
//! payload, turning any failure into `IntakeError::MalformedOutput`, which
//! the capability retry policy treats as retryable.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use intake_contracts::error::{IntakeError, IntakeResult};

use crate::schema::{OutputSchema, VerificationFailure, VerificationReport, VerificationRuleType};

/// A caller-supplied verification function.
///
/// Receives the full payload. Returns `Some(message)` when the check fails,
/// or `None` on success.
pub type CustomVerifierFn = Box<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Verifies capability output against an [`OutputSchema`].
pub struct SchemaVerifier {
    custom_rules: HashMap<String, CustomVerifierFn>,
}

impl SchemaVerifier {
    /// Create a verifier with no custom rules registered.
    pub fn new() -> Self {
        Self {
            custom_rules: HashMap::new(),
        }
    }

    /// Register a custom verification function under `name`.
    ///
    /// Registering the same name twice replaces the previous function.
    pub fn register_rule(&mut self, name: impl Into<String>, f: CustomVerifierFn) {
        self.custom_rules.insert(name.into(), f);
    }

    /// Resolve a dot-notation path. `None` when any segment is missing or
    /// the value is JSON `null`.
    fn resolve_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
        let mut current = value;
        for segment in path.split('.') {
            match current.get(segment) {
                Some(v) if !v.is_null() => current = v,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Run structural and semantic checks on `payload`.
    pub fn verify(&self, payload: &Value, schema: &OutputSchema) -> VerificationReport {
        let mut failures: Vec<VerificationFailure> = Vec::new();

        // ── Phase 1: JSON Schema ─────────────────────────────────────────────
        if !schema.json_schema.is_null() {
            match jsonschema::validator_for(&schema.json_schema) {
                Ok(validator) => {
                    for error in validator.iter_errors(payload) {
                        let message = format!(
                            "JSON Schema violation at {}: {}",
                            error.instance_path, error
                        );
                        warn!(schema_id = %schema.schema_id, %message, "structural validation failure");
                        failures.push(VerificationFailure {
                            rule_id: "json-schema".to_string(),
                            message,
                        });
                    }
                }
                Err(e) => {
                    let message = format!("invalid JSON Schema document: {e}");
                    warn!(schema_id = %schema.schema_id, %message, "schema compilation failure");
                    failures.push(VerificationFailure {
                        rule_id: "json-schema".to_string(),
                        message,
                    });
                }
            }
        }

        // ── Phase 2: semantic rules ──────────────────────────────────────────
        for rule in &schema.rules {
            debug!(rule_id = %rule.rule_id, description = %rule.description, "evaluating verification rule");

            let failure_msg: Option<String> = match &rule.rule_type {
                VerificationRuleType::RequiredField { field_path } => {
                    if Self::resolve_path(payload, field_path).is_none() {
                        Some(format!("required field '{field_path}' is missing or null"))
                    } else {
                        None
                    }
                }

                VerificationRuleType::AllowedValues { field_path, allowed } => {
                    match Self::resolve_path(payload, field_path) {
                        None => Some(format!(
                            "field '{field_path}' is missing; cannot check allowed values"
                        )),
                        Some(actual) if allowed.contains(actual) => None,
                        Some(actual) => Some(format!(
                            "field '{field_path}' has value {actual} which is not in the allowed set"
                        )),
                    }
                }

                VerificationRuleType::NumberRange { field_path, min, max } => {
                    match Self::resolve_path(payload, field_path) {
                        None => None,
                        Some(v) => match v.as_f64() {
                            Some(n) if n >= *min && n <= *max => None,
                            Some(n) => Some(format!(
                                "field '{field_path}' is {n}, outside {min}..={max}"
                            )),
                            None => Some(format!("field '{field_path}' is not a number")),
                        },
                    }
                }

                VerificationRuleType::ForbiddenPattern { field_path, pattern } => {
                    match Self::resolve_path(payload, field_path).and_then(Value::as_str) {
                        Some(s) if s.contains(pattern.as_str()) => Some(format!(
                            "field '{field_path}' contains forbidden pattern '{pattern}'"
                        )),
                        _ => None,
                    }
                }

                VerificationRuleType::Custom { function_name } => {
                    match self.custom_rules.get(function_name.as_str()) {
                        Some(f) => f(payload),
                        None => Some(format!(
                            "no custom rule registered for function name '{function_name}'"
                        )),
                    }
                }
            };

            if let Some(message) = failure_msg {
                warn!(rule_id = %rule.rule_id, %message, "semantic rule failed");
                failures.push(VerificationFailure {
                    rule_id: rule.rule_id.clone(),
                    message,
                });
            }
        }

        let passed = failures.is_empty();
        debug!(
            schema_id = %schema.schema_id,
            passed,
            failure_count = failures.len(),
            "verification complete"
        );

        VerificationReport { passed, failures }
    }

    /// Verify `payload` and decode it into `T`.
    ///
    /// `capability` names the producer in the resulting error.
    pub fn decode<T: DeserializeOwned>(
        &self,
        capability: &str,
        payload: Value,
        schema: &OutputSchema,
    ) -> IntakeResult<T> {
        let report = self.verify(&payload, schema);
        if !report.passed {
            return Err(IntakeError::MalformedOutput {
                capability: capability.to_string(),
                reason: report.summary(),
            });
        }
        serde_json::from_value(payload).map_err(|e| IntakeError::MalformedOutput {
            capability: capability.to_string(),
            reason: format!("failed to decode verified output: {e}"),
        })
    }
}

impl Default for SchemaVerifier {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use intake_contracts::error::IntakeError;

    use super::SchemaVerifier;
    use crate::schema::{OutputSchema, VerificationRule, VerificationRuleType};

    // ── Builder helpers ───────────────────────────────────────────────────────

    fn make_schema(json_schema: serde_json::Value, rules: Vec<VerificationRule>) -> OutputSchema {
        OutputSchema {
            schema_id: "test-schema-v1".to_string(),
            json_schema,
            rules,
        }
    }

    fn rule(id: &str, rule_type: VerificationRuleType) -> VerificationRule {
        VerificationRule {
            rule_id: id.to_string(),
            description: format!("{id} check"),
            rule_type,
        }
    }

    fn score_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": { "score": { "type": "integer" } },
            "required": ["score"]
        })
    }

    // ── JSON Schema ───────────────────────────────────────────────────────────

    #[test]
    fn test_schema_pass() {
        let verifier = SchemaVerifier::new();
        let report = verifier.verify(&json!({ "score": 70 }), &make_schema(score_schema(), vec![]));
        assert!(report.passed, "expected pass, failures: {:?}", report.failures);
    }

    #[test]
    fn test_schema_fail() {
        let verifier = SchemaVerifier::new();
        let report = verifier.verify(&json!({ "other": 42 }), &make_schema(score_schema(), vec![]));

        assert!(!report.passed);
        assert_eq!(report.failures[0].rule_id, "json-schema");
    }

    // ── Semantic rules ────────────────────────────────────────────────────────

    #[test]
    fn test_required_field_nested_path() {
        let verifier = SchemaVerifier::new();
        let schema = make_schema(
            serde_json::Value::Null,
            vec![rule(
                "req-completeness",
                VerificationRuleType::RequiredField {
                    field_path: "documentQuality.completeness".to_string(),
                },
            )],
        );

        assert!(verifier.verify(&json!({ "documentQuality": { "completeness": 80 } }), &schema).passed);

        let report = verifier.verify(&json!({ "documentQuality": {} }), &schema);
        assert!(!report.passed);
        assert!(report.failures[0].message.contains("documentQuality.completeness"));
    }

    #[test]
    fn test_allowed_values() {
        let verifier = SchemaVerifier::new();
        let schema = make_schema(
            serde_json::Value::Null,
            vec![rule(
                "risk-level",
                VerificationRuleType::AllowedValues {
                    field_path: "riskLevel".to_string(),
                    allowed: vec![json!("low"), json!("medium"), json!("high")],
                },
            )],
        );

        assert!(verifier.verify(&json!({ "riskLevel": "low" }), &schema).passed);
        assert!(!verifier.verify(&json!({ "riskLevel": "extreme" }), &schema).passed);
    }

    #[test]
    fn test_number_range() {
        let verifier = SchemaVerifier::new();
        let schema = make_schema(
            serde_json::Value::Null,
            vec![rule(
                "complexity-range",
                VerificationRuleType::NumberRange {
                    field_path: "complexity".to_string(),
                    min: 1.0,
                    max: 10.0,
                },
            )],
        );

        assert!(verifier.verify(&json!({ "complexity": 10 }), &schema).passed);
        assert!(verifier.verify(&json!({}), &schema).passed, "absent field passes");

        let report = verifier.verify(&json!({ "complexity": 11 }), &schema);
        assert!(!report.passed);
        assert_eq!(report.failures[0].rule_id, "complexity-range");
    }

    #[test]
    fn test_forbidden_pattern_detected() {
        let verifier = SchemaVerifier::new();
        let schema = make_schema(
            serde_json::Value::Null,
            vec![rule(
                "no-placeholder",
                VerificationRuleType::ForbiddenPattern {
                    field_path: "summary".to_string(),
                    pattern: "{patientData}".to_string(),
                },
            )],
        );

        let report = verifier.verify(&json!({ "summary": "Summary of {patientData}" }), &schema);
        assert!(!report.passed);
        assert!(report.failures[0].message.contains("{patientData}"));
    }

    #[test]
    fn test_custom_rule_fail_and_unregistered() {
        let mut verifier = SchemaVerifier::new();
        verifier.register_rule(
            "always-fail",
            Box::new(|_payload| Some("custom check failed: condition not met".to_string())),
        );

        let schema = make_schema(
            serde_json::Value::Null,
            vec![
                rule(
                    "custom-check",
                    VerificationRuleType::Custom {
                        function_name: "always-fail".to_string(),
                    },
                ),
                rule(
                    "phantom-check",
                    VerificationRuleType::Custom {
                        function_name: "does-not-exist".to_string(),
                    },
                ),
            ],
        );

        let report = verifier.verify(&json!({}), &schema);
        assert_eq!(report.failures.len(), 2, "all failures are collected");
        assert!(report.failures[0].message.contains("condition not met"));
        assert!(report.failures[1].message.contains("does-not-exist"));
    }

    // ── decode ────────────────────────────────────────────────────────────────

    #[derive(Debug, Deserialize)]
    struct Scored {
        score: u8,
    }

    #[test]
    fn test_decode_passes_verified_payload() {
        let verifier = SchemaVerifier::new();
        let scored: Scored = verifier
            .decode("scorer", json!({ "score": 70 }), &make_schema(score_schema(), vec![]))
            .unwrap();
        assert_eq!(scored.score, 70);
    }

    #[test]
    fn test_decode_failure_is_malformed_output() {
        let verifier = SchemaVerifier::new();
        let result: Result<Scored, _> =
            verifier.decode("scorer", json!({ "other": 1 }), &make_schema(score_schema(), vec![]));

        match result {
            Err(IntakeError::MalformedOutput { capability, reason }) => {
                assert_eq!(capability, "scorer");
                assert!(reason.contains("json-schema"), "got: {reason}");
            }
            other => panic!("expected MalformedOutput, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_type_mismatch_after_verification() {
        let verifier = SchemaVerifier::new();
        // Passes the schema (integer) but overflows u8.
        let result: Result<Scored, _> =
            verifier.decode("scorer", json!({ "score": 300 }), &make_schema(score_schema(), vec![]));
        assert!(matches!(result, Err(IntakeError::MalformedOutput { .. })));
    }
}
