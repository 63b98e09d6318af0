//! # intake-criteria
//!
//! A deterministic rule engine that scores a patient record against a
//! facility's admission criteria.
//!
//! ## Overview
//!
//! [`evaluate`] takes a patient record and a facility's criteria and returns
//! every per-criterion outcome, a total score clamped to 0..=100, and the
//! deal-breakers and warnings among the matches. It is a pure function.
//!
//! [`CriteriaSet`] loads criteria from TOML or JSON and validates operators
//! and field paths at load time.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use intake_criteria::CriteriaSet;
//!
//! let set = CriteriaSet::from_file(Path::new("criteria/sunrise.toml"))?;
//! let evaluation = set.evaluate(&record);
//! ```

pub mod engine;
pub mod field;
pub mod set;

pub use engine::{evaluate, evaluate_criterion};
pub use field::{FieldPath, FieldValue};
pub use set::CriteriaSet;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use intake_contracts::{error::IntakeError, patient::ExtractedPatientData};

    use crate::{field, CriteriaSet, FieldValue};

    const FACILITY_TOML: &str = r#"
        [[criteria]]
        id = "no-ventilator"
        name = "Ventilator dependency"
        category = "clinical"
        is_deal_breaker = true
        priority = 1

        [criteria.rule]
        field = "careRequirements.requiresVentilator"
        operator = "equals"
        value = true

        [[criteria]]
        id = "payer"
        name = "Preferred payer"
        category = "financial"
        priority = 2
        is_active = false

        [criteria.rule]
        field = "insuranceInfo.primaryPayer"
        operator = "not_in_list"
        values = ["Medicare A", "Medicare Advantage"]
        score_impact = -15
    "#;

    // ── 1. TOML loading ───────────────────────────────────────────────────────

    #[test]
    fn test_toml_loads_and_filters_inactive() {
        let set = CriteriaSet::from_toml_str(FACILITY_TOML).unwrap();
        assert_eq!(set.criteria.len(), 2);

        let active = set.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "no-ventilator");
    }

    #[test]
    fn test_toml_evaluation_uses_active_only() {
        let set = CriteriaSet::from_toml_str(FACILITY_TOML).unwrap();
        let mut record = ExtractedPatientData::default();
        record.care_requirements.requires_ventilator = true;

        let evaluation = set.evaluate(&record);
        assert!(evaluation.has_deal_breakers());
        assert_eq!(evaluation.matches.len(), 1);
        assert_eq!(evaluation.total_score, 100, "deal-breaker carries no impact here");
    }

    // ── 2. JSON loading ───────────────────────────────────────────────────────

    #[test]
    fn test_json_accepts_bare_array() {
        let json = r#"[{
            "id": "bims",
            "name": "Cognition",
            "category": "clinical",
            "ruleDefinition": { "field": "functionalStatus.bimsScore", "operator": "less_than", "value": 8, "score_impact": -20 }
        }]"#;
        let set = CriteriaSet::from_json_str(json).unwrap();
        assert_eq!(set.criteria[0].rule.score_impact, -20);
    }

    // ── 3. validation ─────────────────────────────────────────────────────────

    #[test]
    fn test_unknown_field_is_config_error() {
        let toml = r#"
            [[criteria]]
            id = "bad"
            name = "Bad path"
            category = "clinical"
            [criteria.rule]
            field = "demographics.shoeSize"
            operator = "is_null"
        "#;
        match CriteriaSet::from_toml_str(toml) {
            Err(IntakeError::ConfigError { reason }) => {
                assert!(reason.contains("demographics.shoeSize"), "got: {reason}");
            }
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_operator_is_config_error() {
        let toml = r#"
            [[criteria]]
            id = "bad"
            name = "Bad operator"
            category = "clinical"
            [criteria.rule]
            field = "demographics.age"
            operator = "approximately"
        "#;
        assert!(matches!(
            CriteriaSet::from_toml_str(toml),
            Err(IntakeError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_toml_parse_error() {
        match CriteriaSet::from_toml_str("this is not valid toml ][[[") {
            Err(IntakeError::ConfigError { reason }) => {
                assert!(reason.contains("failed to parse criteria TOML"), "got: {reason}");
            }
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    // ── 4. field resolution ───────────────────────────────────────────────────

    #[test]
    fn test_enum_fields_resolve_to_wire_labels() {
        let record: ExtractedPatientData = serde_json::from_value(serde_json::json!({
            "functionalStatus": { "mobility": "1 Person Assist" }
        }))
        .unwrap();
        assert_eq!(
            field::resolve(&record, "functionalStatus.mobility"),
            FieldValue::Text("1 Person Assist".to_string())
        );
        assert_eq!(field::resolve(&record, "functionalStatus.fallRisk"), FieldValue::Null);
        assert_eq!(field::resolve(&record, "nope.nothing"), FieldValue::Undefined);
    }
}
