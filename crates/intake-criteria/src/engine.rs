//! The criteria evaluation algorithm.
//!
//! 1. Sort criteria ascending by `priority` (stable, so ties keep input order).
//! 2. For each criterion, resolve its field path and apply its operator.
//!    An unknown operator or unknown path never matches (except `is_null`
//!    on an unknown path) and is logged; evaluation continues.
//! 3. Start the score at 100, add the impact of every matched criterion,
//!    clamp to 0..=100.
//! 4. A matched deal-breaker criterion is a deal-breaker. Any other matched
//!    criterion with a negative impact is a warning.
//!
//! Evaluation is pure: no I/O, no shared state, identical output for
//! identical input.

use serde_json::Value;
use tracing::{debug, warn};

use intake_contracts::{
    criteria::{CriteriaEvaluation, CriteriaMatch, FacilityCriteria, Operator, RuleDefinition},
    patient::ExtractedPatientData,
    risk::RiskSeverity,
};

use crate::field::{FieldPath, FieldValue};

const BASE_SCORE: i64 = 100;

/// Evaluate `criteria` against `record`.
pub fn evaluate(record: &ExtractedPatientData, criteria: &[FacilityCriteria]) -> CriteriaEvaluation {
    let mut ordered: Vec<&FacilityCriteria> = criteria.iter().collect();
    ordered.sort_by_key(|c| c.priority);

    let mut matches = Vec::with_capacity(ordered.len());
    let mut deal_breakers = Vec::new();
    let mut warnings = Vec::new();
    let mut running = BASE_SCORE;

    for criterion in ordered {
        let outcome = evaluate_criterion(record, criterion);
        if outcome.matched {
            running += i64::from(outcome.score_impact);
            if outcome.is_deal_breaker {
                deal_breakers.push(outcome.clone());
            } else if outcome.score_impact < 0 {
                warnings.push(outcome.clone());
            }
        }
        matches.push(outcome);
    }

    let total_score = running.clamp(0, 100) as u8;
    debug!(
        criteria = matches.len(),
        total_score,
        deal_breakers = deal_breakers.len(),
        warnings = warnings.len(),
        "criteria evaluated"
    );

    CriteriaEvaluation {
        matches,
        total_score,
        deal_breakers,
        warnings,
    }
}

/// Evaluate a single criterion.
pub fn evaluate_criterion(record: &ExtractedPatientData, criterion: &FacilityCriteria) -> CriteriaMatch {
    let rule = &criterion.rule;
    let value = match FieldPath::parse(&rule.field) {
        Some(path) => path.resolve(record),
        None => {
            warn!(
                criteria_id = %criterion.id,
                field = %rule.field,
                "unknown field path; treating as undefined"
            );
            FieldValue::Undefined
        }
    };

    let matched = apply(&criterion.id, rule, &value);
    let is_deal_breaker = criterion.is_deal_breaker && matched;
    let severity = rule.flag_severity.unwrap_or(if criterion.is_deal_breaker {
        RiskSeverity::Critical
    } else {
        RiskSeverity::Medium
    });

    CriteriaMatch {
        criteria_id: criterion.id.clone(),
        criteria_name: criterion.name.clone(),
        category: criterion.category.clone(),
        matched,
        is_deal_breaker,
        score_impact: if matched { rule.score_impact } else { 0 },
        severity,
        reason: matched.then(|| {
            rule.message
                .clone()
                .unwrap_or_else(|| format!("Criterion \"{}\" matched", criterion.name))
        }),
    }
}

/// Apply `rule.operator` to the resolved field value.
fn apply(criteria_id: &str, rule: &RuleDefinition, field: &FieldValue) -> bool {
    let value = rule.value.as_ref().unwrap_or(&Value::Null);
    let values = rule.values.as_deref();

    match &rule.operator {
        Operator::Equals => !matches!(field, FieldValue::Undefined) && equals(field, value),
        Operator::NotEquals => !matches!(field, FieldValue::Undefined) && !equals(field, value),

        Operator::GreaterThan => match (field, value.as_f64()) {
            (FieldValue::Number(n), Some(bound)) => *n > bound,
            _ => false,
        },
        Operator::LessThan => match (field, value.as_f64()) {
            (FieldValue::Number(n), Some(bound)) => *n < bound,
            _ => false,
        },
        Operator::Between => match field {
            FieldValue::Number(n) => {
                *n >= rule.min.unwrap_or(f64::NEG_INFINITY) && *n <= rule.max.unwrap_or(f64::INFINITY)
            }
            _ => false,
        },

        Operator::Contains => match field {
            FieldValue::Text(s) => contains_text(s, value),
            FieldValue::List(items) => items.iter().any(|item| equals(item, value)),
            _ => false,
        },
        Operator::NotContains => match field {
            FieldValue::Text(s) => !contains_text(s, value),
            FieldValue::List(items) => !items.iter().any(|item| equals(item, value)),
            _ => false,
        },
        Operator::ContainsAny => match (field, values) {
            (FieldValue::List(items), Some(wanted)) => wanted
                .iter()
                .any(|w| items.iter().any(|item| equals(item, w))),
            (FieldValue::Text(s), Some(wanted)) => wanted.iter().any(|w| contains_text(s, w)),
            _ => false,
        },
        Operator::ContainsAll => match (field, values) {
            (FieldValue::List(items), Some(wanted)) => wanted
                .iter()
                .all(|w| items.iter().any(|item| equals(item, w))),
            _ => false,
        },

        Operator::InList => match values {
            Some(list) if !matches!(field, FieldValue::Undefined) => {
                list.iter().any(|v| equals(field, v))
            }
            _ => false,
        },
        Operator::NotInList => match values {
            Some(list) if !matches!(field, FieldValue::Undefined) => {
                !list.iter().any(|v| equals(field, v))
            }
            _ => false,
        },

        Operator::IsNull => field.is_nullish(),
        Operator::IsNotNull => !field.is_nullish(),

        Operator::Unknown(name) => {
            warn!(criteria_id = %criteria_id, operator = %name, "unknown operator; criterion does not match");
            false
        }
    }
}

/// Strict equality between a field value and a rule operand.
fn equals(field: &FieldValue, operand: &Value) -> bool {
    match (field, operand) {
        (FieldValue::Null, Value::Null) => true,
        (FieldValue::Bool(a), Value::Bool(b)) => a == b,
        (FieldValue::Number(a), Value::Number(b)) => b.as_f64() == Some(*a),
        (FieldValue::Text(a), Value::String(b)) => a == b,
        _ => false,
    }
}

/// Case-insensitive substring test. Non-string operands use their JSON text.
fn contains_text(haystack: &str, needle: &Value) -> bool {
    let needle = match needle {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
