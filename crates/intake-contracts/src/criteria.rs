//! Facility admission criteria and their evaluation results.
//!
//! Criteria are read-only input to the rule engine. Their lifecycle is owned
//! by facility configuration; the pipeline only ever reads the active set.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::risk::RiskSeverity;

/// The closed set of comparison operators a rule may use.
///
/// Parsed from the snake_case names used in rule definitions. An unrecognised
/// name is kept as `Unknown` rather than rejected: the engine treats it as a
/// non-match and logs it, so one bad rule never disables a facility's set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Between,
    Contains,
    NotContains,
    ContainsAny,
    ContainsAll,
    InList,
    NotInList,
    IsNull,
    IsNotNull,
    Unknown(String),
}

impl Operator {
    pub fn as_str(&self) -> &str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "not_equals",
            Operator::GreaterThan => "greater_than",
            Operator::LessThan => "less_than",
            Operator::Between => "between",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::ContainsAny => "contains_any",
            Operator::ContainsAll => "contains_all",
            Operator::InList => "in_list",
            Operator::NotInList => "not_in_list",
            Operator::IsNull => "is_null",
            Operator::IsNotNull => "is_not_null",
            Operator::Unknown(name) => name,
        }
    }
}

impl From<String> for Operator {
    fn from(name: String) -> Self {
        match name.as_str() {
            "equals" => Operator::Equals,
            "not_equals" => Operator::NotEquals,
            "greater_than" => Operator::GreaterThan,
            "less_than" => Operator::LessThan,
            "between" => Operator::Between,
            "contains" => Operator::Contains,
            "not_contains" => Operator::NotContains,
            "contains_any" => Operator::ContainsAny,
            "contains_all" => Operator::ContainsAll,
            "in_list" => Operator::InList,
            "not_in_list" => Operator::NotInList,
            "is_null" => Operator::IsNull,
            "is_not_null" => Operator::IsNotNull,
            _ => Operator::Unknown(name),
        }
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The comparison a criterion performs against the patient record.
///
/// Example in TOML:
/// ```toml
/// [criteria.rule]
/// field = "careRequirements.requiresVentilator"
/// operator = "equals"
/// value = true
/// message = "Facility cannot support ventilator-dependent patients"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Dotted camelCase path into the patient record, e.g.
    /// `functionalStatus.bimsScore` or `medications.name`.
    pub field: String,

    pub operator: Operator,

    /// Comparison value for single-operand operators.
    #[serde(default)]
    pub value: Option<Value>,

    /// Comparison list for `contains_any`, `contains_all`, `in_list` and
    /// `not_in_list`.
    #[serde(default)]
    pub values: Option<Vec<Value>>,

    /// Inclusive lower bound for `between`. Open when absent.
    #[serde(default)]
    pub min: Option<f64>,

    /// Inclusive upper bound for `between`. Open when absent.
    #[serde(default)]
    pub max: Option<f64>,

    /// Signed adjustment applied to the running score when matched.
    #[serde(default, alias = "scoreImpact")]
    pub score_impact: i32,

    #[serde(default)]
    pub message: Option<String>,

    /// Severity of the risk flag raised from a match. Defaults to critical for
    /// deal-breakers and medium for warnings.
    #[serde(default, alias = "flagSeverity")]
    pub flag_severity: Option<RiskSeverity>,
}

fn default_weight() -> f64 {
    1.0
}

fn default_active() -> bool {
    true
}

/// A named admission rule belonging to a facility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityCriteria {
    pub id: String,
    pub name: String,
    /// Free-form grouping such as `clinical`, `financial` or `behavioral`.
    pub category: String,
    #[serde(alias = "ruleDefinition", alias = "rule_definition")]
    pub rule: RuleDefinition,
    #[serde(default, alias = "isDealBreaker")]
    pub is_deal_breaker: bool,
    /// Evaluation order, ascending.
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_active", alias = "isActive")]
    pub is_active: bool,
}

/// Outcome of evaluating one criterion. Transient, never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaMatch {
    pub criteria_id: String,
    pub criteria_name: String,
    pub category: String,
    pub matched: bool,
    /// True only when the criterion is flagged as a deal-breaker and matched.
    pub is_deal_breaker: bool,
    /// The criterion's impact when matched, otherwise zero.
    pub score_impact: i32,
    pub severity: RiskSeverity,
    pub reason: Option<String>,
}

/// The full result of running a facility's criteria against one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaEvaluation {
    /// One entry per criterion, in evaluation order.
    pub matches: Vec<CriteriaMatch>,
    /// 100 plus every matched impact, clamped to 0..=100.
    pub total_score: u8,
    pub deal_breakers: Vec<CriteriaMatch>,
    /// Matched, non-deal-breaker criteria with a negative impact.
    pub warnings: Vec<CriteriaMatch>,
}

impl CriteriaEvaluation {
    pub fn has_deal_breakers(&self) -> bool {
        !self.deal_breakers.is_empty()
    }
}
