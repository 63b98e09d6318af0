//! Loading a facility's criteria from TOML or JSON.
//!
//! A `CriteriaSet` is the on-disk form of a facility's rules. Loading
//! validates every rule up front: an unknown operator or field path is a
//! configuration error here, even though the engine itself tolerates both.
//!
//! Example:
//! ```toml
//! [[criteria]]
//! id = "no-ventilator"
//! name = "Ventilator dependency"
//! category = "clinical"
//! is_deal_breaker = true
//! priority = 1
//!
//! [criteria.rule]
//! field = "careRequirements.requiresVentilator"
//! operator = "equals"
//! value = true
//! message = "Facility cannot support ventilator-dependent patients"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use intake_contracts::{
    criteria::{CriteriaEvaluation, FacilityCriteria, Operator},
    error::{IntakeError, IntakeResult},
    patient::ExtractedPatientData,
};

use crate::engine;
use crate::field::FieldPath;

/// An ordered set of facility criteria.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CriteriaSet {
    #[serde(default)]
    pub criteria: Vec<FacilityCriteria>,
}

impl CriteriaSet {
    pub fn new(criteria: Vec<FacilityCriteria>) -> IntakeResult<Self> {
        let set = Self { criteria };
        set.validate()?;
        Ok(set)
    }

    /// Parse `s` as TOML with a `[[criteria]]` array.
    ///
    /// Returns `IntakeError::ConfigError` if the TOML is malformed, does not
    /// match the expected shape, or names an unknown operator or field.
    pub fn from_toml_str(s: &str) -> IntakeResult<Self> {
        let set: CriteriaSet = toml::from_str(s).map_err(|e| IntakeError::ConfigError {
            reason: format!("failed to parse criteria TOML: {}", e),
        })?;
        set.validate()?;
        Ok(set)
    }

    /// Parse `s` as JSON: either a bare array of criteria or an object with a
    /// `criteria` array.
    pub fn from_json_str(s: &str) -> IntakeResult<Self> {
        let value: serde_json::Value = serde_json::from_str(s).map_err(|e| IntakeError::ConfigError {
            reason: format!("failed to parse criteria JSON: {}", e),
        })?;
        let set = if value.is_array() {
            serde_json::from_value(value).map(|criteria| CriteriaSet { criteria })
        } else {
            serde_json::from_value(value)
        }
        .map_err(|e| IntakeError::ConfigError {
            reason: format!("failed to parse criteria JSON: {}", e),
        })?;
        set.validate()?;
        Ok(set)
    }

    /// Read the file at `path`. Files ending in `.json` are parsed as JSON,
    /// everything else as TOML.
    pub fn from_file(path: &Path) -> IntakeResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| IntakeError::ConfigError {
            reason: format!("failed to read criteria file '{}': {}", path.display(), e),
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_toml_str(&contents),
        }
    }

    /// The active criteria, ascending by priority.
    pub fn active(&self) -> Vec<FacilityCriteria> {
        let mut active: Vec<FacilityCriteria> =
            self.criteria.iter().filter(|c| c.is_active).cloned().collect();
        active.sort_by_key(|c| c.priority);
        active
    }

    /// Evaluate the active criteria against `record`.
    pub fn evaluate(&self, record: &ExtractedPatientData) -> CriteriaEvaluation {
        engine::evaluate(record, &self.active())
    }

    fn validate(&self) -> IntakeResult<()> {
        for criterion in &self.criteria {
            if let Operator::Unknown(name) = &criterion.rule.operator {
                return Err(IntakeError::ConfigError {
                    reason: format!("criterion '{}' uses unknown operator '{}'", criterion.id, name),
                });
            }
            if FieldPath::parse(&criterion.rule.field).is_none() {
                return Err(IntakeError::ConfigError {
                    reason: format!(
                        "criterion '{}' references unknown field '{}'",
                        criterion.id, criterion.rule.field
                    ),
                });
            }
        }
        Ok(())
    }
}
