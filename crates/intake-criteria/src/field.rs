//! Typed field paths into the patient record.
//!
//! A rule's `field` is a dotted camelCase path. Paths are resolved against a
//! fixed table of accessors rather than by walking a JSON tree, so an unknown
//! path is caught when a criteria set is loaded instead of silently never
//! matching. A path that ends inside a list (`medications.name`) projects the
//! named field out of every element.

use std::fmt;

use serde::Serialize;

use intake_contracts::patient::ExtractedPatientData;

/// The value found at a field path.
///
/// `Undefined` means the path does not exist in the record at all, as
/// opposed to `Null`, a known field that holds no value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn is_nullish(&self) -> bool {
        matches!(self, FieldValue::Undefined | FieldValue::Null)
    }
}

type Accessor = fn(&ExtractedPatientData) -> FieldValue;

/// A validated path into [`ExtractedPatientData`].
#[derive(Clone)]
pub struct FieldPath {
    path: String,
    accessor: Accessor,
}

impl fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldPath").field(&self.path).finish()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl FieldPath {
    /// Look `path` up in the accessor table. `None` for unknown paths.
    pub fn parse(path: &str) -> Option<Self> {
        let accessor: Accessor = match path.trim() {
            // demographics
            "demographics.firstName" => |r| text(&r.demographics.first_name),
            "demographics.lastName" => |r| text(&r.demographics.last_name),
            "demographics.dob" => |r| text(&r.demographics.dob),
            "demographics.age" => |r| number(r.demographics.age),
            "demographics.gender" => |r| wire(&r.demographics.gender),
            "demographics.primaryLanguage" => |r| text(&r.demographics.primary_language),
            "demographics.interpreterNeeded" => |r| FieldValue::Bool(r.demographics.interpreter_needed),

            // clinicalSummary
            "clinicalSummary.chiefComplaint" => |r| text(&r.clinical_summary.chief_complaint),
            "clinicalSummary.hospitalCourseSummary" => {
                |r| text(&r.clinical_summary.hospital_course_summary)
            }
            "clinicalSummary.codeStatus" => |r| wire(&r.clinical_summary.code_status),
            "clinicalSummary.isolationPrecautions" => {
                |r| wire(&r.clinical_summary.isolation_precautions)
            }

            // diagnoses[]
            "diagnoses.icd10Code" => {
                |r| list(r.diagnoses.iter().map(|d| FieldValue::Text(d.icd10_code.clone())))
            }
            "diagnoses.description" => {
                |r| list(r.diagnoses.iter().map(|d| FieldValue::Text(d.description.clone())))
            }
            "diagnoses.type" => |r| list(r.diagnoses.iter().map(|d| wire(&d.kind))),
            "diagnoses.onset" => |r| list(r.diagnoses.iter().map(|d| wire(&d.onset))),

            // medications[]
            "medications.name" => {
                |r| list(r.medications.iter().map(|m| FieldValue::Text(m.name.clone())))
            }
            "medications.route" => |r| list(r.medications.iter().map(|m| wire(&m.route))),
            "medications.isHighCost" => {
                |r| list(r.medications.iter().map(|m| FieldValue::Bool(m.is_high_cost)))
            }
            "medications.requiresMonitoring" => {
                |r| list(r.medications.iter().map(|m| FieldValue::Bool(m.requires_monitoring)))
            }

            // functionalStatus
            "functionalStatus.mobility" => |r| wire(&r.functional_status.mobility),
            "functionalStatus.bimsScore" => |r| number(r.functional_status.bims_score),
            "functionalStatus.fallRisk" => |r| wire(&r.functional_status.fall_risk),
            "functionalStatus.weightLbs" => |r| number(r.functional_status.weight_lbs),

            // careRequirements
            "careRequirements.requiresVentilator" => {
                |r| FieldValue::Bool(r.care_requirements.requires_ventilator)
            }
            "careRequirements.requiresTracheostomy" => {
                |r| FieldValue::Bool(r.care_requirements.requires_tracheostomy)
            }
            "careRequirements.requiresWoundCare" => {
                |r| FieldValue::Bool(r.care_requirements.requires_wound_care)
            }
            "careRequirements.wounds.location" => {
                |r| list(r.care_requirements.wounds.iter().map(|w| FieldValue::Text(w.location.clone())))
            }
            "careRequirements.wounds.type" => {
                |r| list(r.care_requirements.wounds.iter().map(|w| wire(&w.kind)))
            }
            "careRequirements.wounds.stage" => {
                |r| list(r.care_requirements.wounds.iter().map(|w| wire(&w.stage)))
            }
            "careRequirements.requiresIvTherapy" => {
                |r| FieldValue::Bool(r.care_requirements.requires_iv_therapy)
            }
            "careRequirements.ivMedications" => {
                |r| texts(&r.care_requirements.iv_medications)
            }
            "careRequirements.requiresDialysis" => {
                |r| FieldValue::Bool(r.care_requirements.requires_dialysis)
            }
            "careRequirements.requiresOxygen" => {
                |r| FieldValue::Bool(r.care_requirements.requires_oxygen)
            }
            "careRequirements.oxygenLitersPerMinute" => {
                |r| number(r.care_requirements.oxygen_liters_per_minute)
            }
            "careRequirements.therapyNeeds.physicalTherapy" => {
                |r| FieldValue::Bool(r.care_requirements.therapy_needs.physical_therapy)
            }
            "careRequirements.therapyNeeds.occupationalTherapy" => {
                |r| FieldValue::Bool(r.care_requirements.therapy_needs.occupational_therapy)
            }
            "careRequirements.therapyNeeds.speechTherapy" => {
                |r| FieldValue::Bool(r.care_requirements.therapy_needs.speech_therapy)
            }

            // behavioralStatus
            "behavioralStatus.hasBehavioralIssues" => {
                |r| FieldValue::Bool(r.behavioral_status.has_behavioral_issues)
            }
            "behavioralStatus.behaviors" => |r| texts(&r.behavioral_status.behaviors),
            "behavioralStatus.elopementRisk" => |r| wire(&r.behavioral_status.elopement_risk),
            "behavioralStatus.substanceUseActive" => {
                |r| FieldValue::Bool(r.behavioral_status.substance_use_active)
            }

            // insuranceInfo
            "insuranceInfo.primaryPayer" => |r| wire(&r.insurance_info.primary_payer),
            "insuranceInfo.payerName" => |r| text(&r.insurance_info.payer_name),
            "insuranceInfo.memberId" => |r| text(&r.insurance_info.member_id),
            "insuranceInfo.snfDaysRemaining" => |r| number(r.insurance_info.snf_days_remaining),
            "insuranceInfo.medicaidPending" => |r| FieldValue::Bool(r.insurance_info.medicaid_pending),

            _ => return None,
        };

        Some(Self {
            path: path.trim().to_string(),
            accessor,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn resolve(&self, record: &ExtractedPatientData) -> FieldValue {
        (self.accessor)(record)
    }
}

/// Resolve a raw dotted path. Unknown paths resolve to `Undefined`.
pub fn resolve(record: &ExtractedPatientData, path: &str) -> FieldValue {
    match FieldPath::parse(path) {
        Some(field) => field.resolve(record),
        None => FieldValue::Undefined,
    }
}

fn text(value: &Option<String>) -> FieldValue {
    match value {
        Some(s) => FieldValue::Text(s.clone()),
        None => FieldValue::Null,
    }
}

fn number<N: Into<f64>>(value: Option<N>) -> FieldValue {
    match value {
        Some(n) => FieldValue::Number(n.into()),
        None => FieldValue::Null,
    }
}

/// Enum fields compare by their wire label, e.g. `"Medicare A"`.
fn wire<T: Serialize>(value: &Option<T>) -> FieldValue {
    match value.as_ref().map(serde_json::to_value) {
        Some(Ok(serde_json::Value::String(label))) => FieldValue::Text(label),
        _ => FieldValue::Null,
    }
}

fn texts(values: &[String]) -> FieldValue {
    FieldValue::List(values.iter().cloned().map(FieldValue::Text).collect())
}

fn list(values: impl Iterator<Item = FieldValue>) -> FieldValue {
    FieldValue::List(values.collect())
}
