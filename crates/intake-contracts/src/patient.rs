//! The canonical patient record produced by extraction.
//!
//! Every section is a typed record whose fields are individually nullable.
//! Booleans default to `false`, lists to empty, strings, numbers and enums to
//! `None`. Deserialization is lenient field by field: a value of the wrong
//! shape becomes `None`/`false` instead of rejecting the whole record, so one
//! odd field from an extraction capability never discards the rest.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};

use crate::ids::{DocumentId, ReferralId};
use crate::referral::DocumentType;

// ── Lenient field decoding ────────────────────────────────────────────────────

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient::<D, bool>(deserializer)?.unwrap_or(false))
}

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let items = match value {
        Some(serde_json::Value::Array(items)) => items,
        _ => return Ok(Vec::new()),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

// ── Enumerations ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeStatus {
    #[serde(rename = "Full Code")]
    FullCode,
    #[serde(rename = "DNR")]
    Dnr,
    #[serde(rename = "DNR/DNI")]
    DnrDni,
    #[serde(rename = "Comfort Care")]
    ComfortCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsolationPrecautions {
    #[serde(rename = "None")]
    NoPrecautions,
    Contact,
    Droplet,
    Airborne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosisKind {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Onset {
    Acute,
    Chronic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MedicationRoute {
    #[serde(rename = "PO")]
    Oral,
    #[serde(rename = "IV")]
    Intravenous,
    #[serde(rename = "IM")]
    Intramuscular,
    #[serde(rename = "SQ")]
    Subcutaneous,
    Topical,
    Inhaled,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mobility {
    Independent,
    Supervision,
    #[serde(rename = "1 Person Assist")]
    OnePersonAssist,
    #[serde(rename = "2 Person Assist")]
    TwoPersonAssist,
    #[serde(rename = "Non-ambulatory")]
    NonAmbulatory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WoundType {
    #[serde(rename = "Pressure Ulcer")]
    PressureUlcer,
    Surgical,
    Diabetic,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WoundStage {
    #[serde(rename = "1")]
    Stage1,
    #[serde(rename = "2")]
    Stage2,
    #[serde(rename = "3")]
    Stage3,
    #[serde(rename = "4")]
    Stage4,
    Unstageable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElopementRisk {
    #[serde(rename = "None")]
    NoRisk,
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimaryPayer {
    #[serde(rename = "Medicare A")]
    MedicareA,
    #[serde(rename = "Medicare Advantage")]
    MedicareAdvantage,
    Medicaid,
    #[serde(rename = "Managed Care")]
    ManagedCare,
    Commercial,
    #[serde(rename = "Self Pay")]
    SelfPay,
}

// ── Record sections ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Demographics {
    #[serde(default, deserialize_with = "lenient")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub last_name: Option<String>,
    /// ISO `YYYY-MM-DD`, kept as text because source documents vary.
    #[serde(default, deserialize_with = "lenient")]
    pub dob: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub age: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub gender: Option<Gender>,
    #[serde(default, deserialize_with = "lenient")]
    pub primary_language: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub interpreter_needed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalSummary {
    #[serde(default, deserialize_with = "lenient")]
    pub chief_complaint: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub hospital_course_summary: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub code_status: Option<CodeStatus>,
    #[serde(default, deserialize_with = "lenient")]
    pub isolation_precautions: Option<IsolationPrecautions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    #[serde(default)]
    pub icd10_code: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub kind: Option<DiagnosisKind>,
    #[serde(default, deserialize_with = "lenient")]
    pub onset: Option<Onset>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub dose: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub route: Option<MedicationRoute>,
    #[serde(default, deserialize_with = "lenient")]
    pub frequency: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_high_cost: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub requires_monitoring: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionalStatus {
    #[serde(default, deserialize_with = "lenient")]
    pub mobility: Option<Mobility>,
    /// Brief Interview for Mental Status, 0–15.
    #[serde(default, deserialize_with = "lenient")]
    pub bims_score: Option<u8>,
    #[serde(default, deserialize_with = "lenient")]
    pub fall_risk: Option<RiskLevel>,
    #[serde(default, deserialize_with = "lenient")]
    pub weight_lbs: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wound {
    #[serde(default)]
    pub location: String,
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub kind: Option<WoundType>,
    #[serde(default, deserialize_with = "lenient")]
    pub stage: Option<WoundStage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TherapyNeeds {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub physical_therapy: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub occupational_therapy: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub speech_therapy: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CareRequirements {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub requires_ventilator: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub requires_tracheostomy: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub requires_wound_care: bool,
    #[serde(default, deserialize_with = "lenient_list")]
    pub wounds: Vec<Wound>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub requires_iv_therapy: bool,
    #[serde(default, deserialize_with = "lenient_list")]
    pub iv_medications: Vec<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub requires_dialysis: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub requires_oxygen: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub oxygen_liters_per_minute: Option<f64>,
    #[serde(default)]
    pub therapy_needs: TherapyNeeds,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehavioralStatus {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub has_behavioral_issues: bool,
    #[serde(default, deserialize_with = "lenient_list")]
    pub behaviors: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub elopement_risk: Option<ElopementRisk>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub substance_use_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsuranceInfo {
    #[serde(default, deserialize_with = "lenient")]
    pub primary_payer: Option<PrimaryPayer>,
    #[serde(default, deserialize_with = "lenient")]
    pub payer_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub member_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub snf_days_remaining: Option<u32>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub medicaid_pending: bool,
}

/// The canonical structured patient record, one per referral.
///
/// `Default` is the fully-populated empty record used when extraction fails:
/// every key present, every value null/false/empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedPatientData {
    #[serde(default)]
    pub demographics: Demographics,
    #[serde(default)]
    pub clinical_summary: ClinicalSummary,
    #[serde(default, deserialize_with = "lenient_list")]
    pub diagnoses: Vec<Diagnosis>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub medications: Vec<Medication>,
    #[serde(default)]
    pub functional_status: FunctionalStatus,
    #[serde(default)]
    pub care_requirements: CareRequirements,
    #[serde(default)]
    pub behavioral_status: BehavioralStatus,
    #[serde(default)]
    pub insurance_info: InsuranceInfo,
}

/// One OCR'd, classified document handed to the extraction capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentText {
    pub document_id: DocumentId,
    pub document_type: DocumentType,
    pub text: String,
}

/// The persisted extraction for a referral. Replaced wholesale on every
/// extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRecord {
    pub referral_id: ReferralId,
    pub data: ExtractedPatientData,
    pub source_document_ids: Vec<DocumentId>,
    pub extraction_version: String,
    pub model_used: Option<String>,
    /// True when the empty fallback record was stored because extraction failed.
    pub degraded: bool,
    pub extracted_at: DateTime<Utc>,
}
