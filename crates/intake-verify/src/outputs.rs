//! Built-in schemas for every capability the pipeline calls.
//!
//! Structure is checked by JSON Schema; score ranges and the summary checks
//! are semantic rules so failures name the offending field in plain words.

use serde_json::{json, Value};

use crate::engine::SchemaVerifier;
use crate::schema::{OutputSchema, VerificationRule, VerificationRuleType};

/// Name of the custom rule rejecting blank documentation summaries.
pub const NON_BLANK_SUMMARY: &str = "non_blank_summary";

/// A verifier with every custom rule the built-in schemas reference.
pub fn capability_verifier() -> SchemaVerifier {
    let mut verifier = SchemaVerifier::new();
    verifier.register_rule(
        NON_BLANK_SUMMARY,
        Box::new(|payload| {
            let blank = payload
                .get("patientSummary")
                .and_then(Value::as_str)
                .map(|s| s.trim().is_empty())
                .unwrap_or(true);
            blank.then(|| "patientSummary must not be blank".to_string())
        }),
    );
    verifier
}

fn required(id: &str, field_path: &str) -> VerificationRule {
    VerificationRule {
        rule_id: id.to_string(),
        description: format!("{field_path} must be present"),
        rule_type: VerificationRuleType::RequiredField {
            field_path: field_path.to_string(),
        },
    }
}

fn range(id: &str, field_path: &str, min: f64, max: f64) -> VerificationRule {
    VerificationRule {
        rule_id: id.to_string(),
        description: format!("{field_path} must lie in {min}..={max}"),
        rule_type: VerificationRuleType::NumberRange {
            field_path: field_path.to_string(),
            min,
            max,
        },
    }
}

fn risk_finding() -> Value {
    json!({
        "type": "object",
        "properties": {
            "category": { "type": "string" },
            "flagType": { "type": "string" },
            "severity": { "enum": ["low", "medium", "high", "critical"] },
            "isDealBreaker": { "type": "boolean" },
            "title": { "type": "string" },
            "description": { "type": "string" },
            "recommendation": { "type": ["string", "null"] }
        },
        "required": ["category", "flagType", "severity", "title"]
    })
}

fn string_list() -> Value {
    json!({ "type": "array", "items": { "type": "string" } })
}

fn finding_list() -> Value {
    json!({ "type": "array", "items": risk_finding() })
}

pub fn classification() -> OutputSchema {
    OutputSchema {
        schema_id: "classification-v1".to_string(),
        json_schema: json!({
            "type": "object",
            "properties": {
                "type": { "type": "string", "minLength": 1 },
                "confidence": { "type": "number" },
                "reasoning": { "type": ["string", "null"] }
            },
            "required": ["type", "confidence"]
        }),
        rules: vec![
            required("classification-type", "type"),
            range("classification-confidence", "confidence", 0.0, 1.0),
        ],
    }
}

pub fn extraction() -> OutputSchema {
    let section = json!({ "type": "object" });
    let list = json!({ "type": ["array", "null"] });
    OutputSchema {
        schema_id: "extraction-v1".to_string(),
        json_schema: json!({
            "type": "object",
            "properties": {
                "demographics": section,
                "clinicalSummary": section,
                "diagnoses": list,
                "medications": list,
                "functionalStatus": section,
                "careRequirements": section,
                "behavioralStatus": section,
                "insuranceInfo": section
            }
        }),
        rules: vec![range("extraction-bims", "functionalStatus.bimsScore", 0.0, 15.0)],
    }
}

pub fn admissions() -> OutputSchema {
    OutputSchema {
        schema_id: "admissions-v1".to_string(),
        json_schema: json!({
            "type": "object",
            "properties": {
                "fitScore": { "type": "integer" },
                "dealBreakers": finding_list(),
                "warnings": finding_list(),
                "positiveFactors": string_list(),
                "reasoning": { "type": ["string", "null"] }
            },
            "required": ["fitScore"]
        }),
        rules: vec![range("admissions-fit", "fitScore", 0.0, 100.0)],
    }
}

pub fn reimbursement() -> OutputSchema {
    let component = json!({
        "type": "object",
        "properties": {
            "category": { "type": "string" },
            "dailyRate": { "type": "number", "minimum": 0 }
        },
        "required": ["category", "dailyRate"]
    });
    OutputSchema {
        schema_id: "reimbursement-v1".to_string(),
        json_schema: json!({
            "type": "object",
            "properties": {
                "pdpmComponents": {
                    "type": "object",
                    "properties": {
                        "nursing": component,
                        "pt": component,
                        "ot": component,
                        "slp": component,
                        "nta": component
                    },
                    "required": ["nursing", "pt", "ot", "slp", "nta"]
                },
                "estimatedDailyRate": { "type": "number", "minimum": 0 },
                "estimatedLosDays": { "type": "integer", "minimum": 0 },
                "estimatedTotalRevenue": { "type": "number", "minimum": 0 },
                "financialScore": { "type": "integer" },
                "financialFlags": finding_list(),
                "payerAnalysis": {
                    "type": "object",
                    "properties": {
                        "payerType": { "type": "string" },
                        "riskLevel": { "type": "string" },
                        "notes": { "type": "string" }
                    },
                    "required": ["payerType", "riskLevel"]
                }
            },
            "required": [
                "pdpmComponents",
                "estimatedDailyRate",
                "estimatedLosDays",
                "estimatedTotalRevenue",
                "financialScore",
                "payerAnalysis"
            ]
        }),
        rules: vec![
            range("reimbursement-score", "financialScore", 0.0, 100.0),
            VerificationRule {
                rule_id: "reimbursement-payer-risk".to_string(),
                description: "payer risk level must be low, medium or high".to_string(),
                rule_type: VerificationRuleType::AllowedValues {
                    field_path: "payerAnalysis.riskLevel".to_string(),
                    allowed: vec![json!("low"), json!("medium"), json!("high")],
                },
            },
        ],
    }
}

pub fn clinical() -> OutputSchema {
    OutputSchema {
        schema_id: "clinical-v1".to_string(),
        json_schema: json!({
            "type": "object",
            "properties": {
                "clinicalComplexityScore": { "type": "integer" },
                "operationalScore": { "type": "integer" },
                "specialCareNeeds": string_list(),
                "comorbidityRisks": finding_list(),
                "equipmentNeeds": string_list(),
                "staffingConsiderations": string_list(),
                "estimatedNursingHoursPerDay": { "type": "number" }
            },
            "required": ["clinicalComplexityScore", "operationalScore", "estimatedNursingHoursPerDay"]
        }),
        rules: vec![
            range("clinical-complexity", "clinicalComplexityScore", 1.0, 10.0),
            range("clinical-operational", "operationalScore", 0.0, 100.0),
            range("clinical-nursing-hours", "estimatedNursingHoursPerDay", 0.0, 24.0),
        ],
    }
}

pub fn documentation() -> OutputSchema {
    let quality = json!({ "type": "integer" });
    OutputSchema {
        schema_id: "documentation-v1".to_string(),
        json_schema: json!({
            "type": "object",
            "properties": {
                "patientSummary": { "type": "string" },
                "missingDocuments": string_list(),
                "evidenceCitations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "claim": { "type": "string" },
                            "source": { "type": "string" },
                            "excerpt": { "type": ["string", "null"] }
                        },
                        "required": ["claim", "source"]
                    }
                },
                "documentQuality": {
                    "type": "object",
                    "properties": {
                        "completeness": quality,
                        "legibility": quality,
                        "recency": quality
                    },
                    "required": ["completeness", "legibility", "recency"]
                },
                "keyFindings": string_list()
            },
            "required": ["patientSummary", "documentQuality"]
        }),
        rules: vec![
            range("documentation-completeness", "documentQuality.completeness", 0.0, 100.0),
            range("documentation-legibility", "documentQuality.legibility", 0.0, 100.0),
            range("documentation-recency", "documentQuality.recency", 0.0, 100.0),
            VerificationRule {
                rule_id: "documentation-placeholder".to_string(),
                description: "summary must not contain an unfilled template placeholder".to_string(),
                rule_type: VerificationRuleType::ForbiddenPattern {
                    field_path: "patientSummary".to_string(),
                    pattern: "{patientData}".to_string(),
                },
            },
            VerificationRule {
                rule_id: "documentation-summary".to_string(),
                description: "summary must not be blank".to_string(),
                rule_type: VerificationRuleType::Custom {
                    function_name: NON_BLANK_SUMMARY.to_string(),
                },
            },
        ],
    }
}
