//! Fictional referral packets and canned capability answers.
//!
//! All data in this module is hardcoded and fictional. No real patient
//! identifiers or PHI are present. The document texts stand in for what an
//! OCR provider would read off a hospital's faxed referral packet.

use serde_json::{json, Value};

/// Facility whose criteria live in `criteria/sunrise.toml`.
pub const SUNRISE_FACILITY: &str = "sunrise-snf";

/// Admission criteria for the Sunrise facility.
pub const SUNRISE_CRITERIA: &str = include_str!("../criteria/sunrise.toml");

/// One file in a referral packet.
#[derive(Debug, Clone, Copy)]
pub struct MockDocument {
    pub filename: &'static str,
    pub content_type: &'static str,
    pub text: &'static str,
}

impl MockDocument {
    pub fn bytes(&self) -> Vec<u8> {
        self.text.as_bytes().to_vec()
    }
}

// ── Referral packets ──────────────────────────────────────────────────────────

const FACE_SHEET: MockDocument = MockDocument {
    filename: "face_sheet.pdf",
    content_type: "application/pdf",
    text: "FACE SHEET\n\
           Patient: Ellison, Margaret   DOB: 03/14/1942   Sex: F\n\
           Primary language: English\n\
           Primary insurance: Medicare A   Member ID: 1EG4-TE5-MK72\n\
           Emergency contact: Daniel Ellison (son)",
};

const DISCHARGE_SUMMARY: MockDocument = MockDocument {
    filename: "discharge_summary.pdf",
    content_type: "application/pdf",
    text: "DISCHARGE SUMMARY\n\
           Admitted after a mechanical fall at home with right femoral neck fracture.\n\
           Underwent right hip ORIF on hospital day 2, uncomplicated.\n\
           Type 2 diabetes managed with basal-bolus insulin.\n\
           Ambulating 40 ft with rolling walker and one-person assist.\n\
           BIMS 13. Full code. No isolation precautions.\n\
           Discharge to SNF for PT/OT, anticipated stay 3 weeks.",
};

const MEDICATION_LIST: MockDocument = MockDocument {
    filename: "medication_list.pdf",
    content_type: "application/pdf",
    text: "MEDICATION LIST\n\
           Insulin Lispro 4 units SQ with meals\n\
           Insulin Glargine 18 units SQ at bedtime\n\
           Apixaban 2.5 mg PO twice daily\n\
           Acetaminophen 650 mg PO every 6 hours as needed",
};

/// Three-document referral for a post-hip-fracture rehab candidate.
pub fn hip_fracture_referral() -> Vec<MockDocument> {
    vec![FACE_SHEET, DISCHARGE_SUMMARY, MEDICATION_LIST]
}

/// Single-document referral for a ventilator-dependent patient.
pub fn ventilator_referral() -> Vec<MockDocument> {
    vec![MockDocument {
        filename: "h_and_p.pdf",
        content_type: "application/pdf",
        text: "HISTORY AND PHYSICAL\n\
               Patient: Okafor, Samuel   DOB: 11/02/1951\n\
               Chronic respiratory failure, tracheostomy in place.\n\
               Ventilator dependent, AC mode, FiO2 35%.",
    }]
}

// ── Canned extraction ─────────────────────────────────────────────────────────

/// The merged record for [`hip_fracture_referral`].
///
/// Insulin Lispro is deliberately left with `isHighCost: false`; the
/// pipeline's high-cost pass must flag it.
pub fn hip_fracture_record() -> Value {
    json!({
        "demographics": {
            "firstName": "Margaret",
            "lastName": "Ellison",
            "dob": "03/14/1942",
            "age": 84,
            "gender": "female",
            "primaryLanguage": "English",
            "interpreterNeeded": false
        },
        "clinicalSummary": {
            "chiefComplaint": "Right hip fracture after fall",
            "hospitalCourseSummary": "Right hip ORIF on day 2, uncomplicated recovery.",
            "codeStatus": "Full Code",
            "isolationPrecautions": "None"
        },
        "diagnoses": [
            { "icd10Code": "S72.001A", "description": "Fracture of right femoral neck", "type": "primary", "onset": "acute" },
            { "icd10Code": "E11.9", "description": "Type 2 diabetes mellitus", "type": "secondary", "onset": "chronic" }
        ],
        "medications": [
            { "name": "Insulin Lispro", "dose": "4 units", "route": "SQ", "frequency": "with meals", "isHighCost": false, "requiresMonitoring": true },
            { "name": "Insulin Glargine", "dose": "18 units", "route": "SQ", "frequency": "at bedtime", "requiresMonitoring": true },
            { "name": "Apixaban", "dose": "2.5 mg", "route": "PO", "frequency": "twice daily" },
            { "name": "Acetaminophen", "dose": "650 mg", "route": "PO", "frequency": "every 6 hours as needed" }
        ],
        "functionalStatus": {
            "mobility": "1 Person Assist",
            "bimsScore": 13,
            "fallRisk": "High",
            "weightLbs": 142
        },
        "careRequirements": {
            "requiresVentilator": false,
            "requiresWoundCare": true,
            "wounds": [ { "location": "Right hip incision", "type": "Surgical" } ],
            "requiresOxygen": false,
            "therapyNeeds": { "physicalTherapy": true, "occupationalTherapy": true, "speechTherapy": false }
        },
        "behavioralStatus": {
            "hasBehavioralIssues": false,
            "elopementRisk": "None",
            "substanceUseActive": false
        },
        "insuranceInfo": {
            "primaryPayer": "Medicare A",
            "payerName": "Medicare",
            "memberId": "1EG4-TE5-MK72",
            "snfDaysRemaining": 100,
            "medicaidPending": false
        }
    })
}

/// The merged record for [`ventilator_referral`].
pub fn ventilator_record() -> Value {
    json!({
        "demographics": { "firstName": "Samuel", "lastName": "Okafor", "dob": "1951-11-02", "gender": "male" },
        "clinicalSummary": { "codeStatus": "Full Code", "isolationPrecautions": "None" },
        "diagnoses": [
            { "icd10Code": "J96.10", "description": "Chronic respiratory failure", "type": "primary", "onset": "chronic" }
        ],
        "medications": [],
        "functionalStatus": { "mobility": "Non-ambulatory", "bimsScore": 11 },
        "careRequirements": { "requiresVentilator": true, "requiresTracheostomy": true },
        "insuranceInfo": { "primaryPayer": "Medicare A", "snfDaysRemaining": 60 }
    })
}

// ── Canned scoring answers ────────────────────────────────────────────────────

pub fn admissions_answer() -> Value {
    json!({
        "fitScore": 76,
        "positiveFactors": [
            "Good rehab potential after uncomplicated ORIF",
            "Cognitively intact (BIMS 13)"
        ],
        "warnings": [{
            "category": "clinical",
            "flagType": "high_fall_risk",
            "severity": "medium",
            "title": "High fall risk",
            "description": "Admitted after a fall; one-person assist for transfers",
            "recommendation": "Fall prevention protocol and bed alarm"
        }],
        "reasoning": "Typical short-stay rehab profile with manageable diabetes."
    })
}

pub fn reimbursement_answer() -> Value {
    let component = |category: &str, rate: f64| json!({ "category": category, "dailyRate": rate });
    json!({
        "pdpmComponents": {
            "nursing": component("LBC1", 248.0),
            "pt": component("TB", 96.0),
            "ot": component("TB", 89.0),
            "slp": component("SA", 27.0),
            "nta": component("NC", 85.0)
        },
        "estimatedDailyRate": 545.0,
        "estimatedLosDays": 21,
        "estimatedTotalRevenue": 11445.0,
        "financialScore": 95,
        "financialFlags": [],
        "payerAnalysis": {
            "payerType": "Medicare A",
            "riskLevel": "low",
            "notes": "Full SNF benefit available, qualifying 3-day stay met"
        }
    })
}

pub fn clinical_answer() -> Value {
    json!({
        "clinicalComplexityScore": 4,
        "operationalScore": 90,
        "specialCareNeeds": ["Sliding-scale insulin with fingerstick checks", "Surgical incision care"],
        "comorbidityRisks": [{
            "category": "clinical",
            "flagType": "anticoagulation",
            "severity": "low",
            "title": "Anticoagulated",
            "description": "Apixaban increases bleeding risk after falls"
        }],
        "equipmentNeeds": ["Rolling walker", "Raised toilet seat"],
        "staffingConsiderations": ["Standard rehab staffing"],
        "estimatedNursingHoursPerDay": 3.2
    })
}

pub fn documentation_answer() -> Value {
    json!({
        "patientSummary": "84-year-old woman after right hip ORIF with type 2 diabetes on basal-bolus insulin, referred for short-term PT/OT.",
        "missingDocuments": ["Recent lab results"],
        "evidenceCitations": [
            { "claim": "Uncomplicated ORIF", "source": "discharge_summary.pdf", "excerpt": "Underwent right hip ORIF on hospital day 2, uncomplicated." }
        ],
        "documentQuality": { "completeness": 85, "legibility": 95, "recency": 90 },
        "keyFindings": ["Post-surgical rehab candidate", "Insulin-dependent diabetes"]
    })
}
