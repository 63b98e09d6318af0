//! Markdown rationale shown to the admissions reviewer.

use std::fmt::Write;

use intake_contracts::scoring::{
    AdmissionsAssessment, ClinicalAssessment, DocumentationAssessment, Recommendation,
    ReimbursementAssessment,
};

/// Render the detailed rationale from all four agent outputs.
pub fn detailed_rationale(
    recommendation: Recommendation,
    admissions: &AdmissionsAssessment,
    reimbursement: &ReimbursementAssessment,
    clinical: &ClinicalAssessment,
    documentation: &DocumentationAssessment,
) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "## Recommendation: {}", recommendation.as_str().to_uppercase());

    let _ = writeln!(out, "\n### Clinical Fit");
    let _ = writeln!(out, "Score: {}/100", admissions.fit_score);
    bullets(&mut out, "Positive factors:", admissions.positive_factors.iter().cloned());
    bullets(
        &mut out,
        "Deal breakers:",
        admissions
            .deal_breakers
            .iter()
            .map(|f| format!("{}: {}", f.title, f.description)),
    );

    let _ = writeln!(out, "\n### Financial Analysis");
    let _ = writeln!(out, "Estimated daily rate: ${:.2}", reimbursement.estimated_daily_rate);
    let _ = writeln!(out, "Estimated LOS: {} days", reimbursement.estimated_los_days);
    let _ = writeln!(out, "Estimated total revenue: ${:.2}", reimbursement.estimated_total_revenue);
    let payer = &reimbursement.payer_analysis;
    let _ = writeln!(out, "Payer: {} ({} risk)", payer.payer_type, payer.risk_level);

    let _ = writeln!(out, "\n### Clinical Complexity");
    let _ = writeln!(out, "Complexity score: {}/10", clinical.clinical_complexity_score);
    let _ = writeln!(out, "Nursing hours/day: {}", clinical.estimated_nursing_hours_per_day);
    bullets(&mut out, "Special care needs:", clinical.special_care_needs.iter().cloned());

    if !documentation.missing_documents.is_empty() {
        let _ = writeln!(out, "\n### Missing Documents");
        for document in &documentation.missing_documents {
            let _ = writeln!(out, "- {document}");
        }
    }

    out
}

fn bullets(out: &mut String, heading: &str, items: impl Iterator<Item = String>) {
    let mut items = items.peekable();
    if items.peek().is_none() {
        return;
    }
    let _ = writeln!(out, "{heading}");
    for item in items {
        let _ = writeln!(out, "- {item}");
    }
}
