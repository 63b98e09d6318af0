//! Scenario 4: Document retry
//!
//! The OCR provider fails on a document until the job exhausts its
//! attempts. The document and the referral are marked failed and the job
//! lands in the dead letters. Staff then retry the document; it is reset,
//! re-read ahead of other OCR work, and the referral finishes normally.

use std::sync::Arc;

use intake_contracts::error::IntakeResult;
use intake_pipeline::PipelineConfig;

use crate::capabilities::{reference_capabilities, CannedAgents, ScriptedOcr};
use crate::mock_data::{hip_fracture_record, hip_fracture_referral, MockDocument};
use crate::scenarios::{fast_config, print_outcome, Harness};

/// Failed OCR calls before the provider recovers.
const OCR_OUTAGE: u32 = 2;

fn retry_config() -> PipelineConfig {
    let mut config = fast_config();
    config.ocr.concurrency = 1;
    config.ocr.max_attempts = OCR_OUTAGE;
    config
}

fn start(ocr: Arc<ScriptedOcr>) -> IntakeResult<Harness> {
    let mut capabilities = reference_capabilities(hip_fracture_record(), CannedAgents::hip_fracture());
    capabilities.ocr = ocr;
    Harness::start(retry_config(), capabilities)
}

/// Just the discharge summary, so the outage hits a single document.
fn packet() -> Vec<MockDocument> {
    hip_fracture_referral()
        .into_iter()
        .filter(|document| document.filename == "discharge_summary.pdf")
        .collect()
}

pub async fn run_scenario() -> IntakeResult<()> {
    println!("=== Scenario 4: Document Retry ===");
    println!();
    println!("  OCR provider:  fails the first {} calls", OCR_OUTAGE);
    println!("  OCR attempts:  {} per job", OCR_OUTAGE);
    println!();

    let ocr = Arc::new(ScriptedOcr::failing_first(OCR_OUTAGE));
    let harness = start(ocr.clone())?;
    let referral_id = harness.submit(&packet()).await?;
    harness.service.wait_idle().await;

    println!("  -- after the outage --");
    print_outcome(&harness, referral_id)?;
    for failed in harness.service.dead_letters() {
        println!(
            "  Dead letter:            {} job after {} attempts: {}",
            failed.stage, failed.attempts, failed.error
        );
    }
    println!();

    let documents = harness.service.documents(referral_id)?;
    for document in &documents {
        harness.service.retry_document(document.id)?;
        println!("  Retrying:               {}", document.original_filename);
    }
    harness.service.wait_idle().await;

    println!("  -- after the retry --");
    print_outcome(&harness, referral_id)?;
    println!("  OCR calls:              {}", ocr.calls());
    println!();
    println!("  Scenario 4 complete.");
    println!();

    harness.shutdown().await;
    Ok(())
}
