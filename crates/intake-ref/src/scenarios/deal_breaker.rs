//! Scenario 2: Facility deal-breaker
//!
//! A ventilator-dependent patient is referred to a facility whose criteria
//! mark ventilator care as a deal-breaker. The AI agents are healthy and
//! score the patient well, but the matched rule forces a decline.

use intake_contracts::error::IntakeResult;

use crate::capabilities::{reference_capabilities, CannedAgents};
use crate::mock_data::{ventilator_record, ventilator_referral};
use crate::scenarios::{fast_config, print_outcome, Harness};

pub async fn run_scenario() -> IntakeResult<()> {
    println!("=== Scenario 2: Facility Deal-Breaker ===");
    println!();

    let harness = Harness::start(
        fast_config(),
        reference_capabilities(ventilator_record(), CannedAgents::hip_fracture()),
    )?;

    println!("  Facility rule: careRequirements.requiresVentilator equals true [DEAL-BREAKER]");
    println!();

    let referral_id = harness.submit(&ventilator_referral()).await?;
    harness.service.wait_idle().await;

    print_outcome(&harness, referral_id)?;
    println!();
    println!("  Scenario 2 complete.");
    println!();

    harness.shutdown().await;
    Ok(())
}
