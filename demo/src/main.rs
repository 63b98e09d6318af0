//! Referral Intake Reference Runtime: Demo CLI
//!
//! Runs one or all of the four intake scenarios. Each scenario starts the
//! real pipeline (store, activity log, criteria engine, worker pools) wired
//! to deterministic in-memory capabilities and fictional referral packets.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- standard-intake
//!   cargo run -p demo -- deal-breaker
//!   cargo run -p demo -- degraded-processing
//!   cargo run -p demo -- document-retry
//!   cargo run -p demo -- check-config pipeline.toml

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use intake_contracts::error::IntakeResult;
use intake_pipeline::PipelineConfig;
use intake_ref::scenarios::{deal_breaker, degraded_processing, document_retry, standard_intake};

// ── CLI definition ────────────────────────────────────────────────────────────

/// Referral intake pipeline demo.
///
/// Each subcommand runs one or all of the intake scenarios, showing OCR,
/// classification, extraction, multi-agent scoring and the activity chain.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "Referral intake reference runtime demo",
    long_about = "Runs referral intake scenarios showing document processing,\n\
                  facility criteria, degraded scoring and document retry."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all four intake scenarios in sequence.
    RunAll,
    /// Scenario 1: Standard Intake (three documents, strong accept).
    StandardIntake,
    /// Scenario 2: Facility Deal-Breaker (ventilator dependency).
    DealBreaker,
    /// Scenario 3: Degraded Processing (every AI model unavailable).
    DegradedProcessing,
    /// Scenario 4: Document Retry (OCR outage, manual retry).
    DocumentRetry,
    /// Load and validate a pipeline configuration file.
    CheckConfig {
        /// Path to a TOML pipeline configuration.
        path: PathBuf,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    if let Command::CheckConfig { path } = &cli.command {
        match PipelineConfig::from_file(path) {
            Ok(config) => {
                println!("{} is valid:", path.display());
                println!("{:#?}", config);
            }
            Err(e) => {
                eprintln!("Config error: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all().await,
        Command::StandardIntake => standard_intake::run_scenario().await,
        Command::DealBreaker => deal_breaker::run_scenario().await,
        Command::DegradedProcessing => degraded_processing::run_scenario().await,
        Command::DocumentRetry => document_retry::run_scenario().await,
        Command::CheckConfig { .. } => Ok(()),
    };

    match result {
        Ok(()) => {
            println!("All selected scenarios completed successfully.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Scenario dispatch ─────────────────────────────────────────────────────────

async fn run_all() -> IntakeResult<()> {
    standard_intake::run_scenario().await?;
    deal_breaker::run_scenario().await?;
    degraded_processing::run_scenario().await?;
    document_retry::run_scenario().await?;
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("Referral Intake Pipeline");
    println!("Reference Demo");
    println!("========================");
    println!();
    println!("Per referral:");
    println!("  [1] Upload stores the bytes and enqueues OCR (rate limited)");
    println!("  [2] Each document is read, then typed by the classifier");
    println!("  [3] Once every document is typed, one extraction builds the patient record");
    println!("  [4] Facility criteria and four scoring agents run in parallel");
    println!("  [5] Weighted scores pick a recommendation; findings become risk flags");
    println!("  [6] Every stage appends to the referral's SHA-256 activity chain");
    println!();
}
