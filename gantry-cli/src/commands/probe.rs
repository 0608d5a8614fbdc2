//! Probe command handler
//!
//! Runs the health gate alone against an already-deployed service.

use anyhow::Result;
use clap::Args;
use colored::*;
use std::time::Duration;

use gantry_cloud::health::{DEFAULT_HEALTH_PATH, HealthProbe, HttpHealthProbe};
use gantry_core::domain::health::HealthVerdict;

/// Arguments for the probe command
#[derive(Args)]
pub struct ProbeArgs {
    /// Base URL of the deployed service
    #[arg(long)]
    url: String,

    /// Health probe path
    #[arg(long, default_value = DEFAULT_HEALTH_PATH)]
    path: String,

    /// Probe budget in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

/// Handle the probe command
pub async fn handle_probe(args: ProbeArgs) -> Result<i32> {
    let probe = HttpHealthProbe::new();
    let verdict = probe
        .verify(&args.url, &args.path, Duration::from_secs(args.timeout))
        .await;

    match verdict {
        HealthVerdict::Pass { status } => {
            println!(
                "{} {} ({})",
                "✓ healthy".green().bold(),
                args.url.cyan(),
                status
            );
            Ok(0)
        }
        HealthVerdict::Fail { reason } => {
            println!("{} {} ({})", "✗ unhealthy".red().bold(), args.url.cyan(), reason);
            Ok(super::EXIT_HEALTH)
        }
    }
}
