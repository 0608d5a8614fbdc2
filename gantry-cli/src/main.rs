//! Gantry CLI
//!
//! Continuous-deployment pipeline for serverless container services:
//! build a container image remotely, publish it to the artifact registry,
//! roll it out to the target service, and gate on a post-deploy health
//! probe.
//!
//! One invocation is one pipeline run; the surrounding CI triggers it once
//! per push to the primary branch. The exit code encodes the terminal
//! state, with a distinct code per failing stage.

mod commands;
mod config;
mod pipeline;

use clap::Parser;
use colored::*;
use commands::Commands;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code for configuration and setup failures
const EXIT_CONFIG: i32 = 2;

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "Build, publish, and deploy a container service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantry=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let code = match commands::handle_command(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", "✗".red().bold(), e);
            EXIT_CONFIG
        }
    };

    std::process::exit(code);
}
