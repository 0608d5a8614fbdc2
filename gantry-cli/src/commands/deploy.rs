//! Deploy command handler
//!
//! Resolves the run configuration from flags and environment, wires the
//! production clients to the orchestrator, runs the pipeline, and prints
//! the terminal report.

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use std::time::Duration;

use crate::commands::exit_code;
use crate::config::Config;
use crate::pipeline::Pipeline;
use gantry_cloud::build::{RemoteBuildClient, StorageSource};
use gantry_cloud::deploy::ServerlessDeployClient;
use gantry_cloud::health::{DEFAULT_HEALTH_PATH, HttpHealthProbe};
use gantry_cloud::identity::FederatedTokenBroker;
use gantry_core::domain::context::PipelineContext;
use gantry_core::domain::run::{RunOutcome, RunReport};

/// Arguments for the deploy command
///
/// Every flag falls back to a `GANTRY_*` environment variable so the CI
/// trigger can configure the run without building a command line. The
/// identity assertion is env-only (`GANTRY_ID_TOKEN`) and never a flag.
#[derive(Args)]
pub struct DeployArgs {
    /// Cloud project identifier
    #[arg(long, env = "GANTRY_PROJECT")]
    project: String,

    /// Deployment region
    #[arg(long, env = "GANTRY_REGION")]
    region: String,

    /// Target service name
    #[arg(long, env = "GANTRY_SERVICE")]
    service: String,

    /// Artifact repository name
    #[arg(long, env = "GANTRY_REPOSITORY")]
    repository: String,

    /// Triggering source revision (commit hash); becomes the image tag
    #[arg(long, env = "GANTRY_REVISION")]
    revision: String,

    /// Full resource name of the workload identity provider
    #[arg(long, env = "GANTRY_IDENTITY_PROVIDER")]
    identity_provider: String,

    /// Deployer service account email
    #[arg(long, env = "GANTRY_SERVICE_ACCOUNT")]
    service_account: String,

    /// Object-storage bucket holding the prepared build context
    #[arg(long, env = "GANTRY_SOURCE_BUCKET")]
    source_bucket: String,

    /// Object key of the prepared build context archive
    #[arg(long, env = "GANTRY_SOURCE_OBJECT")]
    source_object: String,

    /// Build+push budget in seconds
    #[arg(long, env = "GANTRY_BUILD_TIMEOUT", default_value_t = 1800)]
    build_timeout: u64,

    /// Rollout budget in seconds
    #[arg(long, env = "GANTRY_DEPLOY_TIMEOUT", default_value_t = 600)]
    deploy_timeout: u64,

    /// Health probe budget in seconds
    #[arg(long, env = "GANTRY_PROBE_TIMEOUT", default_value_t = 10)]
    probe_timeout: u64,

    /// Health probe path
    #[arg(long, env = "GANTRY_PROBE_PATH", default_value = DEFAULT_HEALTH_PATH)]
    probe_path: String,

    /// Print the run report as JSON instead of the colored summary
    #[arg(long)]
    json: bool,
}

/// Handle the deploy command
pub async fn handle_deploy(args: DeployArgs) -> Result<i32> {
    let config = resolve_config(&args);
    config.validate()?;

    let context = PipelineContext::new(
        &config.project,
        &config.region,
        &config.service,
        &config.repository,
        &config.revision,
    )
    .context("invalid pipeline context")?;

    let mut broker = FederatedTokenBroker::new(
        &config.identity_provider,
        &config.service_account,
        &config.subject_token,
    );
    if let (Some(sts), Some(iam)) = (&config.sts_endpoint, &config.iam_endpoint) {
        broker = broker.with_endpoints(sts, iam);
    }

    let mut publisher = RemoteBuildClient::new(
        &config.project,
        StorageSource {
            bucket: config.source_bucket.clone(),
            object: config.source_object.clone(),
        },
    );
    if let Some(endpoint) = &config.build_endpoint {
        publisher = publisher.with_endpoint(endpoint);
    }

    let mut deployer = ServerlessDeployClient::new(
        &config.project,
        &config.region,
        &config.service,
        config.deploy_timeout,
    );
    if let Some(endpoint) = &config.deploy_endpoint {
        deployer = deployer.with_endpoint(endpoint);
    }

    let probe = HttpHealthProbe::new();

    let pipeline = Pipeline::new(&context, &broker, &publisher, &deployer, &probe)
        .with_build_timeout(config.build_timeout)
        .with_probe_timeout(config.probe_timeout)
        .with_probe_path(config.probe_path.clone());

    let report = pipeline.run().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(exit_code(&report.outcome))
}

/// Resolves the full configuration from the parsed flags plus the
/// env-only inputs
fn resolve_config(args: &DeployArgs) -> Config {
    Config {
        project: args.project.clone(),
        region: args.region.clone(),
        service: args.service.clone(),
        repository: args.repository.clone(),
        revision: args.revision.clone(),
        identity_provider: args.identity_provider.clone(),
        service_account: args.service_account.clone(),
        subject_token: std::env::var("GANTRY_ID_TOKEN").unwrap_or_default(),
        source_bucket: args.source_bucket.clone(),
        source_object: args.source_object.clone(),
        build_timeout: Duration::from_secs(args.build_timeout),
        deploy_timeout: Duration::from_secs(args.deploy_timeout),
        probe_timeout: Duration::from_secs(args.probe_timeout),
        probe_path: args.probe_path.clone(),
        sts_endpoint: std::env::var("GANTRY_STS_ENDPOINT").ok(),
        iam_endpoint: std::env::var("GANTRY_IAM_ENDPOINT").ok(),
        build_endpoint: std::env::var("GANTRY_BUILD_ENDPOINT").ok(),
        deploy_endpoint: std::env::var("GANTRY_DEPLOY_ENDPOINT").ok(),
    }
}

/// Print the terminal run report
fn print_report(report: &RunReport) {
    println!();
    for stage in &report.completed {
        println!("  {} {}", "✓".green(), stage);
    }

    match report.outcome {
        RunOutcome::Success => {
            println!();
            println!("{}", "✓ Deployed and healthy!".green().bold());
            if let Some(url) = &report.url {
                println!("  URL: {}", url.cyan());
            }
        }
        RunOutcome::Failed { stage } => {
            println!("  {} {}", "✗".red(), stage);
            println!();
            println!("{}", format!("✗ Pipeline failed at {}", stage).red().bold());
            if let Some(error) = &report.error {
                println!("  {}", error.dimmed());
            }
            // A live-but-unhealthy revision needs different remediation
            // than a failed rollout, so its address is still shown.
            if let Some(url) = &report.url {
                println!("  Live revision: {}", url.cyan());
            }
        }
    }

    println!(
        "  Run {} finished in {}s",
        report.run_id.to_string().dimmed(),
        (report.finished_at - report.started_at).num_seconds()
    );
}
