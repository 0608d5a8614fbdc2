//! Commands module
//!
//! Defines the CLI commands and their handlers. Handlers return the
//! process exit code; setup failures bubble up as errors and exit with
//! the configuration code.

mod deploy;
mod probe;

pub use deploy::DeployArgs;
pub use probe::ProbeArgs;

use anyhow::Result;
use clap::Subcommand;

use gantry_core::domain::run::{PipelineStage, RunOutcome};

/// Exit code when the credential could not be minted
const EXIT_AUTH: i32 = 10;
/// Exit code when the build or registry push failed
const EXIT_BUILD: i32 = 11;
/// Exit code when the platform rejected or failed the rollout
const EXIT_DEPLOY: i32 = 12;
/// Exit code when the deployed revision failed the health gate (the
/// revision is live; remediation differs from a failed deploy)
const EXIT_HEALTH: i32 = 13;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline: build, publish, deploy, verify
    Deploy(DeployArgs),
    /// Probe an already-deployed service's health endpoint
    Probe(ProbeArgs),
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module and returns the
/// process exit code.
pub async fn handle_command(command: Commands) -> Result<i32> {
    match command {
        Commands::Deploy(args) => deploy::handle_deploy(args).await,
        Commands::Probe(args) => probe::handle_probe(args).await,
    }
}

/// Maps a run outcome to the process exit code the surrounding CI keys off
pub fn exit_code(outcome: &RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Success => 0,
        RunOutcome::Failed { stage } => match stage {
            PipelineStage::Start | PipelineStage::Authenticated => EXIT_AUTH,
            PipelineStage::Built => EXIT_BUILD,
            PipelineStage::Deployed => EXIT_DEPLOY,
            PipelineStage::Verified => EXIT_HEALTH,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_exits_zero() {
        assert_eq!(exit_code(&RunOutcome::Success), 0);
    }

    #[test]
    fn test_each_failing_stage_has_a_distinct_code() {
        let codes: Vec<i32> = [
            PipelineStage::Authenticated,
            PipelineStage::Built,
            PipelineStage::Deployed,
            PipelineStage::Verified,
        ]
        .into_iter()
        .map(|stage| exit_code(&RunOutcome::Failed { stage }))
        .collect();

        assert_eq!(codes, vec![EXIT_AUTH, EXIT_BUILD, EXIT_DEPLOY, EXIT_HEALTH]);

        let mut deduped = codes.clone();
        deduped.dedup();
        assert_eq!(deduped.len(), codes.len());
        assert!(codes.iter().all(|&code| code != 0));
    }
}
