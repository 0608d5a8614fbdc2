//! Pipeline state machine vocabulary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The states of one pipeline run, in execution order
///
/// Transitions are strictly forward: `Start → Authenticated → Built →
/// Deployed → Verified`, terminating in success or failure. A failure is
/// attributed to the state the run was attempting to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelineStage {
    Start,
    Authenticated,
    Built,
    Deployed,
    Verified,
}

impl PipelineStage {
    /// The state following this one, or `None` at the end of the pipeline
    pub fn next(self) -> Option<PipelineStage> {
        match self {
            PipelineStage::Start => Some(PipelineStage::Authenticated),
            PipelineStage::Authenticated => Some(PipelineStage::Built),
            PipelineStage::Built => Some(PipelineStage::Deployed),
            PipelineStage::Deployed => Some(PipelineStage::Verified),
            PipelineStage::Verified => None,
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Start => write!(f, "start"),
            PipelineStage::Authenticated => write!(f, "authenticate"),
            PipelineStage::Built => write!(f, "build"),
            PipelineStage::Deployed => write!(f, "deploy"),
            PipelineStage::Verified => write!(f, "verify"),
        }
    }
}

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Success,
    /// The run failed while attempting to reach `stage`
    ///
    /// `Failed { stage: Verified }` means the deployment already took
    /// effect and the new revision is live but unhealthy; remediation
    /// differs from a deploy failure, where no new revision exists.
    Failed { stage: PipelineStage },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success)
    }
}

/// Record of one pipeline run, produced by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// States reached, in order; `Start` is implicit and not recorded
    pub completed: Vec<PipelineStage>,
    pub outcome: RunOutcome,
    /// Rendered error of the failing stage, if any
    pub error: Option<String>,
    /// Public URL of the deployed service
    ///
    /// Present whenever deployment succeeded, including runs that then
    /// failed verification: the unhealthy revision stays live and the
    /// operator needs its address.
    pub url: Option<String>,
}
