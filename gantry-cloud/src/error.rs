//! Error types for the cloud control-plane clients
//!
//! One enum per pipeline stage. Every variant is fatal to the current run:
//! nothing here is retried automatically and nothing is downgraded to a
//! warning. Remediation is a human or a fresh trigger.

use thiserror::Error;

/// Identity or permission failures while minting the deployer credential
#[derive(Debug, Error)]
pub enum AuthError {
    /// The STS endpoint rejected the token exchange
    #[error("token exchange rejected (status {status}): {message}")]
    Exchange {
        /// HTTP status code
        status: u16,
        /// Error message from the identity provider
        message: String,
    },

    /// The IAM credentials endpoint rejected the impersonation request
    #[error("service account impersonation rejected (status {status}): {message}")]
    Impersonation { status: u16, message: String },

    /// The request never produced a usable response
    #[error("identity request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered 2xx but the body was not what it should be
    #[error("malformed identity response: {0}")]
    MalformedResponse(String),
}

impl AuthError {
    pub fn exchange(status: u16, message: impl Into<String>) -> Self {
        Self::Exchange {
            status,
            message: message.into(),
        }
    }

    pub fn impersonation(status: u16, message: impl Into<String>) -> Self {
        Self::Impersonation {
            status,
            message: message.into(),
        }
    }

    /// Whether the failure is a trust/permission problem rather than a
    /// transport one; these will not self-heal within a run
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            Self::Exchange { status: 403, .. } | Self::Impersonation { status: 403, .. }
        )
    }
}

/// Remote build or registry-push failures
#[derive(Debug, Error)]
pub enum BuildError {
    /// A precondition on the build request was violated locally
    #[error("invalid build request: {0}")]
    Precondition(String),

    /// The build service rejected the submission
    #[error("build submission rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The build ran remotely and failed (compile error, push rejection, ...)
    #[error("build {build_id} failed: {detail}")]
    Failed { build_id: String, detail: String },

    /// Build and push did not finish within the configured budget
    #[error("build exceeded its {limit_secs}s budget")]
    Timeout { limit_secs: u64 },

    /// The build succeeded but reported no pushed-image digest
    #[error("build result carries no image digest")]
    MissingDigest,

    /// The produced tags did not resolve to a single digest
    #[error("build tags resolved to different digests: {expected} vs {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// The request never produced a usable response
    #[error("build request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The build service answered 2xx with an unparseable body
    #[error("malformed build response: {0}")]
    MalformedResponse(String),
}

impl BuildError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Platform-side deployment failures
#[derive(Debug, Error)]
pub enum DeployError {
    /// The platform rejected the request (quota, invalid image, permission)
    #[error("deployment rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The new revision was created but never became ready
    #[error("revision rollout failed: {detail}")]
    RevisionFailed { detail: String },

    /// The rollout did not finish within the configured budget
    #[error("deployment exceeded its {limit_secs}s budget")]
    Timeout { limit_secs: u64 },

    /// The platform reports the service ready but without a serving URL
    #[error("service is ready but reports no serving URL")]
    NotServing,

    /// The request never produced a usable response
    #[error("deploy request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The platform answered 2xx with an unparseable body
    #[error("malformed deploy response: {0}")]
    MalformedResponse(String),
}

impl DeployError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Rejected { status: 403, .. })
    }

    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, Self::Rejected { status: 429, .. })
    }
}
