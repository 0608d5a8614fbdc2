//! Deployment domain types

use serde::{Deserialize, Serialize};

/// Who may invoke the deployed service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessPolicy {
    /// Unauthenticated invocations allowed (`allUsers` gets the invoker role)
    Public,
    /// Only identities with the invoker role may call the service
    AuthenticatedOnly,
}

impl std::fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessPolicy::Public => write!(f, "public"),
            AccessPolicy::AuthenticatedOnly => write!(f, "authenticated-only"),
        }
    }
}

/// Outcome of a successful deployment
///
/// `url` is only ever populated once the platform has confirmed the new
/// revision is serving traffic; the deploy client enforces this before
/// constructing the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    /// Stable public URL of the service
    pub url: String,
    /// Platform-assigned name of the revision now receiving traffic
    pub revision_name: String,
}
