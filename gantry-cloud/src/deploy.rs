//! Serverless deployment client
//!
//! Upserts the target service on the managed compute platform: created if
//! absent, otherwise a new revision is rolled out and receives 100% of
//! traffic atomically (the platform never routes to a partially
//! initialized revision). Returns the stable public URL once the platform
//! reports the revision ready.
//!
//! No rollback lives here. Reverting a bad revision is an operational
//! action outside the pipeline.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::DeployError;
use crate::identity::trim_endpoint;
use gantry_core::domain::credential::Credential;
use gantry_core::domain::deploy::{AccessPolicy, DeploymentResult};
use gantry_core::domain::image::ImageReference;

/// Default public deploy endpoint
pub const DEFAULT_DEPLOY_ENDPOINT: &str = "https://run.googleapis.com";

/// Role granted to `allUsers` when the access policy is public
const INVOKER_ROLE: &str = "roles/run.invoker";

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Capability: produce a `DeploymentResult`
#[async_trait]
pub trait ServiceDeployer: Send + Sync {
    /// Idempotent upsert of the configured service to the given image
    async fn deploy(
        &self,
        credential: &Credential,
        image: &ImageReference,
        policy: AccessPolicy,
    ) -> Result<DeploymentResult, DeployError>;
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceSpec {
    template: RevisionTemplate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RevisionTemplate {
    containers: Vec<ContainerSpec>,
}

#[derive(Debug, Serialize)]
struct ContainerSpec {
    image: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceStatus {
    #[serde(default)]
    uri: String,
    #[serde(default)]
    latest_ready_revision: String,
    #[serde(default)]
    terminal_condition: Option<Condition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Condition {
    #[serde(rename = "type", default)]
    condition_type: String,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Serialize)]
struct SetIamPolicyRequest {
    policy: IamPolicy,
}

#[derive(Debug, Serialize)]
struct IamPolicy {
    bindings: Vec<IamBinding>,
}

#[derive(Debug, Serialize)]
struct IamBinding {
    role: String,
    members: Vec<String>,
}

// =============================================================================
// Client
// =============================================================================

/// Deployer backed by the serverless platform's admin API
pub struct ServerlessDeployClient {
    client: Client,
    endpoint: String,
    project: String,
    region: String,
    service: String,
    /// Budget for the rollout to reach a terminal state
    timeout: Duration,
    poll_interval: Duration,
}

impl ServerlessDeployClient {
    pub fn new(
        project: impl Into<String>,
        region: impl Into<String>,
        service: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: DEFAULT_DEPLOY_ENDPOINT.to_string(),
            project: project.into(),
            region: region.into(),
            service: service.into(),
            timeout,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Overrides the deploy endpoint (primarily for tests)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = trim_endpoint(endpoint.into());
        self
    }

    /// Overrides the rollout-poll interval (primarily for tests)
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn service_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/services/{}",
            self.project, self.region, self.service
        )
    }

    async fn service_exists(&self, credential: &Credential) -> Result<bool, DeployError> {
        let url = format!("{}/v2/{}", self.endpoint, self.service_path());

        let response = self
            .client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(credential.token())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        Err(DeployError::rejected(status.as_u16(), message))
    }

    /// Creates the service or rolls out a new revision of it
    async fn upsert(
        &self,
        credential: &Credential,
        image: &ImageReference,
        exists: bool,
    ) -> Result<Operation, DeployError> {
        let spec = ServiceSpec {
            template: RevisionTemplate {
                containers: vec![ContainerSpec {
                    image: image.to_string(),
                }],
            },
        };

        let request = if exists {
            debug!(service = %self.service, "rolling out new revision");
            let url = format!("{}/v2/{}", self.endpoint, self.service_path());
            self.client.patch(&url)
        } else {
            debug!(service = %self.service, "service absent, creating");
            let url = format!(
                "{}/v2/projects/{}/locations/{}/services?serviceId={}",
                self.endpoint, self.project, self.region, self.service
            );
            self.client.post(&url)
        };

        let response = request
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(credential.token())
            .json(&spec)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(DeployError::rejected(status.as_u16(), message));
        }

        response
            .json()
            .await
            .map_err(|e| DeployError::MalformedResponse(e.to_string()))
    }

    /// Polls the rollout operation until done or the budget is exhausted
    async fn await_rollout(
        &self,
        credential: &Credential,
        mut operation: Operation,
    ) -> Result<(), DeployError> {
        let started = Instant::now();

        loop {
            if operation.done {
                if let Some(error) = operation.error {
                    return Err(DeployError::RevisionFailed {
                        detail: error.message,
                    });
                }
                return Ok(());
            }

            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                return Err(DeployError::Timeout {
                    limit_secs: self.timeout.as_secs(),
                });
            }

            debug!(operation = %operation.name, "rollout in progress");
            let remaining = self.timeout - elapsed;
            tokio::time::sleep(self.poll_interval.min(remaining)).await;

            let url = format!("{}/v2/{}", self.endpoint, operation.name);
            let response = self
                .client
                .get(&url)
                .timeout(REQUEST_TIMEOUT)
                .bearer_auth(credential.token())
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown error".to_string());
                return Err(DeployError::rejected(status.as_u16(), message));
            }

            operation = response
                .json()
                .await
                .map_err(|e| DeployError::MalformedResponse(e.to_string()))?;
        }
    }

    /// Grants unauthenticated invocation when the policy is public
    async fn apply_access_policy(
        &self,
        credential: &Credential,
        policy: AccessPolicy,
    ) -> Result<(), DeployError> {
        if policy != AccessPolicy::Public {
            return Ok(());
        }

        let url = format!("{}/v2/{}:setIamPolicy", self.endpoint, self.service_path());
        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(credential.token())
            .json(&public_invoker_policy())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(DeployError::rejected(status.as_u16(), message));
        }

        Ok(())
    }

    /// Reads the service back and requires it to be ready and serving
    async fn resolve_result(&self, credential: &Credential) -> Result<DeploymentResult, DeployError> {
        let url = format!("{}/v2/{}", self.endpoint, self.service_path());
        let response = self
            .client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(credential.token())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(DeployError::rejected(status.as_u16(), message));
        }

        let service: ServiceStatus = response
            .json()
            .await
            .map_err(|e| DeployError::MalformedResponse(e.to_string()))?;

        if let Some(condition) = &service.terminal_condition {
            if condition.condition_type == "Ready" && condition.state != "CONDITION_SUCCEEDED" {
                return Err(DeployError::RevisionFailed {
                    detail: format!("terminal condition state {}", condition.state),
                });
            }
        }

        if service.uri.is_empty() {
            return Err(DeployError::NotServing);
        }

        Ok(DeploymentResult {
            url: service.uri,
            revision_name: revision_basename(&service.latest_ready_revision).to_string(),
        })
    }
}

#[async_trait]
impl ServiceDeployer for ServerlessDeployClient {
    async fn deploy(
        &self,
        credential: &Credential,
        image: &ImageReference,
        policy: AccessPolicy,
    ) -> Result<DeploymentResult, DeployError> {
        let exists = self.service_exists(credential).await?;
        let operation = self.upsert(credential, image, exists).await?;
        self.await_rollout(credential, operation).await?;
        self.apply_access_policy(credential, policy).await?;

        let result = self.resolve_result(credential).await?;

        info!(
            service = %self.service,
            revision = %result.revision_name,
            url = %result.url,
            policy = %policy,
            "revision serving traffic"
        );

        Ok(result)
    }
}

/// IAM policy granting the invoker role to all users
fn public_invoker_policy() -> SetIamPolicyRequest {
    SetIamPolicyRequest {
        policy: IamPolicy {
            bindings: vec![IamBinding {
                role: INVOKER_ROLE.to_string(),
                members: vec!["allUsers".to_string()],
            }],
        },
    }
}

/// Last segment of a fully qualified revision resource name
fn revision_basename(resource_name: &str) -> &str {
    resource_name.rsplit('/').next().unwrap_or(resource_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_spec_wire_shape() {
        let spec = ServiceSpec {
            template: RevisionTemplate {
                containers: vec![ContainerSpec {
                    image: "r-docker.pkg.dev/p/repo/svc:abc123".to_string(),
                }],
            },
        };

        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            value["template"]["containers"][0]["image"],
            "r-docker.pkg.dev/p/repo/svc:abc123"
        );
    }

    #[test]
    fn test_public_invoker_policy_binds_all_users() {
        let value = serde_json::to_value(public_invoker_policy()).unwrap();
        assert_eq!(value["policy"]["bindings"][0]["role"], INVOKER_ROLE);
        assert_eq!(value["policy"]["bindings"][0]["members"][0], "allUsers");
    }

    #[test]
    fn test_ready_service_parses() {
        let body = r#"{
            "uri": "https://svc-xyz.a.run.app",
            "latestReadyRevision": "projects/p/locations/r/services/svc/revisions/svc-00042-abc",
            "terminalCondition": {"type": "Ready", "state": "CONDITION_SUCCEEDED"}
        }"#;

        let service: ServiceStatus = serde_json::from_str(body).unwrap();
        assert_eq!(service.uri, "https://svc-xyz.a.run.app");
        assert_eq!(revision_basename(&service.latest_ready_revision), "svc-00042-abc");
    }

    #[test]
    fn test_operation_parses_with_defaults() {
        let operation: Operation =
            serde_json::from_str(r#"{"name": "projects/p/operations/op-1"}"#).unwrap();
        assert!(!operation.done);
        assert!(operation.error.is_none());
    }

    #[test]
    fn test_revision_basename_of_bare_name() {
        assert_eq!(revision_basename("svc-00001-a"), "svc-00001-a");
    }

    #[test]
    fn test_service_path_shape() {
        let client = ServerlessDeployClient::new("proj", "europe-west1", "svc", Duration::from_secs(600));
        assert_eq!(client.service_path(), "projects/proj/locations/europe-west1/services/svc");
    }
}
