//! Remote image build client
//!
//! Submits a container build of the prepared source context, waits for the
//! remote service to build and push the image under every requested tag,
//! and returns the reference used for deployment together with the digest
//! all tags resolved to.
//!
//! Polling an unfinished build is platform-mandated completion tracking; a
//! failed request is never reissued.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::BuildError;
use crate::identity::trim_endpoint;
use gantry_core::domain::credential::Credential;
use gantry_core::domain::image::{ImageDigest, ImageReference, PublishedImage};

/// Default public build service endpoint
pub const DEFAULT_BUILD_ENDPOINT: &str = "https://cloudbuild.googleapis.com";

/// Hosted builder image that runs the docker build-and-push step
const DOCKER_BUILDER: &str = "gcr.io/cloud-builders/docker";

const POLL_INTERVAL: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Capability: produce a `PublishedImage`
#[async_trait]
pub trait ImagePublisher: Send + Sync {
    /// Builds the source context remotely and pushes it under every tag
    ///
    /// `tags` must be non-empty; the first tag is the one the deployment
    /// references. `timeout` bounds total build+push wall clock.
    async fn build_and_push(
        &self,
        credential: &Credential,
        tags: &[ImageReference],
        timeout: Duration,
    ) -> Result<PublishedImage, BuildError>;
}

/// Location of the prepared build context in object storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSource {
    pub bucket: String,
    pub object: String,
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBuildRequest {
    source: BuildSourceWire,
    steps: Vec<BuildStep>,
    images: Vec<String>,
    timeout: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildSourceWire {
    storage_source: StorageSource,
}

#[derive(Debug, Serialize)]
struct BuildStep {
    name: String,
    args: Vec<String>,
}

/// Build submission answers with a long-running operation wrapping the
/// queued build; only the build id is needed for tracking.
#[derive(Debug, Deserialize)]
struct CreateBuildResponse {
    metadata: BuildOperationMetadata,
}

#[derive(Debug, Deserialize)]
struct BuildOperationMetadata {
    build: BuildState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildState {
    id: String,
    status: BuildStatus,
    #[serde(default)]
    status_detail: Option<String>,
    #[serde(default)]
    results: Option<BuildResults>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum BuildStatus {
    StatusUnknown,
    Pending,
    Queued,
    Working,
    Success,
    Failure,
    InternalError,
    Timeout,
    Cancelled,
    Expired,
    #[serde(other)]
    Unrecognized,
}

impl BuildStatus {
    /// Whether the build has reached a terminal state
    fn is_terminal(self) -> bool {
        !matches!(
            self,
            BuildStatus::StatusUnknown
                | BuildStatus::Pending
                | BuildStatus::Queued
                | BuildStatus::Working
                | BuildStatus::Unrecognized
        )
    }
}

#[derive(Debug, Deserialize)]
struct BuildResults {
    #[serde(default)]
    images: Vec<BuiltImage>,
}

#[derive(Debug, Deserialize)]
struct BuiltImage {
    name: String,
    digest: String,
}

// =============================================================================
// Client
// =============================================================================

/// Image publisher backed by the remote build service
pub struct RemoteBuildClient {
    client: Client,
    endpoint: String,
    project: String,
    source: StorageSource,
    poll_interval: Duration,
}

impl RemoteBuildClient {
    pub fn new(project: impl Into<String>, source: StorageSource) -> Self {
        Self {
            client: Client::new(),
            endpoint: DEFAULT_BUILD_ENDPOINT.to_string(),
            project: project.into(),
            source,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Overrides the build service endpoint (primarily for tests)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = trim_endpoint(endpoint.into());
        self
    }

    /// Overrides the completion-poll interval (primarily for tests)
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn submit(
        &self,
        credential: &Credential,
        tags: &[ImageReference],
        timeout: Duration,
    ) -> Result<String, BuildError> {
        let url = format!("{}/v1/projects/{}/builds", self.endpoint, self.project);
        let request = build_request(&self.source, tags, timeout);

        debug!(images = request.images.len(), "submitting remote build");

        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(credential.token())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(BuildError::rejected(status.as_u16(), message));
        }

        let created: CreateBuildResponse = response
            .json()
            .await
            .map_err(|e| BuildError::MalformedResponse(e.to_string()))?;

        Ok(created.metadata.build.id)
    }

    async fn fetch_build(
        &self,
        credential: &Credential,
        build_id: &str,
    ) -> Result<BuildState, BuildError> {
        let url = format!(
            "{}/v1/projects/{}/builds/{}",
            self.endpoint, self.project, build_id
        );

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
            return Err(BuildError::rejected(status.as_u16(), message));
        }

        response
            .json()
            .await
            .map_err(|e| BuildError::MalformedResponse(e.to_string()))
    }

    /// Polls the build until it reaches a terminal state or the wall-clock
    /// budget is exhausted
    async fn await_completion(
        &self,
        credential: &Credential,
        build_id: &str,
        timeout: Duration,
    ) -> Result<BuildState, BuildError> {
        let started = Instant::now();

        loop {
            let build = self.fetch_build(credential, build_id).await?;

            if build.status.is_terminal() {
                return Ok(build);
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(BuildError::Timeout {
                    limit_secs: timeout.as_secs(),
                });
            }

            debug!(build_id, status = ?build.status, "build still running");
            let remaining = timeout - elapsed;
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }
}

#[async_trait]
impl ImagePublisher for RemoteBuildClient {
    async fn build_and_push(
        &self,
        credential: &Credential,
        tags: &[ImageReference],
        timeout: Duration,
    ) -> Result<PublishedImage, BuildError> {
        let deploy_reference = tags
            .first()
            .ok_or_else(|| BuildError::Precondition("no tags supplied".to_string()))?
            .clone();
        if timeout.is_zero() {
            return Err(BuildError::Precondition("timeout must be positive".to_string()));
        }

        let build_id = self.submit(credential, tags, timeout).await?;
        info!(build_id = %build_id, "remote build submitted");

        let build = self.await_completion(credential, &build_id, timeout).await?;

        if build.status != BuildStatus::Success {
            let detail = build
                .status_detail
                .unwrap_or_else(|| format!("{:?}", build.status));
            return Err(BuildError::Failed {
                build_id: build.id,
                detail,
            });
        }

        let digest = single_digest(build.results.as_ref())?;

        info!(
            build_id = %build.id,
            image = %deploy_reference,
            digest = %digest,
            "image built and pushed"
        );

        Ok(PublishedImage {
            reference: deploy_reference,
            digest,
        })
    }
}

/// Composes the build request: one docker step building the context and
/// tagging every requested reference, with all tags pushed by the service
fn build_request(
    source: &StorageSource,
    tags: &[ImageReference],
    timeout: Duration,
) -> CreateBuildRequest {
    let mut args = vec!["build".to_string()];
    for tag in tags {
        args.push("-t".to_string());
        args.push(tag.to_string());
    }
    args.push(".".to_string());

    CreateBuildRequest {
        source: BuildSourceWire {
            storage_source: source.clone(),
        },
        steps: vec![BuildStep {
            name: DOCKER_BUILDER.to_string(),
            args,
        }],
        images: tags.iter().map(|t| t.to_string()).collect(),
        timeout: format!("{}s", timeout.as_secs()),
    }
}

/// Extracts the one digest every pushed tag must share
fn single_digest(results: Option<&BuildResults>) -> Result<ImageDigest, BuildError> {
    let images = results.map(|r| r.images.as_slice()).unwrap_or_default();

    let Some(first) = images.first() else {
        return Err(BuildError::MissingDigest);
    };

    for image in &images[1..] {
        if image.digest != first.digest {
            return Err(BuildError::DigestMismatch {
                expected: first.digest.clone(),
                actual: image.digest.clone(),
            });
        }
    }

    Ok(ImageDigest(first.digest.clone()))
}
