//! Pipeline orchestrator
//!
//! Drives one run through the strict forward sequence
//! `Start → Authenticated → Built → Deployed → Verified`, terminating in
//! success or failure. Fail-fast: the first stage error aborts the run,
//! later stages are never invoked, and nothing is retried or compensated.
//!
//! The health gate runs after traffic has already shifted. A failing
//! verdict therefore marks the run failed while the new revision stays
//! live; this trades safe gating for fast visible rollout and the report
//! keeps the deployed URL so the operator can act on it.

use chrono::Utc;
use std::time::Duration;
use tracing::{error, info};

use gantry_cloud::error::{AuthError, BuildError, DeployError};
use gantry_cloud::health::DEFAULT_HEALTH_PATH;
use gantry_cloud::{HealthProbe, ImagePublisher, ServiceDeployer, TokenBroker};
use gantry_core::domain::context::PipelineContext;
use gantry_core::domain::deploy::AccessPolicy;
use gantry_core::domain::health::{HealthVerdict, ProbeFailure};
use gantry_core::domain::run::{PipelineStage, RunOutcome, RunReport};

const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(1800);
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// A stage failure, attributed to the state the run was attempting to reach
#[derive(Debug)]
pub enum StageError {
    Auth(AuthError),
    Build(BuildError),
    Deploy(DeployError),
    /// The revision is live but did not answer the health probe
    HealthCheck(ProbeFailure),
}

impl StageError {
    pub fn stage(&self) -> PipelineStage {
        match self {
            StageError::Auth(_) => PipelineStage::Authenticated,
            StageError::Build(_) => PipelineStage::Built,
            StageError::Deploy(_) => PipelineStage::Deployed,
            StageError::HealthCheck(_) => PipelineStage::Verified,
        }
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageError::Auth(e) => write!(f, "{}", e),
            StageError::Build(e) => write!(f, "{}", e),
            StageError::Deploy(e) => write!(f, "{}", e),
            StageError::HealthCheck(reason) => write!(f, "health check failed: {}", reason),
        }
    }
}

impl std::error::Error for StageError {}

/// One pipeline run over the four external capabilities
///
/// The capabilities are trait objects so tests can substitute
/// deterministic fakes and exercise the full state machine without
/// network access.
pub struct Pipeline<'a> {
    context: &'a PipelineContext,
    broker: &'a dyn TokenBroker,
    publisher: &'a dyn ImagePublisher,
    deployer: &'a dyn ServiceDeployer,
    probe: &'a dyn HealthProbe,
    build_timeout: Duration,
    probe_timeout: Duration,
    probe_path: String,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        context: &'a PipelineContext,
        broker: &'a dyn TokenBroker,
        publisher: &'a dyn ImagePublisher,
        deployer: &'a dyn ServiceDeployer,
        probe: &'a dyn HealthProbe,
    ) -> Self {
        Self {
            context,
            broker,
            publisher,
            deployer,
            probe,
            build_timeout: DEFAULT_BUILD_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            probe_path: DEFAULT_HEALTH_PATH.to_string(),
        }
    }

    pub fn with_build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_probe_path(mut self, path: impl Into<String>) -> Self {
        self.probe_path = path.into();
        self
    }

    /// Executes the run and reports its terminal state
    pub async fn run(&self) -> RunReport {
        let started_at = Utc::now();
        let mut completed = Vec::new();
        let mut url = None;

        info!(
            run_id = %self.context.run_id,
            service = %self.context.service,
            revision = %self.context.revision,
            "pipeline started"
        );

        let (outcome, error) = match self.execute(&mut completed, &mut url).await {
            Ok(()) => {
                info!(run_id = %self.context.run_id, "pipeline succeeded");
                (RunOutcome::Success, None)
            }
            Err(e) => {
                error!(
                    run_id = %self.context.run_id,
                    stage = %e.stage(),
                    "pipeline failed: {}",
                    e
                );
                (RunOutcome::Failed { stage: e.stage() }, Some(e.to_string()))
            }
        };

        RunReport {
            run_id: self.context.run_id,
            started_at,
            finished_at: Utc::now(),
            completed,
            outcome,
            error,
            url,
        }
    }

    /// The forward-only stage sequence; the first error short-circuits
    async fn execute(
        &self,
        completed: &mut Vec<PipelineStage>,
        url: &mut Option<String>,
    ) -> Result<(), StageError> {
        let credential = self.broker.authenticate().await.map_err(StageError::Auth)?;
        completed.push(PipelineStage::Authenticated);

        let tags = self.context.image_tags();
        let image = self
            .publisher
            .build_and_push(&credential, &tags, self.build_timeout)
            .await
            .map_err(StageError::Build)?;
        completed.push(PipelineStage::Built);

        let deployment = self
            .deployer
            .deploy(&credential, &image.reference, AccessPolicy::Public)
            .await
            .map_err(StageError::Deploy)?;
        // Traffic has shifted; record the URL before the gate so a failed
        // verdict still surfaces where the live revision answers.
        *url = Some(deployment.url.clone());
        completed.push(PipelineStage::Deployed);

        let verdict = self
            .probe
            .verify(&deployment.url, &self.probe_path, self.probe_timeout)
            .await;

        match verdict {
            HealthVerdict::Pass { status } => {
                completed.push(PipelineStage::Verified);
                info!(status, url = %deployment.url, "deployed revision is healthy");
                Ok(())
            }
            HealthVerdict::Fail { reason } => Err(StageError::HealthCheck(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::Mutex;

    use gantry_core::domain::credential::Credential;
    use gantry_core::domain::deploy::DeploymentResult;
    use gantry_core::domain::image::{ImageDigest, ImageReference, PublishedImage};

    fn context() -> PipelineContext {
        PipelineContext::new("proj", "europe-west1", "svc", "images", "abc123").unwrap()
    }

    fn credential() -> Credential {
        Credential::new("tok", Utc::now() + ChronoDuration::seconds(600))
    }

    struct FakeBroker {
        fail: bool,
    }

    #[async_trait]
    impl TokenBroker for FakeBroker {
        async fn authenticate(&self) -> Result<Credential, AuthError> {
            if self.fail {
                return Err(AuthError::exchange(403, "trust relationship missing"));
            }
            Ok(credential())
        }
    }

    #[derive(Default)]
    struct FakePublisher {
        fail_with_timeout: bool,
        calls: Mutex<Vec<Vec<ImageReference>>>,
    }

    #[async_trait]
    impl ImagePublisher for FakePublisher {
        async fn build_and_push(
            &self,
            _credential: &Credential,
            tags: &[ImageReference],
            timeout: Duration,
        ) -> Result<PublishedImage, BuildError> {
            self.calls.lock().unwrap().push(tags.to_vec());

            if self.fail_with_timeout {
                return Err(BuildError::Timeout {
                    limit_secs: timeout.as_secs(),
                });
            }

            Ok(PublishedImage {
                reference: tags[0].clone(),
                digest: ImageDigest("sha256:aa".to_string()),
            })
        }
    }

    #[derive(Default)]
    struct FakeDeployer {
        fail: bool,
        calls: Mutex<Vec<(ImageReference, AccessPolicy)>>,
    }

    #[async_trait]
    impl ServiceDeployer for FakeDeployer {
        async fn deploy(
            &self,
            _credential: &Credential,
            image: &ImageReference,
            policy: AccessPolicy,
        ) -> Result<DeploymentResult, DeployError> {
            self.calls.lock().unwrap().push((image.clone(), policy));

            if self.fail {
                return Err(DeployError::rejected(429, "quota exceeded"));
            }

            // Idempotent upsert: the same (service, image) always resolves
            // to the same URL.
            Ok(DeploymentResult {
                url: "https://svc-xyz.a.run.app".to_string(),
                revision_name: "svc-00042-abc".to_string(),
            })
        }
    }

    struct FakeProbe {
        verdict: HealthVerdict,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeProbe {
        fn passing() -> Self {
            Self {
                verdict: HealthVerdict::Pass { status: 200 },
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                verdict: HealthVerdict::from_status(status),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HealthProbe for FakeProbe {
        async fn verify(&self, url: &str, path: &str, _timeout: Duration) -> HealthVerdict {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), path.to_string()));
            self.verdict.clone()
        }
    }

    #[tokio::test]
    async fn test_successful_run_passes_every_state_in_order() {
        let context = context();
        let broker = FakeBroker { fail: false };
        let publisher = FakePublisher::default();
        let deployer = FakeDeployer::default();
        let probe = FakeProbe::passing();

        let report = Pipeline::new(&context, &broker, &publisher, &deployer, &probe)
            .run()
            .await;

        assert!(report.outcome.is_success());
        assert_eq!(
            report.completed,
            vec![
                PipelineStage::Authenticated,
                PipelineStage::Built,
                PipelineStage::Deployed,
                PipelineStage::Verified,
            ]
        );
        assert_eq!(report.url.as_deref(), Some("https://svc-xyz.a.run.app"));
        assert!(report.error.is_none());
        assert!(report.finished_at >= report.started_at);
    }

    #[tokio::test]
    async fn test_build_receives_revision_and_latest_tags() {
        let context = context();
        let broker = FakeBroker { fail: false };
        let publisher = FakePublisher::default();
        let deployer = FakeDeployer::default();
        let probe = FakeProbe::passing();

        Pipeline::new(&context, &broker, &publisher, &deployer, &probe)
            .run()
            .await;

        let calls = publisher.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let tags = &calls[0];
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].tag, "abc123");
        assert_eq!(tags[1].tag, "latest");
        assert_eq!(tags[0].repository, tags[1].repository);
    }

    #[tokio::test]
    async fn test_deploy_receives_the_revision_tag_not_latest() {
        let context = context();
        let broker = FakeBroker { fail: false };
        let publisher = FakePublisher::default();
        let deployer = FakeDeployer::default();
        let probe = FakeProbe::passing();

        Pipeline::new(&context, &broker, &publisher, &deployer, &probe)
            .run()
            .await;

        let calls = deployer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (image, policy) = &calls[0];
        assert_eq!(image.tag, "abc123");
        assert!(!image.is_floating());
        assert_eq!(*policy, AccessPolicy::Public);
    }

    #[tokio::test]
    async fn test_probe_targets_the_deployed_url_and_health_path() {
        let context = context();
        let broker = FakeBroker { fail: false };
        let publisher = FakePublisher::default();
        let deployer = FakeDeployer::default();
        let probe = FakeProbe::passing();

        Pipeline::new(&context, &broker, &publisher, &deployer, &probe)
            .run()
            .await;

        let calls = probe.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![("https://svc-xyz.a.run.app".to_string(), "/health".to_string())]
        );
    }

    #[tokio::test]
    async fn test_auth_failure_invokes_nothing_downstream() {
        let context = context();
        let broker = FakeBroker { fail: true };
        let publisher = FakePublisher::default();
        let deployer = FakeDeployer::default();
        let probe = FakeProbe::passing();

        let report = Pipeline::new(&context, &broker, &publisher, &deployer, &probe)
            .run()
            .await;

        assert_eq!(
            report.outcome,
            RunOutcome::Failed {
                stage: PipelineStage::Authenticated
            }
        );
        assert!(report.completed.is_empty());
        assert_eq!(publisher.calls.lock().unwrap().len(), 0);
        assert_eq!(deployer.calls.lock().unwrap().len(), 0);
        assert_eq!(probe.calls.lock().unwrap().len(), 0);
        assert!(report.url.is_none());
    }

    #[tokio::test]
    async fn test_build_timeout_never_reaches_the_deployer() {
        let context = context();
        let broker = FakeBroker { fail: false };
        let publisher = FakePublisher {
            fail_with_timeout: true,
            ..Default::default()
        };
        let deployer = FakeDeployer::default();
        let probe = FakeProbe::passing();

        let report = Pipeline::new(&context, &broker, &publisher, &deployer, &probe)
            .with_build_timeout(Duration::from_secs(1800))
            .run()
            .await;

        assert_eq!(
            report.outcome,
            RunOutcome::Failed {
                stage: PipelineStage::Built
            }
        );
        assert_eq!(report.completed, vec![PipelineStage::Authenticated]);
        assert_eq!(deployer.calls.lock().unwrap().len(), 0);
        assert_eq!(probe.calls.lock().unwrap().len(), 0);
        assert!(report.error.unwrap().contains("1800"));
    }

    #[tokio::test]
    async fn test_deploy_failure_skips_the_probe() {
        let context = context();
        let broker = FakeBroker { fail: false };
        let publisher = FakePublisher::default();
        let deployer = FakeDeployer {
            fail: true,
            ..Default::default()
        };
        let probe = FakeProbe::passing();

        let report = Pipeline::new(&context, &broker, &publisher, &deployer, &probe)
            .run()
            .await;

        assert_eq!(
            report.outcome,
            RunOutcome::Failed {
                stage: PipelineStage::Deployed
            }
        );
        assert_eq!(probe.calls.lock().unwrap().len(), 0);
        assert!(report.url.is_none());
    }

    #[tokio::test]
    async fn test_unhealthy_revision_fails_the_run_but_stays_live() {
        let context = context();
        let broker = FakeBroker { fail: false };
        let publisher = FakePublisher::default();
        let deployer = FakeDeployer::default();
        let probe = FakeProbe::failing(503);

        let report = Pipeline::new(&context, &broker, &publisher, &deployer, &probe)
            .run()
            .await;

        // Failed at the verify boundary, distinguishable from a failed
        // deploy, and the deployed URL is still reported because the new
        // revision keeps serving.
        assert_eq!(
            report.outcome,
            RunOutcome::Failed {
                stage: PipelineStage::Verified
            }
        );
        assert_eq!(
            report.completed,
            vec![
                PipelineStage::Authenticated,
                PipelineStage::Built,
                PipelineStage::Deployed,
            ]
        );
        assert_eq!(deployer.calls.lock().unwrap().len(), 1);
        assert_eq!(report.url.as_deref(), Some("https://svc-xyz.a.run.app"));
        assert!(report.error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_repeated_deploys_resolve_to_the_same_url() {
        let context = context();
        let broker = FakeBroker { fail: false };
        let publisher = FakePublisher::default();
        let deployer = FakeDeployer::default();
        let probe = FakeProbe::passing();

        let pipeline = Pipeline::new(&context, &broker, &publisher, &deployer, &probe);
        let first = pipeline.run().await;
        let second = pipeline.run().await;

        assert_eq!(first.url, second.url);
        let calls = deployer.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, calls[1].0);
    }

    #[tokio::test]
    async fn test_custom_probe_path_is_used() {
        let context = context();
        let broker = FakeBroker { fail: false };
        let publisher = FakePublisher::default();
        let deployer = FakeDeployer::default();
        let probe = FakeProbe::passing();

        Pipeline::new(&context, &broker, &publisher, &deployer, &probe)
            .with_probe_path("/livez")
            .run()
            .await;

        let calls = probe.calls.lock().unwrap();
        assert_eq!(calls[0].1, "/livez");
    }
}
