//! Deploy configuration
//!
//! Every knob for one pipeline run, resolved once from flags and
//! environment before any stage starts and then frozen. Stages never read
//! ambient environment state.

use std::time::Duration;

/// Resolved configuration for a deploy run
#[derive(Debug, Clone)]
pub struct Config {
    /// Cloud project identifier
    pub project: String,

    /// Deployment region
    pub region: String,

    /// Target service name
    pub service: String,

    /// Artifact repository name
    pub repository: String,

    /// Triggering source revision (commit hash), used as the image tag
    pub revision: String,

    /// Full resource name of the workload identity provider
    pub identity_provider: String,

    /// Deployer service account email
    pub service_account: String,

    /// Identity assertion from the surrounding environment (env only,
    /// never a flag)
    pub subject_token: String,

    /// Object-storage location of the prepared build context
    pub source_bucket: String,
    pub source_object: String,

    /// Bounds total remote build+push duration
    pub build_timeout: Duration,

    /// Bounds the rollout reaching a terminal state
    pub deploy_timeout: Duration,

    /// Bounds the single post-deploy probe
    pub probe_timeout: Duration,

    /// Path the deployed application answers health checks on
    pub probe_path: String,

    /// Control-plane endpoint overrides, for staging or test fixtures
    pub sts_endpoint: Option<String>,
    pub iam_endpoint: Option<String>,
    pub build_endpoint: Option<String>,
    pub deploy_endpoint: Option<String>,
}

impl Config {
    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        for (field, value) in [
            ("project", &self.project),
            ("region", &self.region),
            ("service", &self.service),
            ("repository", &self.repository),
            ("revision", &self.revision),
            ("identity provider", &self.identity_provider),
            ("service account", &self.service_account),
            ("source bucket", &self.source_bucket),
            ("source object", &self.source_object),
        ] {
            if value.is_empty() {
                anyhow::bail!("{} cannot be empty", field);
            }
        }

        if self.subject_token.is_empty() {
            anyhow::bail!("no identity assertion found (set GANTRY_ID_TOKEN)");
        }

        if !self.service_account.contains('@') {
            anyhow::bail!(
                "service account '{}' is not an account email",
                self.service_account
            );
        }

        if self.build_timeout.is_zero() {
            anyhow::bail!("build timeout must be greater than 0");
        }

        if self.deploy_timeout.is_zero() {
            anyhow::bail!("deploy timeout must be greater than 0");
        }

        if self.probe_timeout.is_zero() {
            anyhow::bail!("probe timeout must be greater than 0");
        }

        if !self.probe_path.starts_with('/') {
            anyhow::bail!("probe path '{}' must start with '/'", self.probe_path);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            project: "proj".to_string(),
            region: "europe-west1".to_string(),
            service: "svc".to_string(),
            repository: "images".to_string(),
            revision: "abc123".to_string(),
            identity_provider:
                "//iam.googleapis.com/projects/1/locations/global/workloadIdentityPools/ci/providers/gh"
                    .to_string(),
            service_account: "deployer@proj.iam.gserviceaccount.com".to_string(),
            subject_token: "assertion".to_string(),
            source_bucket: "proj_cloudbuild".to_string(),
            source_object: "source/abc123.tgz".to_string(),
            build_timeout: Duration::from_secs(1800),
            deploy_timeout: Duration::from_secs(600),
            probe_timeout: Duration::from_secs(10),
            probe_path: "/health".to_string(),
            sts_endpoint: None,
            iam_endpoint: None,
            build_endpoint: None,
            deploy_endpoint: None,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_empty_required_field_fails() {
        let mut config = config();
        config.project = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_identity_assertion_names_the_env_var() {
        let mut config = config();
        config.subject_token = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("GANTRY_ID_TOKEN"));
    }

    #[test]
    fn test_service_account_must_be_an_email() {
        let mut config = config();
        config.service_account = "deployer".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeouts_fail() {
        let mut no_build_budget = config();
        no_build_budget.build_timeout = Duration::ZERO;
        assert!(no_build_budget.validate().is_err());

        let mut no_probe_budget = config();
        no_probe_budget.probe_timeout = Duration::ZERO;
        assert!(no_probe_budget.validate().is_err());
    }

    #[test]
    fn test_probe_path_must_be_absolute() {
        let mut config = config();
        config.probe_path = "health".to_string();
        assert!(config.validate().is_err());
    }
}
