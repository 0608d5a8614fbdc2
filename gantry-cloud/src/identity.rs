//! Identity broker client
//!
//! Exchanges a federated workload identity assertion for a short-lived
//! access token bound to the deployer service account. Two round trips:
//! an OAuth token exchange against the STS endpoint, then service-account
//! impersonation against the IAM credentials endpoint.
//!
//! Failures here are fatal to the run and never retried: a broken trust
//! relationship will not self-heal within a single pipeline execution.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::AuthError;
use gantry_core::domain::credential::Credential;

/// Default public STS endpoint
pub const DEFAULT_STS_ENDPOINT: &str = "https://sts.googleapis.com";
/// Default public IAM credentials endpoint
pub const DEFAULT_IAM_ENDPOINT: &str = "https://iamcredentials.googleapis.com";

const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const SUBJECT_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:jwt";
const REQUESTED_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
const CLOUD_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Identity requests are short control-plane calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifetime requested for the impersonated credential; long enough for one
/// deploy, no mid-run refresh
const CREDENTIAL_LIFETIME_SECS: u64 = 600;

/// Capability: produce a `Credential` for the deployer service account
#[async_trait]
pub trait TokenBroker: Send + Sync {
    async fn authenticate(&self) -> Result<Credential, AuthError>;
}

// =============================================================================
// Wire types
// =============================================================================

/// STS token-exchange request (camelCase on the wire)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeTokenRequest<'a> {
    grant_type: &'a str,
    audience: &'a str,
    scope: &'a str,
    requested_token_type: &'a str,
    subject_token: &'a str,
    subject_token_type: &'a str,
}

/// STS answers in OAuth style (snake_case)
#[derive(Debug, Deserialize)]
struct ExchangeTokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct GenerateAccessTokenRequest<'a> {
    scope: Vec<&'a str>,
    lifetime: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAccessTokenResponse {
    access_token: String,
    expire_time: DateTime<Utc>,
}

// =============================================================================
// Client
// =============================================================================

/// Token broker backed by workload identity federation
///
/// Construction captures the trust configuration; `authenticate` performs
/// the two-step exchange. Endpoints are overridable so tests can point the
/// broker at local fixtures.
pub struct FederatedTokenBroker {
    client: Client,
    sts_endpoint: String,
    iam_endpoint: String,
    /// Full resource name of the workload identity provider
    provider: String,
    /// Email of the service account to impersonate
    service_account: String,
    /// Identity assertion supplied by the surrounding environment
    subject_token: String,
}

impl FederatedTokenBroker {
    pub fn new(
        provider: impl Into<String>,
        service_account: impl Into<String>,
        subject_token: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            sts_endpoint: DEFAULT_STS_ENDPOINT.to_string(),
            iam_endpoint: DEFAULT_IAM_ENDPOINT.to_string(),
            provider: provider.into(),
            service_account: service_account.into(),
            subject_token: subject_token.into(),
        }
    }

    /// Overrides both identity endpoints (primarily for tests)
    pub fn with_endpoints(
        mut self,
        sts_endpoint: impl Into<String>,
        iam_endpoint: impl Into<String>,
    ) -> Self {
        self.sts_endpoint = trim_endpoint(sts_endpoint.into());
        self.iam_endpoint = trim_endpoint(iam_endpoint.into());
        self
    }

    async fn exchange_subject_token(&self) -> Result<String, AuthError> {
        let url = format!("{}/v1/token", self.sts_endpoint);
        debug!(provider = %self.provider, "exchanging workload identity assertion");

        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(&ExchangeTokenRequest {
                grant_type: GRANT_TYPE,
                audience: &self.provider,
                scope: CLOUD_SCOPE,
                requested_token_type: REQUESTED_TOKEN_TYPE,
                subject_token: &self.subject_token,
                subject_token_type: SUBJECT_TOKEN_TYPE,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AuthError::exchange(status.as_u16(), message));
        }

        let exchanged: ExchangeTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        Ok(exchanged.access_token)
    }

    async fn impersonate(&self, federated_token: &str) -> Result<Credential, AuthError> {
        let url = format!(
            "{}/v1/projects/-/serviceAccounts/{}:generateAccessToken",
            self.iam_endpoint, self.service_account
        );
        debug!(service_account = %self.service_account, "impersonating deployer service account");

        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(federated_token)
            .json(&GenerateAccessTokenRequest {
                scope: vec![CLOUD_SCOPE],
                lifetime: format!("{}s", CREDENTIAL_LIFETIME_SECS),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AuthError::impersonation(status.as_u16(), message));
        }

        let minted: GenerateAccessTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        Ok(Credential::new(minted.access_token, minted.expire_time))
    }
}

#[async_trait]
impl TokenBroker for FederatedTokenBroker {
    async fn authenticate(&self) -> Result<Credential, AuthError> {
        let federated_token = self.exchange_subject_token().await?;
        let credential = self.impersonate(&federated_token).await?;

        info!(
            service_account = %self.service_account,
            expires_at = %credential.expires_at(),
            "minted short-lived deployer credential"
        );

        Ok(credential)
    }
}

pub(crate) fn trim_endpoint(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}
