//! Post-deploy health probe
//!
//! One synchronous GET against the deployed service's health endpoint.
//! This is a gate, not a readiness poller: exactly one request, no retry
//! loop, and any non-2xx answer, connection failure, or timeout is a fail.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use gantry_core::domain::health::{HealthVerdict, ProbeFailure};

/// Path the deployed application must answer on; the sole contract the
/// pipeline requires from the application under deployment
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// Capability: produce a `HealthVerdict`
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn verify(&self, url: &str, path: &str, timeout: Duration) -> HealthVerdict;
}

/// Health probe over plain HTTP GET
pub struct HttpHealthProbe {
    client: Client,
}

impl HttpHealthProbe {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpHealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn verify(&self, url: &str, path: &str, timeout: Duration) -> HealthVerdict {
        let target = join_probe_url(url, path);
        debug!(target = %target, "probing deployed service");

        match self.client.get(&target).timeout(timeout).send().await {
            Ok(response) => HealthVerdict::from_status(response.status().as_u16()),
            Err(e) if e.is_timeout() => HealthVerdict::Fail {
                reason: ProbeFailure::Timeout,
            },
            Err(e) => HealthVerdict::Fail {
                reason: ProbeFailure::Connect(e.to_string()),
            },
        }
    }
}

/// Joins a base URL and probe path without doubling the separator
fn join_probe_url(url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_probe_url() {
        assert_eq!(
            join_probe_url("https://svc-xyz.a.run.app", "/health"),
            "https://svc-xyz.a.run.app/health"
        );
        assert_eq!(
            join_probe_url("https://svc-xyz.a.run.app/", "health"),
            "https://svc-xyz.a.run.app/health"
        );
    }
}
