//! Short-lived deployment credentials

use chrono::{DateTime, Utc};

/// A short-lived bearer token bound to the deployer service account
///
/// Created at pipeline start, consumed by the build and deploy stages,
/// never persisted. The token is not serializable and its `Debug` output
/// is redacted.
#[derive(Clone)]
pub struct Credential {
    token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// The bearer token value
    pub fn token(&self) -> &str {
        &self.token
    }

    /// When the identity provider expires this credential
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the credential has expired at the given instant
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
