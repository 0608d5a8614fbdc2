//! Health probe domain types

use serde::{Deserialize, Serialize};

/// Why a health probe failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeFailure {
    /// The service answered with a non-2xx status
    Status(u16),
    /// No response within the probe timeout
    Timeout,
    /// The connection could not be established
    Connect(String),
}

impl std::fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeFailure::Status(code) => write!(f, "unhealthy status {}", code),
            ProbeFailure::Timeout => write!(f, "probe timed out"),
            ProbeFailure::Connect(detail) => write!(f, "connection failed: {}", detail),
        }
    }
}

/// Terminal verdict of the post-deploy health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthVerdict {
    /// 2xx response received within the timeout
    Pass { status: u16 },
    /// Anything else: non-2xx, connection failure, or timeout
    Fail { reason: ProbeFailure },
}

impl HealthVerdict {
    /// Classifies a response status: pass iff it is in [200, 299]
    pub fn from_status(status: u16) -> Self {
        if (200..=299).contains(&status) {
            HealthVerdict::Pass { status }
        } else {
            HealthVerdict::Fail {
                reason: ProbeFailure::Status(status),
            }
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, HealthVerdict::Pass { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_is_strictly_2xx() {
        assert!(HealthVerdict::from_status(200).is_pass());
        assert!(HealthVerdict::from_status(204).is_pass());
        assert!(HealthVerdict::from_status(299).is_pass());

        assert!(!HealthVerdict::from_status(199).is_pass());
        assert!(!HealthVerdict::from_status(301).is_pass());
        assert!(!HealthVerdict::from_status(404).is_pass());
        assert!(!HealthVerdict::from_status(503).is_pass());
    }

    #[test]
    fn test_failed_status_is_recorded() {
        assert_eq!(
            HealthVerdict::from_status(503),
            HealthVerdict::Fail {
                reason: ProbeFailure::Status(503)
            }
        );
    }
}
