//! Gantry Cloud Clients
//!
//! Typed HTTP clients for the external control planes the deployment
//! pipeline drives: the identity broker, the remote build service, the
//! serverless deploy API, and the post-deploy health probe.
//!
//! Each capability is a narrow trait ("produce a Credential", "produce a
//! PublishedImage", "produce a DeploymentResult", "produce a
//! HealthVerdict") with one production implementation, so the pipeline
//! logic can be exercised with deterministic fakes and no network.
//!
//! # Example
//!
//! ```no_run
//! use gantry_cloud::identity::{FederatedTokenBroker, TokenBroker};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gantry_cloud::error::AuthError> {
//!     let broker = FederatedTokenBroker::new(
//!         "//iam.googleapis.com/projects/1/locations/global/workloadIdentityPools/ci/providers/gh",
//!         "deployer@proj.iam.gserviceaccount.com",
//!         std::env::var("GANTRY_ID_TOKEN").unwrap_or_default(),
//!     );
//!
//!     let credential = broker.authenticate().await?;
//!     println!("credential expires at {}", credential.expires_at());
//!     Ok(())
//! }
//! ```

pub mod build;
pub mod deploy;
pub mod error;
pub mod health;
pub mod identity;

// Re-export the capability traits and production clients
pub use build::{ImagePublisher, RemoteBuildClient, StorageSource};
pub use deploy::{ServerlessDeployClient, ServiceDeployer};
pub use error::{AuthError, BuildError, DeployError};
pub use health::{HealthProbe, HttpHealthProbe};
pub use identity::{FederatedTokenBroker, TokenBroker};
