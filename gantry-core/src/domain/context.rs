//! Pipeline run context

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::image::{FLOATING_TAG, ImageReference, is_valid_tag};

/// Errors produced when resolving a pipeline context
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    /// A required field was empty
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    /// A field does not match the platform resource-name grammar
    #[error("{field} '{value}' is not a valid resource name")]
    InvalidName { field: &'static str, value: String },

    /// The source revision is not usable as an image tag
    #[error("revision '{0}' is not a valid image tag")]
    InvalidRevision(String),
}

/// Immutable configuration for one pipeline run
///
/// Resolved once at pipeline start and passed by reference to every stage.
/// No stage reads ambient environment state; everything it needs is here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineContext {
    /// Correlation id for this run, minted at construction
    pub run_id: Uuid,
    /// Cloud project identifier
    pub project: String,
    /// Deployment region, e.g. `europe-west1`
    pub region: String,
    /// Target service name
    pub service: String,
    /// Artifact repository name
    pub repository: String,
    /// Triggering source revision (commit hash); doubles as the image tag
    pub revision: String,
}

impl PipelineContext {
    /// Resolves and validates a context from the raw configuration inputs
    pub fn new(
        project: impl Into<String>,
        region: impl Into<String>,
        service: impl Into<String>,
        repository: impl Into<String>,
        revision: impl Into<String>,
    ) -> Result<Self, ContextError> {
        let project = project.into();
        let region = region.into();
        let service = service.into();
        let repository = repository.into();
        let revision = revision.into();

        validate_resource_name("project", &project)?;
        validate_resource_name("region", &region)?;
        validate_resource_name("service", &service)?;
        validate_resource_name("repository", &repository)?;

        if revision.is_empty() {
            return Err(ContextError::Empty("revision"));
        }
        if !is_valid_tag(&revision) {
            return Err(ContextError::InvalidRevision(revision));
        }

        Ok(Self {
            run_id: Uuid::new_v4(),
            project,
            region,
            service,
            repository,
            revision,
        })
    }

    /// Registry path all images of this run are published under
    ///
    /// Shape: `{region}-docker.pkg.dev/{project}/{repository}/{service}`
    pub fn image_repository_path(&self) -> String {
        format!(
            "{}-docker.pkg.dev/{}/{}/{}",
            self.region, self.project, self.repository, self.service
        )
    }

    /// The two tags published per run
    ///
    /// The revision-specific tag comes first; it is the reference used for
    /// deployment. The floating `latest` tag is republished for convenience
    /// and must end up on the same digest.
    pub fn image_tags(&self) -> [ImageReference; 2] {
        let repository = self.image_repository_path();
        [
            ImageReference {
                repository: repository.clone(),
                tag: self.revision.clone(),
            },
            ImageReference {
                repository,
                tag: FLOATING_TAG.to_string(),
            },
        ]
    }
}

/// Validates a platform resource name: lowercase alphanumerics and dashes,
/// starting with a letter
fn validate_resource_name(field: &'static str, value: &str) -> Result<(), ContextError> {
    if value.is_empty() {
        return Err(ContextError::Empty(field));
    }

    let mut chars = value.chars();
    let first = chars.next().unwrap_or(' ');

    let valid = first.is_ascii_lowercase()
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if !valid {
        return Err(ContextError::InvalidName {
            field,
            value: value.to_string(),
        });
    }

    Ok(())
}
