//! Image reference domain types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The floating tag every run republishes alongside the revision tag.
pub const FLOATING_TAG: &str = "latest";

/// Errors produced when parsing or constructing an image reference
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageRefError {
    /// Reference has no `:tag` suffix
    #[error("image reference '{0}' has no tag")]
    MissingTag(String),

    /// Repository path is empty
    #[error("image reference has an empty repository path")]
    EmptyRepository,

    /// Tag does not match the registry tag grammar
    #[error("invalid image tag '{0}'")]
    InvalidTag(String),
}

/// A fully qualified registry image reference (`registry/repo:tag`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    /// Repository path, e.g. `europe-west1-docker.pkg.dev/proj/repo/svc`
    pub repository: String,
    /// Tag, e.g. a commit hash or `latest`
    pub tag: String,
}

impl ImageReference {
    /// Builds a reference from a repository path and tag, validating both
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Result<Self, ImageRefError> {
        let repository = repository.into();
        let tag = tag.into();

        if repository.is_empty() {
            return Err(ImageRefError::EmptyRepository);
        }
        if !is_valid_tag(&tag) {
            return Err(ImageRefError::InvalidTag(tag));
        }

        Ok(Self { repository, tag })
    }

    /// Parses a `registry/repo:tag` string
    ///
    /// The split is on the last `:` so registry ports in the repository
    /// path are handled, as long as the reference actually carries a tag.
    pub fn parse(reference: &str) -> Result<Self, ImageRefError> {
        let (repository, tag) = reference
            .rsplit_once(':')
            .ok_or_else(|| ImageRefError::MissingTag(reference.to_string()))?;

        // A `:` that belongs to a registry port (e.g. `localhost:5000/repo`)
        // is not a tag separator.
        if tag.contains('/') {
            return Err(ImageRefError::MissingTag(reference.to_string()));
        }

        Self::new(repository, tag)
    }

    /// Whether this reference uses the mutable floating tag
    pub fn is_floating(&self) -> bool {
        self.tag == FLOATING_TAG
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// A content digest (`sha256:...`) identifying an image independent of tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDigest(pub String);

impl std::fmt::Display for ImageDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A built image as published to the registry
///
/// `reference` is the tag used for deployment (the revision-specific one by
/// convention); `digest` is the digest every tag of the build resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedImage {
    pub reference: ImageReference,
    pub digest: ImageDigest,
}

/// Validates a tag against the registry tag grammar
///
/// Tags start with an alphanumeric or underscore, followed by up to 127
/// alphanumerics, underscores, dots, or dashes.
pub fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();

    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphanumeric() || first == '_') {
        return false;
    }

    if tag.len() > 128 {
        return false;
    }

    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_reference() {
        let image =
            ImageReference::parse("europe-west1-docker.pkg.dev/proj/repo/svc:abc123").unwrap();
        assert_eq!(image.repository, "europe-west1-docker.pkg.dev/proj/repo/svc");
        assert_eq!(image.tag, "abc123");
        assert!(!image.is_floating());
    }

    #[test]
    fn test_parse_floating_tag() {
        let image = ImageReference::parse("registry.example/repo/svc:latest").unwrap();
        assert!(image.is_floating());
    }

    #[test]
    fn test_parse_rejects_missing_tag() {
        assert_eq!(
            ImageReference::parse("registry.example/repo/svc"),
            Err(ImageRefError::MissingTag("registry.example/repo/svc".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_port_only_colon() {
        // The colon belongs to the port, so the reference is untagged
        assert!(matches!(
            ImageReference::parse("localhost:5000/repo/svc"),
            Err(ImageRefError::MissingTag(_))
        ));
    }

    #[test]
    fn test_new_rejects_invalid_tag() {
        assert_eq!(
            ImageReference::new("registry.example/repo/svc", "bad tag"),
            Err(ImageRefError::InvalidTag("bad tag".to_string()))
        );
        assert_eq!(
            ImageReference::new("registry.example/repo/svc", ""),
            Err(ImageRefError::InvalidTag(String::new()))
        );
    }

    #[test]
    fn test_new_rejects_empty_repository() {
        assert_eq!(
            ImageReference::new("", "abc123"),
            Err(ImageRefError::EmptyRepository)
        );
    }

    #[test]
    fn test_tag_grammar() {
        assert!(is_valid_tag("abc123"));
        assert!(is_valid_tag("v1.2.3-rc.1"));
        assert!(is_valid_tag("_internal"));
        assert!(!is_valid_tag(""));
        assert!(!is_valid_tag(".hidden"));
        assert!(!is_valid_tag("-dash"));
        assert!(!is_valid_tag(&"a".repeat(129)));
    }

    #[test]
    fn test_display_round_trip() {
        let image = ImageReference::parse("registry.example/repo/svc:abc123").unwrap();
        assert_eq!(image.to_string(), "registry.example/repo/svc:abc123");
    }
}
