use std::{fmt, str::FromStr, sync::LazyLock};

use getset::Getters;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    config::{DEFAULT_OCI_REFERENCE_REPO_NAMESPACE, DEFAULT_OCI_REFERENCE_TAG},
    MonoupdateError,
};

use super::digest;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The registry host implied when a reference names none.
pub const DOCKER_HUB_HOST: &str = "docker.io";

/// Host aliases the runtime treats as Docker Hub.
const DOCKER_HUB_ALIASES: [&str; 3] = ["docker.io", "index.docker.io", "registry-1.docker.io"];

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w[\w.-]{0,127}$").expect("tag pattern is a valid regular expression")
});

static REPOSITORY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9.-]+(:[0-9]+)?/)?[a-z0-9]+(?:[._-][a-z0-9]+)*(/[a-z0-9]+(?:[._-][a-z0-9]+)*)*$")
        .expect("repository pattern is a valid regular expression")
});

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A `repository:tag` pair as the container runtime lists it.
///
/// The repository keeps whatever registry host the user wrote (`nginx`, `ghcr.io/org/app`);
/// [`ImageName::canonical`] gives the fully qualified form used for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ImageName {
    /// The repository, possibly with a registry host.
    repository: String,

    /// The tag.
    tag: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ImageName {
    /// Creates a new image name from a repository and tag.
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// Splits a reference such as `host:5000/app:1.2@sha256:...` into repository and tag.
    ///
    /// A digest suffix is dropped. A missing tag becomes `latest`.
    pub fn from_reference(reference: &str) -> Self {
        let without_digest = reference
            .trim()
            .split_once('@')
            .map(|(name, _)| name)
            .unwrap_or(reference.trim());

        let last_slash = without_digest.rfind('/').map(|idx| idx + 1).unwrap_or(0);
        match without_digest[last_slash..].rfind(':') {
            Some(idx) => {
                let split = last_slash + idx;
                Self::new(&without_digest[..split], &without_digest[split + 1..])
            }
            None => Self::new(without_digest, DEFAULT_OCI_REFERENCE_TAG),
        }
    }

    /// Returns the `registry/namespace/name:tag` form, with Docker Hub defaults filled in.
    ///
    /// `nginx`, `nginx:latest`, `library/nginx:latest` and `docker.io/library/nginx:latest` all
    /// have the same canonical form.
    pub fn canonical(&self) -> String {
        let (registry, path) = extract_registry_and_path(&self.repository);
        let registry = if DOCKER_HUB_ALIASES.contains(&registry) {
            DOCKER_HUB_HOST
        } else {
            registry
        };

        let path = if registry == DOCKER_HUB_HOST && !path.contains('/') {
            format!("{DEFAULT_OCI_REFERENCE_REPO_NAMESPACE}/{path}")
        } else {
            path.to_string()
        };

        format!("{registry}/{path}:{}", self.tag)
    }

    /// Returns true if both names denote the same image.
    pub fn same_image(&self, other: &ImageName) -> bool {
        self.canonical() == other.canonical()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns true if the reference pins a digest, either bare (`sha256:...`) or as `name@digest`.
///
/// Digest-pinned references cannot be re-pulled by tag.
pub fn is_digest_pinned(reference: &str) -> bool {
    digest::is_digest(reference) || reference.contains('@')
}

/// Splits a repository into its registry host and remaining path.
///
/// The first segment is a host if it contains `.` or `:` or is `localhost`; otherwise the host
/// is [`DOCKER_HUB_HOST`].
pub fn extract_registry_and_path(repository: &str) -> (&str, &str) {
    match repository.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (first, rest)
        }
        _ => (DOCKER_HUB_HOST, repository),
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for ImageName {
    type Err = MonoupdateError;

    /// Parses a user-supplied reference, validating repository and tag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MonoupdateError::ImageReferenceError(
                "input string is empty".into(),
            ));
        }

        if is_digest_pinned(s) {
            return Err(MonoupdateError::ImageReferenceError(format!(
                "digest-pinned reference cannot be updated by tag: {s}"
            )));
        }

        let name = Self::from_reference(s);
        if !REPOSITORY_REGEX.is_match(&name.repository) {
            return Err(MonoupdateError::ImageReferenceError(format!(
                "invalid repository: {}",
                name.repository
            )));
        }

        if !TAG_REGEX.is_match(&name.tag) {
            return Err(MonoupdateError::ImageReferenceError(format!(
                "invalid tag: {}",
                name.tag
            )));
        }

        Ok(name)
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
