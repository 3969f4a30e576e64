//! Human-readable versions for images.
//!
//! Registries only know digests. A version string comes from the image's config labels, or, when
//! the image carries no version label but points at its source repository on GitHub, from that
//! repository's latest release.

use std::{collections::HashMap, sync::Arc, time::Duration};

use reqwest::{header, StatusCode};
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;

use crate::{
    config::{DEFAULT_METADATA_TIMEOUT, DEFAULT_RELEASE_RETRIES},
    utils, MonoupdateError, MonoupdateResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Label keys holding a version string, highest priority first.
pub const VERSION_LABELS: &[&str] = &[
    "org.opencontainers.image.version",
    "org.label-schema.version",
    "version",
    "VERSION",
];

/// Label keys holding the image's source repository URL, highest priority first.
pub const SOURCE_LABELS: &[&str] = &["org.opencontainers.image.source", "org.label-schema.vcs-url"];

/// The public GitHub REST API.
pub const GITHUB_API_URL: &str = "https://api.github.com";

const GITHUB_HOST: &str = "github.com";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A `owner/repo` pair on a source hosting service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRepository {
    /// The owning user or organization.
    pub owner: String,

    /// The repository name.
    pub repo: String,
}

/// Looks up the latest published release of a source repository.
#[async_trait::async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Returns the tag name of the latest release, or `None` if the repository has no releases.
    async fn latest_release(&self, source: &SourceRepository) -> MonoupdateResult<Option<String>>;
}

/// [`ReleaseSource`] backed by the GitHub REST API.
#[derive(Debug)]
pub struct GithubReleases {
    client: ClientWithMiddleware,
    base_url: String,
    token: Option<String>,
}

/// Derives version strings from labels, with an optional release lookup fallback.
#[derive(Clone, Default)]
pub struct VersionExtractor {
    releases: Option<Arc<dyn ReleaseSource>>,
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl GithubReleases {
    /// Creates a client for the public GitHub API, authenticating with `GITHUB_TOKEN` if set.
    pub fn new() -> MonoupdateResult<Self> {
        Self::with_base_url(GITHUB_API_URL, DEFAULT_METADATA_TIMEOUT, DEFAULT_RELEASE_RETRIES)
    }

    /// Creates a client for a GitHub-compatible API at `base_url`.
    pub fn with_base_url(
        base_url: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> MonoupdateResult<Self> {
        Ok(Self {
            client: utils::build_http_client(timeout, max_retries)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: utils::get_github_token(),
        })
    }

    /// Sets or clears the bearer token sent with release requests.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

impl VersionExtractor {
    /// Creates an extractor that only reads labels.
    pub fn labels_only() -> Self {
        Self { releases: None }
    }

    /// Creates an extractor that falls back to `releases` when no version label exists.
    pub fn with_releases(releases: Arc<dyn ReleaseSource>) -> Self {
        Self {
            releases: Some(releases),
        }
    }

    /// Returns the version of an image described by `labels`.
    ///
    /// Release lookup failures are logged and yield `None`.
    pub async fn extract(&self, labels: &HashMap<String, String>) -> Option<String> {
        if let Some(version) = version_from_labels(labels) {
            return Some(version);
        }

        let releases = self.releases.as_ref()?;
        let source = source_repository(labels)?;

        match releases.latest_release(&source).await {
            Ok(version) => version,
            Err(e) => {
                tracing::debug!(
                    owner = %source.owner,
                    repo = %source.repo,
                    error = %e,
                    "release lookup failed"
                );
                None
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the first non-empty version label, in [`VERSION_LABELS`] order.
pub fn version_from_labels(labels: &HashMap<String, String>) -> Option<String> {
    VERSION_LABELS
        .iter()
        .filter_map(|key| labels.get(*key))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Returns the GitHub repository an image declares as its source, if any.
pub fn source_repository(labels: &HashMap<String, String>) -> Option<SourceRepository> {
    SOURCE_LABELS
        .iter()
        .filter_map(|key| labels.get(*key))
        .find_map(|url| parse_github_url(url))
}

/// Parses `https://github.com/owner/repo[.git][/...]` and `git@github.com:owner/repo.git`.
pub fn parse_github_url(url: &str) -> Option<SourceRepository> {
    let url = url.trim();
    let rest = if let Some(rest) = url.strip_prefix("git@github.com:") {
        rest
    } else {
        let without_scheme = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .or_else(|| url.strip_prefix("git://"))
            .unwrap_or(url);
        let without_www = without_scheme
            .strip_prefix("www.")
            .unwrap_or(without_scheme);
        without_www.strip_prefix(GITHUB_HOST)?.strip_prefix('/')?
    };

    let mut segments = rest.split('/').filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if repo.is_empty() {
        return None;
    }

    Some(SourceRepository {
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait::async_trait]
impl ReleaseSource for GithubReleases {
    async fn latest_release(&self, source: &SourceRepository) -> MonoupdateResult<Option<String>> {
        let url = format!(
            "{}/repos/{}/{}/releases/latest",
            self.base_url, source.owner, source.repo
        );

        let mut request = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let release = response.json::<GithubRelease>().await?;
                Ok(Some(release.tag_name).filter(|tag| !tag.is_empty()))
            }
            status => Err(MonoupdateError::ReleaseLookup(format!(
                "{url} returned status {}",
                status.as_u16()
            ))),
        }
    }
}

impl std::fmt::Debug for VersionExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionExtractor")
            .field("releases", &self.releases.is_some())
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
