//! Mapping from repository strings to registry endpoints.
//!
//! Every registry dialect names its token endpoint and token service differently. This module
//! knows the major hosts and falls back to the `{host}/token` convention for everything else.

use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::config::DEFAULT_OCI_REFERENCE_REPO_NAMESPACE;

use super::reference::{extract_registry_and_path, DOCKER_HUB_HOST};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Base URL of the Docker Hub registry API.
pub const DOCKER_REGISTRY_URL: &str = "https://registry-1.docker.io";

/// Docker Hub token endpoint.
pub const DOCKER_AUTH_REALM: &str = "https://auth.docker.io/token";

/// Docker Hub token service name.
pub const DOCKER_AUTH_SERVICE: &str = "registry.docker.io";

/// GitHub Container Registry host.
const GHCR_HOST: &str = "ghcr.io";

/// The LinuxServer.io registry, a pure mirror of GHCR under a fixed namespace.
const LSCR_HOST: &str = "lscr.io";

/// The namespace LSCR images live under on GHCR.
const LSCR_NAMESPACE: &str = "linuxserver";

/// Quay host.
const QUAY_HOST: &str = "quay.io";

/// Google Container Registry host.
const GCR_HOST: &str = "gcr.io";

/// Microsoft Container Registry host. Serves anonymous pulls without a token handshake.
const MCR_HOST: &str = "mcr.microsoft.com";

const DOCKER_HUB_ALIASES: [&str; 3] = [DOCKER_HUB_HOST, "index.docker.io", "registry-1.docker.io"];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// How credentials for a target are looked up.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialLookup {
    /// Never send credentials.
    #[default]
    None,

    /// Attach Docker Hub credentials from the Docker CLI config to the token request only.
    DockerHub,
}

/// Where and how to talk to the registry serving a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct RegistryTarget {
    /// The registry API base URL, without a trailing slash.
    #[builder(setter(into))]
    base_url: String,

    /// The token endpoint, or `None` when the host has no anonymous-token support.
    #[builder(default, setter(into, strip_option))]
    auth_token_url: Option<String>,

    /// The `service` parameter of token requests.
    #[builder(setter(into))]
    auth_service: String,

    /// The repository path on the registry, e.g. `library/nginx`.
    #[builder(setter(into))]
    image_path: String,

    /// The host as written in the repository string.
    #[builder(setter(into))]
    original_host: String,

    /// How credentials are found for the token request.
    #[builder(default)]
    credentials: CredentialLookup,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RegistryTarget {
    /// Resolves the registry target for a repository. Total: every string maps to a target.
    ///
    /// ## Examples
    ///
    /// ```
    /// use monoupdate::oci::RegistryTarget;
    ///
    /// let target = RegistryTarget::resolve("nginx");
    /// assert_eq!(target.get_image_path(), "library/nginx");
    ///
    /// let target = RegistryTarget::resolve("ghcr.io/org/app");
    /// assert_eq!(target.get_base_url(), "https://ghcr.io");
    /// ```
    pub fn resolve(repository: &str) -> Self {
        let repository = strip_reference_suffix(repository.trim());

        if !repository.contains('/') {
            return docker_hub(
                DOCKER_HUB_HOST,
                format!("{DEFAULT_OCI_REFERENCE_REPO_NAMESPACE}/{repository}"),
            );
        }

        let (host, path) = extract_registry_and_path(repository);
        if path.len() == repository.len() {
            // No host segment: a namespaced Docker Hub image such as `bitnami/redis`.
            return docker_hub(DOCKER_HUB_HOST, path.to_string());
        }

        let lower_host = host.to_ascii_lowercase();
        match lower_host.as_str() {
            h if DOCKER_HUB_ALIASES.contains(&h) => {
                let path = if path.contains('/') {
                    path.to_string()
                } else {
                    format!("{DEFAULT_OCI_REFERENCE_REPO_NAMESPACE}/{path}")
                };
                docker_hub(host, path)
            }
            GHCR_HOST => token_target(
                "https://ghcr.io",
                "https://ghcr.io/token",
                GHCR_HOST,
                path,
                host,
            ),
            LSCR_HOST => {
                let path = if path.starts_with(&format!("{LSCR_NAMESPACE}/")) {
                    path.to_string()
                } else {
                    format!("{LSCR_NAMESPACE}/{path}")
                };
                token_target(
                    "https://ghcr.io",
                    "https://ghcr.io/token",
                    GHCR_HOST,
                    &path,
                    host,
                )
            }
            QUAY_HOST => token_target(
                "https://quay.io",
                "https://quay.io/v2/auth",
                QUAY_HOST,
                path,
                host,
            ),
            h if h == GCR_HOST || h.ends_with(".gcr.io") => token_target(
                &format!("https://{host}"),
                &format!("https://{host}/v2/token"),
                host,
                path,
                host,
            ),
            MCR_HOST => RegistryTarget::builder()
                .base_url(format!("https://{host}"))
                .auth_service(host)
                .image_path(path)
                .original_host(host)
                .build(),
            _ => {
                let scheme = if is_local_host(&lower_host) {
                    "http"
                } else {
                    "https"
                };
                token_target(
                    &format!("{scheme}://{host}"),
                    &format!("{scheme}://{host}/token"),
                    host,
                    path,
                    host,
                )
            }
        }
    }

    /// Returns true if a token request should be made before manifest calls.
    pub fn supports_token(&self) -> bool {
        self.auth_token_url.is_some()
    }

    /// Returns the registry's host as seen in the base URL.
    pub fn registry_host(&self) -> &str {
        self.base_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.base_url)
    }

    /// The URL of a manifest, by tag or digest.
    pub fn manifest_url(&self, reference: &str) -> String {
        format!(
            "{}/v2/{}/manifests/{}",
            self.base_url, self.image_path, reference
        )
    }

    /// The URL of a blob, by digest.
    pub fn blob_url(&self, digest: &str) -> String {
        format!("{}/v2/{}/blobs/{}", self.base_url, self.image_path, digest)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn docker_hub(host: &str, image_path: String) -> RegistryTarget {
    RegistryTarget::builder()
        .base_url(DOCKER_REGISTRY_URL)
        .auth_token_url(DOCKER_AUTH_REALM)
        .auth_service(DOCKER_AUTH_SERVICE)
        .image_path(image_path)
        .original_host(host)
        .credentials(CredentialLookup::DockerHub)
        .build()
}

fn token_target(
    base_url: &str,
    auth_token_url: &str,
    auth_service: &str,
    image_path: &str,
    original_host: &str,
) -> RegistryTarget {
    RegistryTarget::builder()
        .base_url(base_url)
        .auth_token_url(auth_token_url)
        .auth_service(auth_service)
        .image_path(image_path)
        .original_host(original_host)
        .build()
}

/// Drops a `@digest` suffix and a `:tag` suffix that follows the last path segment.
fn strip_reference_suffix(repository: &str) -> &str {
    let repository = repository
        .split_once('@')
        .map(|(name, _)| name)
        .unwrap_or(repository);

    let last_slash = repository.rfind('/').map(|idx| idx + 1).unwrap_or(0);
    match repository[last_slash..].rfind(':') {
        Some(idx) => &repository[..last_slash + idx],
        None => repository,
    }
}

fn is_local_host(host: &str) -> bool {
    let name = host.split(':').next().unwrap_or(host);
    name == "localhost" || name == "127.0.0.1"
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
