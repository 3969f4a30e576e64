use bytes::Bytes;

use crate::{oci::RegistryTarget, MonoupdateResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The MIME type of an OCI image index.
pub const OCI_INDEX_MIME_TYPE: &str = "application/vnd.oci.image.index.v1+json";

/// The MIME type of a Docker manifest list.
pub const DOCKER_MANIFEST_LIST_MIME_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// The MIME type of a Docker image manifest.
pub const DOCKER_MANIFEST_MIME_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// The MIME type of an OCI image manifest.
pub const OCI_MANIFEST_MIME_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// Accept list for tag lookups, ordered so that list-level documents are preferred.
pub const MANIFEST_ACCEPT: &[&str] = &[
    OCI_INDEX_MIME_TYPE,
    DOCKER_MANIFEST_LIST_MIME_TYPE,
    DOCKER_MANIFEST_MIME_TYPE,
    OCI_MANIFEST_MIME_TYPE,
];

/// Accept list for platform-specific manifest lookups by digest.
pub const PLATFORM_MANIFEST_ACCEPT: &[&str] = &[DOCKER_MANIFEST_MIME_TYPE, OCI_MANIFEST_MIME_TYPE];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A bearer token issued by a registry's token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

/// A manifest body together with the headers that identify it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestResponse {
    /// The raw manifest document.
    pub body: Bytes,

    /// The registry's `Docker-Content-Digest` header, if present.
    pub content_digest: Option<String>,

    /// The response `Content-Type`, if present.
    pub content_type: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Read-only client for the Distribution/OCI registry protocol.
///
/// Implementations must bound every call with a timeout so one unresponsive registry cannot stall
/// a scan.
#[async_trait::async_trait]
pub trait RegistryClient: Send + Sync {
    /// Requests a pull-scoped token for the target.
    ///
    /// `None` is a normal outcome (no token endpoint, anonymous access refused, network error);
    /// callers proceed unauthenticated.
    async fn get_auth_token(&self, target: &RegistryTarget) -> Option<AuthToken>;

    /// Fetches a manifest by tag or digest.
    async fn fetch_manifest(
        &self,
        target: &RegistryTarget,
        reference: &str,
        accept: &[&str],
        token: Option<&AuthToken>,
    ) -> MonoupdateResult<ManifestResponse>;

    /// Fetches a blob by digest.
    async fn fetch_blob(
        &self,
        target: &RegistryTarget,
        digest: &str,
        token: Option<&AuthToken>,
    ) -> MonoupdateResult<Bytes>;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AuthToken {
    /// Wraps a token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}
