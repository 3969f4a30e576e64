use std::time::Duration;

use bytes::Bytes;
use reqwest::{header, Response, StatusCode};
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;

use crate::{
    config::{DEFAULT_METADATA_TIMEOUT, DEFAULT_REGISTRY_RETRIES},
    oci::{CredentialLookup, DockerCredentialStore, RegistryTarget},
    utils, MonoupdateError, MonoupdateResult,
};

use super::{AuthToken, ManifestResponse, RegistryClient};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The header carrying the registry-asserted digest of a manifest.
pub const CONTENT_DIGEST_HEADER: &str = "docker-content-digest";

/// The error code registries use to signal an exhausted pull quota.
const RATE_LIMIT_CODE: &str = "TOOMANYREQUESTS";

/// The registry host whose stored credentials lift the anonymous rate limit.
const DOCKER_HUB_CREDENTIAL_HOST: &str = "index.docker.io";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// DockerRegistry is a client for the Registry HTTP API v2 as spoken by Docker Hub, GHCR, Quay,
/// GCR and generic Distribution registries.
///
/// Only the read side is implemented: token, manifest and blob fetches.
///
/// [See OCI distribution specification for more details on the manifest schema][OCI Distribution Spec]
///
/// [See Docker Registry API for more details on the API][Docker Registry API]
///
/// [OCI Distribution Spec]: https://distribution.github.io/distribution/spec/manifest-v2-2/#image-manifest-version-2-schema-2
/// [Docker Registry API]: https://distribution.github.io/distribution/spec/api/#introduction
#[derive(Debug)]
pub struct DockerRegistry {
    /// The HTTP client used to make requests to registries.
    client: ClientWithMiddleware,

    /// Where Docker Hub credentials are read from.
    credentials: DockerCredentialStore,
}

/// The body of a token endpoint response. Registries use either field name.
#[derive(Debug, Deserialize)]
struct DockerAuthMaterial {
    #[serde(default)]
    token: Option<String>,

    #[serde(default)]
    access_token: Option<String>,
}

/// An error response from a registry.
#[derive(Debug, Default, Deserialize)]
pub struct DockerRegistryResponseError {
    /// The errors returned by the registry.
    #[serde(default)]
    pub errors: Vec<DockerRegistryErrorEntry>,
}

/// One entry of a registry error response.
#[derive(Debug, Default, Deserialize)]
pub struct DockerRegistryErrorEntry {
    /// The machine-readable error code, e.g. `UNAUTHORIZED`.
    #[serde(default)]
    pub code: String,

    /// The human readable message.
    #[serde(default)]
    pub message: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DockerRegistry {
    /// Creates a registry client with the default metadata timeout and no in-scan retries.
    pub fn new() -> MonoupdateResult<Self> {
        Self::with_timeout(DEFAULT_METADATA_TIMEOUT, DEFAULT_REGISTRY_RETRIES)
    }

    /// Creates a registry client whose requests are bounded by `timeout`.
    pub fn with_timeout(timeout: Duration, max_retries: u32) -> MonoupdateResult<Self> {
        Ok(Self {
            client: utils::build_http_client(timeout, max_retries)?,
            credentials: DockerCredentialStore::default_path(),
        })
    }

    /// Replaces the credential store, e.g. to read a config file other than the user's.
    pub fn with_credentials(mut self, credentials: DockerCredentialStore) -> Self {
        self.credentials = credentials;
        self
    }

    /// Maps a non-success response to a typed error.
    async fn check_status(
        &self,
        target: &RegistryTarget,
        url: &str,
        response: Response,
    ) -> MonoupdateResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let host = target.get_original_host().clone();
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS || has_rate_limit_marker(body.as_bytes()) {
            return Err(MonoupdateError::RegistryRateLimited(host));
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(MonoupdateError::RegistryUnauthorized {
                    host,
                    image_path: target.get_image_path().clone(),
                    status: status.as_u16(),
                })
            }
            StatusCode::NOT_FOUND => Err(MonoupdateError::ManifestNotFound(url.to_string())),
            _ => Err(MonoupdateError::RegistryStatus {
                host,
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns true if the body is a registry error document carrying the rate-limit code.
pub fn has_rate_limit_marker(body: &[u8]) -> bool {
    serde_json::from_slice::<DockerRegistryResponseError>(body)
        .map(|err| {
            err.errors
                .iter()
                .any(|entry| entry.code.eq_ignore_ascii_case(RATE_LIMIT_CODE))
        })
        .unwrap_or(false)
}

fn header_value(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait::async_trait]
impl RegistryClient for DockerRegistry {
    async fn get_auth_token(&self, target: &RegistryTarget) -> Option<AuthToken> {
        let auth_url = target.get_auth_token_url().as_deref()?;
        let scope = format!("repository:{}:pull", target.get_image_path());

        let mut request = self
            .client
            .get(auth_url)
            .query(&[("service", target.get_auth_service().as_str()), ("scope", &scope)]);

        // Stored credentials go to the token endpoint only, never to manifest or blob calls.
        if *target.get_credentials() == CredentialLookup::DockerHub {
            if let Some(creds) = self.credentials.get(DOCKER_HUB_CREDENTIAL_HOST) {
                request = request.basic_auth(creds.username, Some(creds.password));
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url = auth_url, error = %e, "token request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!(
                url = auth_url,
                status = response.status().as_u16(),
                "token endpoint refused request, continuing unauthenticated"
            );
            return None;
        }

        match response.json::<DockerAuthMaterial>().await {
            Ok(material) => material
                .token
                .or(material.access_token)
                .filter(|token| !token.is_empty())
                .map(AuthToken::new),
            Err(e) => {
                tracing::debug!(url = auth_url, error = %e, "malformed token response");
                None
            }
        }
    }

    async fn fetch_manifest(
        &self,
        target: &RegistryTarget,
        reference: &str,
        accept: &[&str],
        token: Option<&AuthToken>,
    ) -> MonoupdateResult<ManifestResponse> {
        let url = target.manifest_url(reference);
        tracing::debug!(url = %url, "fetching manifest");

        let mut request = self.client.get(&url).header(header::ACCEPT, accept.join(", "));
        if let Some(token) = token {
            request = request.bearer_auth(token.as_str());
        }

        let response = request.send().await?;
        let response = self.check_status(target, &url, response).await?;

        let content_digest = header_value(&response, CONTENT_DIGEST_HEADER);
        let content_type = header_value(&response, header::CONTENT_TYPE.as_str());
        let body = response.bytes().await?;

        Ok(ManifestResponse {
            body,
            content_digest,
            content_type,
        })
    }

    async fn fetch_blob(
        &self,
        target: &RegistryTarget,
        digest: &str,
        token: Option<&AuthToken>,
    ) -> MonoupdateResult<Bytes> {
        let url = target.blob_url(digest);
        tracing::debug!(url = %url, "fetching blob");

        let mut request = self.client.get(&url);
        if let Some(token) = token {
            request = request.bearer_auth(token.as_str());
        }

        let response = request.send().await?;
        let response = self.check_status(target, &url, response).await?;
        let body = response.bytes().await?;

        // Some mirrors answer 200 with an error document when the quota is exhausted.
        if has_rate_limit_marker(&body) {
            return Err(MonoupdateError::RegistryRateLimited(
                target.get_original_host().clone(),
            ));
        }

        Ok(body)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
