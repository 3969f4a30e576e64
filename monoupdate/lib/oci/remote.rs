//! Inspection of what a registry currently serves for a tag.
//!
//! The tag manifest must resolve with a content digest; the platform manifest, config blob and
//! release lookup behind it only contribute optional metadata.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MonoupdateError, MonoupdateResult};

use super::{
    manifest, AuthToken, RegistryClient, RegistryTarget, VersionExtractor, MANIFEST_ACCEPT,
    PLATFORM_MANIFEST_ACCEPT,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What the registry currently serves for a `repository:tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteManifestInfo {
    /// The content digest the registry asserted for the tag. This is the comparison digest.
    pub manifest_digest: String,

    /// The platform-specific manifest digest when the tag is multi-arch.
    pub platform_digest: Option<String>,

    /// The config blob digest, if it could be determined.
    pub config_digest: Option<String>,

    /// The image version from labels or the source repository's latest release.
    pub version: Option<String>,

    /// When the image was built, from the config blob.
    pub created_at: Option<DateTime<Utc>>,
}

/// Fetches [`RemoteManifestInfo`] for images on any supported registry.
#[derive(Clone)]
pub struct RemoteInspector {
    client: Arc<dyn RegistryClient>,
    versions: VersionExtractor,
    host_arch: String,
}

#[derive(Debug, Default)]
struct ConfigMetadata {
    labels: HashMap<String, String>,
    created_at: Option<DateTime<Utc>>,
}

/// The parts of an image config blob read for metadata. Every field is optional.
#[derive(Debug, Default, Deserialize)]
struct ConfigBlob {
    #[serde(default)]
    created: Option<String>,

    #[serde(default)]
    config: Option<ConfigBlobSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigBlobSection {
    #[serde(default, rename = "Labels")]
    labels: Option<HashMap<String, String>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RemoteInspector {
    /// Creates an inspector that selects platform manifests for `host_arch`.
    pub fn new(
        client: Arc<dyn RegistryClient>,
        versions: VersionExtractor,
        host_arch: impl Into<String>,
    ) -> Self {
        Self {
            client,
            versions,
            host_arch: host_arch.into(),
        }
    }

    /// Inspects `repository:tag` on the registry the repository resolves to.
    pub async fn inspect(&self, repository: &str, tag: &str) -> MonoupdateResult<RemoteManifestInfo> {
        let target = RegistryTarget::resolve(repository);
        self.inspect_target(&target, tag).await
    }

    /// Inspects a tag on an already resolved target.
    ///
    /// Fails when the tag manifest cannot be fetched, lacks a content digest or cannot be parsed.
    /// Failures past that point (platform manifest, config blob, release lookup) only drop the
    /// corresponding metadata.
    pub async fn inspect_target(
        &self,
        target: &RegistryTarget,
        tag: &str,
    ) -> MonoupdateResult<RemoteManifestInfo> {
        let token = if target.supports_token() {
            self.client.get_auth_token(target).await
        } else {
            None
        };

        let response = self
            .client
            .fetch_manifest(target, tag, MANIFEST_ACCEPT, token.as_ref())
            .await?;

        let manifest_digest = response.content_digest.ok_or_else(|| {
            MonoupdateError::MissingContentDigest(format!("{}:{tag}", target.get_image_path()))
        })?;

        let resolved = manifest::resolve(&response.body, &self.host_arch)?;
        let mut config_digest = resolved.config_digest;

        if let Some(platform_digest) = &resolved.platform_digest {
            config_digest = self
                .platform_config_digest(target, platform_digest, token.as_ref())
                .await;
        }

        let metadata = match &config_digest {
            Some(digest) => self.config_metadata(target, digest, token.as_ref()).await,
            None => ConfigMetadata::default(),
        };

        let version = self.versions.extract(&metadata.labels).await;

        Ok(RemoteManifestInfo {
            manifest_digest,
            platform_digest: resolved.platform_digest,
            config_digest,
            version,
            created_at: metadata.created_at,
        })
    }

    async fn platform_config_digest(
        &self,
        target: &RegistryTarget,
        platform_digest: &str,
        token: Option<&AuthToken>,
    ) -> Option<String> {
        let result = async {
            let response = self
                .client
                .fetch_manifest(target, platform_digest, PLATFORM_MANIFEST_ACCEPT, token)
                .await?;
            manifest::config_digest(&response.body)
        }
        .await;

        result
            .map_err(|e| log_metadata_error(target, "platform manifest", &e))
            .ok()
    }

    async fn config_metadata(
        &self,
        target: &RegistryTarget,
        config_digest: &str,
        token: Option<&AuthToken>,
    ) -> ConfigMetadata {
        let result = async {
            let blob = self.client.fetch_blob(target, config_digest, token).await?;
            let config: ConfigBlob = serde_json::from_slice(&blob)?;
            MonoupdateResult::Ok(config)
        }
        .await;

        match result {
            Ok(config) => ConfigMetadata {
                labels: config
                    .config
                    .and_then(|c| c.labels)
                    .unwrap_or_default(),
                created_at: config
                    .created
                    .as_deref()
                    .and_then(|created| DateTime::parse_from_rfc3339(created).ok())
                    .map(|created| created.with_timezone(&Utc)),
            },
            Err(e) => {
                log_metadata_error(target, "config blob", &e);
                ConfigMetadata::default()
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn log_metadata_error(target: &RegistryTarget, what: &str, error: &MonoupdateError) {
    if error.is_auth_or_rate_limit() || error.is_parse_error() {
        tracing::debug!(
            image = %target.get_image_path(),
            error = %error,
            "no version metadata from {what}"
        );
    } else {
        tracing::warn!(
            image = %target.get_image_path(),
            error = %error,
            "failed to fetch {what}"
        );
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Debug for RemoteInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteInspector")
            .field("versions", &self.versions)
            .field("host_arch", &self.host_arch)
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
