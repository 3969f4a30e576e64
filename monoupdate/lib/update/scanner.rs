//! Registry and container passes that find updatable images.

use std::{collections::HashSet, sync::Arc};

use futures::{stream, StreamExt};

use crate::{
    oci::{digest, is_digest_pinned, version_from_labels, ImageName, RemoteInspector},
    runtime::{ContainerRuntime, LocalContainer, LocalImage},
    MonoupdateError, MonoupdateResult,
};

use super::{dedup, UpdateCandidate, UpdateType};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Finds images and containers that can be updated.
///
/// A scan runs two passes and concatenates their results:
///
/// - the registry pass compares each local image's repo digests with the digest its registry now
///   serves for the tag;
/// - the container pass finds containers still running an older image than their creation
///   reference resolves to locally.
///
/// Individual checks that fail are logged and left out; only a failure to list images or
/// containers fails the scan.
#[derive(Clone)]
pub struct UpdateScanner {
    runtime: Arc<dyn ContainerRuntime>,
    inspector: RemoteInspector,
    concurrency: usize,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl UpdateScanner {
    /// Creates a scanner that runs at most `concurrency` checks at once.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        inspector: RemoteInspector,
        concurrency: usize,
    ) -> Self {
        Self {
            runtime,
            inspector,
            concurrency: concurrency.max(1),
        }
    }

    /// Runs both passes and returns the deduplicated candidates.
    pub async fn scan(&self) -> MonoupdateResult<Vec<UpdateCandidate>> {
        let images = self.runtime.list_images().await?;
        let containers = self.runtime.list_containers().await?;
        tracing::info!(
            images = images.len(),
            containers = containers.len(),
            "scanning for updates"
        );

        let mut candidates = self.registry_pass(images).await;
        candidates.extend(self.container_pass(containers).await);

        let candidates = dedup(candidates);
        tracing::info!(count = candidates.len(), "scan finished");
        Ok(candidates)
    }

    /// Checks every tagged, pulled image against its registry.
    pub async fn registry_pass(&self, images: Vec<LocalImage>) -> Vec<UpdateCandidate> {
        let mut seen = HashSet::new();
        let images: Vec<LocalImage> = images
            .into_iter()
            .filter(|image| image.is_tagged())
            .filter(|image| seen.insert(image.key()))
            .collect();

        stream::iter(images)
            .map(|image| async move {
                match self.check_image(&image).await {
                    Ok(candidate) => candidate,
                    Err(e) => {
                        log_skipped(&image.key(), &e);
                        None
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|candidate| async move { candidate })
            .collect()
            .await
    }

    /// Checks every container for an image newer than the one it runs.
    pub async fn container_pass(&self, containers: Vec<LocalContainer>) -> Vec<UpdateCandidate> {
        stream::iter(containers)
            .map(|container| async move {
                match self.check_container(&container).await {
                    Ok(candidate) => candidate,
                    Err(e) => {
                        log_skipped(container.get_name(), &e);
                        None
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|candidate| async move { candidate })
            .collect()
            .await
    }

    /// Compares one local image with its registry.
    pub async fn check_image(&self, image: &LocalImage) -> MonoupdateResult<Option<UpdateCandidate>> {
        let local_digests: Vec<&String> = image
            .get_repo_digests()
            .iter()
            .filter(|entry| {
                digest::repository_part(entry)
                    .is_some_and(|repository| same_repository(repository, image.get_repository()))
            })
            .collect();

        if local_digests.is_empty() {
            tracing::debug!(image = %image.key(), "no repo digest, image was not pulled from a registry");
            return Ok(None);
        }

        let remote = self
            .inspector
            .inspect(image.get_repository(), image.get_tag())
            .await?;

        if digest::matches(&local_digests, &remote.manifest_digest) {
            tracing::debug!(image = %image.key(), "image is up to date");
            return Ok(None);
        }

        let current_digest = digest::short(digest::digest_part(local_digests[0]));
        let latest_digest = digest::short(&remote.manifest_digest);
        tracing::info!(
            image = %image.key(),
            current = %current_digest,
            latest = %latest_digest,
            "update available"
        );

        Ok(Some(
            UpdateCandidate::builder()
                .repository(image.get_repository().as_str())
                .tag(image.get_tag().as_str())
                .current_digest(current_digest)
                .latest_digest(latest_digest)
                .update_type(UpdateType::Registry)
                .size(Some(*image.get_size_bytes()))
                .current_version(version_from_labels(image.get_labels()))
                .new_version(remote.version)
                .build(),
        ))
    }

    /// Checks whether a container's creation reference now resolves to a different image.
    pub async fn check_container(
        &self,
        container: &LocalContainer,
    ) -> MonoupdateResult<Option<UpdateCandidate>> {
        let reference = creation_reference(self.runtime.as_ref(), container).await?;
        if reference.is_empty() || is_digest_pinned(&reference) {
            tracing::debug!(container = %container.get_name(), "container is pinned to a digest");
            return Ok(None);
        }

        let Some(local_id) = self.runtime.image_id(&reference).await? else {
            return Ok(None);
        };

        if digest::normalize(&local_id) == digest::normalize(container.get_bound_image_id()) {
            return Ok(None);
        }

        let name = ImageName::from_reference(&reference);
        tracing::info!(
            container = %container.get_name(),
            image = %name,
            "container runs an outdated image"
        );

        Ok(Some(
            UpdateCandidate::builder()
                .repository(name.get_repository().as_str())
                .tag(name.get_tag().as_str())
                .current_digest(digest::short(container.get_bound_image_id()))
                .latest_digest(digest::short(&local_id))
                .update_type(UpdateType::Container)
                .container_id(container.get_id().clone())
                .container_name(container.get_name().clone())
                .build(),
        ))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the reference a container was created from.
///
/// The runtime reports a bare image id once the container's tag has moved; the original reference
/// is then read from the container's creation config.
pub async fn creation_reference(
    runtime: &dyn ContainerRuntime,
    container: &LocalContainer,
) -> MonoupdateResult<String> {
    let bound = container.get_bound_image_ref();
    if bound.is_empty() || digest::is_digest(bound) {
        return runtime.container_creation_ref(container.get_id()).await;
    }

    Ok(bound.clone())
}

/// Returns true if two repositories name the same image repository.
pub fn same_repository(a: &str, b: &str) -> bool {
    ImageName::new(a, "latest").same_image(&ImageName::new(b, "latest"))
}

fn log_skipped(subject: &str, error: &MonoupdateError) {
    if error.is_parse_error() {
        tracing::debug!(subject, error = %error, "skipping check");
    } else {
        tracing::warn!(subject, error = %error, "skipping check");
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Debug for UpdateScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateScanner")
            .field("inspector", &self.inspector)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanner_same_repository() {
        assert!(same_repository("nginx", "docker.io/library/nginx"));
        assert!(same_repository("library/nginx", "index.docker.io/library/nginx"));
        assert!(!same_repository("nginx", "ghcr.io/nginx/nginx"));
    }
}
