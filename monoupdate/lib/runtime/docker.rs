use bollard::{
    auth::DockerCredentials,
    container::{InspectContainerOptions, ListContainersOptions, RestartContainerOptions},
    errors::Error as BollardError,
    image::{CreateImageOptions, ListImagesOptions},
    models::{ContainerSummary, CreateImageInfo, ImageSummary},
    Docker,
};
use chrono::DateTime;
use futures::{stream::BoxStream, StreamExt};

use crate::{
    oci::{extract_registry_and_path, DockerCredentialStore, ImageName},
    MonoupdateError, MonoupdateResult,
};

use super::{ContainerRuntime, LocalContainer, LocalImage, PullProgress, UNTAGGED};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The label naming a container's compose project.
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

/// The label naming a container's compose service.
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

/// The label holding the directory a compose project was started from.
pub const COMPOSE_WORKING_DIR_LABEL: &str = "com.docker.compose.project.working_dir";

/// The label holding a compose project's comma-separated config files.
pub const COMPOSE_CONFIG_FILES_LABEL: &str = "com.docker.compose.project.config_files";

/// Seconds a container gets to stop before a restart kills it.
const RESTART_GRACE_SECONDS: i64 = 10;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// [`ContainerRuntime`] backed by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
    credentials: DockerCredentialStore,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DockerRuntime {
    /// Connects to the local Docker daemon using `DOCKER_HOST` or the platform's default socket.
    pub fn connect() -> MonoupdateResult<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::with_docker(docker))
    }

    /// Wraps an existing Engine API client.
    pub fn with_docker(docker: Docker) -> Self {
        Self {
            docker,
            credentials: DockerCredentialStore::default_path(),
        }
    }

    /// Replaces the credential store used for pulls.
    pub fn with_credentials(mut self, credentials: DockerCredentialStore) -> Self {
        self.credentials = credentials;
        self
    }

    fn pull_credentials(&self, repository: &str) -> Option<DockerCredentials> {
        let (registry, _) = extract_registry_and_path(repository);
        let creds = self.credentials.get(registry)?;
        Some(DockerCredentials {
            username: Some(creds.username),
            password: Some(creds.password),
            serveraddress: Some(registry.to_string()),
            ..Default::default()
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Expands an image summary into one snapshot per tag. Untagged images yield a single `<none>`
/// snapshot.
pub fn images_from_summary(summary: ImageSummary) -> Vec<LocalImage> {
    let created_at = DateTime::from_timestamp(summary.created, 0);
    let size_bytes = u64::try_from(summary.size).unwrap_or_default();

    let names: Vec<ImageName> = summary
        .repo_tags
        .iter()
        .filter(|tag| tag.as_str() != "<none>:<none>")
        .map(|tag| ImageName::from_reference(tag))
        .collect();

    let names = if names.is_empty() {
        vec![ImageName::new(UNTAGGED, UNTAGGED)]
    } else {
        names
    };

    names
        .into_iter()
        .map(|name| {
            LocalImage::builder()
                .repository(name.get_repository().as_str())
                .tag(name.get_tag().as_str())
                .id(summary.id.as_str())
                .repo_digests(summary.repo_digests.clone())
                .size_bytes(size_bytes)
                .labels(summary.labels.clone())
                .created_at(created_at)
                .build()
        })
        .collect()
}

/// Converts a container summary into a snapshot. Returns `None` for summaries without an id.
pub fn container_from_summary(summary: ContainerSummary) -> Option<LocalContainer> {
    let id = summary.id?;
    let labels = summary.labels.unwrap_or_default();
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|name| name.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.clone());

    Some(
        LocalContainer::builder()
            .application_name(labels.get(COMPOSE_PROJECT_LABEL).cloned())
            .service_name(labels.get(COMPOSE_SERVICE_LABEL).cloned())
            .id(id)
            .name(name)
            .bound_image_ref(summary.image.unwrap_or_default())
            .bound_image_id(summary.image_id.unwrap_or_default())
            .running(summary.state.as_deref() == Some("running"))
            .labels(labels)
            .build(),
    )
}

fn pull_progress(image: &str, info: CreateImageInfo) -> MonoupdateResult<PullProgress> {
    if let Some(message) = info.error {
        return Err(MonoupdateError::PullFailed {
            image: image.to_string(),
            message,
        });
    }

    let detail = info.progress_detail.unwrap_or_default();
    Ok(PullProgress {
        layer: info.id,
        status: info.status,
        current: detail.current.and_then(|c| u64::try_from(c).ok()),
        total: detail.total.and_then(|t| u64::try_from(t).ok()),
    })
}

fn is_not_found(error: &BollardError) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait::async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_images(&self) -> MonoupdateResult<Vec<LocalImage>> {
        let summaries = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await?;

        Ok(summaries.into_iter().flat_map(images_from_summary).collect())
    }

    async fn list_containers(&self) -> MonoupdateResult<Vec<LocalContainer>> {
        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await?;

        Ok(summaries
            .into_iter()
            .filter_map(container_from_summary)
            .collect())
    }

    async fn container_creation_ref(&self, container_id: &str) -> MonoupdateResult<String> {
        let response = match self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(response) => response,
            Err(e) if is_not_found(&e) => {
                return Err(MonoupdateError::RuntimeNotFound(container_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        response
            .config
            .and_then(|config| config.image)
            .filter(|image| !image.is_empty())
            .ok_or_else(|| MonoupdateError::RuntimeNotFound(format!("image of {container_id}")))
    }

    async fn image_id(&self, reference: &str) -> MonoupdateResult<Option<String>> {
        match self.docker.inspect_image(reference).await {
            Ok(image) => Ok(image.id),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn pull_image(
        &self,
        repository: &str,
        tag: &str,
    ) -> BoxStream<'static, MonoupdateResult<PullProgress>> {
        let image = format!("{repository}:{tag}");
        let options = CreateImageOptions {
            from_image: repository.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        };

        tracing::info!(image = %image, "pulling image");
        self.docker
            .create_image(Some(options), None, self.pull_credentials(repository))
            .map(move |item| match item {
                Ok(info) => pull_progress(&image, info),
                Err(e) => Err(MonoupdateError::PullFailed {
                    image: image.clone(),
                    message: e.to_string(),
                }),
            })
            .boxed()
    }

    async fn restart_container(&self, container_id: &str) -> MonoupdateResult<()> {
        tracing::info!(container = container_id, "restarting container");
        self.docker
            .restart_container(
                container_id,
                Some(RestartContainerOptions {
                    t: RESTART_GRACE_SECONDS as _,
                }),
            )
            .await?;
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
