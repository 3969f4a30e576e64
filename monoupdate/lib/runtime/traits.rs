use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{oci::ImageName, MonoupdateResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The repository or tag the runtime reports for untagged images.
pub const UNTAGGED: &str = "<none>";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A snapshot of one `repository:tag` of a local image.
///
/// An image carrying several tags appears once per tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct LocalImage {
    /// The repository, possibly with a registry host.
    #[builder(setter(into))]
    repository: String,

    /// The tag.
    #[builder(setter(into))]
    tag: String,

    /// The local image id.
    #[builder(setter(into))]
    id: String,

    /// The `repository@digest` pairs recorded when the image was pulled.
    #[builder(default)]
    repo_digests: Vec<String>,

    /// The image size in bytes.
    #[builder(default)]
    size_bytes: u64,

    /// The image's config labels.
    #[builder(default)]
    labels: HashMap<String, String>,

    /// When the image was built.
    #[builder(default)]
    created_at: Option<DateTime<Utc>>,
}

/// A snapshot of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct LocalContainer {
    /// The container id.
    #[builder(setter(into))]
    id: String,

    /// The container name without the leading `/`.
    #[builder(setter(into))]
    name: String,

    /// The image reference the runtime reports for the container. This is a bare image id once the
    /// tag the container was created from has moved to another image.
    #[builder(setter(into))]
    bound_image_ref: String,

    /// The id of the image the container runs.
    #[builder(setter(into))]
    bound_image_id: String,

    /// The application group the container belongs to.
    #[builder(default, setter(into))]
    application_name: Option<String>,

    /// The service the container implements within its application group.
    #[builder(default, setter(into))]
    service_name: Option<String>,

    /// Whether the container is running.
    #[builder(default)]
    running: bool,

    /// The container's labels.
    #[builder(default)]
    labels: HashMap<String, String>,
}

/// One event of an image pull's progress stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullProgress {
    /// The layer the event is about, if any.
    pub layer: Option<String>,

    /// The status text, e.g. `Downloading` or `Extracting`.
    pub status: Option<String>,

    /// Bytes processed so far for the layer.
    pub current: Option<u64>,

    /// Total bytes of the layer.
    pub total: Option<u64>,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// The container runtime control plane: inspection, pull and restart.
#[async_trait::async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Lists local images, one entry per `repository:tag`.
    async fn list_images(&self) -> MonoupdateResult<Vec<LocalImage>>;

    /// Lists all containers, running or not.
    async fn list_containers(&self) -> MonoupdateResult<Vec<LocalContainer>>;

    /// Returns the image reference a container was created from.
    async fn container_creation_ref(&self, container_id: &str) -> MonoupdateResult<String>;

    /// Returns the id of the image a reference currently resolves to locally, if any.
    async fn image_id(&self, reference: &str) -> MonoupdateResult<Option<String>>;

    /// Pulls `repository:tag`, yielding structured progress. A failed pull ends the stream with
    /// an error item.
    fn pull_image(
        &self,
        repository: &str,
        tag: &str,
    ) -> BoxStream<'static, MonoupdateResult<PullProgress>>;

    /// Restarts a container in place.
    async fn restart_container(&self, container_id: &str) -> MonoupdateResult<()>;
}

/// Recreates application groups.
#[async_trait::async_trait]
pub trait StackOrchestrator: Send + Sync {
    /// Recreates every container of `application`, or only `service` within it.
    async fn recreate(&self, application: &str, service: Option<&str>) -> MonoupdateResult<()>;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LocalImage {
    /// Returns true if the image has a real repository and tag.
    pub fn is_tagged(&self) -> bool {
        !self.repository.is_empty()
            && !self.tag.is_empty()
            && self.repository != UNTAGGED
            && self.tag != UNTAGGED
    }

    /// Returns the `repository:tag` key of the image.
    pub fn key(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    /// Returns the image's name.
    pub fn name(&self) -> ImageName {
        ImageName::new(&self.repository, &self.tag)
    }
}

impl LocalContainer {
    /// Returns true if the container belongs to an application group.
    pub fn is_grouped(&self) -> bool {
        self.application_name.is_some()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
