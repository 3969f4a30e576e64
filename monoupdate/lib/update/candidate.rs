//! Update candidates and their deduplication.

use std::collections::HashMap;

use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::oci::ImageName;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Why an image is considered updatable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateType {
    /// The registry serves a different digest than the local image was pulled from.
    Registry,

    /// A container still runs an older image than its tag resolves to locally.
    Container,
}

/// An image that can be updated, as found by a scan.
///
/// Candidates are keyed by `repository:tag`. Digests are shortened for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(rename_all = "camelCase")]
pub struct UpdateCandidate {
    /// The repository, possibly with a registry host.
    #[builder(setter(into))]
    repository: String,

    /// The tag.
    #[builder(setter(into))]
    tag: String,

    /// The digest (or image id) currently in use, shortened.
    #[builder(setter(into))]
    current_digest: String,

    /// The digest (or image id) available, shortened.
    #[builder(setter(into))]
    latest_digest: String,

    /// Why the image is updatable.
    update_type: UpdateType,

    /// The local image size in bytes.
    #[builder(default, setter(into))]
    size: Option<u64>,

    /// The version of the local image.
    #[builder(default, setter(into))]
    current_version: Option<String>,

    /// The version of the available image.
    #[builder(default, setter(into))]
    new_version: Option<String>,

    /// The outdated container, for container candidates.
    #[builder(default, setter(into))]
    container_id: Option<String>,

    /// The outdated container's name, for container candidates.
    #[builder(default, setter(into))]
    container_name: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl UpdateCandidate {
    /// Returns the `repository:tag` key of the candidate.
    pub fn key(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    /// Returns the candidate's image name.
    pub fn image_name(&self) -> ImageName {
        ImageName::new(&self.repository, &self.tag)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Removes duplicate candidates by canonical image name, keeping first-seen order.
///
/// `nginx:latest` and `docker.io/library/nginx:latest` collide. When names collide a registry
/// candidate replaces a container candidate; otherwise the first one is kept.
pub fn dedup(candidates: Vec<UpdateCandidate>) -> Vec<UpdateCandidate> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<UpdateCandidate> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let canonical = candidate.image_name().canonical();
        match positions.get(&canonical) {
            Some(&idx) => {
                if unique[idx].update_type == UpdateType::Container
                    && candidate.update_type == UpdateType::Registry
                {
                    unique[idx] = candidate;
                }
            }
            None => {
                positions.insert(canonical, unique.len());
                unique.push(candidate);
            }
        }
    }

    unique
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
