//! Manifest parsing: single-platform vs. multi-arch detection and platform selection.

use oci_spec::image::{Descriptor, ImageIndex, ImageManifest, Os};
use serde_json::Value;

use crate::{MonoupdateError, MonoupdateResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The annotation key Docker uses to mark non-image siblings in an index.
pub const DOCKER_REFERENCE_TYPE_ANNOTATION: &str = "vnd.docker.reference.type";

/// The annotation value marking a build provenance or attestation manifest.
pub const ATTESTATION_MANIFEST_TYPE: &str = "attestation-manifest";

/// The architecture registries use for attestation entries.
const UNKNOWN_ARCH: &str = "unknown";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What a manifest body says about the image it describes.
///
/// The comparison digest is not part of this: it is always the content digest the registry
/// returned for the original request, which the caller reads from the response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedManifest {
    /// Whether the body was an image index / manifest list.
    pub is_multi_arch: bool,

    /// The digest of the manifest selected for the host platform (multi-arch only).
    pub platform_digest: Option<String>,

    /// The digest of the image config blob (single-arch only; for multi-arch it lives in the
    /// platform manifest).
    pub config_digest: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Resolves a raw manifest body.
///
/// For an index the entry matching `linux/{host_arch}` is selected, skipping attestation
/// siblings. With no exact match the first real entry whose architecture is not `unknown` is used.
pub fn resolve(raw: &[u8], host_arch: &str) -> MonoupdateResult<ResolvedManifest> {
    let value: Value = serde_json::from_slice(raw)?;

    if value.get("manifests").is_some_and(Value::is_array) {
        let index: ImageIndex = serde_json::from_value(value)?;
        let selected = select_platform(index.manifests(), host_arch).ok_or_else(|| {
            MonoupdateError::NoPlatformManifest(format!("linux/{host_arch}"))
        })?;

        return Ok(ResolvedManifest {
            is_multi_arch: true,
            platform_digest: Some(selected.digest().to_string()),
            config_digest: None,
        });
    }

    if value.get("schemaVersion").and_then(Value::as_u64) == Some(1) {
        return Err(MonoupdateError::UnsupportedManifest(
            "schema version 1 manifests are not supported".into(),
        ));
    }

    let manifest: ImageManifest = serde_json::from_value(value)?;
    Ok(ResolvedManifest {
        is_multi_arch: false,
        platform_digest: None,
        config_digest: Some(manifest.config().digest().to_string()),
    })
}

/// Extracts the config digest from a platform-specific manifest.
pub fn config_digest(raw: &[u8]) -> MonoupdateResult<String> {
    let manifest: ImageManifest = serde_json::from_slice(raw)?;
    Ok(manifest.config().digest().to_string())
}

/// Selects the descriptor for `linux/{host_arch}` from an index.
pub fn select_platform<'a>(manifests: &'a [Descriptor], host_arch: &str) -> Option<&'a Descriptor> {
    let candidates = || manifests.iter().filter(|m| !is_attestation(m));

    candidates()
        .find(|m| {
            m.platform().as_ref().is_some_and(|p| {
                matches!(p.os(), Os::Linux) && p.architecture().to_string() == host_arch
            })
        })
        .or_else(|| {
            candidates().find(|m| {
                m.platform()
                    .as_ref()
                    .is_some_and(|p| p.architecture().to_string() != UNKNOWN_ARCH)
            })
        })
}

/// Returns the OCI architecture name of the machine this binary runs on.
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "arm" => "arm",
        "x86" => "386",
        "powerpc64" => "ppc64le",
        "s390x" => "s390x",
        "riscv64" => "riscv64",
        other => other,
    }
}

fn is_attestation(descriptor: &Descriptor) -> bool {
    descriptor.annotations().as_ref().is_some_and(|a| {
        a.get(DOCKER_REFERENCE_TYPE_ANNOTATION)
            .is_some_and(|kind| kind == ATTESTATION_MANIFEST_TYPE)
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
