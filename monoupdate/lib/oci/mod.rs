//! OCI (Open Container Initiative) module for inspecting images on container registries.
//!
//! This module provides functionality for:
//! - Resolving repository strings to registry endpoints and their auth conventions
//! - Fetching tokens, manifests and config blobs over the Distribution API
//! - Normalizing and comparing content digests across single- and multi-arch manifests
//! - Deriving a human version string from image labels or source releases

pub mod digest;

mod credentials;
mod distribution;
mod manifest;
mod reference;
mod remote;
mod target;
mod version;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use credentials::*;
pub use distribution::*;
pub use manifest::*;
pub use reference::*;
pub use remote::*;
pub use target::*;
pub use version::*;
