//! Container runtime and stack orchestrator collaborators.
//!
//! The update engine only talks to the traits in this module. [`DockerRuntime`] implements the
//! runtime over the Docker Engine API and [`ComposeCli`] recreates compose projects.

mod compose;
mod docker;
mod traits;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use compose::*;
pub use docker::*;
pub use traits::*;
