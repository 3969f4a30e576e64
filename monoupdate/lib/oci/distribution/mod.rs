//! Clients for the Distribution/OCI registry HTTP protocol.

mod docker;
mod traits;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use docker::*;
pub use traits::*;
