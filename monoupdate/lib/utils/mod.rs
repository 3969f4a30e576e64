//! Utility functions and types.

pub mod env;
mod http;
mod path;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use env::*;
pub use http::*;
pub use path::*;
