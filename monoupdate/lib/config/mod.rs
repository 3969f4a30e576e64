//! Configuration types and helpers.

mod defaults;
mod engine;
mod schedule;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;
pub use engine::*;
pub use schedule::*;
