//! Update detection and application.
//!
//! [`UpdateScanner`] finds [`UpdateCandidate`]s, [`UpdateExecutor`] applies them and records the
//! outcome in [`UpdateHistory`], and [`Scheduler`] ties both to externally triggered schedules.

mod candidate;
mod executor;
mod history;
mod notifier;
mod record;
mod scanner;
mod scheduler;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use candidate::*;
pub use executor::*;
pub use history::*;
pub use notifier::*;
pub use record::*;
pub use scanner::*;
pub use scheduler::*;
