//! Outbound notifications about available and applied updates.

use crate::config::Schedule;

use super::{UpdateCandidate, UpdateRecord, UpdateStatus};

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Outbound notifications about scheduled update runs.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Called when a run finds candidates it does not apply.
    async fn updates_available(&self, schedule: &Schedule, candidates: &[UpdateCandidate]);

    /// Called when a run has applied updates.
    async fn updates_applied(&self, schedule: &Schedule, records: &[UpdateRecord]);
}

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// [`Notifier`] that writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn updates_available(&self, schedule: &Schedule, candidates: &[UpdateCandidate]) {
        for candidate in candidates {
            tracing::info!(
                schedule = %schedule.get_name(),
                image = %candidate.key(),
                current = candidate.get_current_version().as_deref().unwrap_or("-"),
                new = candidate.get_new_version().as_deref().unwrap_or("-"),
                "update available"
            );
        }
    }

    async fn updates_applied(&self, schedule: &Schedule, records: &[UpdateRecord]) {
        for record in records {
            if record.status == UpdateStatus::Completed {
                tracing::info!(schedule = %schedule.get_name(), image = %record.image, "update applied");
            } else {
                tracing::warn!(
                    schedule = %schedule.get_name(),
                    image = %record.image,
                    error = record.error.as_deref().unwrap_or("unknown"),
                    "update failed"
                );
            }
        }
    }
}
