//! Update schedules.
//!
//! Schedules are owned by the config store. The engine only reads them when an external clock
//! fires a tick; the cron expression itself is never parsed here.

use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What a schedule does with the candidates it finds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScheduleMode {
    /// Apply every available update.
    All,

    /// Apply only updates that keep the same major version.
    Minor,

    /// Only report available updates.
    #[default]
    CheckOnly,
}

/// A cron-triggered update schedule.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Unique identifier of the schedule.
    #[builder(setter(into))]
    id: String,

    /// Human readable name.
    #[builder(setter(into))]
    name: String,

    /// The cron expression evaluated by the external clock.
    #[builder(setter(into))]
    cron_expression: String,

    /// Whether ticks of this schedule do anything.
    #[serde(default = "default_enabled")]
    #[builder(default = true)]
    enabled: bool,

    /// Images never touched by this schedule, by repository or `repository:tag`.
    #[serde(default)]
    #[builder(default)]
    excluded_images: Vec<String>,

    /// What to do with found candidates.
    #[serde(default)]
    #[builder(default)]
    mode: ScheduleMode,

    /// Whether containers are recreated after the pull.
    #[serde(default = "default_enabled")]
    #[builder(default = true)]
    restart_containers: bool,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn default_enabled() -> bool {
    true
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_deserializes_camel_case() -> anyhow::Result<()> {
        let schedule: Schedule = serde_json::from_str(
            r#"{
                "id": "nightly",
                "name": "Nightly",
                "cronExpression": "0 3 * * *",
                "excludedImages": ["postgres"],
                "mode": "checkOnly"
            }"#,
        )?;

        assert_eq!(schedule.get_id(), "nightly");
        assert!(*schedule.get_enabled());
        assert!(*schedule.get_restart_containers());
        assert_eq!(*schedule.get_mode(), ScheduleMode::CheckOnly);
        assert_eq!(schedule.get_excluded_images(), &vec!["postgres".to_string()]);
        Ok(())
    }

    #[test]
    fn test_schedule_mode_serialization() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&ScheduleMode::Minor)?, r#""minor""#);
        assert_eq!(serde_json::to_string(&ScheduleMode::All)?, r#""all""#);
        Ok(())
    }
}
