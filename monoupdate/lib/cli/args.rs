use std::path::PathBuf;

use super::styles;
use clap::{Parser, Subcommand};

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// monoupdate CLI - Detects stale container images and updates the containers running them
#[derive(Debug, Parser)]
#[command(name = "monoupdate", author, about, version, styles=styles::styles())]
pub struct MonoupdateArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<MonoupdateSubcommand>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum MonoupdateSubcommand {
    /// Scan local images and containers for available updates
    #[command(name = "check")]
    Check {
        /// Print candidates as JSON
        #[arg(long)]
        json: bool,
    },

    /// Pull a newer version of an image and recreate its containers
    #[command(name = "update")]
    Update {
        /// The image reference, e.g. `nginx:latest`
        #[arg(value_name = "IMAGE")]
        image: String,

        /// Only pull the image, leave containers untouched
        #[arg(long)]
        no_restart: bool,
    },

    /// Show past update executions
    #[command(name = "history")]
    History {
        /// Maximum number of records to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one tick of a stored schedule
    #[command(name = "tick")]
    Tick {
        /// The schedule id
        #[arg(value_name = "SCHEDULE_ID")]
        schedule_id: String,
    },

    /// Manage update schedules
    #[command(name = "schedules")]
    Schedules {
        /// The schedules action
        #[command(subcommand)]
        action: SchedulesAction,
    },

    /// Update the image monoupdate itself runs from
    #[command(name = "self-update")]
    SelfUpdate,
}

/// Actions on stored schedules
#[derive(Debug, Subcommand)]
pub enum SchedulesAction {
    /// Print the stored schedules as JSON
    #[command(name = "list")]
    List,

    /// Replace the stored schedules with the JSON array in a file
    #[command(name = "set")]
    Set {
        /// Path to a JSON file holding an array of schedules
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_args_command_is_valid() {
        MonoupdateArgs::command().debug_assert();
    }

    #[test]
    fn test_args_parse_update() -> anyhow::Result<()> {
        let args = MonoupdateArgs::try_parse_from(["monoupdate", "update", "nginx:latest", "--no-restart"])?;
        match args.subcommand {
            Some(MonoupdateSubcommand::Update { image, no_restart }) => {
                assert_eq!(image, "nginx:latest");
                assert!(no_restart);
            }
            other => panic!("unexpected subcommand: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_args_parse_schedules_set() -> anyhow::Result<()> {
        let args =
            MonoupdateArgs::try_parse_from(["monoupdate", "-v", "schedules", "set", "schedules.json"])?;
        assert!(args.verbose);
        assert!(matches!(
            args.subcommand,
            Some(MonoupdateSubcommand::Schedules {
                action: SchedulesAction::Set { .. }
            })
        ));
        Ok(())
    }
}
