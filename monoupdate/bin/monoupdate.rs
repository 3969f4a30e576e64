use std::sync::Arc;

use clap::{CommandFactory, Parser};
use monoupdate::{
    cli::{AnsiStyles, MonoupdateArgs, MonoupdateSubcommand, SchedulesAction},
    config::{EngineConfig, Schedule, MONOUPDATE_DB_FILENAME},
    management::SqliteConfigStore,
    oci::{DockerCredentialStore, DockerRegistry, GithubReleases, GITHUB_API_URL},
    runtime::{ComposeCli, ContainerRuntime, DockerRuntime},
    update::{ExecuteOptions, LogNotifier, ProgressEvent, UpdateCandidate, UpdateRecord},
    utils, EngineServices, MonoupdateResult, UpdateEngine,
};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const PROGRESS_CHANNEL_SIZE: usize = 64;

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> MonoupdateResult<()> {
    let args = MonoupdateArgs::parse();

    let filter = if args.verbose {
        EnvFilter::new("monoupdate=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("monoupdate=info"))
    };

    fmt()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_env_filter(filter)
        .init();

    let Some(subcommand) = args.subcommand else {
        MonoupdateArgs::command().print_help()?;
        return Ok(());
    };

    let engine = build_engine().await?;
    match subcommand {
        MonoupdateSubcommand::Check { json } => {
            let candidates = engine.scan().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&candidates)?);
            } else {
                print_candidates(&candidates);
            }
        }
        MonoupdateSubcommand::Update { image, no_restart } => {
            tracing::trace!("updating image: image={image}, no_restart={no_restart}");
            match engine.check(&image).await? {
                Some(candidate) => {
                    let options = ExecuteOptions {
                        restart: !no_restart,
                    };
                    let record = execute_with_progress(&engine, &candidate, options).await;
                    print_records(&[record]);
                }
                None => println!("{} is up to date", image.literal()),
            }
        }
        MonoupdateSubcommand::History { limit, json } => {
            let records = engine.history(limit).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_records(&records);
            }
        }
        MonoupdateSubcommand::Tick { schedule_id } => {
            let report = engine.tick(&schedule_id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        MonoupdateSubcommand::Schedules { action } => match action {
            SchedulesAction::List => {
                let schedules = engine.schedules().await?;
                println!("{}", serde_json::to_string_pretty(&schedules)?);
            }
            SchedulesAction::Set { file } => {
                let contents = tokio::fs::read_to_string(&file).await?;
                let schedules: Vec<Schedule> = serde_json::from_str(&contents)?;
                engine.set_schedules(&schedules).await?;
                println!("stored {} schedule(s)", schedules.len());
            }
        },
        MonoupdateSubcommand::SelfUpdate => match engine.update_self().await? {
            Some(record) => print_records(&[record]),
            None => println!("monoupdate is up to date"),
        },
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: *
//--------------------------------------------------------------------------------------------------

async fn build_engine() -> MonoupdateResult<UpdateEngine> {
    let config = EngineConfig::default();
    let credentials = DockerCredentialStore::new(utils::get_docker_config_path());

    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(DockerRuntime::connect()?.with_credentials(credentials.clone()));
    let registry = DockerRegistry::with_timeout(
        *config.get_metadata_timeout(),
        *config.get_registry_retries(),
    )?
    .with_credentials(credentials);
    let releases = GithubReleases::with_base_url(
        GITHUB_API_URL,
        *config.get_metadata_timeout(),
        *config.get_release_retries(),
    )?;
    let store =
        SqliteConfigStore::open(utils::get_monoupdate_home_path().join(MONOUPDATE_DB_FILENAME))
            .await?;

    let services = EngineServices::builder()
        .runtime(runtime.clone())
        .orchestrator(Arc::new(
            ComposeCli::new(runtime).with_timeout(*config.get_pull_timeout()),
        ))
        .store(Arc::new(store))
        .registry(Arc::new(registry))
        .releases(Arc::new(releases))
        .notifier(Arc::new(LogNotifier))
        .build();

    UpdateEngine::new(config, services).await
}

async fn execute_with_progress(
    engine: &UpdateEngine,
    candidate: &UpdateCandidate,
    options: ExecuteOptions,
) -> UpdateRecord {
    let (tx, mut rx) = mpsc::channel(PROGRESS_CHANNEL_SIZE);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_progress(&event);
        }
    });

    let record = engine.execute_with_progress(candidate, options, tx).await;
    if let Err(e) = printer.await {
        tracing::debug!(error = %e, "progress printer stopped");
    }

    record
}

fn print_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::Pulling { status } => eprintln!("{status}"),
        ProgressEvent::Downloading {
            layer,
            current,
            total,
        }
        | ProgressEvent::Extracting {
            layer,
            current,
            total,
        } => match total {
            Some(total) => eprintln!("{layer}: {current}/{total}"),
            None => eprintln!("{layer}: {current}"),
        },
        ProgressEvent::Pulled => eprintln!("{}", "pulled".valid()),
        ProgressEvent::Recreating { target } => eprintln!("recreating {}", target.literal()),
        ProgressEvent::Completed { status } => eprintln!("finished: {status:?}"),
    }
}

fn print_candidates(candidates: &[UpdateCandidate]) {
    if candidates.is_empty() {
        println!("{}", "all images are up to date".valid());
        return;
    }

    println!("{}", "Available updates".header());
    for candidate in candidates {
        let versions = match (candidate.get_current_version(), candidate.get_new_version()) {
            (Some(current), Some(new)) => format!(" ({current} -> {new})"),
            (None, Some(new)) => format!(" (-> {new})"),
            _ => String::new(),
        };
        println!(
            "  {} {} -> {}{versions} [{:?}]",
            candidate.key().literal(),
            candidate.get_current_digest(),
            candidate.get_latest_digest().placeholder(),
            candidate.get_update_type(),
        );
    }
}

fn print_records(records: &[UpdateRecord]) {
    for record in records {
        let status = format!("{:?}", record.status);
        let status = match &record.error {
            Some(_) => status.error(),
            None => status.valid(),
        };
        println!(
            "{} {} {status} ({} container(s))",
            record.timestamp.to_rfc3339(),
            record.image.literal(),
            record.affected_containers,
        );
        for warning in &record.warnings {
            println!("  warning: {warning}");
        }
        if let Some(error) = &record.error {
            println!("  error: {}", error.error());
        }
    }
}
