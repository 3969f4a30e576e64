//! The update engine.
//!
//! [`UpdateEngine`] owns one scanner, executor, scheduler and history, all built from an
//! [`EngineConfig`] and a set of injected collaborators. Nothing is global: tests build an engine
//! over fakes, the binary builds one over Docker.

use std::sync::Arc;

use tokio::sync::mpsc;
use typed_builder::TypedBuilder;

use crate::{
    config::{EngineConfig, Schedule},
    management::ConfigStore,
    oci::{DockerRegistry, ImageName, RegistryClient, ReleaseSource, RemoteInspector, VersionExtractor},
    runtime::{ContainerRuntime, StackOrchestrator},
    update::{
        ExecuteOptions, LogNotifier, Notifier, ProgressEvent, ScheduleReport, Scheduler,
        UpdateCandidate, UpdateExecutor, UpdateHistory, UpdateRecord, UpdateScanner,
    },
    MonoupdateError, MonoupdateResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The external systems an [`UpdateEngine`] talks to.
#[derive(TypedBuilder)]
pub struct EngineServices {
    /// The container runtime holding local images and containers.
    runtime: Arc<dyn ContainerRuntime>,

    /// Recreates application groups.
    orchestrator: Arc<dyn StackOrchestrator>,

    /// Persists schedules and update history.
    store: Arc<dyn ConfigStore>,

    /// The registry client. Defaults to [`DockerRegistry`] built from the engine config.
    #[builder(default, setter(strip_option))]
    registry: Option<Arc<dyn RegistryClient>>,

    /// Release lookups used when an image carries no version label.
    #[builder(default, setter(strip_option))]
    releases: Option<Arc<dyn ReleaseSource>>,

    /// Receives scheduled run notifications.
    #[builder(default = Arc::new(LogNotifier))]
    notifier: Arc<dyn Notifier>,
}

/// Detects stale images and applies updates to the containers running them.
#[derive(Clone)]
pub struct UpdateEngine {
    config: EngineConfig,
    runtime: Arc<dyn ContainerRuntime>,
    store: Arc<dyn ConfigStore>,
    scanner: UpdateScanner,
    executor: UpdateExecutor,
    scheduler: Scheduler,
    history: UpdateHistory,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl UpdateEngine {
    /// Creates an engine and seeds its history from the store.
    pub async fn new(config: EngineConfig, services: EngineServices) -> MonoupdateResult<Self> {
        let registry = match services.registry {
            Some(registry) => registry,
            None => Arc::new(DockerRegistry::with_timeout(
                *config.get_metadata_timeout(),
                *config.get_registry_retries(),
            )?),
        };

        let versions = match services.releases {
            Some(releases) => VersionExtractor::with_releases(releases),
            None => VersionExtractor::labels_only(),
        };

        let inspector = RemoteInspector::new(registry, versions, config.get_host_arch().as_str());
        let scanner = UpdateScanner::new(
            services.runtime.clone(),
            inspector,
            *config.get_scan_concurrency(),
        );

        let history =
            UpdateHistory::with_store(*config.get_history_capacity(), services.store.clone());
        history.load().await?;

        let executor = UpdateExecutor::new(
            services.runtime.clone(),
            services.orchestrator,
            history.clone(),
            *config.get_pull_timeout(),
        );

        let scheduler = Scheduler::new(
            scanner.clone(),
            executor.clone(),
            services.notifier,
            config.get_self_image().clone(),
        );

        Ok(Self {
            config,
            runtime: services.runtime,
            store: services.store,
            scanner,
            executor,
            scheduler,
            history,
        })
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Scans every local image and container for available updates.
    pub async fn scan(&self) -> MonoupdateResult<Vec<UpdateCandidate>> {
        self.scanner.scan().await
    }

    /// Checks one image reference against its registry.
    ///
    /// Returns `None` when the image is up to date or not present locally.
    pub async fn check(&self, reference: &str) -> MonoupdateResult<Option<UpdateCandidate>> {
        let target = ImageName::from_reference(reference);
        let images = self.runtime.list_images().await?;

        let Some(image) = images
            .iter()
            .find(|image| image.is_tagged() && image.name().same_image(&target))
        else {
            tracing::debug!(image = %target, "image is not present locally");
            return Ok(None);
        };

        self.scanner.check_image(image).await
    }

    /// Applies one candidate.
    pub async fn execute(
        &self,
        candidate: &UpdateCandidate,
        options: ExecuteOptions,
    ) -> UpdateRecord {
        self.executor.execute(candidate, options).await
    }

    /// Applies one candidate, streaming progress events to `progress`.
    pub async fn execute_with_progress(
        &self,
        candidate: &UpdateCandidate,
        options: ExecuteOptions,
        progress: mpsc::Sender<ProgressEvent>,
    ) -> UpdateRecord {
        self.executor
            .execute_with_progress(candidate, options, progress)
            .await
    }

    /// Returns up to `limit` update records, newest first.
    pub async fn history(&self, limit: usize) -> Vec<UpdateRecord> {
        self.history.list(limit).await
    }

    /// Returns the stored schedules.
    pub async fn schedules(&self) -> MonoupdateResult<Vec<Schedule>> {
        self.store.get_update_schedules().await
    }

    /// Replaces the stored schedules.
    pub async fn set_schedules(&self, schedules: &[Schedule]) -> MonoupdateResult<()> {
        self.store.set_update_schedules(schedules).await
    }

    /// Runs the schedule with id `schedule_id`. Called by the external clock on each cron tick.
    pub async fn tick(&self, schedule_id: &str) -> MonoupdateResult<ScheduleReport> {
        let schedules = self.schedules().await?;
        let schedule = schedules
            .iter()
            .find(|schedule| schedule.get_id() == schedule_id)
            .ok_or_else(|| MonoupdateError::ScheduleNotFound(schedule_id.to_string()))?;

        self.scheduler.run(schedule).await
    }

    /// Updates the image the engine itself runs from and recreates its containers.
    ///
    /// Returns `None` when the image is already up to date.
    pub async fn update_self(&self) -> MonoupdateResult<Option<UpdateRecord>> {
        let self_image = self
            .config
            .get_self_image()
            .as_deref()
            .ok_or(MonoupdateError::SelfImageNotConfigured)?;

        let Some(candidate) = self.check(self_image).await? else {
            tracing::info!(image = %self_image, "self image is up to date");
            return Ok(None);
        };

        tracing::info!(image = %self_image, "updating self image");
        Ok(Some(
            self.execute(&candidate, ExecuteOptions::default()).await,
        ))
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Debug for UpdateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateEngine")
            .field("config", &self.config)
            .field("scanner", &self.scanner)
            .field("history", &self.history)
            .finish()
    }
}
