//! Applying an update: pull, discover affected containers, recreate or restart, record.

use std::{collections::HashSet, sync::Arc, time::Duration};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{
    oci::ImageName,
    runtime::{ContainerRuntime, LocalContainer, PullProgress, StackOrchestrator},
    MonoupdateError, MonoupdateResult,
};

use super::{
    creation_reference, RestartKind, RestartedContainer, UpdateCandidate, UpdateHistory,
    UpdateRecord, UpdateStatus, UpdateType,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Options for one update execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteOptions {
    /// Whether affected containers are recreated after the pull.
    pub restart: bool,
}

/// A progress event of an update execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ProgressEvent {
    /// A pull status message without byte counts.
    Pulling {
        /// The status text reported by the runtime.
        status: String,
    },

    /// A layer is downloading.
    Downloading {
        /// The layer id.
        layer: String,

        /// Bytes downloaded so far.
        current: u64,

        /// Total bytes, if known.
        total: Option<u64>,
    },

    /// A layer is being extracted.
    Extracting {
        /// The layer id.
        layer: String,

        /// Bytes extracted so far.
        current: u64,

        /// Total bytes, if known.
        total: Option<u64>,
    },

    /// The pull finished.
    Pulled,

    /// An application group or container is being recreated or restarted.
    Recreating {
        /// The application or container name.
        target: String,
    },

    /// The execution reached a terminal state.
    Completed {
        /// The terminal status.
        status: UpdateStatus,
    },
}

/// Pulls updated images and moves the affected containers onto them.
///
/// Groups and containers are handled one at a time, in discovery order. Every outcome is recorded
/// on the [`UpdateRecord`], which is appended to history once terminal.
#[derive(Clone)]
pub struct UpdateExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    orchestrator: Arc<dyn StackOrchestrator>,
    history: UpdateHistory,
    pull_timeout: Duration,
}

/// The containers using an image, split by how they are recreated.
#[derive(Debug, Default)]
struct AffectedContainers {
    groups: Vec<(String, Vec<LocalContainer>)>,
    standalone: Vec<LocalContainer>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl UpdateExecutor {
    /// Creates an executor.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        orchestrator: Arc<dyn StackOrchestrator>,
        history: UpdateHistory,
        pull_timeout: Duration,
    ) -> Self {
        Self {
            runtime,
            orchestrator,
            history,
            pull_timeout,
        }
    }

    /// Applies one candidate and returns its terminal record.
    pub async fn execute(
        &self,
        candidate: &UpdateCandidate,
        options: ExecuteOptions,
    ) -> UpdateRecord {
        self.run(candidate, options, None).await
    }

    /// Applies one candidate, sending progress events to `progress`.
    ///
    /// A closed receiver does not stop the execution.
    pub async fn execute_with_progress(
        &self,
        candidate: &UpdateCandidate,
        options: ExecuteOptions,
        progress: mpsc::Sender<ProgressEvent>,
    ) -> UpdateRecord {
        self.run(candidate, options, Some(&progress)).await
    }

    async fn run(
        &self,
        candidate: &UpdateCandidate,
        options: ExecuteOptions,
        progress: Option<&mpsc::Sender<ProgressEvent>>,
    ) -> UpdateRecord {
        let image = candidate.image_name();
        let mut record = UpdateRecord::new(image.to_string());
        tracing::info!(image = %image, update_type = ?candidate.get_update_type(), "executing update");

        if *candidate.get_update_type() == UpdateType::Registry {
            match self.pull(&image, progress).await {
                Ok(()) => {
                    record.advance(UpdateStatus::Pulled);
                    emit(progress, ProgressEvent::Pulled).await;
                }
                Err(e) => {
                    tracing::warn!(image = %image, error = %e, "pull failed");
                    record.fail(e.to_string());
                    return self.finish(record, progress).await;
                }
            }
        }

        if !options.restart {
            record.advance(UpdateStatus::Completed);
            return self.finish(record, progress).await;
        }

        let affected = match self.discover(&image).await {
            Ok(affected) => affected,
            Err(e) => {
                record.fail(format!("failed to discover containers: {e}"));
                return self.finish(record, progress).await;
            }
        };

        record.affected_containers =
            affected.groups.iter().map(|(_, c)| c.len()).sum::<usize>() + affected.standalone.len();
        record.advance(UpdateStatus::Recreating);

        let mut failures = Vec::new();
        for (application, containers) in &affected.groups {
            emit(
                progress,
                ProgressEvent::Recreating {
                    target: application.clone(),
                },
            )
            .await;

            if let Err(e) = self.recreate_group(application, containers, &mut record).await {
                failures.push(format!("{application}: {e}"));
            }
        }

        for container in &affected.standalone {
            emit(
                progress,
                ProgressEvent::Recreating {
                    target: container.get_name().clone(),
                },
            )
            .await;

            if let Err(e) = self.restart_standalone(&image, container, &mut record).await {
                failures.push(format!("{}: {e}", container.get_name()));
            }
        }

        if failures.is_empty() {
            record.advance(UpdateStatus::Completed);
        } else {
            record.fail(failures.join("; "));
        }

        self.finish(record, progress).await
    }

    async fn pull(
        &self,
        image: &ImageName,
        progress: Option<&mpsc::Sender<ProgressEvent>>,
    ) -> MonoupdateResult<()> {
        let pull = async {
            let mut stream = self
                .runtime
                .pull_image(image.get_repository(), image.get_tag());
            while let Some(item) = stream.next().await {
                if let Some(event) = ProgressEvent::from_pull(item?) {
                    emit(progress, event).await;
                }
            }
            MonoupdateResult::Ok(())
        };

        tokio::time::timeout(self.pull_timeout, pull)
            .await
            .map_err(|_| MonoupdateError::Timeout(format!("pull of {image}"), self.pull_timeout))?
    }

    /// Finds every container created from `image`, grouped by application in discovery order.
    async fn discover(&self, image: &ImageName) -> MonoupdateResult<AffectedContainers> {
        let mut affected = AffectedContainers::default();

        for container in self.runtime.list_containers().await? {
            let reference = match creation_reference(self.runtime.as_ref(), &container).await {
                Ok(reference) => reference,
                Err(e) => {
                    tracing::debug!(container = %container.get_name(), error = %e, "cannot resolve container image");
                    continue;
                }
            };

            if !ImageName::from_reference(&reference).same_image(image) {
                continue;
            }

            match container.get_application_name().clone() {
                Some(application) => match affected
                    .groups
                    .iter_mut()
                    .find(|(name, _)| *name == application)
                {
                    Some((_, members)) => members.push(container),
                    None => affected.groups.push((application, vec![container])),
                },
                None => affected.standalone.push(container),
            }
        }

        Ok(affected)
    }

    async fn recreate_group(
        &self,
        application: &str,
        containers: &[LocalContainer],
        record: &mut UpdateRecord,
    ) -> MonoupdateResult<()> {
        // Scope to a service only when every affected member carries the same service label.
        let services: Option<HashSet<&str>> = containers
            .iter()
            .map(|c| c.get_service_name().as_deref())
            .collect();
        let service = match services {
            Some(services) if services.len() == 1 => services.into_iter().next(),
            _ => None,
        };

        let result = self.orchestrator.recreate(application, service).await;
        let error = result.as_ref().err().map(ToString::to_string);
        if let Some(error) = &error {
            tracing::warn!(application, error = %error, "recreate failed");
        }

        record
            .restarted_containers
            .extend(containers.iter().map(|c| RestartedContainer {
                id: c.get_id().clone(),
                name: c.get_name().clone(),
                application: Some(application.to_string()),
                kind: RestartKind::Recreated,
                error: error.clone(),
            }));

        result
    }

    async fn restart_standalone(
        &self,
        image: &ImageName,
        container: &LocalContainer,
        record: &mut UpdateRecord,
    ) -> MonoupdateResult<()> {
        let result = self.runtime.restart_container(container.get_id()).await;
        let error = result.as_ref().err().map(ToString::to_string);

        match &error {
            None => record.warnings.push(format!(
                "container {} was restarted in place and still runs its previous image; recreate it to use {image}",
                container.get_name()
            )),
            Some(error) => {
                tracing::warn!(container = %container.get_name(), error = %error, "restart failed")
            }
        }

        record.restarted_containers.push(RestartedContainer {
            id: container.get_id().clone(),
            name: container.get_name().clone(),
            application: None,
            kind: RestartKind::Restarted,
            error,
        });

        result
    }

    async fn finish(
        &self,
        record: UpdateRecord,
        progress: Option<&mpsc::Sender<ProgressEvent>>,
    ) -> UpdateRecord {
        tracing::info!(image = %record.image, status = ?record.status, "update finished");
        emit(
            progress,
            ProgressEvent::Completed {
                status: record.status,
            },
        )
        .await;

        self.history.append(record.clone()).await;
        record
    }
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self { restart: true }
    }
}

impl ProgressEvent {
    /// Converts a runtime pull event. Events with no status are dropped.
    pub fn from_pull(progress: PullProgress) -> Option<Self> {
        let status = progress.status?;
        let layer = progress.layer.unwrap_or_default();

        Some(match (status.as_str(), progress.current) {
            ("Downloading", Some(current)) => ProgressEvent::Downloading {
                layer,
                current,
                total: progress.total,
            },
            ("Extracting", Some(current)) => ProgressEvent::Extracting {
                layer,
                current,
                total: progress.total,
            },
            _ => ProgressEvent::Pulling { status },
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

async fn emit(progress: Option<&mpsc::Sender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(sender) = progress {
        if sender.send(event).await.is_err() {
            tracing::trace!("progress receiver dropped");
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Debug for UpdateExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateExecutor")
            .field("history", &self.history)
            .field("pull_timeout", &self.pull_timeout)
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
