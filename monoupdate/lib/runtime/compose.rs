use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::process::Command;

use crate::{config::DEFAULT_PULL_TIMEOUT, MonoupdateError, MonoupdateResult};

use super::{
    ContainerRuntime, LocalContainer, StackOrchestrator, COMPOSE_CONFIG_FILES_LABEL,
    COMPOSE_WORKING_DIR_LABEL,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// [`StackOrchestrator`] that recreates compose projects with the `docker compose` CLI.
///
/// The project's working directory and config files are read from the labels compose puts on the
/// containers it creates.
pub struct ComposeCli {
    runtime: Arc<dyn ContainerRuntime>,
    program: PathBuf,
    timeout: Duration,
}

/// How to invoke compose for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    /// The project name.
    pub name: String,

    /// The directory compose was started from.
    pub working_dir: Option<PathBuf>,

    /// The config files of the project.
    pub config_files: Vec<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ComposeCli {
    /// Creates an orchestrator using `docker` from `PATH`.
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self::with_program(runtime, "docker")
    }

    /// Creates an orchestrator using a specific docker binary.
    pub fn with_program(runtime: Arc<dyn ContainerRuntime>, program: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            program: program.into(),
            timeout: DEFAULT_PULL_TIMEOUT,
        }
    }

    /// Sets how long one `compose up` may run before it is killed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn project(&self, application: &str) -> MonoupdateResult<ComposeProject> {
        let containers = self.runtime.list_containers().await?;
        ComposeProject::from_containers(application, &containers)
            .ok_or_else(|| MonoupdateError::RuntimeNotFound(format!("application {application}")))
    }
}

impl ComposeProject {
    /// Reads a project's location from the labels of its containers.
    pub fn from_containers(application: &str, containers: &[LocalContainer]) -> Option<Self> {
        let member = containers
            .iter()
            .find(|c| c.get_application_name().as_deref() == Some(application))?;
        let labels = member.get_labels();

        Some(Self {
            name: application.to_string(),
            working_dir: labels
                .get(COMPOSE_WORKING_DIR_LABEL)
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            config_files: labels
                .get(COMPOSE_CONFIG_FILES_LABEL)
                .map(|files| {
                    files
                        .split(',')
                        .map(str::trim)
                        .filter(|f| !f.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    /// The `docker` arguments that recreate the project, or one service of it.
    pub fn up_args(&self, service: Option<&str>) -> Vec<String> {
        let mut args = vec!["compose".to_string(), "-p".to_string(), self.name.clone()];
        for file in &self.config_files {
            args.push("-f".into());
            args.push(file.clone());
        }

        args.extend(["up", "-d", "--force-recreate"].map(String::from));
        if let Some(service) = service {
            args.push("--no-deps".into());
            args.push(service.to_string());
        }

        args
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait::async_trait]
impl StackOrchestrator for ComposeCli {
    async fn recreate(&self, application: &str, service: Option<&str>) -> MonoupdateResult<()> {
        let project = self.project(application).await?;
        let args = project.up_args(service);

        tracing::info!(application, service, "recreating application");
        let mut command = Command::new(&self.program);
        command.args(&args).kill_on_drop(true);
        if let Some(dir) = &project.working_dir {
            command.current_dir(dir);
        }

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                MonoupdateError::Timeout(format!("recreate of {application}"), self.timeout)
            })??;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MonoupdateError::RecreateFailed {
                application: application.to_string(),
                message: stderr.trim().to_string(),
            });
        }

        Ok(())
    }
}

impl std::fmt::Debug for ComposeCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposeCli")
            .field("program", &self.program)
            .field("timeout", &self.timeout)
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
