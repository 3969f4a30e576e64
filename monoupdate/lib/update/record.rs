//! Terminal records of update executions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Where an update is in its lifecycle.
///
/// `Pending -> Pulled -> Recreating -> Completed | Failed`. Container candidates skip `Pulled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateStatus {
    /// Execution started.
    Pending,

    /// The new image has been pulled.
    Pulled,

    /// Affected containers are being recreated or restarted.
    Recreating,

    /// Every step succeeded.
    Completed,

    /// At least one step failed.
    Failed,
}

/// How a container was moved onto the new image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RestartKind {
    /// Recreated by the stack orchestrator as part of its application group.
    Recreated,

    /// Restarted in place.
    Restarted,
}

/// The outcome for one container touched by an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartedContainer {
    /// The container id.
    pub id: String,

    /// The container name.
    pub name: String,

    /// The application group, if any.
    pub application: Option<String>,

    /// How the container was handled.
    #[serde(rename = "type")]
    pub kind: RestartKind,

    /// The failure, if the container could not be handled.
    pub error: Option<String>,
}

/// The record of one update execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecord {
    /// Unique id of the execution.
    pub id: Uuid,

    /// The `repository:tag` updated.
    pub image: String,

    /// When execution started.
    pub timestamp: DateTime<Utc>,

    /// The current state.
    pub status: UpdateStatus,

    /// Per-container outcomes, in processing order.
    pub restarted_containers: Vec<RestartedContainer>,

    /// How many containers use the image.
    pub affected_containers: usize,

    /// Non-fatal notices about the execution.
    #[serde(default)]
    pub warnings: Vec<String>,

    /// The failure summary when `status` is `Failed`.
    pub error: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl UpdateStatus {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UpdateStatus::Completed | UpdateStatus::Failed)
    }
}

impl UpdateRecord {
    /// Starts a record for `image` in the `Pending` state.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            image: image.into(),
            timestamp: Utc::now(),
            status: UpdateStatus::Pending,
            restarted_containers: Vec::new(),
            affected_containers: 0,
            warnings: Vec::new(),
            error: None,
        }
    }

    /// Moves the record forward. Moves backwards or out of a terminal state are ignored.
    pub fn advance(&mut self, status: UpdateStatus) {
        if self.status.is_terminal() || status <= self.status {
            tracing::debug!(
                image = %self.image,
                from = ?self.status,
                to = ?status,
                "ignoring update status transition"
            );
            return;
        }

        self.status = status;
    }

    /// Marks the record failed with `message`.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }

        self.status = UpdateStatus::Failed;
        self.error = Some(message.into());
    }

    /// Returns the containers whose handling failed.
    pub fn failed_containers(&self) -> impl Iterator<Item = &RestartedContainer> {
        self.restarted_containers
            .iter()
            .filter(|c| c.error.is_some())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
