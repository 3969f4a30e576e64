//! Schedule ticks: notify-only, or apply all or minor updates.

use std::sync::Arc;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::{
    config::{Schedule, ScheduleMode},
    oci::ImageName,
    MonoupdateResult,
};

use super::{ExecuteOptions, Notifier, UpdateCandidate, UpdateExecutor, UpdateRecord, UpdateScanner};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What one scheduled run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleReport {
    /// The schedule that ran.
    pub schedule_id: String,

    /// Candidates left after exclusions.
    pub candidates: Vec<UpdateCandidate>,

    /// Records of the updates applied.
    pub applied: Vec<UpdateRecord>,

    /// Candidates reported but not applied.
    pub notified: Vec<UpdateCandidate>,
}

/// Drives scans and updates when an external clock fires a schedule.
///
/// The engine's own image is never applied here; it is only updated through the manual
/// self-update path.
#[derive(Clone)]
pub struct Scheduler {
    scanner: UpdateScanner,
    executor: UpdateExecutor,
    notifier: Arc<dyn Notifier>,
    self_image: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Scheduler {
    /// Creates a scheduler.
    pub fn new(
        scanner: UpdateScanner,
        executor: UpdateExecutor,
        notifier: Arc<dyn Notifier>,
        self_image: Option<String>,
    ) -> Self {
        Self {
            scanner,
            executor,
            notifier,
            self_image,
        }
    }

    /// Runs one tick of `schedule`. Disabled schedules do nothing.
    pub async fn run(&self, schedule: &Schedule) -> MonoupdateResult<ScheduleReport> {
        let mut report = ScheduleReport {
            schedule_id: schedule.get_id().clone(),
            ..Default::default()
        };

        if !*schedule.get_enabled() {
            tracing::debug!(schedule = %schedule.get_id(), "schedule is disabled");
            return Ok(report);
        }

        tracing::info!(schedule = %schedule.get_id(), mode = ?schedule.get_mode(), "running schedule");
        let candidates: Vec<UpdateCandidate> = self
            .scanner
            .scan()
            .await?
            .into_iter()
            .filter(|c| !is_excluded(c, schedule.get_excluded_images()))
            .filter(|c| !self.is_self_image(c))
            .collect();

        let (apply, notify): (Vec<_>, Vec<_>) = match schedule.get_mode() {
            ScheduleMode::CheckOnly => (Vec::new(), candidates.clone()),
            ScheduleMode::All => (candidates.clone(), Vec::new()),
            ScheduleMode::Minor => candidates.iter().cloned().partition(is_minor_candidate),
        };

        let options = ExecuteOptions {
            restart: *schedule.get_restart_containers(),
        };
        for candidate in &apply {
            report
                .applied
                .push(self.executor.execute(candidate, options).await);
        }

        if !notify.is_empty() {
            self.notifier.updates_available(schedule, &notify).await;
        }
        if !report.applied.is_empty() {
            self.notifier
                .updates_applied(schedule, &report.applied)
                .await;
        }

        report.candidates = candidates;
        report.notified = notify;
        Ok(report)
    }

    fn is_self_image(&self, candidate: &UpdateCandidate) -> bool {
        self.self_image
            .as_deref()
            .is_some_and(|image| ImageName::from_reference(image).same_image(&candidate.image_name()))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns true if `candidate` matches an exclusion, by repository, `repository:tag` or either's
/// canonical form.
pub fn is_excluded(candidate: &UpdateCandidate, excluded: &[String]) -> bool {
    let name = candidate.image_name();
    excluded.iter().map(|e| e.trim()).any(|excluded| {
        if excluded.is_empty() {
            return false;
        }

        let has_tag = excluded
            .rsplit('/')
            .next()
            .is_some_and(|last| last.contains(':'));
        if has_tag {
            ImageName::from_reference(excluded).same_image(&name)
        } else {
            ImageName::new(excluded, name.get_tag().as_str()).same_image(&name)
        }
    })
}

/// Returns true if both versions parse and share a major version.
pub fn is_minor_update(current: &str, new: &str) -> bool {
    match (parse_version(current), parse_version(new)) {
        (Some(current), Some(new)) => current.major == new.major,
        _ => false,
    }
}

/// Parses a loose semantic version: a leading `v` is dropped and missing minor or patch parts are
/// filled with zero.
pub fn parse_version(version: &str) -> Option<Version> {
    let version = version.trim();
    let version = version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version);

    let split = version.find(['-', '+']).unwrap_or(version.len());
    let (core, suffix) = version.split_at(split);

    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }

    Version::parse(&format!("{}{suffix}", parts.join("."))).ok()
}

fn is_minor_candidate(candidate: &UpdateCandidate) -> bool {
    match (candidate.get_current_version(), candidate.get_new_version()) {
        (Some(current), Some(new)) => is_minor_update(current, new),
        _ => false,
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("scanner", &self.scanner)
            .field("executor", &self.executor)
            .field("self_image", &self.self_image)
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
