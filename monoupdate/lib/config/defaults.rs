use std::{path::PathBuf, sync::LazyLock, time::Duration};

use crate::utils::{DOCKER_CONFIG_DIR, MONOUPDATE_HOME_DIR};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The default number of registry checks that may be in flight at once during a scan.
pub const DEFAULT_SCAN_CONCURRENCY: usize = 10;

/// The default timeout for registry and release metadata calls.
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(15);

/// The default timeout for an image pull through the container runtime.
pub const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// The default number of update records kept in history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// The default number of retries for transient registry failures. Scans never retry in-scan;
/// the next scheduled scan is the retry.
pub const DEFAULT_REGISTRY_RETRIES: u32 = 0;

/// The default number of retries for transient release lookup failures.
pub const DEFAULT_RELEASE_RETRIES: u32 = 2;

/// The default tag used when a reference does not name one.
pub const DEFAULT_OCI_REFERENCE_TAG: &str = "latest";

/// The default namespace of single-segment Docker Hub repositories.
pub const DEFAULT_OCI_REFERENCE_REPO_NAMESPACE: &str = "library";

/// The name of the SQLite database holding schedules and history.
pub const MONOUPDATE_DB_FILENAME: &str = "monoupdate.db";

/// The path where all monoupdate global data is stored.
pub static DEFAULT_MONOUPDATE_HOME: LazyLock<PathBuf> = LazyLock::new(|| {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(MONOUPDATE_HOME_DIR)
});

/// The directory where the Docker CLI keeps its `config.json`.
pub static DEFAULT_DOCKER_CONFIG_HOME: LazyLock<PathBuf> = LazyLock::new(|| {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DOCKER_CONFIG_DIR)
});
