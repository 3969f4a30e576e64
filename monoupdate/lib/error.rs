use std::{
    error::Error,
    fmt::{self, Display},
};
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a monoupdate-related operation.
pub type MonoupdateResult<T> = Result<T, MonoupdateError>;

/// An error that occurred while checking for or applying an image update.
#[derive(Debug, Error)]
pub enum MonoupdateError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),

    /// An error that occurred during an HTTP request.
    #[error("http request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// An error that occurred during an HTTP middleware operation.
    #[error("http middleware error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// An error that occurred while (de)serializing JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error that occurred while parsing an OCI document.
    #[error("oci spec error: {0}")]
    OciSpec(#[from] oci_spec::OciSpecError),

    /// An error returned by the Docker Engine API.
    #[error("docker engine error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// An error that occurred in the database layer.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An error that occurred while running database migrations.
    #[error("database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An error that occurred when a join handle returned an error.
    #[error("join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    /// The registry rejected the request as unauthenticated or forbidden.
    #[error("registry {host} denied access to {image_path} (status {status})")]
    RegistryUnauthorized {
        /// The registry host.
        host: String,

        /// The repository path on the registry.
        image_path: String,

        /// The HTTP status returned.
        status: u16,
    },

    /// The registry signalled that the pull rate limit has been exceeded.
    #[error("registry {0} rate limit exceeded")]
    RegistryRateLimited(String),

    /// The registry answered with an unexpected status.
    #[error("registry {host} returned status {status} for {url}")]
    RegistryStatus {
        /// The registry host.
        host: String,

        /// The requested URL.
        url: String,

        /// The HTTP status returned.
        status: u16,
    },

    /// The registry response did not carry a content digest header.
    #[error("registry response for {0} is missing the content digest header")]
    MissingContentDigest(String),

    /// An error that occurred when a manifest was not found.
    #[error("manifest not found: {0}")]
    ManifestNotFound(String),

    /// A manifest list contained no usable platform entry.
    #[error("no usable platform manifest in index for {0}")]
    NoPlatformManifest(String),

    /// The manifest or blob has a shape this client does not understand.
    #[error("unsupported manifest format: {0}")]
    UnsupportedManifest(String),

    /// A release lookup against a source repository host failed.
    #[error("release lookup failed: {0}")]
    ReleaseLookup(String),

    /// An invalid image reference was given.
    #[error("invalid image reference: {0}")]
    ImageReferenceError(String),

    /// Pulling an image failed.
    #[error("image pull failed for {image}: {message}")]
    PullFailed {
        /// The image being pulled.
        image: String,

        /// The failure reported by the runtime.
        message: String,
    },

    /// An operation did not finish before its deadline.
    #[error("{0} timed out after {1:?}")]
    Timeout(String, std::time::Duration),

    /// A container or image was not found in the container runtime.
    #[error("not found in container runtime: {0}")]
    RuntimeNotFound(String),

    /// Recreating an application group failed.
    #[error("stack orchestrator failed to recreate {application}: {message}")]
    RecreateFailed {
        /// The application group.
        application: String,

        /// The orchestrator's failure message.
        message: String,
    },

    /// The referenced schedule does not exist.
    #[error("schedule not found: {0}")]
    ScheduleNotFound(String),

    /// No image is configured for self update.
    #[error("self image is not configured")]
    SelfImageNotConfigured,
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MonoupdateError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> MonoupdateError {
        MonoupdateError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Returns true if the error is an authentication or rate-limit rejection from a registry.
    ///
    /// These errors mean "no metadata available", not a broken registry.
    pub fn is_auth_or_rate_limit(&self) -> bool {
        matches!(
            self,
            MonoupdateError::RegistryUnauthorized { .. } | MonoupdateError::RegistryRateLimited(_)
        )
    }

    /// Returns true if the error is a document-shape problem rather than a transport failure.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            MonoupdateError::Json(_)
                | MonoupdateError::OciSpec(_)
                | MonoupdateError::UnsupportedManifest(_)
                | MonoupdateError::NoPlatformManifest(_)
        )
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `MonoupdateResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> MonoupdateResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
