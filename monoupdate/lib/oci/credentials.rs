//! Registry credentials from the Docker CLI configuration.
//!
//! Reads the same `config.json` the Docker CLI and engine use (`$DOCKER_CONFIG/config.json`,
//! default `~/.docker/config.json`). Lookups never fail: a missing file, unreadable JSON, a bad
//! base64 payload or a credential helper entry all mean "no credentials".

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

use crate::utils::get_docker_config_path;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A username/password pair for a registry.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    /// The username.
    pub username: String,

    /// The password or access token.
    pub password: String,
}

/// Read-only view of the Docker CLI credential store.
#[derive(Debug, Clone)]
pub struct DockerCredentialStore {
    path: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct DockerAuthEntry {
    #[serde(default)]
    auth: Option<String>,

    #[serde(default)]
    username: Option<String>,

    #[serde(default)]
    password: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DockerCredentialStore {
    /// Creates a store reading the Docker CLI config at its default location.
    pub fn default_path() -> Self {
        Self::new(get_docker_config_path())
    }

    /// Creates a store reading a specific `config.json`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path of the config file this store reads.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Looks up credentials for a registry host.
    pub fn get(&self, registry: &str) -> Option<RegistryCredentials> {
        let config = self.load()?;
        let wanted = normalize_registry(registry);

        let entry = config
            .auths
            .iter()
            .find(|(key, _)| normalize_registry(key) == wanted)
            .map(|(_, entry)| entry)?;

        decode_entry(entry)
    }

    fn load(&self) -> Option<DockerConfigFile> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "no docker config");
                return None;
            }
        };

        match serde_json::from_str(&data) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "ignoring malformed docker config"
                );
                None
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn decode_entry(entry: &DockerAuthEntry) -> Option<RegistryCredentials> {
    if let (Some(username), Some(password)) = (&entry.username, &entry.password) {
        if !username.is_empty() && !password.is_empty() {
            return Some(RegistryCredentials {
                username: username.clone(),
                password: password.clone(),
            });
        }
    }

    let encoded = entry.auth.as_deref()?.trim();
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    if username.is_empty() || password.is_empty() {
        return None;
    }

    Some(RegistryCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Normalizes registry keys: `https://index.docker.io/v1/`, `docker.io` and
/// `registry-1.docker.io` all become `index.docker.io`.
fn normalize_registry(registry: &str) -> String {
    let r = registry.trim().to_lowercase();
    let r = r
        .strip_prefix("https://")
        .or_else(|| r.strip_prefix("http://"))
        .unwrap_or(&r);
    let host = r.split('/').next().unwrap_or(r);

    if host == "docker.io" || host == "registry-1.docker.io" {
        "index.docker.io".to_string()
    } else {
        host.to_string()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
