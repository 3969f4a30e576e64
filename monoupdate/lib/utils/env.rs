use std::{env, path::PathBuf};

use crate::config::{DEFAULT_DOCKER_CONFIG_HOME, DEFAULT_MONOUPDATE_HOME};

use super::DOCKER_CONFIG_FILENAME;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment variable overriding the monoupdate data directory.
pub const MONOUPDATE_HOME_ENV_VAR: &str = "MONOUPDATE_HOME";

/// Environment variable naming the image monoupdate itself runs from.
pub const MONOUPDATE_SELF_IMAGE_ENV_VAR: &str = "MONOUPDATE_SELF_IMAGE";

/// Environment variable overriding the Docker CLI configuration directory.
pub const DOCKER_CONFIG_ENV_VAR: &str = "DOCKER_CONFIG";

/// Environment variable holding an optional GitHub API token.
pub const GITHUB_TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the monoupdate data directory, honoring `MONOUPDATE_HOME`.
pub fn get_monoupdate_home_path() -> PathBuf {
    match env::var(MONOUPDATE_HOME_ENV_VAR) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => DEFAULT_MONOUPDATE_HOME.clone(),
    }
}

/// Returns the path of the Docker CLI `config.json`, honoring `DOCKER_CONFIG`.
pub fn get_docker_config_path() -> PathBuf {
    let dir = match env::var(DOCKER_CONFIG_ENV_VAR) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => DEFAULT_DOCKER_CONFIG_HOME.clone(),
    };

    dir.join(DOCKER_CONFIG_FILENAME)
}

/// Returns the image monoupdate runs from, if configured.
pub fn get_self_image() -> Option<String> {
    env::var(MONOUPDATE_SELF_IMAGE_ENV_VAR)
        .ok()
        .filter(|image| !image.trim().is_empty())
}

/// Returns the GitHub API token, if configured.
pub fn get_github_token() -> Option<String> {
    env::var(GITHUB_TOKEN_ENV_VAR)
        .ok()
        .filter(|token| !token.trim().is_empty())
}
