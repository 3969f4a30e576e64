//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The directory under the user's home where monoupdate keeps its data.
pub const MONOUPDATE_HOME_DIR: &str = ".monoupdate";

/// The directory under the user's home where the Docker CLI keeps its configuration.
pub const DOCKER_CONFIG_DIR: &str = ".docker";

/// The name of the Docker CLI configuration file.
pub const DOCKER_CONFIG_FILENAME: &str = "config.json";
