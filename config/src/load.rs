use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory, relative to the working directory, holding the configuration files.
const CONFIGURATION_DIR: &str = "configuration";

/// Extensions tried, in order, for every configuration file.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Prefix of environment variable overrides, e.g. `APP_TABLES__KEY_COLUMN`.
const ENV_PREFIX: &str = "APP";

const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator between nested keys in environment variable overrides.
const ENV_SEPARATOR: &str = "__";

const LIST_SEPARATOR: &str = ",";

/// Implemented by top-level configuration structs that can be loaded with [`load_config`].
pub trait Config {
    /// Keys whose environment variable values are split on commas into lists.
    const LIST_PARSE_KEYS: &'static [&'static str];
}

/// Errors raised while assembling a configuration.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    #[error("could not locate `{stem}` configuration in `{directory}`; attempted: {attempted}")]
    ConfigurationFileMissing {
        stem: String,
        directory: PathBuf,
        attempted: String,
    },

    #[error("failed to determine runtime environment: {0}")]
    Environment(#[source] io::Error),

    #[error("failed to build configuration: {0}")]
    Build(#[source] rust_cli_config::ConfigError),

    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] rust_cli_config::ConfigError),
}

/// Loads `T` from the `configuration` directory of the current working directory.
///
/// The environment comes from `APP_ENVIRONMENT` (see [`Environment::load`]).
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    let environment = Environment::load().map_err(LoadConfigError::Environment)?;

    load_config_from(&base_path.join(CONFIGURATION_DIR), environment)
}

/// Loads `T` from `directory`, layering `base`, then `{environment}`, then `APP_` env variables.
///
/// Later sources override earlier ones key by key.
pub fn load_config_from<T>(directory: &Path, environment: Environment) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    if !directory.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(
            directory.to_path_buf(),
        ));
    }

    let base_file = find_configuration_file(directory, "base")?;
    let environment_file = find_configuration_file(directory, environment.as_str())?;

    let mut environment_source = rust_cli_config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    if !T::LIST_PARSE_KEYS.is_empty() {
        environment_source = environment_source
            .try_parsing(true)
            .list_separator(LIST_SEPARATOR);

        for key in T::LIST_PARSE_KEYS {
            environment_source = environment_source.with_list_parse_key(key);
        }
    }

    let settings = rust_cli_config::Config::builder()
        .add_source(rust_cli_config::File::from(base_file))
        .add_source(rust_cli_config::File::from(environment_file))
        .add_source(environment_source)
        .build()
        .map_err(LoadConfigError::Build)?;

    settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}

fn find_configuration_file(directory: &Path, stem: &str) -> Result<PathBuf, LoadConfigError> {
    let candidates: Vec<PathBuf> = CONFIG_FILE_EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{stem}.{extension}")))
        .collect();

    if let Some(path) = candidates.iter().find(|path| path.is_file()) {
        return Ok(path.clone());
    }

    let attempted = candidates
        .iter()
        .map(|path| format!("`{}`", path.display()))
        .collect::<Vec<_>>()
        .join(", ");

    Err(LoadConfigError::ConfigurationFileMissing {
        stem: stem.to_string(),
        directory: directory.to_path_buf(),
        attempted,
    })
}
