#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for srcforge
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/srcforge/config.toml)
//! - Environment variables
//! - CLI flags (applied by the binary)

pub mod build;
pub mod constants;
pub mod general;

pub use build::{BuildConfig, DependencyConfig};
pub use general::{GeneralConfig, PathConfig};

use serde::{Deserialize, Serialize};
use srcforge_errors::{ConfigError, Error};
use srcforge_types::{ColorChoice, InstallLocation, OutputFormat};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub dependencies: DependencyConfig,

    #[serde(default)]
    pub paths: PathConfig,
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir
            .join(constants::APP_DIR_NAME)
            .join(constants::CONFIG_FILE_NAME))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Write configuration as TOML, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written.
    pub async fn save_to_file(&self, path: &Path) -> Result<(), Error> {
        let contents = toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            error: e.to_string(),
        })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ConfigError::WriteError {
                    path: parent.display().to_string(),
                    error: e.to_string(),
                })?;
        }

        fs::write(path, contents)
            .await
            .map_err(|e| ConfigError::WriteError {
                path: path.display().to_string(),
                error: e.to_string(),
            })?;
        Ok(())
    }

    /// Reject values that deserialize but cannot be used
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` describing the first offending field.
    pub fn validate(&self) -> Result<(), Error> {
        if self.build.max_dependency_rounds == 0 {
            return Err(ConfigError::Invalid {
                message: "build.max_dependency_rounds must be at least 1".to_string(),
            }
            .into());
        }
        if self.build.command_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                message: "build.command_timeout_secs must be positive".to_string(),
            }
            .into());
        }
        if self.dependencies.package_manager.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "dependencies.package_manager must not be empty".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // SRCFORGE_OUTPUT
        if let Ok(output) = std::env::var("SRCFORGE_OUTPUT") {
            self.general.default_output = match output.as_str() {
                "plain" => OutputFormat::Plain,
                "tty" => OutputFormat::Tty,
                "json" => OutputFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "SRCFORGE_OUTPUT".to_string(),
                        value: output,
                    }
                    .into())
                }
            };
        }

        // SRCFORGE_COLOR
        if let Ok(color) = std::env::var("SRCFORGE_COLOR") {
            self.general.color = match color.as_str() {
                "always" => ColorChoice::Always,
                "auto" => ColorChoice::Auto,
                "never" => ColorChoice::Never,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "SRCFORGE_COLOR".to_string(),
                        value: color,
                    }
                    .into())
                }
            };
        }

        // SRCFORGE_BUILD_JOBS
        if let Ok(jobs) = std::env::var("SRCFORGE_BUILD_JOBS") {
            self.build.build_jobs = jobs.parse().map_err(|_| ConfigError::InvalidValue {
                field: "SRCFORGE_BUILD_JOBS".to_string(),
                value: jobs,
            })?;
        }

        // SRCFORGE_RUN_TESTS
        if let Ok(run_tests) = std::env::var("SRCFORGE_RUN_TESTS") {
            self.build.run_tests = parse_bool("SRCFORGE_RUN_TESTS", run_tests)?;
        }

        // SRCFORGE_INSTALL_LOCATION
        if let Ok(location) = std::env::var("SRCFORGE_INSTALL_LOCATION") {
            self.build.install_location = match location.as_str() {
                "user" | "user_local" => InstallLocation::UserLocal,
                "system" | "system_wide" => InstallLocation::SystemWide,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "SRCFORGE_INSTALL_LOCATION".to_string(),
                        value: location,
                    }
                    .into())
                }
            };
        }

        Ok(())
    }

    /// `SRCFORGE_*` variables in the environment that `merge_env` does not read
    #[must_use]
    pub fn unknown_env_vars() -> Vec<String> {
        let mut unknown: Vec<String> = std::env::vars_os()
            .filter_map(|(key, _)| key.into_string().ok())
            .filter(|key| {
                key.starts_with(constants::ENV_PREFIX)
                    && !constants::ENV_VARS.contains(&key.as_str())
            })
            .collect();
        unknown.sort();
        unknown
    }

    /// Parent directory for extraction work dirs (with default)
    #[must_use]
    pub fn work_dir(&self) -> PathBuf {
        self.paths
            .work_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Directory for debug log files (with default)
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.paths.log_dir.clone().unwrap_or_else(|| {
            dirs::state_dir()
                .or_else(dirs::cache_dir)
                .unwrap_or_else(std::env::temp_dir)
                .join(constants::APP_DIR_NAME)
                .join("logs")
        })
    }
}

fn parse_bool(field: &str, value: String) -> Result<bool, Error> {
    match value.as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        }
        .into()),
    }
}

/// Calculate build jobs based on CPU count
///
/// An explicit value wins. Otherwise all but one CPU are used, minimum 1.
#[must_use]
pub fn calculate_build_jobs(config_value: usize) -> usize {
    if config_value > 0 {
        config_value
    } else {
        num_cpus::get().saturating_sub(1).max(1)
    }
}
