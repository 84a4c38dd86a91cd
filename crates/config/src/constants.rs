//! Fixed names and defaults that are not exposed through TOML

pub const APP_DIR_NAME: &str = "srcforge";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Prefix of the per-run extraction directory under the work dir
pub const WORK_DIR_PREFIX: &str = "srcforge-";

/// Environment variables read by `Config::merge_env`
pub const ENV_PREFIX: &str = "SRCFORGE_";
pub const ENV_VARS: [&str; 5] = [
    "SRCFORGE_OUTPUT",
    "SRCFORGE_COLOR",
    "SRCFORGE_BUILD_JOBS",
    "SRCFORGE_RUN_TESTS",
    "SRCFORGE_INSTALL_LOCATION",
];

pub const DEFAULT_PACKAGE_MANAGER: &str = "dnf";
pub const DEFAULT_ELEVATION_COMMAND: &str = "pkexec";
pub const DEFAULT_MAX_DEPENDENCY_ROUNDS: u32 = 3;
