//! Integration tests for config

#[cfg(test)]
mod tests {
    use srcforge_config::*;
    use srcforge_types::{ColorChoice, InstallLocation, OutputFormat};
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to ensure env var tests don't run concurrently
    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    use srcforge_config::constants::ENV_VARS;

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[tokio::test]
    async fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[general]
default_output = "plain"
color = "never"

[build]
build_jobs = 4
run_tests = false
install_location = "system_wide"
command_timeout_secs = 600

[dependencies]
check_availability = false
extra_ignored_names = ["foo", "bar"]
        "#
        )
        .unwrap();

        let config = Config::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.general.default_output, OutputFormat::Plain);
        assert_eq!(config.general.color, ColorChoice::Never);
        assert_eq!(config.build.build_jobs, 4);
        assert!(!config.build.run_tests);
        assert_eq!(config.build.install_location, InstallLocation::SystemWide);
        assert_eq!(config.build.command_timeout_secs, Some(600));
        assert!(config.build.auto_fix_versioning);
        assert!(!config.dependencies.check_availability);
        assert_eq!(config.dependencies.package_manager, "dnf");
        assert_eq!(config.dependencies.extra_ignored_names, vec!["foo", "bar"]);
    }

    #[tokio::test]
    async fn test_empty_file_gives_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        let config = Config::load_from_file(temp_file.path()).await.unwrap();
        assert!(config.build.run_tests);
        assert!(config.build.retry_single_job);
        assert_eq!(config.build.max_dependency_rounds, 3);
        assert_eq!(config.dependencies.elevation, "pkexec");
    }

    #[tokio::test]
    async fn test_invalid_values_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[build]\nmax_dependency_rounds = 0").unwrap();
        assert!(Config::load_from_file(temp_file.path()).await.is_err());

        let mut broken = NamedTempFile::new().unwrap();
        writeln!(broken, "[build\nbuild_jobs = ").unwrap();
        assert!(Config::load_from_file(broken.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.build.build_jobs = 2;
        config.dependencies.extra_ignored_names = vec!["glib".to_string()];
        config.save_to_file(&path).await.unwrap();

        let loaded = Config::load_from_file(&path).await.unwrap();
        assert_eq!(loaded.build.build_jobs, 2);
        assert_eq!(loaded.dependencies.extra_ignored_names, vec!["glib"]);
    }

    #[test]
    fn test_merge_env() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();

        std::env::set_var("SRCFORGE_OUTPUT", "json");
        std::env::set_var("SRCFORGE_COLOR", "always");
        std::env::set_var("SRCFORGE_BUILD_JOBS", "3");
        std::env::set_var("SRCFORGE_RUN_TESTS", "no");
        std::env::set_var("SRCFORGE_INSTALL_LOCATION", "system");

        let mut config = Config::default();
        config.merge_env().unwrap();

        assert_eq!(config.general.default_output, OutputFormat::Json);
        assert_eq!(config.general.color, ColorChoice::Always);
        assert_eq!(config.build.build_jobs, 3);
        assert!(!config.build.run_tests);
        assert_eq!(config.build.install_location, InstallLocation::SystemWide);

        clear_env();
    }

    #[test]
    fn test_unknown_env_vars_are_reported() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();

        std::env::set_var("SRCFORGE_BUILD_JOBS", "2");
        std::env::set_var("SRCFORGE_BULID_JOBS", "4");

        let unknown = Config::unknown_env_vars();
        assert!(unknown.contains(&"SRCFORGE_BULID_JOBS".to_string()));
        assert!(!unknown.contains(&"SRCFORGE_BUILD_JOBS".to_string()));

        std::env::remove_var("SRCFORGE_BULID_JOBS");
        clear_env();
    }

    #[test]
    fn test_invalid_env_value() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        clear_env();

        std::env::set_var("SRCFORGE_OUTPUT", "invalid");

        let mut config = Config::default();
        let result = config.merge_env();
        assert!(result.is_err());

        clear_env();
    }

    #[test]
    fn test_calculate_build_jobs() {
        assert_eq!(calculate_build_jobs(6), 6);
        assert!(calculate_build_jobs(0) >= 1);
    }
}
