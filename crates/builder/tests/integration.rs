//! Integration tests for the build pipeline

#[cfg(test)]
mod tests {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use proptest::prelude::*;
    use srcforge_builder::*;
    use srcforge_config::Config;
    use srcforge_errors::{BuildError, Error};
    use srcforge_events::{AppEvent, BuildEvent};
    use srcforge_types::{BuildStage, BuildSystemKind, InstallLocation};
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::tempdir;

    /// Write a `.tar.gz` holding `files` as `(path, contents, mode)`
    fn write_tarball(path: &Path, files: &[(&str, &str, u32)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, contents, mode) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder
                .append_data(&mut header, name, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn test_config(work_dir: &Path) -> Config {
        let mut config = Config::default();
        config.paths.work_dir = Some(work_dir.to_path_buf());
        config.build.build_jobs = 2;
        config.dependencies.check_availability = false;
        config
    }

    fn drain(rx: &mut srcforge_events::EventReceiver) -> Vec<BuildEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AppEvent::Build(build) = event {
                events.push(build);
            }
        }
        events
    }

    const PLAIN_MAKEFILE: &str = "PREFIX ?= /usr/local\n\
        all:\n\t@echo building foo\n\
        test:\n\t@echo tests ok\n\
        install:\n\tmkdir -p $(PREFIX)/bin\n\tcp foo.sh $(PREFIX)/bin/foo\n";

    #[tokio::test]
    async fn test_plain_makefile_archive_end_to_end() {
        let downloads = tempdir().unwrap();
        let work = tempdir().unwrap();
        let prefix = tempdir().unwrap();
        let archive = downloads.path().join("foo-1.0.tar.gz");
        write_tarball(
            &archive,
            &[
                ("foo-1.0/Makefile", PLAIN_MAKEFILE, 0o644),
                ("foo-1.0/foo.sh", "#!/bin/sh\necho foo\n", 0o755),
            ],
        );

        let (tx, mut rx) = srcforge_events::channel();
        let mut orchestrator = BuildOrchestrator::new(test_config(work.path()), &archive, Some(tx))
            .with_install_target(InstallTarget::with_prefix(
                prefix.path(),
                InstallLocation::UserLocal,
            ));

        let kind = orchestrator.detect().await.unwrap();
        assert_eq!(kind, BuildSystemKind::PlainMakefile);
        assert_eq!(orchestrator.state().project_name, "foo");

        let build_system = orchestrator.state().build_system().unwrap().clone();
        let ctx = orchestrator.state().build_context();
        assert!(build_system.configure_command(&ctx).is_empty());
        let test_command = build_system.test_command().await.unwrap();
        assert!(!test_command.is_empty());

        let result = orchestrator.run().await;
        let events = drain(&mut rx);

        // Configuration hands over to Compilation before any process starts
        let entered_compilation = events
            .iter()
            .position(|e| {
                matches!(
                    e,
                    BuildEvent::StageChanged {
                        from: BuildStage::Configuration,
                        to: BuildStage::Compilation,
                        ..
                    }
                )
            })
            .expect("pipeline reached compilation");
        let first_command = events
            .iter()
            .position(|e| matches!(e, BuildEvent::CommandStarted { .. }));
        assert!(first_command.map_or(true, |idx| idx > entered_compilation));

        if which::which("make").is_ok() {
            let summary = result.unwrap();
            assert_eq!(summary.stage, BuildStage::Complete);
            assert_eq!(summary.tests_passed, Some(true));
            assert_eq!(
                summary.main_executable,
                Some(prefix.path().join("bin").join("foo"))
            );
            assert!(summary.stdout_tail.contains("building foo"));
            assert!(events
                .iter()
                .any(|e| matches!(e, BuildEvent::Completed { .. })));
        } else {
            assert!(matches!(
                result,
                Err(Error::Build(BuildError::ToolMissing { .. }))
            ));
            assert_eq!(orchestrator.state().stage(), BuildStage::Compilation);
        }

        orchestrator.cleanup().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_autotools_takes_priority_over_cmake() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let configure = dir.path().join("configure");
        std::fs::write(&configure, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&configure, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(dir.path().join("CMakeLists.txt"), "project(x)\n").unwrap();

        let detected = detect_build_system(dir.path()).await.unwrap();
        assert_eq!(detected.kind(), BuildSystemKind::Autotools);
    }

    #[tokio::test]
    async fn test_undetected_tree_accepts_manual_override() {
        let downloads = tempdir().unwrap();
        let work = tempdir().unwrap();
        let archive = downloads.path().join("odd-0.3.tar.gz");
        write_tarball(&archive, &[("odd-0.3/README", "nothing to build\n", 0o644)]);

        let mut orchestrator = BuildOrchestrator::new(test_config(work.path()), &archive, None);
        let err = orchestrator.detect().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Build(BuildError::NoBuildSystemDetected { .. })
        ));
        assert_eq!(orchestrator.state().stage(), BuildStage::Detection);

        orchestrator
            .force_build_system(BuildSystemKind::Meson)
            .await
            .unwrap();
        assert_eq!(orchestrator.detect().await.unwrap(), BuildSystemKind::Meson);
        assert!(orchestrator.state().build_system_forced());
        assert!(orchestrator
            .force_build_system(BuildSystemKind::CMake)
            .await
            .is_err());

        orchestrator.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_during_configure_removes_tree() {
        let downloads = tempdir().unwrap();
        let work = tempdir().unwrap();
        let archive = downloads.path().join("slow-2.0.tar.gz");
        write_tarball(
            &archive,
            &[("slow-2.0/configure", "#!/bin/sh\nsleep 30\n", 0o755)],
        );

        let (tx, mut rx) = srcforge_events::channel();
        let mut orchestrator = BuildOrchestrator::new(test_config(work.path()), &archive, Some(tx));
        let token = orchestrator.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            token.cancel();
        });

        let started = std::time::Instant::now();
        let err = orchestrator.run().await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(orchestrator.state().stage(), BuildStage::Cancelled);
        assert!(orchestrator.state().error_stage().is_none());

        let leftover: Vec<PathBuf> = std::fs::read_dir(work.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert!(leftover.is_empty(), "left behind: {leftover:?}");

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, BuildEvent::CommandCancelled { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, BuildEvent::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_cache_file_fix_writes_fallback_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("VERSION"), "keep-me\n").unwrap();

        let runners = RunnerFactory::new("it", None, CancelToken::new(), Some(60));
        let mut fixer = GitVersioningFixer::new(dir.path(), "proj-2.4.1.tar.gz", runners);
        let issues = fixer
            .detect_issues("CMake Error: no commit id cache, cannot determine version")
            .await;
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, VersioningIssueKind::CacheFile);
        assert_eq!(issues[0].cache_file_path, None);

        let report = fixer.apply_fixes().await;
        assert!(report.success, "{}", report.message);

        let read = |name: &str| std::fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(read("VERSION"), "keep-me\n");
        assert_eq!(read(".version"), "2.4.1\n");
        assert_eq!(read("version.txt"), "2.4.1\n");
        assert_eq!(read(".git-commit-id").trim(), fixer.short_hash());
    }

    #[test]
    fn test_documented_package_mappings() {
        let resolver = DependencyResolver::new();
        let zlib = resolver.parse("Package 'zlib' not found");
        assert_eq!(zlib[0].package.as_deref(), Some("zlib-devel"));
        let gtk = resolver.parse("checking for gtk... no");
        assert_eq!(gtk[0].package.as_deref(), Some("gtk3-devel"));
    }

    #[test]
    fn test_version_from_archive_name() {
        assert_eq!(extract_version("project-2.4.1.tar.gz"), "2.4.1");
        assert_eq!(extract_version("project.tar.gz"), "0.0.0");
    }

    const OUTPUT_LINES: &[&str] = &[
        "checking for gtk... no",
        "Package 'zlib' not found",
        "configure: error: library png not found",
        "main.c:3:10: fatal error: openssl/ssl.h: No such file or directory",
        "-- Could NOT find SDL2 (missing: SDL2_LIBRARY SDL2_INCLUDE_DIR)",
        "checking for gcc... gcc",
        "Call Stack (most recent call first):",
        "fatal: not a git repository",
        "Package libxml-2.0 was not found in the pkg-config search path.",
        "random noise line",
        "",
    ];

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_resolver_is_idempotent_and_deduplicated(
            lines in prop::collection::vec(prop::sample::select(OUTPUT_LINES.to_vec()), 0..16)
        ) {
            let text = lines.join("\n");
            let resolver = DependencyResolver::new();
            let first = resolver.parse(&text);
            let second = resolver.parse(&text);
            prop_assert_eq!(&first, &second);

            let keys: HashSet<String> = first.iter().map(DependencyInfo::key).collect();
            prop_assert_eq!(keys.len(), first.len());
        }
    }
}
