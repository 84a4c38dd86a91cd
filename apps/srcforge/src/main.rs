//! srcforge - build and install programs from source archives
//!
//! The CLI wires configuration, the event channel and terminal rendering
//! around the build pipeline in `srcforge-builder`.

mod cli;
mod display;
mod error;
mod events;
mod logging;

use crate::cli::{Cli, Commands, ConfigCommands};
use crate::display::{CommandResult, ConfigReport, DetectionReport, OptionsReport, OutputRenderer};
use crate::error::CliError;
use crate::events::EventHandler;
use clap::Parser;
use srcforge_builder::{
    BuildOrchestrator, CancelToken, DependencyResolver, InstallTarget, PackageManager,
    RunnerFactory, SystemPackageManager,
};
use srcforge_config::Config;
use srcforge_errors::{BuildError, Error};
use srcforge_events::{AppEvent, EventEmitter, EventReceiver, EventSender, GeneralEvent};
use srcforge_types::{BuildSystemKind, ColorChoice, InstallLocation, OutputFormat};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process;
use tokio::io::AsyncReadExt;
use tokio::select;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (config, loaded) = match load_config(&cli).await {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    let json_mode = cli.global.json || config.general.default_output == OutputFormat::Json;

    init_tracing(json_mode, cli.global.debug, &config.log_dir());

    if let Err(e) = run(cli, config, loaded, json_mode).await {
        error!("Application error: {}", e);
        if !json_mode {
            eprintln!("Error: {e}");
        }
        process::exit(1);
    }
}

/// Load configuration with file, environment, then CLI-flag precedence
///
/// Also returns the `ConfigurationLoaded` event to report once the event
/// channel exists.
async fn load_config(cli: &Cli) -> Result<(Config, GeneralEvent), CliError> {
    let explicit = cli.global.config.as_deref();
    let initializing = matches!(cli.command, Commands::Config(ConfigCommands::Init { .. }));
    let mut config = match explicit {
        Some(path) if initializing && !path.exists() => Config::default(),
        _ => Config::load_or_default(explicit).await?,
    };
    config.merge_env()?;
    apply_cli_config(&mut config, &cli.global, &cli.command);
    config.validate()?;

    let loaded = GeneralEvent::ConfigurationLoaded {
        source: config_source(explicit),
        warnings: Config::unknown_env_vars()
            .into_iter()
            .map(|name| format!("unknown environment variable {name} ignored"))
            .collect(),
    };
    Ok((config, loaded))
}

/// Config file that was read, or `built-in defaults` when none exists
fn config_source(explicit: Option<&Path>) -> String {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => Config::default_path().ok(),
    };
    match path {
        Some(path) if path.is_file() => path.display().to_string(),
        _ => "built-in defaults".to_string(),
    }
}

/// Main application logic
async fn run(
    cli: Cli,
    config: Config,
    loaded: GeneralEvent,
    json_mode: bool,
) -> Result<(), CliError> {
    info!("Starting srcforge v{}", env!("CARGO_PKG_VERSION"));

    let color = cli.global.color.unwrap_or(config.general.color);
    let renderer = OutputRenderer::new(json_mode, color);
    let colors_enabled = match color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => console::Term::stdout().features().colors_supported(),
    };
    let mut event_handler = EventHandler::new(colors_enabled, cli.global.verbose, json_mode);

    let (event_sender, event_receiver) = srcforge_events::channel();
    event_sender.emit(AppEvent::General(loaded));
    let ctx = CommandContext {
        config,
        config_path: cli.global.config,
        events: event_sender,
    };

    let result =
        execute_command_with_events(cli.command, ctx, event_receiver, &mut event_handler).await;

    match result {
        Ok(result) => {
            renderer.render_result(&result)?;
            info!("Command completed successfully");
            Ok(())
        }
        Err(CliError::BuildFailed { source, summary }) => {
            if json_mode || !source.is_cancelled() {
                renderer.render_result(&CommandResult::Build(summary))?;
            }
            Err(CliError::Build(source))
        }
        Err(e) => Err(e),
    }
}

/// Everything a command needs besides its own arguments
struct CommandContext {
    config: Config,
    config_path: Option<PathBuf>,
    events: EventSender,
}

/// Execute command with concurrent event handling
async fn execute_command_with_events(
    command: Commands,
    ctx: CommandContext,
    mut event_receiver: EventReceiver,
    event_handler: &mut EventHandler,
) -> Result<CommandResult, CliError> {
    let mut command_future = Box::pin(execute_command(command, ctx));

    loop {
        select! {
            result = &mut command_future => {
                while let Ok(event) = event_receiver.try_recv() {
                    event_handler.handle_event(event);
                }
                return result;
            }

            event = event_receiver.recv() => {
                match event {
                    Some(event) => event_handler.handle_event(event),
                    None => { /* Channel closed: keep waiting for command to finish */ }
                }
            }
        }
    }
}

/// Execute the specified command
async fn execute_command(command: Commands, ctx: CommandContext) -> Result<CommandResult, CliError> {
    match command {
        Commands::Build {
            archive,
            build_system,
            prefix,
            options,
            keep_source,
            ..
        } => {
            let forced = parse_build_system(build_system.as_deref())?;
            execute_build(&ctx, archive, forced, prefix, options, keep_source).await
        }
        Commands::Detect { archive } => {
            tracked(&ctx.events, "detect", execute_detect(&ctx, archive)).await
        }
        Commands::Options {
            archive,
            build_system,
        } => {
            let forced = parse_build_system(build_system.as_deref())?;
            tracked(&ctx.events, "options", execute_options(&ctx, archive, forced)).await
        }
        Commands::Deps { log, check } => {
            tracked(&ctx.events, "deps", execute_deps(&ctx, &log, check)).await
        }
        Commands::Config(ConfigCommands::Init { force }) => {
            let path = config_path(&ctx)?;
            if path.exists() && !force {
                return Err(CliError::InvalidArguments(format!(
                    "{} already exists, pass --force to overwrite it",
                    path.display()
                )));
            }
            Config::default().save_to_file(&path).await?;
            Ok(CommandResult::Success(format!(
                "Wrote default configuration to {}",
                path.display()
            )))
        }
        Commands::Config(ConfigCommands::Show) => {
            let path = config_path(&ctx)?;
            Ok(CommandResult::Config(ConfigReport {
                exists: path.exists(),
                path,
                config: ctx.config,
            }))
        }
    }
}

/// Run a command between `OperationStarted` and its completion or failure event
async fn tracked<F>(events: &EventSender, operation: &str, command: F) -> Result<CommandResult, CliError>
where
    F: Future<Output = Result<CommandResult, CliError>>,
{
    events.emit_operation_started(operation);
    let result = command.await;
    match &result {
        Ok(_) => events.emit_operation_completed(operation, true),
        Err(e) => events.emit_operation_failed(operation, e.to_string()),
    }
    result
}

async fn execute_build(
    ctx: &CommandContext,
    archive: PathBuf,
    forced: Option<BuildSystemKind>,
    prefix: Option<PathBuf>,
    options: Vec<String>,
    keep_source: bool,
) -> Result<CommandResult, CliError> {
    let location = ctx.config.build.install_location;
    let target = match prefix {
        Some(prefix) => InstallTarget::with_prefix(absolute(&prefix)?, location),
        None => InstallTarget::from_location(location),
    };

    let mut orchestrator =
        BuildOrchestrator::new(ctx.config.clone(), archive, Some(ctx.events.clone()))
            .with_install_target(target)
            .with_selected_options(options);

    let token = orchestrator.cancel_token();
    let signal_task = tokio::spawn(cancel_on_ctrl_c(token));

    let outcome = match forced {
        Some(kind) => match orchestrator.force_build_system(kind).await {
            Ok(()) => orchestrator.run().await,
            Err(e) => Err(e),
        },
        None => orchestrator.run().await,
    };
    signal_task.abort();

    if keep_source {
        if let Some(dir) = &orchestrator.state().source_dir {
            info!(dir = %dir.display(), "keeping extracted source tree");
        }
    } else if let Err(e) = orchestrator.cleanup().await {
        warn!("failed to remove extracted tree: {e}");
    }

    match outcome {
        Ok(summary) => Ok(CommandResult::Build(Box::new(summary))),
        Err(source) => Err(CliError::BuildFailed {
            source,
            summary: Box::new(orchestrator.state().summary()),
        }),
    }
}

async fn execute_detect(ctx: &CommandContext, archive: PathBuf) -> Result<CommandResult, CliError> {
    let mut orchestrator =
        BuildOrchestrator::new(ctx.config.clone(), &archive, Some(ctx.events.clone()));
    let detected = orchestrator.detect().await;

    let report = match detected {
        Ok(kind) => {
            let state = orchestrator.state();
            let build_ctx = state.build_context();
            let (configure_command, test_command) = match state.build_system() {
                Some(build_system) => (
                    build_system.configure_command(&build_ctx),
                    build_system.test_command().await,
                ),
                None => (Vec::new(), None),
            };
            Ok(DetectionReport {
                archive,
                source_dir: state.source_dir.clone(),
                build_system: kind,
                forced: state.build_system_forced(),
                configure_command,
                test_command,
            })
        }
        Err(e) => Err(e),
    };

    orchestrator.cleanup().await?;
    Ok(CommandResult::Detection(report?))
}

async fn execute_options(
    ctx: &CommandContext,
    archive: PathBuf,
    forced: Option<BuildSystemKind>,
) -> Result<CommandResult, CliError> {
    let mut orchestrator =
        BuildOrchestrator::new(ctx.config.clone(), archive, Some(ctx.events.clone()));

    let discovered = discover_options(&mut orchestrator, forced).await;
    orchestrator.cleanup().await?;
    Ok(CommandResult::Options(discovered?))
}

async fn discover_options(
    orchestrator: &mut BuildOrchestrator,
    forced: Option<BuildSystemKind>,
) -> Result<OptionsReport, Error> {
    let build_system = match forced {
        Some(kind) => {
            orchestrator.force_build_system(kind).await?;
            kind
        }
        None => orchestrator.detect().await?,
    };
    let options = orchestrator.discover_options().await?.to_vec();
    Ok(OptionsReport {
        build_system,
        options,
    })
}

async fn execute_deps(ctx: &CommandContext, log: &Path, check: bool) -> Result<CommandResult, CliError> {
    let bytes = if log == Path::new("-") {
        let mut buf = Vec::new();
        tokio::io::stdin().read_to_end(&mut buf).await?;
        buf
    } else {
        tokio::fs::read(log)
            .await
            .map_err(|e| Error::io_with_path(&e, log))?
    };
    let output = String::from_utf8_lossy(&bytes);

    let resolver = DependencyResolver::new()
        .with_ignored_names(ctx.config.dependencies.extra_ignored_names.clone());
    let mut dependencies = resolver.parse(&output);

    if check {
        let runners = RunnerFactory::new(
            "deps",
            Some(ctx.events.clone()),
            CancelToken::new(),
            ctx.config.build.command_timeout_secs,
        );
        let package_manager = SystemPackageManager::new(&ctx.config.dependencies, runners);
        for dependency in &mut dependencies {
            if let Some(package) = dependency.package.clone() {
                if !dependency.not_in_repos && !package_manager.is_available(&package).await {
                    dependency.not_in_repos = true;
                }
            }
            dependency.selected_for_install = dependency.is_installable();
        }
    }

    Ok(CommandResult::Dependencies(dependencies))
}

async fn cancel_on_ctrl_c(token: CancelToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received, cancelling build");
        token.cancel();
    }
}

fn parse_build_system(name: Option<&str>) -> Result<Option<BuildSystemKind>, CliError> {
    name.map(|name| {
        BuildSystemKind::from_name(name).ok_or_else(|| {
            CliError::Build(
                BuildError::UnknownBuildSystem {
                    name: name.to_string(),
                }
                .into(),
            )
        })
    })
    .transpose()
}

fn config_path(ctx: &CommandContext) -> Result<PathBuf, CliError> {
    match &ctx.config_path {
        Some(path) => Ok(path.clone()),
        None => Ok(Config::default_path()?),
    }
}

fn absolute(path: &Path) -> Result<PathBuf, CliError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Initialize tracing/logging
fn init_tracing(json_mode: bool, debug_enabled_flag: bool, log_dir: &Path) {
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug_enabled_flag;

    if json_mode {
        // JSON mode: suppress all console output to avoid contaminating JSON
        if debug_enabled && std::fs::create_dir_all(log_dir).is_ok() {
            if let Ok(file) = std::fs::File::create(log_file_path(log_dir)) {
                tracing_subscriber::fmt()
                    .json()
                    .with_writer(file)
                    .with_env_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
                            |_| tracing_subscriber::EnvFilter::new("info,srcforge=debug"),
                        ),
                    )
                    .init();
                return;
            }
        }
        tracing_subscriber::fmt()
            .with_writer(std::io::sink)
            .with_env_filter("off")
            .init();
    } else if debug_enabled {
        // Debug mode: structured JSON logs to file
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!("Warning: Failed to create log directory: {e}");
        }

        let log_file = log_file_path(log_dir);
        match std::fs::File::create(&log_file) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .json()
                    .with_writer(file)
                    .with_env_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
                            |_| {
                                tracing_subscriber::EnvFilter::new(
                                    "info,srcforge=debug,srcforge_builder=debug",
                                )
                            },
                        ),
                    )
                    .init();

                eprintln!("Debug logging enabled: {}", log_file.display());
            }
            Err(e) => {
                eprintln!("Warning: Failed to create log file: {e}");
                tracing_subscriber::fmt()
                    .with_writer(std::io::stderr)
                    .with_env_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
                            |_| tracing_subscriber::EnvFilter::new("info,srcforge=info"),
                        ),
                    )
                    .init();
            }
        }
    } else {
        // Normal mode: minimal logging to stderr
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("warn,srcforge=warn")
                }),
            )
            .init();
    }
}

fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(format!(
        "srcforge-{}.log",
        chrono::Utc::now().format("%Y%m%d-%H%M%S")
    ))
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(config: &mut Config, global: &cli::GlobalArgs, command: &Commands) {
    if let Some(color) = global.color {
        config.general.color = color;
    }
    if global.json {
        config.general.default_output = OutputFormat::Json;
    }

    if let Commands::Build {
        jobs,
        install_deps,
        system,
        no_tests,
        ..
    } = command
    {
        if let Some(job_count) = jobs {
            config.build.build_jobs = *job_count;
        }
        if *install_deps {
            config.dependencies.auto_install = true;
        }
        if *system {
            config.build.install_location = InstallLocation::SystemWide;
        }
        if *no_tests {
            config.build.run_tests = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tracked_reports_completion() {
        let (tx, mut rx) = srcforge_events::channel();
        let result = tracked(&tx, "deps", async {
            Ok(CommandResult::Success("done".to_string()))
        })
        .await;
        assert!(result.is_ok());

        assert!(matches!(
            rx.try_recv().unwrap(),
            AppEvent::General(GeneralEvent::OperationStarted { operation }) if operation == "deps"
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            AppEvent::General(GeneralEvent::OperationCompleted { operation, success: true })
                if operation == "deps"
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tracked_reports_failure() {
        let (tx, mut rx) = srcforge_events::channel();
        let result = tracked(&tx, "detect", async {
            Err(CliError::InvalidArguments("no archive".to_string()))
        })
        .await;
        assert!(result.is_err());

        rx.try_recv().unwrap();
        match rx.try_recv().unwrap() {
            AppEvent::General(GeneralEvent::OperationFailed { operation, error }) => {
                assert_eq!(operation, "detect");
                assert!(error.contains("no archive"), "{error}");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_config_source_names_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(config_source(Some(&path)), "built-in defaults");

        std::fs::write(&path, "").unwrap();
        assert_eq!(config_source(Some(&path)), path.display().to_string());
    }
}
