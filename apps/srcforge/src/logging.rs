//! Structured logging integration for events
//!
//! Converts pipeline events into tracing records with structured fields so
//! that `--debug` log files can be filtered by session, stage or command.

use srcforge_events::{AppEvent, BuildEvent, GeneralEvent};
use tracing::{debug, error, info, trace, warn};

/// Log an `AppEvent` at its level with structured fields
pub fn log_event_with_tracing(event: &AppEvent) {
    match event {
        AppEvent::General(general) => log_general_event(general),
        AppEvent::Build(build) => log_build_event(build),
    }
}

fn log_general_event(event: &GeneralEvent) {
    match event {
        GeneralEvent::Warning { message, context } => {
            warn!(context = ?context, "{message}");
        }
        GeneralEvent::Notice { message } => info!("{message}"),
        GeneralEvent::DebugLog { message } => debug!("{message}"),
        GeneralEvent::OperationStarted { operation } => {
            info!(operation = %operation, "Operation started");
        }
        GeneralEvent::OperationCompleted { operation, success } => {
            info!(operation = %operation, success = success, "Operation completed");
        }
        GeneralEvent::OperationFailed { operation, error } => {
            error!(operation = %operation, error = %error, "Operation failed");
        }
        GeneralEvent::ConfigurationLoaded { source, warnings } => {
            info!(source = %source, warnings = ?warnings, "Configuration loaded");
        }
    }
}

#[allow(clippy::too_many_lines)]
fn log_build_event(event: &BuildEvent) {
    let session = event.session_id();
    match event {
        BuildEvent::SessionStarted {
            archive,
            install_prefix,
            ..
        } => {
            info!(
                session = session,
                archive = %archive.display(),
                install_prefix = %install_prefix.display(),
                "Build session started"
            );
        }
        BuildEvent::StageChanged { from, to, .. } => {
            info!(session = session, from = %from, to = %to, "Stage changed");
        }
        BuildEvent::Extracted { source_dir, .. } => {
            info!(session = session, source_dir = %source_dir.display(), "Archive extracted");
        }
        BuildEvent::BuildSystemDetected { kind, forced, .. } => {
            info!(session = session, kind = %kind, forced = forced, "Build system bound");
        }
        BuildEvent::CommandStarted {
            command,
            working_dir,
            ..
        } => {
            debug!(
                session = session,
                command = %command,
                working_dir = %working_dir.display(),
                "Command started"
            );
        }
        BuildEvent::StepOutput {
            line, is_stderr, ..
        } => {
            trace!(session = session, stderr = is_stderr, "{line}");
        }
        BuildEvent::Progress {
            current,
            total,
            activity,
            ..
        } => {
            debug!(
                session = session,
                current = ?current,
                total = ?total,
                activity = ?activity,
                "Progress"
            );
        }
        BuildEvent::CommandCompleted {
            command,
            exit_code,
            duration,
            ..
        } => {
            info!(
                session = session,
                command = %command,
                exit_code = exit_code,
                duration_ms = duration.as_millis(),
                "Command completed"
            );
        }
        BuildEvent::CommandCancelled { command, .. } => {
            warn!(session = session, command = %command, "Command cancelled");
        }
        BuildEvent::ToolMissing { tool, hint, .. } => {
            warn!(session = session, tool = %tool, hint = ?hint, "Required tool missing");
        }
        BuildEvent::DependenciesDetected {
            packages,
            unavailable,
            ..
        } => {
            info!(
                session = session,
                packages = ?packages,
                unavailable = ?unavailable,
                "Missing dependencies detected"
            );
        }
        BuildEvent::DependenciesInstalled { packages, .. } => {
            info!(session = session, packages = ?packages, "Dependencies installed");
        }
        BuildEvent::VersioningIssuesDetected { issues, .. } => {
            info!(session = session, issues = ?issues, "Git versioning issues detected");
        }
        BuildEvent::VersioningFixProgress { message, .. } => {
            info!(session = session, "{message}");
        }
        BuildEvent::Retrying { stage, reason, .. } => {
            info!(session = session, stage = %stage, reason = %reason, "Retrying stage");
        }
        BuildEvent::TestsFinished { passed, .. } => {
            info!(session = session, passed = passed, "Tests finished");
        }
        BuildEvent::Completed {
            install_prefix,
            main_executable,
            duration,
            ..
        } => {
            info!(
                session = session,
                install_prefix = %install_prefix.display(),
                main_executable = ?main_executable,
                duration_ms = duration.as_millis(),
                "Build completed"
            );
        }
        BuildEvent::Failed { stage, failure, .. } => {
            error!(
                session = session,
                stage = %stage,
                code = ?failure.code,
                hint = ?failure.hint,
                retryable = failure.retryable,
                "{}",
                failure.message
            );
        }
        BuildEvent::Cancelled { .. } => {
            warn!(session = session, "Build cancelled");
        }
    }
}
