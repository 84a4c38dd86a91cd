//! Event handling and progress display

use crate::logging::log_event_with_tracing;
use console::Style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use srcforge_events::{AppEvent, BuildEvent, GeneralEvent};
use srcforge_types::BuildStage;

/// Event handler for progress display and user feedback
pub struct EventHandler {
    /// Progress manager so status lines don't tear the bar
    multi_progress: MultiProgress,
    /// Bar for the command currently reporting progress
    progress_bar: Option<ProgressBar>,
    colors_enabled: bool,
    /// Print every output line of the running command
    verbose: bool,
    /// JSON mode: nothing goes to the terminal
    quiet: bool,
}

impl EventHandler {
    /// Create new event handler
    pub fn new(colors_enabled: bool, verbose: bool, quiet: bool) -> Self {
        let multi_progress = if quiet {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        Self {
            multi_progress,
            progress_bar: None,
            colors_enabled,
            verbose,
            quiet,
        }
    }

    /// Handle incoming event
    pub fn handle_event(&mut self, event: AppEvent) {
        log_event_with_tracing(&event);
        if self.quiet {
            return;
        }
        match event {
            AppEvent::General(general) => self.handle_general_event(general),
            AppEvent::Build(build) => self.handle_build_event(build),
        }
    }

    fn handle_general_event(&mut self, event: GeneralEvent) {
        match event {
            GeneralEvent::Warning { message, context } => {
                let line = match context {
                    Some(context) => format!("warning: {message} ({context})"),
                    None => format!("warning: {message}"),
                };
                self.show_styled(&line, &Style::new().yellow());
            }
            GeneralEvent::Notice { message } => self.show_status(&message),
            // The final error is printed by main; repeat it only when verbose
            GeneralEvent::OperationFailed { operation, error } => {
                if self.verbose {
                    self.show_error(&format!("{operation} failed: {error}"));
                }
            }
            GeneralEvent::OperationStarted { operation } => {
                if self.verbose {
                    self.show_status(&format!("Running {operation}"));
                }
            }
            GeneralEvent::ConfigurationLoaded { warnings, .. } => {
                for warning in warnings {
                    self.show_styled(&format!("warning: {warning}"), &Style::new().yellow());
                }
            }
            GeneralEvent::DebugLog { .. } | GeneralEvent::OperationCompleted { .. } => {}
        }
    }

    #[allow(clippy::too_many_lines)]
    fn handle_build_event(&mut self, event: BuildEvent) {
        match event {
            BuildEvent::SessionStarted {
                archive,
                install_prefix,
                ..
            } => {
                self.show_status(&format!(
                    "Building {} into {}",
                    archive.display(),
                    install_prefix.display()
                ));
            }
            BuildEvent::StageChanged { to, .. } => {
                if !to.is_terminal() {
                    self.finish_progress();
                    self.show_styled(&format!("==> {}", stage_title(to)), &Style::new().bold());
                }
            }
            BuildEvent::Extracted { source_dir, .. } => {
                self.show_status(&format!("Extracted to {}", source_dir.display()));
            }
            BuildEvent::BuildSystemDetected { kind, forced, .. } => {
                let how = if forced { "selected" } else { "detected" };
                self.show_status(&format!("Build system {how}: {}", kind.display_name()));
            }
            BuildEvent::CommandStarted { command, .. } => {
                self.show_styled(&format!("$ {command}"), &Style::new().cyan());
            }
            BuildEvent::StepOutput {
                line, is_stderr, ..
            } => {
                if self.verbose {
                    if is_stderr {
                        self.show_styled(&line, &Style::new().dim());
                    } else {
                        self.show_status(&line);
                    }
                }
            }
            BuildEvent::Progress {
                current,
                total,
                activity,
                ..
            } => self.update_progress(current, total, activity),
            BuildEvent::CommandCompleted {
                exit_code,
                duration,
                ..
            } => {
                self.finish_progress();
                if exit_code != 0 {
                    self.show_styled(
                        &format!("  exited with {exit_code} after {:.1}s", duration.as_secs_f64()),
                        &Style::new().dim(),
                    );
                }
            }
            BuildEvent::CommandCancelled { command, .. } => {
                self.finish_progress();
                self.show_styled(&format!("  cancelled: {command}"), &Style::new().yellow());
            }
            BuildEvent::ToolMissing { tool, hint, .. } => {
                self.show_error(&format!("{tool} is not installed"));
                if let Some(hint) = hint {
                    self.show_status(&format!("  {hint}"));
                }
            }
            BuildEvent::DependenciesDetected {
                packages,
                unavailable,
                ..
            } => {
                if !packages.is_empty() {
                    self.show_status(&format!("Missing build dependencies: {}", packages.join(", ")));
                }
                if !unavailable.is_empty() {
                    self.show_styled(
                        &format!("Not in the package repositories: {}", unavailable.join(", ")),
                        &Style::new().yellow(),
                    );
                }
            }
            BuildEvent::DependenciesInstalled { packages, .. } => {
                self.show_styled(
                    &format!("Installed {}", packages.join(", ")),
                    &Style::new().green(),
                );
            }
            BuildEvent::VersioningIssuesDetected { issues, .. } => {
                self.show_styled(
                    "Source tree expects git metadata, applying versioning fixes",
                    &Style::new().yellow(),
                );
                for issue in issues {
                    self.show_status(&format!("  - {issue}"));
                }
            }
            BuildEvent::VersioningFixProgress { message, .. } => {
                self.show_status(&format!("  {message}"));
            }
            BuildEvent::Retrying { stage, reason, .. } => {
                self.show_styled(
                    &format!("Retrying {}: {reason}", stage_title(stage).to_lowercase()),
                    &Style::new().yellow(),
                );
            }
            BuildEvent::TestsFinished { passed, .. } => {
                if passed {
                    self.show_styled("Tests passed", &Style::new().green());
                } else {
                    self.show_styled("Tests failed, continuing", &Style::new().yellow());
                }
            }
            BuildEvent::Completed { duration, .. } => {
                self.finish_progress();
                self.show_styled(
                    &format!("Build finished in {:.1}s", duration.as_secs_f64()),
                    &Style::new().green().bold(),
                );
            }
            BuildEvent::Failed { stage, failure, .. } => {
                self.finish_progress();
                self.show_error(&format!(
                    "{} failed: {}",
                    stage_title(stage),
                    failure.message
                ));
            }
            BuildEvent::Cancelled { .. } => {
                self.finish_progress();
                self.show_styled("Build cancelled", &Style::new().yellow());
            }
        }
    }

    fn update_progress(
        &mut self,
        current: Option<u64>,
        total: Option<u64>,
        activity: Option<String>,
    ) {
        let (Some(current), Some(total)) = (current, total) else {
            if let (Some(bar), Some(activity)) = (&self.progress_bar, activity) {
                bar.set_message(activity);
            }
            return;
        };
        let bar = self.progress_bar.get_or_insert_with(|| {
            let bar = self.multi_progress.add(ProgressBar::new(total));
            let style = ProgressStyle::default_bar()
                .template("{bar:40.cyan/blue} {pos:>4}/{len:4} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ");
            bar.set_style(style);
            bar
        });
        bar.set_length(total);
        bar.set_position(current.min(total));
        if let Some(activity) = activity {
            bar.set_message(activity);
        }
    }

    fn finish_progress(&mut self) {
        if let Some(bar) = self.progress_bar.take() {
            bar.finish_and_clear();
            self.multi_progress.remove(&bar);
        }
    }

    /// Show status message
    fn show_status(&self, message: &str) {
        self.multi_progress.println(message).unwrap_or(());
    }

    fn show_styled(&self, message: &str, style: &Style) {
        if self.colors_enabled {
            self.show_status(&style.apply_to(message).to_string());
        } else {
            self.show_status(message);
        }
    }

    /// Show error message
    fn show_error(&self, message: &str) {
        let line = format!("error: {message}");
        if self.colors_enabled {
            eprintln!("{}", Style::new().red().bold().apply_to(line));
        } else {
            eprintln!("{line}");
        }
    }
}

fn stage_title(stage: BuildStage) -> &'static str {
    match stage {
        BuildStage::Extraction => "Extracting",
        BuildStage::Detection => "Detecting build system",
        BuildStage::Configuration => "Configuring",
        BuildStage::DependencyResolution => "Resolving dependencies",
        BuildStage::Compilation => "Compiling",
        BuildStage::Testing => "Testing",
        BuildStage::Installation => "Installing",
        BuildStage::DesktopIntegration => "Desktop integration",
        BuildStage::Complete => "Complete",
        BuildStage::Failed => "Failed",
        BuildStage::Cancelled => "Cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use srcforge_events::FailureContext;

    fn build(event: BuildEvent) -> AppEvent {
        AppEvent::Build(event)
    }

    #[test]
    fn test_progress_bar_lifecycle() {
        let mut handler = EventHandler::new(false, false, false);
        handler.multi_progress.set_draw_target(ProgressDrawTarget::hidden());

        handler.handle_event(build(BuildEvent::Progress {
            session_id: "s".to_string(),
            current: Some(3),
            total: Some(10),
            activity: Some("Building C object foo.o".to_string()),
        }));
        let bar = handler.progress_bar.as_ref().expect("bar created");
        assert_eq!(bar.position(), 3);
        assert_eq!(bar.length(), Some(10));

        handler.handle_event(build(BuildEvent::Failed {
            session_id: "s".to_string(),
            stage: BuildStage::Compilation,
            failure: FailureContext::new(
                Some("build.compilation_failed"),
                "boom",
                None::<String>,
                true,
            ),
        }));
        assert!(handler.progress_bar.is_none());
    }

    #[test]
    fn test_quiet_handler_ignores_terminal_rendering() {
        let mut handler = EventHandler::new(false, true, true);
        handler.handle_event(build(BuildEvent::Progress {
            session_id: "s".to_string(),
            current: Some(1),
            total: Some(2),
            activity: None,
        }));
        assert!(handler.progress_bar.is_none());
        handler.handle_event(AppEvent::General(GeneralEvent::notice("hello")));
    }
}
