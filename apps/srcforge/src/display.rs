//! Output rendering and formatting

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use console::{Style, Term};
use serde::Serialize;
use srcforge_builder::{BuildSummary, ConfigOption, DependencyInfo};
use srcforge_config::Config;
use srcforge_types::{BuildStage, BuildSystemKind, ColorChoice};
use std::io;
use std::path::PathBuf;

/// Result of one CLI command, rendered as a table or JSON
#[derive(Debug, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CommandResult {
    Build(Box<BuildSummary>),
    Detection(DetectionReport),
    Options(OptionsReport),
    Dependencies(Vec<DependencyInfo>),
    Config(ConfigReport),
    Success(String),
}

impl CommandResult {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Serialize)]
pub struct DetectionReport {
    pub archive: PathBuf,
    pub source_dir: Option<PathBuf>,
    pub build_system: BuildSystemKind,
    pub forced: bool,
    pub configure_command: Vec<String>,
    pub test_command: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct OptionsReport {
    pub build_system: BuildSystemKind,
    pub options: Vec<ConfigOption>,
}

#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub path: PathBuf,
    pub exists: bool,
    pub config: Config,
}

/// Output renderer for CLI results
#[derive(Clone)]
pub struct OutputRenderer {
    /// Use JSON output format
    json_output: bool,
    /// Color configuration
    color_choice: ColorChoice,
    /// Terminal instance
    term: Term,
}

impl OutputRenderer {
    /// Create new output renderer
    pub fn new(json_output: bool, color_choice: ColorChoice) -> Self {
        Self {
            json_output,
            color_choice,
            term: Term::stdout(),
        }
    }

    /// Render command result
    pub fn render_result(&self, result: &CommandResult) -> io::Result<()> {
        if self.json_output {
            self.render_json(result)
        } else {
            self.render_table(result)
        }
    }

    fn render_json(&self, result: &CommandResult) -> io::Result<()> {
        let json = result.to_json().map_err(io::Error::other)?;
        println!("{json}");
        Ok(())
    }

    fn render_table(&self, result: &CommandResult) -> io::Result<()> {
        match result {
            CommandResult::Build(summary) => self.render_build_summary(summary),
            CommandResult::Detection(report) => self.render_detection(report),
            CommandResult::Options(report) => self.render_options(report),
            CommandResult::Dependencies(deps) => self.render_dependencies(deps),
            CommandResult::Config(report) => self.render_config(report),
            CommandResult::Success(message) => self.render_success_message(message),
        }
    }

    /// Render the summary of a finished or failed build
    pub fn render_build_summary(&self, summary: &BuildSummary) -> io::Result<()> {
        let title = match summary.stage {
            BuildStage::Complete => "Build Summary",
            BuildStage::Cancelled => "Build Cancelled",
            _ => "Build Failed",
        };
        println!("{}", self.style_heading(title));
        println!();
        println!("Project:        {}", summary.project_name);
        if let Some(build_system) = &summary.build_system {
            let suffix = if summary.build_system_forced {
                " (manual)"
            } else {
                ""
            };
            println!("Build system:   {build_system}{suffix}");
        }
        println!(
            "Install prefix: {} ({})",
            summary.install_prefix.display(),
            summary.install_location
        );

        if let Some(stage) = summary.error_stage {
            println!("Failed stage:   {stage}");
            if let Some(message) = &summary.error_message {
                let first_line = message.lines().next().unwrap_or_default();
                println!("Error:          {first_line}");
            }
        }
        if let Some(passed) = summary.tests_passed {
            println!("Tests:          {}", if passed { "passed" } else { "failed" });
        }
        if let Some(seconds) = summary.compile_seconds {
            println!("Compile time:   {seconds:.1}s");
        }
        if let Some(elapsed) = summary.elapsed() {
            println!("Total time:     {:.1}s", elapsed.as_secs_f64());
        }
        if let Some(main) = &summary.main_executable {
            println!("Executable:     {}", main.display());
        }

        if !summary.installed_files.is_empty() {
            println!();
            println!("Installed executables ({}):", summary.installed_files.len());
            for file in &summary.installed_files {
                let marker = if file.is_main_binary { "*" } else { "•" };
                let kind = if file.is_elf { "" } else { " (script)" };
                println!("  {marker} {}{kind}", file.path.display());
            }
        }

        if !summary.dependencies.is_empty() && summary.stage != BuildStage::Complete {
            println!();
            self.render_dependencies(&summary.dependencies)?;
        }
        Ok(())
    }

    fn render_detection(&self, report: &DetectionReport) -> io::Result<()> {
        println!("{}", self.style_heading(report.build_system.display_name()));
        println!();
        println!("Archive:    {}", report.archive.display());
        if let Some(dir) = &report.source_dir {
            println!("Source dir: {}", dir.display());
        }
        println!(
            "Selection:  {}",
            if report.forced { "manual" } else { "detected" }
        );
        if report.configure_command.is_empty() {
            println!("Configure:  (none)");
        } else {
            println!("Configure:  {}", report.configure_command.join(" "));
        }
        match &report.test_command {
            Some(cmd) => println!("Tests:      {}", cmd.join(" ")),
            None => println!("Tests:      (none detected)"),
        }
        Ok(())
    }

    fn render_options(&self, report: &OptionsReport) -> io::Result<()> {
        if report.options.is_empty() {
            println!(
                "No configuration options found for {}.",
                report.build_system.display_name()
            );
            return Ok(());
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Option").add_attribute(Attribute::Bold),
            Cell::new("Type").add_attribute(Attribute::Bold),
            Cell::new("Default").add_attribute(Attribute::Bold),
            Cell::new("Description").add_attribute(Attribute::Bold),
        ]);

        for option in &report.options {
            let (kind, default) = if option.is_feature {
                let default = if option.default_enabled { "on" } else { "off" };
                ("switch", default)
            } else {
                ("value", option.value.as_deref().unwrap_or("-"))
            };
            table.add_row(vec![
                Cell::new(&option.name),
                Cell::new(kind),
                Cell::new(default),
                Cell::new(&option.description),
            ]);
        }

        println!("{table}");
        println!();
        println!("Pass options to a build with --option=ARG.");
        Ok(())
    }

    /// Render the missing dependency table with manual install notes
    pub fn render_dependencies(&self, deps: &[DependencyInfo]) -> io::Result<()> {
        if deps.is_empty() {
            println!("No missing dependencies detected.");
            return Ok(());
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Dependency").add_attribute(Attribute::Bold),
            Cell::new("Package").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Description").add_attribute(Attribute::Bold),
        ]);

        for dep in deps {
            table.add_row(vec![
                Cell::new(&dep.name),
                Cell::new(dep.package.as_deref().unwrap_or("-")),
                Self::format_dependency_status(dep),
                Cell::new(&dep.description),
            ]);
        }
        println!("{table}");

        for dep in deps.iter().filter(|d| d.not_in_repos) {
            println!();
            println!("{} needs a manual install:", self.style_heading(&dep.name));
            if let Some(repo) = &dep.copr_repo {
                println!("  COPR repository: {repo}");
            }
            if let Some(url) = &dep.manual_install_url {
                println!("  Project page:    {url}");
            }
            if let Some(cmd) = &dep.manual_install_cmd {
                for line in cmd.lines() {
                    println!("    {line}");
                }
            }
        }
        Ok(())
    }

    fn format_dependency_status(dep: &DependencyInfo) -> Cell {
        if dep.not_in_repos {
            Cell::new("Manual install").fg(Color::Yellow)
        } else if dep.package.is_none() {
            Cell::new("Unknown package").fg(Color::Red)
        } else if dep.selected_for_install {
            Cell::new("Installable").fg(Color::Green)
        } else {
            Cell::new("Available").fg(Color::Blue)
        }
    }

    fn render_config(&self, report: &ConfigReport) -> io::Result<()> {
        let state = if report.exists { "" } else { " (not written yet)" };
        println!("# {}{state}", report.path.display());
        let text = toml::to_string_pretty(&report.config).map_err(io::Error::other)?;
        print!("{text}");
        Ok(())
    }

    fn render_success_message(&self, message: &str) -> io::Result<()> {
        println!("{message}");
        Ok(())
    }

    fn style_heading(&self, text: &str) -> String {
        if self.supports_color() {
            Style::new().bold().apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// Check if color output is supported
    fn supports_color(&self) -> bool {
        match self.color_choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => self.term.features().colors_supported(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_result_json_shape() {
        let result = CommandResult::Success("done".to_string());
        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["kind"], "success");
        assert_eq!(json["data"], "done");
    }

    #[test]
    fn test_dependency_status_cells() {
        let dep = DependencyInfo {
            name: "zlib".to_string(),
            package: Some("zlib-devel".to_string()),
            description: "Compression library".to_string(),
            is_header_only: false,
            manual_install_url: None,
            manual_install_cmd: None,
            quick_install: Vec::new(),
            copr_repo: None,
            not_in_repos: false,
            selected_for_install: true,
        };
        assert_eq!(
            OutputRenderer::format_dependency_status(&dep).content(),
            "Installable"
        );
        let manual = DependencyInfo {
            not_in_repos: true,
            ..dep
        };
        assert_eq!(
            OutputRenderer::format_dependency_status(&manual).content(),
            "Manual install"
        );
    }
}
