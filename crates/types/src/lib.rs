#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for srcforge
//!
//! This crate provides the small vocabulary shared by every other crate:
//! pipeline stages, build system identities, install locations and CLI
//! presentation choices.

pub mod stage;

pub use stage::BuildStage;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Build tool families the pipeline knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildSystemKind {
    Autotools,
    #[serde(rename = "cmake")]
    CMake,
    Meson,
    PlainMakefile,
}

impl BuildSystemKind {
    /// All variants in detection priority order
    pub const DETECTION_ORDER: [Self; 4] =
        [Self::Autotools, Self::CMake, Self::Meson, Self::PlainMakefile];

    /// Human readable name
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Autotools => "GNU Autotools",
            Self::CMake => "CMake",
            Self::Meson => "Meson",
            Self::PlainMakefile => "Plain Makefile",
        }
    }

    /// Short identifier used on the command line and in config files
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Autotools => "autotools",
            Self::CMake => "cmake",
            Self::Meson => "meson",
            Self::PlainMakefile => "make",
        }
    }

    /// Parse either the short identifier or the display name, ignoring case
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::DETECTION_ORDER.into_iter().find(|kind| {
            kind.id().eq_ignore_ascii_case(name) || kind.display_name().eq_ignore_ascii_case(name)
        })
    }
}

impl std::fmt::Display for BuildSystemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Where the build is installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallLocation {
    /// `~/.local`, no elevation required
    UserLocal,
    /// `/usr/local`, install commands run through `sudo`
    SystemWide,
}

impl InstallLocation {
    /// Install prefix for this location
    #[must_use]
    pub fn prefix(self) -> PathBuf {
        match self {
            Self::UserLocal => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join(".local"),
            Self::SystemWide => PathBuf::from("/usr/local"),
        }
    }

    /// Whether install commands need a privilege elevation wrapper
    #[must_use]
    pub fn requires_elevation(self) -> bool {
        matches!(self, Self::SystemWide)
    }
}

impl Default for InstallLocation {
    fn default() -> Self {
        Self::UserLocal
    }
}

impl std::fmt::Display for InstallLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserLocal => write!(f, "user"),
            Self::SystemWide => write!(f, "system"),
        }
    }
}

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Plain,
    Tty,
    Json,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Tty
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    Always,
    Auto,
    Never,
}

// Implement clap::ValueEnum for ColorChoice
impl clap::ValueEnum for ColorChoice {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Always, Self::Auto, Self::Never]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Always => clap::builder::PossibleValue::new("always"),
            Self::Auto => clap::builder::PossibleValue::new("auto"),
            Self::Never => clap::builder::PossibleValue::new("never"),
        })
    }
}

impl Default for ColorChoice {
    fn default() -> Self {
        Self::Auto
    }
}
