//! Command line interface definition

use clap::{Parser, Subcommand};
use srcforge_types::ColorChoice;
use std::path::PathBuf;

/// srcforge - build and install programs from source archives
#[derive(Parser)]
#[command(name = "srcforge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build and install programs from source archives")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Write debug logs to the log directory
    #[arg(long, global = true)]
    pub debug: bool,

    /// Stream the output of build commands
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Color output control
    #[arg(long, global = true, value_enum)]
    pub color: Option<ColorChoice>,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Extract, configure, compile, test and install a source archive
    #[command(alias = "b")]
    Build {
        /// Path to the source archive (.tar.gz, .tar.xz, .tar.bz2, .tgz, .zip)
        archive: PathBuf,

        /// Skip detection and use this build system (autotools, cmake, meson, make)
        #[arg(long, value_name = "NAME")]
        build_system: Option<String>,

        /// Install missing build dependencies through the package manager
        #[arg(long)]
        install_deps: bool,

        /// Number of parallel build jobs (0=auto)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Install system-wide instead of under ~/.local
        #[arg(long)]
        system: bool,

        /// Install under this prefix instead of the location default
        #[arg(long, value_name = "DIR")]
        prefix: Option<PathBuf>,

        /// Extra configure argument, repeatable (e.g. --option=--disable-nls)
        #[arg(short = 'o', long = "option", value_name = "ARG", allow_hyphen_values = true)]
        options: Vec<String>,

        /// Skip the test stage
        #[arg(long)]
        no_tests: bool,

        /// Keep the extracted source tree after a successful build
        #[arg(long)]
        keep_source: bool,
    },

    /// Report which build system an archive uses
    Detect {
        /// Path to the source archive
        archive: PathBuf,
    },

    /// List the configuration options an archive's build system offers
    Options {
        /// Path to the source archive
        archive: PathBuf,

        /// Skip detection and use this build system
        #[arg(long, value_name = "NAME")]
        build_system: Option<String>,
    },

    /// Infer missing build dependencies from a configure or compiler log
    Deps {
        /// Log file to scan, `-` for stdin
        log: PathBuf,

        /// Ask the package manager which packages exist
        #[arg(long)]
        check: bool,
    },

    /// Configuration file management
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Configuration subcommands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}
