//! distkit - build reproducible Python wheels and sdists
//!
//! Command-line front end for [`distkit_core`]. Argument parsing lives here;
//! every command is a thin wrapper that loads the project, hands it to the
//! core and prints what was produced.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

pub mod cmd;

use clap::{Parser, Subcommand, ValueEnum};
use distkit_core::Format;
use std::path::PathBuf;

/// Top-level arguments.
#[derive(Debug, Parser)]
#[command(name = "distkit")]
#[command(author, version, about = "distkit - build reproducible Python wheels and sdists")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build distribution archives
    Build {
        /// Project directory holding pyproject.toml
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Format to build (repeatable); all formats when omitted
        #[arg(long = "format", short = 'f', value_enum)]
        formats: Vec<FormatArg>,
        /// Output directory, relative to the project unless absolute
        #[arg(long, short = 'o', env = "DISTKIT_DIST_DIR")]
        dist_dir: Option<PathBuf>,
        /// Interpreter used for native builds and tag queries
        #[arg(long, env = "DISTKIT_PYTHON")]
        python: Option<PathBuf>,
    },
    /// Print the compatibility tag the wheel would carry
    Tag {
        /// Project directory holding pyproject.toml
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Interpreter queried for native packages
        #[arg(long, env = "DISTKIT_PYTHON")]
        python: Option<PathBuf>,
    },
    /// Print the package descriptor (METADATA / PKG-INFO)
    Metadata {
        /// Project directory holding pyproject.toml
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

/// Archive format as spelled on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// Source archive
    Sdist,
    /// Binary archive
    Wheel,
}

impl From<FormatArg> for Format {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Sdist => Self::Sdist,
            FormatArg::Wheel => Self::Wheel,
        }
    }
}
