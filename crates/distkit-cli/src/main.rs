//! distkit - build reproducible Python wheels and sdists

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use distkit_cli::cmd;
use distkit_cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise info, or debug with -v
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Build {
            path,
            formats,
            dist_dir,
            python,
        } => {
            let formats: Vec<_> = formats.into_iter().map(Into::into).collect();
            cmd::build::build(&path, &formats, dist_dir, python)
        }
        Commands::Tag { path, python } => cmd::tag::tag(&path, python),
        Commands::Metadata { path } => cmd::metadata::metadata(&path),
    }
}
