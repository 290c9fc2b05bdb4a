//! Build command

use anyhow::{Context, Result};
use distkit_core::{BuildConfig, Format, pyproject};
use std::path::{Path, PathBuf};

/// Build the requested archives for the project at `path`.
pub fn build(
    path: &Path,
    formats: &[Format],
    dist_dir: Option<PathBuf>,
    python: Option<PathBuf>,
) -> Result<()> {
    let mut config = BuildConfig::from_env();
    if !formats.is_empty() {
        let mut formats = formats.to_vec();
        formats.sort();
        formats.dedup();
        config.formats = formats;
    }
    if dist_dir.is_some() {
        config.dist_dir = dist_dir;
    }
    if let Some(python) = python {
        config.python = python;
    }

    let package = pyproject::load(path)
        .with_context(|| format!("Failed to load project at {}", path.display()))?;
    println!("Building {} ({})", package.name, package.version);

    let built = distkit_core::build(&package, path, &config)
        .with_context(|| format!("Failed to build {}", package.name))?;
    for archive in built {
        println!("  - Built {}", archive.display());
    }
    Ok(())
}
