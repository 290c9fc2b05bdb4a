//! Tag command

use anyhow::{Context, Result};
use distkit_core::{PythonInterpreter, pyproject, tags};
use std::path::{Path, PathBuf};

/// Print the compatibility tag of the project at `path`.
pub fn tag(path: &Path, python: Option<PathBuf>) -> Result<()> {
    let package = pyproject::load(path)
        .with_context(|| format!("Failed to load project at {}", path.display()))?;
    let environment = python.map_or_else(PythonInterpreter::default, PythonInterpreter::new);
    let tag = tags::resolve(&package, &environment).context("Failed to resolve tag")?;
    println!("{tag}");
    Ok(())
}
