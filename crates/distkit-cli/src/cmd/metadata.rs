//! Metadata command

use anyhow::{Context, Result};
use distkit_core::{metadata, project, pyproject};
use std::path::Path;

/// Print the package descriptor of the project at `path`.
pub fn metadata(path: &Path) -> Result<()> {
    let package = pyproject::load(path)
        .with_context(|| format!("Failed to load project at {}", path.display()))?;
    let projection = project(&package, &package.dependencies)?;
    print!("{}", metadata::package_descriptor(&package, &projection));
    Ok(())
}
