//! Build settings.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// An archive format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Format {
    /// Source archive (`.tar.gz`).
    Sdist,
    /// Binary archive (`.whl`).
    Wheel,
}

impl Format {
    /// Every format, in build order.
    pub const ALL: [Self; 2] = [Self::Sdist, Self::Wheel];
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sdist => "sdist",
            Self::Wheel => "wheel",
        })
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sdist" => Ok(Self::Sdist),
            "wheel" | "whl" => Ok(Self::Wheel),
            other => Err(format!("unknown format '{other}' (expected sdist or wheel)")),
        }
    }
}

/// How and where to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Output directory; `<project>/dist` when unset.
    pub dist_dir: Option<PathBuf>,
    /// Interpreter used for native builds and tag queries.
    pub python: PathBuf,
    /// Formats to build.
    pub formats: Vec<Format>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            dist_dir: None,
            python: PathBuf::from("python3"),
            formats: Format::ALL.to_vec(),
        }
    }
}

impl BuildConfig {
    /// Load configuration from environment variables.
    ///
    /// `DISTKIT_DIST_DIR` sets the output directory, `DISTKIT_PYTHON` the
    /// interpreter and `DISTKIT_FORMATS` a comma-separated format list.
    /// Unknown formats are ignored.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let mut config = Self::default();
        if let Some(dir) = var("DISTKIT_DIST_DIR") {
            config.dist_dir = Some(PathBuf::from(dir));
        }
        if let Some(python) = var("DISTKIT_PYTHON") {
            config.python = PathBuf::from(python);
        }
        let formats = var("DISTKIT_FORMATS").map(|f| parse_formats(&f));
        if let Some(formats) = formats.filter(|f| !f.is_empty()) {
            config.formats = formats;
        }
        config
    }

    /// Output directory for the project at `root`.
    pub fn dist_dir(&self, root: &Path) -> PathBuf {
        match &self.dist_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => root.join("dist"),
        }
    }
}

/// Parse `sdist,wheel`, dropping duplicates and unknown names.
pub fn parse_formats(text: &str) -> Vec<Format> {
    let mut formats: Vec<Format> = text
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    formats.sort();
    formats.dedup();
    formats
}
