//! The in-memory description of a package that a build consumes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::constraint::VersionSet;
use crate::dependency::{Dependency, EntryPoint, canonical_name};
use crate::version::Version;

/// Group name under which scripts are registered.
pub const CONSOLE_SCRIPTS: &str = "console_scripts";

/// How the importable code of a package is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// A directory holding `__init__.py`.
    Package,
    /// A single `<name>.py` file.
    SingleFile,
}

/// The importable module a package ships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Import name (`my_package`).
    pub name: String,
    /// Directory package or single file.
    pub kind: ModuleKind,
    /// Directory the module lives under, relative to the project root
    /// (`src`), or `None` when it sits at the root.
    pub source_root: Option<PathBuf>,
}

impl Module {
    /// A directory package at the project root.
    pub fn package(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ModuleKind::Package,
            source_root: None,
        }
    }

    /// A single-file module at the project root.
    pub fn single_file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ModuleKind::SingleFile,
            source_root: None,
        }
    }

    /// Place the module under a separate source root such as `src`.
    pub fn in_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = Some(root.into());
        self
    }

    /// Whether the module lives under a relocated source root.
    pub fn is_in_source_root(&self) -> bool {
        self.source_root.is_some()
    }

    /// Project-relative path of the module: `src/my_package` or `module.py`.
    pub fn path(&self) -> PathBuf {
        let leaf = match self.kind {
            ModuleKind::Package => PathBuf::from(&self.name),
            ModuleKind::SingleFile => PathBuf::from(format!("{}.py", self.name)),
        };
        match &self.source_root {
            Some(root) => root.join(leaf),
            None => leaf,
        }
    }
}

/// An author or maintainer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    /// Display name.
    pub name: String,
    /// Contact address, if given.
    pub email: Option<String>,
}

/// A package ready to be built.
///
/// Constructed by the caller (usually from a project file) and only borrowed by
/// the builders.
#[derive(Debug, Clone)]
pub struct Package {
    /// Distribution name as written by the author (`My Package`).
    pub name: String,
    /// Release version.
    pub version: Version,
    /// One-line summary.
    pub summary: Option<String>,
    /// Long description, typically the readme contents.
    pub description: Option<String>,
    /// MIME type of `description`.
    pub description_content_type: Option<String>,
    /// Readme file the description was read from, relative to the project root.
    pub readme: Option<PathBuf>,
    /// Authors, first one is reported in the metadata.
    pub authors: Vec<Author>,
    /// License identifier.
    pub license: Option<String>,
    /// Project home page.
    pub homepage: Option<String>,
    /// Source repository URL.
    pub repository: Option<String>,
    /// Documentation URL.
    pub documentation: Option<String>,
    /// Search keywords.
    pub keywords: Vec<String>,
    /// Trove classifiers.
    pub classifiers: Vec<String>,
    /// Interpreter versions the package supports.
    pub python: VersionSet,
    /// Declared dependencies, in declaration order.
    pub dependencies: Vec<Dependency>,
    /// Extra name → names of the optional dependencies it activates.
    pub extras: BTreeMap<String, Vec<String>>,
    /// Console scripts: script name → `module:function`.
    pub scripts: BTreeMap<String, String>,
    /// Plugin entry points: group → name → `module:attr`.
    pub plugins: BTreeMap<String, BTreeMap<String, String>>,
    /// Native build script (`build.py`), relative to the project root.
    pub build_script: Option<PathBuf>,
    /// The importable module.
    pub module: Module,
}

impl Package {
    /// A package with no metadata beyond its identity. The module name is
    /// derived from `name`.
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        let name = name.into();
        let module = Module::package(module_name(&name));
        Self {
            name,
            version,
            summary: None,
            description: None,
            description_content_type: None,
            readme: None,
            authors: Vec::new(),
            license: None,
            homepage: None,
            repository: None,
            documentation: None,
            keywords: Vec::new(),
            classifiers: Vec::new(),
            python: VersionSet::any(),
            dependencies: Vec::new(),
            extras: BTreeMap::new(),
            scripts: BTreeMap::new(),
            plugins: BTreeMap::new(),
            build_script: None,
            module,
        }
    }

    /// Whether the package compiles native code before packaging.
    pub fn has_native_build(&self) -> bool {
        self.build_script.is_some()
    }

    /// The extras that activate the dependency called `name`.
    pub fn extras_for(&self, name: &str) -> Vec<&str> {
        let wanted = canonical_name(name);
        self.extras
            .iter()
            .filter(|(_, members)| members.iter().any(|m| canonical_name(m) == wanted))
            .map(|(extra, _)| extra.as_str())
            .collect()
    }

    /// Every entry point, grouped and sorted. Scripts are registered under
    /// [`CONSOLE_SCRIPTS`].
    pub fn entry_points(&self) -> BTreeMap<String, Vec<EntryPoint>> {
        let mut groups: BTreeMap<String, Vec<EntryPoint>> = BTreeMap::new();
        let declared = std::iter::once((CONSOLE_SCRIPTS, &self.scripts))
            .chain(self.plugins.iter().map(|(g, eps)| (g.as_str(), eps)));

        for (group, entries) in declared {
            for (name, target) in entries {
                groups.entry(group.to_string()).or_default().push(EntryPoint {
                    name: name.clone(),
                    target: target.clone(),
                });
            }
        }
        for entries in groups.values_mut() {
            entries.sort();
        }
        groups
    }

    /// First author, if any.
    pub fn author(&self) -> Option<&Author> {
        self.authors.first()
    }

    /// Module path relative to `root`.
    pub fn module_path(&self, root: &Path) -> PathBuf {
        root.join(self.module.path())
    }
}

/// Import name for a distribution name: `my-package` → `my_package`.
pub fn module_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}
