//! Loading a [`Package`] from `pyproject.toml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use distkit_schema::{Author, Dependency, Module, Package, Version, module_name};
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::error::{BuildError, Result};

/// Project file name.
pub const PYPROJECT: &str = "pyproject.toml";

static AUTHOR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?P<name>[^<>]+?)\s*(?:<(?P<email>[^<>]+)>)?\s*$").ok());

#[derive(Debug, Deserialize)]
struct PyProject {
    tool: Option<Tool>,
}

#[derive(Debug, Deserialize)]
struct Tool {
    poetry: Option<PoetrySection>,
}

#[derive(Debug, Deserialize)]
struct PoetrySection {
    name: String,
    version: String,
    description: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    license: Option<String>,
    homepage: Option<String>,
    repository: Option<String>,
    documentation: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    classifiers: Vec<String>,
    readme: Option<PathBuf>,
    build: Option<PathBuf>,
    #[serde(default)]
    packages: Vec<PackageInclude>,
    #[serde(default)]
    dependencies: BTreeMap<String, DependencySpec>,
    #[serde(default)]
    extras: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    scripts: BTreeMap<String, String>,
    #[serde(default)]
    plugins: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct PackageInclude {
    include: String,
    from: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DependencySpec {
    Constraint(String),
    Detailed(DetailedDependency),
}

#[derive(Debug, Deserialize)]
struct DetailedDependency {
    version: Option<String>,
    #[serde(default)]
    optional: bool,
    python: Option<String>,
    #[serde(default)]
    extras: Vec<String>,
}

/// Load the package described by `<root>/pyproject.toml`.
///
/// # Errors
///
/// [`BuildError::Project`] if the file is missing, malformed or lacks a
/// `[tool.poetry]` table; [`BuildError::ConstraintRender`] if a dependency
/// constraint cannot be parsed.
pub fn load(root: &Path) -> Result<Package> {
    let path = root.join(PYPROJECT);
    let project_error = |message: String| BuildError::Project {
        path: path.clone(),
        message,
    };

    let text = std::fs::read_to_string(&path).map_err(|e| project_error(e.to_string()))?;
    let parsed: PyProject = toml::from_str(&text).map_err(|e| project_error(e.to_string()))?;
    let section = parsed
        .tool
        .and_then(|t| t.poetry)
        .ok_or_else(|| project_error("missing [tool.poetry] section".into()))?;

    let version: Version = section
        .version
        .parse()
        .map_err(|e| project_error(format!("invalid version: {e}")))?;

    let mut package = Package::new(section.name.trim(), version);
    package.summary = section.description;
    package.authors = section.authors.iter().map(|a| parse_author(a)).collect();
    package.license = section.license;
    package.homepage = section.homepage;
    package.repository = section.repository;
    package.documentation = section.documentation;
    package.keywords = section.keywords;
    package.classifiers = section.classifiers;
    package.extras = section.extras;
    package.scripts = section.scripts;
    package.plugins = section.plugins;
    package.build_script = section.build;

    if let Some(readme) = section.readme {
        match std::fs::read_to_string(root.join(&readme)) {
            Ok(description) => {
                package.description = Some(description);
                package.description_content_type = content_type(&readme).map(str::to_string);
                package.readme = Some(readme);
            }
            Err(e) => warn!(readme = %readme.display(), error = %e, "readme not readable; skipping"),
        }
    }

    for (name, spec) in section.dependencies {
        if name.eq_ignore_ascii_case("python") {
            let constraint = match &spec {
                DependencySpec::Constraint(c) => c.as_str(),
                DependencySpec::Detailed(d) => d.version.as_deref().unwrap_or("*"),
            };
            package.python = constraint
                .parse()
                .map_err(|e| BuildError::constraint("python", e))?;
            continue;
        }
        package.dependencies.push(dependency(&name, spec)?);
    }

    package.module = detect_module(root, &package.name, &section.packages);
    Ok(package)
}

fn dependency(name: &str, spec: DependencySpec) -> Result<Dependency> {
    let invalid = |e| BuildError::constraint(name, e);
    match spec {
        DependencySpec::Constraint(constraint) => Dependency::new(name, &constraint).map_err(invalid),
        DependencySpec::Detailed(detail) => {
            let mut dependency =
                Dependency::new(name, detail.version.as_deref().unwrap_or("*")).map_err(invalid)?;
            if detail.optional {
                dependency = dependency.optional();
            }
            if let Some(python) = &detail.python {
                dependency = dependency.with_python(python).map_err(invalid)?;
            }
            Ok(dependency.with_features(detail.extras))
        }
    }
}

/// Split `"Name <email>"` into its parts.
pub fn parse_author(text: &str) -> Author {
    let captures = AUTHOR.as_ref().and_then(|re| re.captures(text.trim()));
    match captures {
        Some(caps) => Author {
            name: caps["name"].to_string(),
            email: caps.name("email").map(|m| m.as_str().to_string()),
        },
        None => Author {
            name: text.trim().to_string(),
            email: None,
        },
    }
}

/// MIME type of a readme, from its extension.
pub fn content_type(readme: &Path) -> Option<&'static str> {
    match readme.extension()?.to_str()?.to_ascii_lowercase().as_str() {
        "md" | "markdown" => Some("text/markdown"),
        "rst" => Some("text/x-rst"),
        "txt" => Some("text/plain"),
        _ => None,
    }
}

fn detect_module(root: &Path, name: &str, includes: &[PackageInclude]) -> Module {
    if let Some(include) = includes.first() {
        let (name, kind_hint) = match include.include.strip_suffix(".py") {
            Some(stem) => (stem.to_string(), Some(true)),
            None => (include.include.clone(), None),
        };
        let base = include.from.as_ref().map_or_else(|| root.to_path_buf(), |f| root.join(f));
        let single = kind_hint.unwrap_or_else(|| {
            !base.join(&name).is_dir() && base.join(format!("{name}.py")).is_file()
        });
        let module = if single {
            Module::single_file(name)
        } else {
            Module::package(name)
        };
        return match &include.from {
            Some(from) => module.in_source_root(from),
            None => module,
        };
    }

    let name = module_name(name);
    let candidates = [
        (root.to_path_buf(), None),
        (root.join("src"), Some("src")),
    ];
    for (base, source_root) in candidates {
        let module = if base.join(&name).join("__init__.py").is_file() {
            Module::package(&name)
        } else if base.join(format!("{name}.py")).is_file() {
            Module::single_file(&name)
        } else {
            continue;
        };
        return match source_root {
            Some(dir) => module.in_source_root(dir),
            None => module,
        };
    }

    warn!(module = %name, "no module found on disk; assuming a package at the project root");
    Module::package(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use distkit_schema::ModuleKind;
    use std::fs;

    const COMPLETE: &str = r#"
[tool.poetry]
name = "my-package"
version = "1.2.3"
description = "Some description."
authors = ["Sébastien Eustace <sebastien@eustace.io>"]
license = "MIT"
readme = "README.rst"
homepage = "https://poetry.eustace.io/"
repository = "https://github.com/sdispater/poetry"
keywords = ["packaging", "dependency", "poetry"]
classifiers = ["Topic :: Software Development :: Libraries :: Python Modules"]

[tool.poetry.dependencies]
python = "~2.7 || ^3.6"
cleo = "^0.6"
cachy = { version = "^0.2.0", extras = ["msgpack"] }
pendulum = { version = "^1.4", optional = true }
pathlib2 = { version = "^2.2", python = "~2.7" }

[tool.poetry.extras]
time = ["pendulum"]

[tool.poetry.scripts]
my-script = "my_package:main"

[tool.poetry.plugins."blogtool.parsers"]
".rst" = "some_module:SomeClass"
"#;

    fn project(pyproject: &str, files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PYPROJECT), pyproject).unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
        dir
    }

    fn minimal(name: &str) -> String {
        format!("[tool.poetry]\nname = \"{name}\"\nversion = \"0.1\"\n")
    }

    #[test]
    fn loads_complete_project() {
        let dir = project(COMPLETE, &["my_package/__init__.py"]);
        fs::write(dir.path().join("README.rst"), "My Package\n==========\n").unwrap();

        let pkg = load(dir.path()).unwrap();
        assert_eq!(pkg.name, "my-package");
        assert_eq!(pkg.version.to_string(), "1.2.3");
        assert_eq!(pkg.authors[0].name, "Sébastien Eustace");
        assert_eq!(pkg.authors[0].email.as_deref(), Some("sebastien@eustace.io"));
        assert_eq!(pkg.description.as_deref(), Some("My Package\n==========\n"));
        assert_eq!(pkg.description_content_type.as_deref(), Some("text/x-rst"));
        assert_eq!(pkg.python.to_string(), ">=2.7,<2.8 || >=3.6,<4.0");
        assert_eq!(pkg.dependencies.len(), 4);
        assert_eq!(pkg.module, Module::package("my_package"));

        let cachy = pkg.dependencies.iter().find(|d| d.name == "cachy").unwrap();
        assert_eq!(cachy.display_name(), "cachy[msgpack]");
        let pendulum = pkg.dependencies.iter().find(|d| d.name == "pendulum").unwrap();
        assert!(pendulum.optional);
        let pathlib2 = pkg.dependencies.iter().find(|d| d.name == "pathlib2").unwrap();
        assert!(!pathlib2.is_unrestricted());

        assert_eq!(pkg.extras["time"], vec!["pendulum"]);
        assert_eq!(pkg.scripts["my-script"], "my_package:main");
        assert_eq!(pkg.plugins["blogtool.parsers"][".rst"], "some_module:SomeClass");
    }

    #[test]
    fn detects_source_root_layouts() {
        let dir = project(&minimal("package-src"), &["src/package_src/__init__.py"]);
        let pkg = load(dir.path()).unwrap();
        assert_eq!(pkg.module, Module::package("package_src").in_source_root("src"));

        let dir = project(&minimal("module-src"), &["src/module_src.py"]);
        let pkg = load(dir.path()).unwrap();
        assert_eq!(pkg.module, Module::single_file("module_src").in_source_root("src"));
    }

    #[test]
    fn detects_single_file_module() {
        let dir = project(&minimal("module1"), &["module1.py"]);
        let pkg = load(dir.path()).unwrap();
        assert_eq!(pkg.module.kind, ModuleKind::SingleFile);
        assert!(!pkg.module.is_in_source_root());
    }

    #[test]
    fn explicit_packages_override_detection() {
        let text = format!(
            "{}packages = [{{ include = \"extra\", from = \"lib\" }}]\n",
            minimal("weird-name")
        );
        let dir = project(&text, &["lib/extra/__init__.py"]);
        let pkg = load(dir.path()).unwrap();
        assert_eq!(pkg.module, Module::package("extra").in_source_root("lib"));
    }

    #[test]
    fn build_script_marks_native_package() {
        let text = format!("{}build = \"build.py\"\n", minimal("extended"));
        let dir = project(&text, &["extended/__init__.py", "build.py"]);
        let pkg = load(dir.path()).unwrap();
        assert!(pkg.has_native_build());
    }

    #[test]
    fn missing_section_is_a_project_error() {
        let dir = project("[project]\nname = \"x\"\n", &[]);
        assert!(matches!(load(dir.path()), Err(BuildError::Project { .. })));
    }

    #[test]
    fn bad_constraint_names_the_dependency() {
        let text = format!("{}\n[tool.poetry.dependencies]\nbroken = \">>1\"\n", minimal("x"));
        let dir = project(&text, &["x/__init__.py"]);
        let err = load(dir.path()).unwrap_err();
        assert!(
            matches!(err, BuildError::ConstraintRender { ref dependency, .. } if dependency == "broken")
        );
    }

    #[test]
    fn authors_without_email() {
        let author = parse_author("Jane Doe");
        assert_eq!(author.name, "Jane Doe");
        assert_eq!(author.email, None);
        let author = parse_author("  Jane Doe <jane@example.org>  ");
        assert_eq!(author.email.as_deref(), Some("jane@example.org"));
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type(Path::new("README.md")), Some("text/markdown"));
        assert_eq!(content_type(Path::new("README.RST")), Some("text/x-rst"));
        assert_eq!(content_type(Path::new("README")), None);
    }
}
