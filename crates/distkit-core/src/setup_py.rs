//! Synthesized `setup.py` for source archives.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use distkit_schema::{EntryPoint, ModuleKind, Package};

use crate::requirements::Projection;

/// A Python literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PyLiteral {
    /// `None`
    None,
    /// A single-quoted string.
    Str(String),
    /// A bare name referring to an earlier assignment.
    Name(String),
    /// `[...]`
    List(Vec<PyLiteral>),
    /// `{...}` with string keys, in the given order.
    Dict(Vec<(String, PyLiteral)>),
}

impl PyLiteral {
    /// Optional string, `None` when absent.
    pub fn opt(value: Option<&str>) -> Self {
        value.map_or(Self::None, |v| Self::Str(v.to_string()))
    }

    /// List of strings.
    pub fn strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(|s| Self::Str(s.into())).collect())
    }

    /// Python source for this value, on one line.
    pub fn render(&self) -> String {
        match self {
            Self::None => "None".to_string(),
            Self::Str(s) => quote(s),
            Self::Name(n) => n.clone(),
            Self::List(items) => {
                let inner: Vec<String> = items.iter().map(Self::render).collect();
                format!("[{}]", inner.join(", "))
            }
            Self::Dict(entries) => {
                let inner: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", quote(k), v.render()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
        }
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Packages and data files found in a module's file list.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ModuleLayout {
    /// Dotted names of every directory holding `__init__.py`.
    pub packages: Vec<String>,
    /// Non-Python files per package, relative to the package directory.
    pub package_data: BTreeMap<String, Vec<String>>,
}

impl ModuleLayout {
    /// Classify the project-relative `files` that belong to `package`'s module.
    pub fn scan(package: &Package, files: &[PathBuf]) -> Self {
        let module_path = package.module.path();
        let base = package.module.source_root.clone().unwrap_or_default();

        let inside: Vec<&Path> = files
            .iter()
            .filter(|f| f.starts_with(&module_path))
            .filter_map(|f| f.strip_prefix(&base).ok())
            .collect();

        let package_dirs: BTreeSet<&Path> = inside
            .iter()
            .filter(|f| f.file_name().is_some_and(|n| n == "__init__.py"))
            .filter_map(|f| f.parent())
            .collect();

        let mut data: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for &file in &inside {
            if file.extension().is_some_and(|e| e == "py") {
                continue;
            }
            let Some(owner) = file
                .ancestors()
                .skip(1)
                .find(|dir| package_dirs.contains(dir))
            else {
                continue;
            };
            if let Ok(rel) = file.strip_prefix(owner) {
                data.entry(dotted(owner))
                    .or_default()
                    .push(crate::archive::archive_path(rel));
            }
        }
        for entries in data.values_mut() {
            entries.sort();
        }

        Self {
            packages: package_dirs.into_iter().map(dotted).collect(),
            package_data: data,
        }
    }
}

fn dotted(dir: &Path) -> String {
    crate::archive::archive_path(dir).replace('/', ".")
}

/// Render `setup.py` for `package` built from `files`.
pub fn setup_script(package: &Package, files: &[PathBuf], projection: &Projection) -> String {
    let layout = ModuleLayout::scan(package, files);
    let mut body = String::from("# -*- coding: utf-8 -*-\nfrom distutils.core import setup\n\n");
    if let Some(script) = &package.build_script {
        let module = script
            .file_stem()
            .map_or_else(|| "build".into(), OsStr::to_string_lossy);
        let _ = writeln!(body, "from {module} import *\n");
    }

    let mut kwargs: Vec<(String, PyLiteral)> = vec![
        ("name".into(), PyLiteral::Str(package.name.clone())),
        ("version".into(), PyLiteral::Str(package.version.to_string())),
        ("description".into(), PyLiteral::opt(package.summary.as_deref())),
        (
            "long_description".into(),
            PyLiteral::opt(package.description.as_deref()),
        ),
        (
            "author".into(),
            PyLiteral::opt(package.author().map(|a| a.name.as_str())),
        ),
        (
            "author_email".into(),
            PyLiteral::opt(package.author().and_then(|a| a.email.as_deref())),
        ),
        ("url".into(), PyLiteral::opt(package.homepage.as_deref())),
    ];

    let mut assign = |body: &mut String, name: &str, value: PyLiteral| {
        let _ = writeln!(body, "{name} = \\\n{}\n", value.render());
        kwargs.push((name.into(), PyLiteral::Name(name.into())));
    };

    match package.module.kind {
        ModuleKind::Package => {
            assign(&mut body, "packages", PyLiteral::strings(layout.packages));
        }
        ModuleKind::SingleFile => {
            assign(
                &mut body,
                "py_modules",
                PyLiteral::strings([package.module.name.clone()]),
            );
        }
    }
    if let Some(root) = &package.module.source_root {
        let dir = PyLiteral::Dict(vec![(
            String::new(),
            PyLiteral::Str(crate::archive::archive_path(root)),
        )]);
        assign(&mut body, "package_dir", dir);
    }
    if !layout.package_data.is_empty() {
        let data = layout
            .package_data
            .into_iter()
            .map(|(pkg, files)| (pkg, PyLiteral::strings(files)))
            .collect();
        assign(&mut body, "package_data", PyLiteral::Dict(data));
    }

    assign(
        &mut body,
        "install_requires",
        PyLiteral::strings(projection.install_requires()),
    );
    let extras = projection.extras_require();
    if !extras.is_empty() {
        let extras = extras
            .into_iter()
            .map(|(key, reqs)| (key, PyLiteral::strings(reqs)))
            .collect();
        assign(&mut body, "extras_require", PyLiteral::Dict(extras));
    }

    let entry_points = package.entry_points();
    if !entry_points.is_empty() {
        let groups = entry_points
            .into_iter()
            .map(|(group, eps)| (group, PyLiteral::strings(eps.iter().map(EntryPoint::spec))))
            .collect();
        assign(&mut body, "entry_points", PyLiteral::Dict(groups));
    }

    if let Some(python) = &projection.python_requires {
        kwargs.push(("python_requires".into(), PyLiteral::Str(python.clone())));
    }

    body.push_str("setup_kwargs = {\n");
    for (key, value) in &kwargs {
        let _ = writeln!(body, "    {}: {},", quote(key), value.render());
    }
    body.push_str("}\n");
    if package.has_native_build() {
        body.push_str("build(setup_kwargs)\n");
    }
    body.push_str("\nsetup(**setup_kwargs)\n");
    body
}
