//! Declared dependencies of a package.

use serde::{Deserialize, Serialize};

use crate::constraint::{ConstraintError, VersionSet};

/// A single declared dependency, already resolved to a constraint string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Distribution name as written by the author.
    pub name: String,
    /// Versions of the dependency that satisfy the declaration.
    pub constraint: VersionSet,
    /// Only installed when an extra that names it is requested.
    pub optional: bool,
    /// Interpreter versions under which the dependency applies at all.
    pub python: VersionSet,
    /// Extras requested *of the dependency*, e.g. `msgpack` in `cachy[msgpack]`.
    pub features: Vec<String>,
}

impl Dependency {
    /// Parse a dependency from its name and constraint text.
    ///
    /// # Errors
    ///
    /// Returns [`ConstraintError`] if `constraint` cannot be parsed.
    pub fn new(name: impl Into<String>, constraint: &str) -> Result<Self, ConstraintError> {
        Ok(Self {
            name: name.into(),
            constraint: constraint.parse()?,
            optional: false,
            python: VersionSet::any(),
            features: Vec::new(),
        })
    }

    /// Mark the dependency as optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Restrict the interpreter versions the dependency applies to.
    ///
    /// # Errors
    ///
    /// Returns [`ConstraintError`] if `python` cannot be parsed.
    pub fn with_python(mut self, python: &str) -> Result<Self, ConstraintError> {
        self.python = python.parse()?;
        Ok(self)
    }

    /// Request extras of the dependency itself.
    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the dependency applies under every interpreter.
    pub fn is_unrestricted(&self) -> bool {
        self.python.is_any()
    }

    /// Name with requested features, e.g. `cachy[msgpack]`.
    pub fn display_name(&self) -> String {
        if self.features.is_empty() {
            self.name.clone()
        } else {
            let mut features = self.features.clone();
            features.sort();
            format!("{}[{}]", self.name, features.join(","))
        }
    }
}

/// Canonical name for matching dependencies across tables: lowercase, with
/// runs of `-`, `_` and `.` collapsed to `-`.
pub fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_sep = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_sep {
                out.push('-');
            }
            in_sep = true;
        } else {
            out.push(c.to_ascii_lowercase());
            in_sep = false;
        }
    }
    out
}

/// An entry point: a named reference to a callable, `module:attr`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryPoint {
    /// Name the entry point is registered under.
    pub name: String,
    /// Object reference, `package.module:function`.
    pub target: String,
}

impl EntryPoint {
    /// `name = target`, the form used by `setup()` and `entry_points.txt`.
    pub fn spec(&self) -> String {
        format!("{} = {}", self.name, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_sorts_features() {
        let dep = Dependency::new("cachy", "^0.2.0")
            .unwrap()
            .with_features(["redis", "msgpack"]);
        assert_eq!(dep.display_name(), "cachy[msgpack,redis]");
    }

    #[test]
    fn canonical_name_folds_separators() {
        assert_eq!(canonical_name("Foo__Bar.baz"), "foo-bar-baz");
        assert_eq!(canonical_name("pendulum"), "pendulum");
    }

    #[test]
    fn python_restriction_defaults_to_any() {
        let dep = Dependency::new("A", "*").unwrap();
        assert!(dep.is_unrestricted());
        let dep = dep.with_python("~2.7 || ^3.6").unwrap();
        assert!(!dep.is_unrestricted());
    }
}
