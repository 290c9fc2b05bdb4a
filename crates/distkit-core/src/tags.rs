//! Compatibility tag resolution.
//!
//! Pure packages get a universal tag computed from their interpreter range.
//! Packages with a native build step are tagged for the interpreter that
//! builds them, which means asking that interpreter about itself.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use distkit_schema::{Bound, Package, Version, VersionSet};
use serde::Deserialize;
use tracing::debug;

use crate::error::{BuildError, Result};

/// `{interpreter}-{abi}-{platform}`, as used in binary archive names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityTag {
    /// Implementation and version (`cp37`) or `py2.py3` / `py3`.
    pub interpreter: String,
    /// ABI identifier, `none` for pure packages.
    pub abi: String,
    /// Platform identifier, `any` for pure packages.
    pub platform: String,
}

impl CompatibilityTag {
    /// Build a tag from its three parts.
    pub fn new(
        interpreter: impl Into<String>,
        abi: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            abi: abi.into(),
            platform: platform.into(),
        }
    }
}

impl fmt::Display for CompatibilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.interpreter, self.abi, self.platform)
    }
}

/// What a target interpreter reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InterpreterInfo {
    /// Implementation abbreviation (`cp`, `pp`).
    pub implementation: String,
    /// Major and minor version digits (`37`).
    pub version: String,
    /// ABI identifier (`cp37m`).
    pub abi: String,
    /// Platform identifier (`linux-x86_64`, `macosx-10.9-x86_64`).
    pub platform: String,
}

/// Source of [`InterpreterInfo`] for native builds.
pub trait TargetEnvironment {
    /// Describe the interpreter the archive is built for.
    ///
    /// # Errors
    ///
    /// [`BuildError::EnvironmentQuery`] if the interpreter cannot be asked.
    fn query(&self) -> Result<InterpreterInfo>;
}

/// Fixed answers, for cross builds and tests.
impl TargetEnvironment for InterpreterInfo {
    fn query(&self) -> Result<InterpreterInfo> {
        Ok(self.clone())
    }
}

/// Prints the interpreter description as one JSON object.
const PROBE: &str = r#"
import json, sys, sysconfig
names = {"cpython": "cp", "pypy": "pp", "ironpython": "ip", "jython": "jy"}
impl = getattr(sys, "implementation", None)
impl = impl.name if impl else "cpython"
soabi = sysconfig.get_config_var("SOABI")
if soabi and soabi.startswith("cpython-"):
    abi = "cp" + soabi.split("-")[1]
elif soabi:
    abi = soabi.replace(".", "_").replace("-", "_")
else:
    abi = "none"
print(json.dumps({
    "implementation": names.get(impl, impl),
    "version": "".join(str(p) for p in sys.version_info[:2]),
    "abi": abi,
    "platform": sysconfig.get_platform(),
}))
"#;

/// Asks a Python executable about itself by running a short probe script.
#[derive(Debug, Clone)]
pub struct PythonInterpreter {
    executable: PathBuf,
}

impl PythonInterpreter {
    /// Query `executable`, resolved through `PATH` if it is a bare name.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

impl Default for PythonInterpreter {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl TargetEnvironment for PythonInterpreter {
    fn query(&self) -> Result<InterpreterInfo> {
        let exe = self.executable.display();
        let output = Command::new(&self.executable)
            .arg("-c")
            .arg(PROBE)
            .output()
            .map_err(|e| BuildError::EnvironmentQuery(format!("could not run {exe}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BuildError::EnvironmentQuery(format!(
                "{exe} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let info: InterpreterInfo = serde_json::from_slice(&output.stdout).map_err(|e| {
            BuildError::EnvironmentQuery(format!("unexpected probe output from {exe}: {e}"))
        })?;
        debug!(?info, "queried target interpreter");
        Ok(info)
    }
}

/// Compute the compatibility tag for `package`.
///
/// The environment is only consulted when the package has a native build
/// step.
///
/// # Errors
///
/// [`BuildError::EnvironmentQuery`] if a native package's interpreter cannot
/// be queried.
pub fn resolve(package: &Package, environment: &dyn TargetEnvironment) -> Result<CompatibilityTag> {
    if !package.has_native_build() {
        let interpreter = if supports_python2(&package.python) {
            "py2.py3"
        } else {
            "py3"
        };
        return Ok(CompatibilityTag::new(interpreter, "none", "any"));
    }

    let info = environment.query()?;
    Ok(CompatibilityTag::new(
        format!("{}{}", info.implementation, info.version),
        info.abi.to_lowercase(),
        info.platform.replace(['.', '-'], "_"),
    ))
}

fn supports_python2(python: &VersionSet) -> bool {
    let series = VersionSet::range(
        Bound::Inclusive(Version::from_release(&[2, 0, 0])),
        Bound::Exclusive(Version::from_release(&[3, 0, 0])),
    );
    python.allows_any(&series)
}
