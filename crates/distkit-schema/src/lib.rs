//! Shared types for distkit: packages, dependencies and version constraints.

pub mod constraint;
pub mod dependency;
pub mod package;
pub mod version;

// Re-exports
pub use constraint::{Bound, ConstraintError, Interval, VersionSet};
pub use dependency::{Dependency, EntryPoint, canonical_name};
pub use package::{Author, CONSOLE_SCRIPTS, Module, ModuleKind, Package, module_name};
pub use version::{PreLabel, PreRelease, Version};
