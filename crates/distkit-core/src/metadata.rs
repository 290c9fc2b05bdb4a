//! Text renderers for the metadata members.
//!
//! Each renderer is a pure function from package state to the member's full
//! text. The assemblers hand the result to an archive writer so that metadata
//! is hashed like any other member.

use std::fmt::Write as _;

use distkit_schema::Package;

use crate::requirements::Projection;
use crate::tags::CompatibilityTag;

/// Version of the package descriptor format.
pub const METADATA_VERSION: &str = "2.1";

/// Version of the compatibility descriptor format.
pub const WHEEL_VERSION: &str = "1.0";

/// Tool identity written to `WHEEL`.
pub const GENERATOR: &str = concat!("distkit ", env!("CARGO_PKG_VERSION"));

/// Value used for mandatory fields the package leaves unset.
const UNKNOWN: &str = "UNKNOWN";

/// Render the package descriptor (`METADATA` in a wheel, `PKG-INFO` in an
/// sdist).
pub fn package_descriptor(package: &Package, projection: &Projection) -> String {
    let mut out = String::new();
    let mut field = |name: &str, value: &str| {
        let _ = writeln!(out, "{name}: {value}");
    };

    field("Metadata-Version", METADATA_VERSION);
    field("Name", &package.name);
    field("Version", &package.version.to_string());
    field("Summary", package.summary.as_deref().unwrap_or_default());
    field("Home-page", package.homepage.as_deref().unwrap_or(UNKNOWN));
    field("License", package.license.as_deref().unwrap_or(UNKNOWN));

    if !package.keywords.is_empty() {
        field("Keywords", &package.keywords.join(","));
    }
    if let Some(author) = package.author() {
        field("Author", &author.name);
        if let Some(email) = &author.email {
            field("Author-email", email);
        }
    }
    if let Some(python) = &projection.python_requires {
        field("Requires-Python", python);
    }
    for classifier in &package.classifiers {
        field("Classifier", classifier);
    }
    for extra in package.extras.keys() {
        field("Provides-Extra", extra);
    }
    for requirement in projection.requires_dist() {
        field("Requires-Dist", &requirement);
    }
    if let Some(url) = &package.repository {
        field("Project-URL", &format!("Repository, {url}"));
    }
    if let Some(url) = &package.documentation {
        field("Project-URL", &format!("Documentation, {url}"));
    }
    if let Some(content_type) = &package.description_content_type {
        field("Description-Content-Type", content_type);
    }

    if let Some(description) = &package.description {
        out.push('\n');
        out.push_str(description);
        if !description.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

/// Render the compatibility descriptor (`WHEEL`).
pub fn wheel_descriptor(purelib: bool, tag: &CompatibilityTag) -> String {
    format!(
        "Wheel-Version: {WHEEL_VERSION}\n\
         Generator: {GENERATOR}\n\
         Root-Is-Purelib: {purelib}\n\
         Tag: {tag}\n"
    )
}

/// Render `entry_points.txt`, or `None` when the package registers nothing.
pub fn entry_point_registry(package: &Package) -> Option<String> {
    let groups = package.entry_points();
    if groups.is_empty() {
        return None;
    }

    let mut out = String::new();
    for (group, entries) in &groups {
        let _ = writeln!(out, "[{group}]");
        let mut lines: Vec<String> = entries
            .iter()
            .map(|ep| {
                let spec = ep.spec();
                spec.split_whitespace().collect::<String>()
            })
            .collect();
        lines.sort();
        for line in lines {
            out.push_str(&line);
            out.push('\n');
        }
        out.push('\n');
    }
    Some(out)
}
