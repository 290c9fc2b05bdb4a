//! Projection of declared dependencies into requirement strings.
//!
//! Both archive formats need the dependency list flattened into requirement
//! strings, but they disagree on where conditions go. The source archive's
//! `setup()` call takes a plain `install_requires` list plus an
//! `extras_require` table keyed by `extra:marker`; the binary archive's
//! `METADATA` wants one `Requires-Dist` line per requirement with the
//! condition inlined as a PEP 508 marker. [`project`] computes the shared
//! intermediate form, a [`Projection`], and each format renders from it.
//!
//! Conditions are grouped under a structured [`GroupKey`] (extra name and
//! interpreter marker kept apart) so that two different conditions can never
//! collide on the same concatenated string.

use std::collections::BTreeMap;
use std::fmt;

use distkit_schema::{Bound, Dependency, Interval, Package, Version, VersionSet};
use tracing::warn;

use crate::error::{BuildError, Result};

/// Marker variable used for interpreter restrictions.
pub const PYTHON_VERSION: &str = "python_version";

/// Marker variable for bounds finer than a minor series (`3.6.1`).
pub const PYTHON_FULL_VERSION: &str = "python_full_version";

/// Name reported when the package's own interpreter range cannot render.
const PYTHON: &str = "python";

/// Where a conditional requirement is grouped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    /// Extra that activates the requirement.
    pub extra: Option<String>,
    /// Interpreter marker under which it applies.
    pub marker: Option<String>,
}

impl GroupKey {
    /// Requirement activated by `extra` under every interpreter.
    pub fn extra(extra: impl Into<String>) -> Self {
        Self {
            extra: Some(extra.into()),
            marker: None,
        }
    }

    /// Unconditional requirement restricted to interpreters matching `marker`.
    pub fn marker(marker: impl Into<String>) -> Self {
        Self {
            extra: None,
            marker: Some(marker.into()),
        }
    }

    /// The full PEP 508 marker: interpreter clause, extra clause, or both.
    pub fn pep508_marker(&self) -> String {
        let extra = self.extra.as_ref().map(|e| format!("extra == \"{e}\""));
        match (self.marker.as_deref(), extra) {
            (Some(m), Some(e)) if m.contains(" or ") => format!("({m}) and {e}"),
            (Some(m), Some(e)) => format!("{m} and {e}"),
            (Some(m), None) => m.to_string(),
            (None, Some(e)) => e,
            (None, None) => String::new(),
        }
    }
}

/// `extras_require` key form: `extra`, `:marker` or `extra:marker`.
impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(extra) = &self.extra {
            f.write_str(extra)?;
        }
        if let Some(marker) = &self.marker {
            write!(f, ":{marker}")?;
        }
        Ok(())
    }
}

/// A requirement on one distribution, without any condition attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Name including requested features (`cachy[msgpack]`).
    pub name: String,
    /// Comma-joined comparisons (`>=1.0,<2.0`), empty for any version.
    pub specifier: String,
}

impl Requirement {
    /// Render `dependency`'s constraint as comparisons.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ConstraintRender`] if the constraint is made of
    /// disjoint ranges that no comparison list can express.
    pub fn from_dependency(dependency: &Dependency) -> Result<Self> {
        let specifier = render_specifier(&dependency.constraint)
            .map_err(|message| BuildError::constraint(&dependency.name, message))?;
        Ok(Self {
            name: dependency.display_name(),
            specifier,
        })
    }

    /// `name>=1.0,<2.0`, the `setup()` form.
    pub fn compact(&self) -> String {
        format!("{}{}", self.name, self.specifier)
    }

    /// `name (>=1.0,<2.0)`, the `Requires-Dist` form.
    pub fn pep508(&self) -> String {
        if self.specifier.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.specifier)
        }
    }
}

/// Dependencies split into unconditional and conditional requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    /// Unconditional requirements, sorted by [`Requirement::compact`].
    pub plain: Vec<Requirement>,
    /// Conditional requirements by key; each list sorted.
    pub grouped: BTreeMap<GroupKey, Vec<Requirement>>,
    /// Rendered interpreter range, `None` when every interpreter is allowed.
    pub python_requires: Option<String>,
}

impl Projection {
    /// `install_requires` entries.
    pub fn install_requires(&self) -> Vec<String> {
        self.plain.iter().map(Requirement::compact).collect()
    }

    /// `extras_require` table.
    pub fn extras_require(&self) -> BTreeMap<String, Vec<String>> {
        self.grouped
            .iter()
            .map(|(key, reqs)| {
                (
                    key.to_string(),
                    reqs.iter().map(Requirement::compact).collect(),
                )
            })
            .collect()
    }

    /// `Requires-Dist` values: plain requirements first, then each group in
    /// key order with its marker attached.
    pub fn requires_dist(&self) -> Vec<String> {
        let plain = self.plain.iter().map(Requirement::pep508);
        let grouped = self.grouped.iter().flat_map(|(key, reqs)| {
            let marker = key.pep508_marker();
            reqs.iter()
                .map(move |req| format!("{}; {marker}", req.pep508()))
        });
        plain.chain(grouped).collect()
    }
}

/// Project `dependencies` of `package` into plain and grouped requirements.
///
/// Optional dependencies are grouped under every extra that names them and
/// skipped when no extra does. Interpreter restrictions are intersected with
/// the package's own interpreter range; a restriction that covers that whole
/// range adds no marker.
///
/// # Errors
///
/// Returns [`BuildError::ConstraintRender`] if a constraint or the package's
/// interpreter range cannot be rendered, or an interpreter restriction
/// excludes every interpreter the package supports.
pub fn project(package: &Package, dependencies: &[Dependency]) -> Result<Projection> {
    let python_requires = requires_python(&package.python)?;
    let mut plain = Vec::new();
    let mut grouped: BTreeMap<GroupKey, Vec<Requirement>> = BTreeMap::new();

    for dependency in dependencies {
        let requirement = Requirement::from_dependency(dependency)?;
        let marker = python_marker(dependency, &package.python)?;

        if dependency.optional {
            let extras = package.extras_for(&dependency.name);
            if extras.is_empty() {
                warn!(
                    dependency = %dependency.name,
                    "optional dependency is not part of any extra; skipping"
                );
                continue;
            }
            for extra in extras {
                let key = GroupKey {
                    extra: Some(extra.to_string()),
                    marker: marker.clone(),
                };
                grouped.entry(key).or_default().push(requirement.clone());
            }
            continue;
        }

        match marker {
            Some(marker) => grouped
                .entry(GroupKey::marker(marker))
                .or_default()
                .push(requirement),
            None => plain.push(requirement),
        }
    }

    plain.sort_by_key(Requirement::compact);
    for reqs in grouped.values_mut() {
        reqs.sort_by_key(Requirement::compact);
    }
    Ok(Projection {
        plain,
        grouped,
        python_requires,
    })
}

fn python_marker(dependency: &Dependency, package_python: &VersionSet) -> Result<Option<String>> {
    let effective = dependency.python.intersect(package_python);
    if effective.is_empty() {
        return Err(BuildError::constraint(
            &dependency.name,
            format!(
                "interpreter restriction '{}' excludes every supported interpreter ('{}')",
                dependency.python, package_python
            ),
        ));
    }
    if package_python.is_subset_of(&dependency.python) {
        return Ok(None);
    }
    Ok(Some(render_marker(PYTHON_VERSION, &effective)))
}

/// Render a version set as a marker expression over `variable`.
///
/// Each interval becomes a conjunction of comparisons; several intervals are
/// parenthesized and joined with `or`.
pub fn render_marker(variable: &str, set: &VersionSet) -> String {
    let clauses: Vec<String> = set
        .intervals()
        .iter()
        .map(|interval| interval_marker(variable, interval))
        .collect();
    if clauses.len() == 1 {
        return clauses.into_iter().next().unwrap_or_default();
    }
    clauses
        .iter()
        .map(|c| format!("({c})"))
        .collect::<Vec<_>>()
        .join(" or ")
}

fn interval_marker(variable: &str, interval: &Interval) -> String {
    let var = |v: &Version| marker_variable(variable, v);
    if let Some(v) = interval.as_point() {
        return format!("{} == \"{v}\"", var(v));
    }
    let mut parts = Vec::with_capacity(2);
    match &interval.lower {
        Bound::Unbounded => {}
        Bound::Inclusive(v) => parts.push(format!("{} >= \"{v}\"", var(v))),
        Bound::Exclusive(v) => parts.push(format!("{} > \"{v}\"", var(v))),
    }
    match &interval.upper {
        Bound::Unbounded => {}
        Bound::Inclusive(v) => parts.push(format!("{} <= \"{v}\"", var(v))),
        Bound::Exclusive(v) => parts.push(format!("{} < \"{v}\"", var(v))),
    }
    parts.join(" and ")
}

/// `python_version` only holds `major.minor`; longer bounds compare against
/// `python_full_version`.
fn marker_variable<'a>(variable: &'a str, bound: &Version) -> &'a str {
    if variable == PYTHON_VERSION && bound.precision() > 2 {
        PYTHON_FULL_VERSION
    } else {
        variable
    }
}

/// Render a version set as a comma-joined comparison list.
///
/// Disjoint ranges are only expressible when every gap is a single excluded
/// version (`>=1.0,!=1.5,<2.0`).
///
/// # Errors
///
/// Returns a description of the problem when the set is empty or has a gap
/// wider than one version.
pub fn render_specifier(set: &VersionSet) -> std::result::Result<String, String> {
    let intervals = set.intervals();
    match intervals {
        [] => return Err("constraint admits no version".to_string()),
        [only] if only.is_full() => return Ok(String::new()),
        [only] => return Ok(only.to_string()),
        _ => {}
    }

    let mut parts: Vec<String> = intervals
        .first()
        .and_then(|first| lower_clause(&first.lower))
        .into_iter()
        .collect();
    for pair in intervals.windows(2) {
        match (&pair[0].upper, &pair[1].lower) {
            (Bound::Exclusive(a), Bound::Exclusive(b)) if a == b => parts.push(format!("!={a}")),
            _ => {
                return Err(format!(
                    "'{set}' spans disjoint ranges and cannot be written as a requirement"
                ));
            }
        }
    }
    parts.extend(intervals.last().and_then(|last| upper_clause(&last.upper)));
    Ok(parts.join(","))
}

fn lower_clause(bound: &Bound) -> Option<String> {
    match bound {
        Bound::Unbounded => None,
        Bound::Inclusive(v) => Some(format!(">={v}")),
        Bound::Exclusive(v) => Some(format!(">{v}")),
    }
}

fn upper_clause(bound: &Bound) -> Option<String> {
    match bound {
        Bound::Unbounded => None,
        Bound::Inclusive(v) => Some(format!("<={v}")),
        Bound::Exclusive(v) => Some(format!("<{v}")),
    }
}

/// Final minor release of each closed interpreter series.
const FINAL_MINOR: [(u64, u64); 2] = [(1, 6), (2, 7)];

/// Render the package's interpreter range for `Requires-Python` /
/// `python_requires`. Returns `None` when every interpreter is supported.
///
/// Gaps between ranges are written as `!=X.Y.*` exclusions over the minor
/// series that exist, so `~2.7 || ^3.6` becomes
/// `>=2.7,!=3.0.*,!=3.1.*,!=3.2.*,!=3.3.*,!=3.4.*,!=3.5.*,<4.0`.
///
/// # Errors
///
/// Returns [`BuildError::ConstraintRender`] if the range is empty or has a
/// gap that does not line up with whole minor series.
pub fn requires_python(python: &VersionSet) -> Result<Option<String>> {
    if python.is_any() {
        return Ok(None);
    }
    let intervals = python.intervals();
    let (Some(first), Some(last)) = (intervals.first(), intervals.last()) else {
        return Err(BuildError::constraint(
            PYTHON,
            "interpreter range admits no version",
        ));
    };

    let mut parts: Vec<String> = lower_clause(&first.lower).into_iter().collect();
    for pair in intervals.windows(2) {
        let exclusions = gap_exclusions(&pair[0].upper, &pair[1].lower).ok_or_else(|| {
            BuildError::constraint(
                PYTHON,
                format!("interpreter range '{python}' has a gap that cannot be written as exclusions"),
            )
        })?;
        parts.extend(exclusions);
    }
    parts.extend(upper_clause(&last.upper));
    Ok(Some(parts.join(",")))
}

/// Exclusions for the versions between `below` (upper bound of one range)
/// and `above` (lower bound of the next).
fn gap_exclusions(below: &Bound, above: &Bound) -> Option<Vec<String>> {
    match (below, above) {
        (Bound::Exclusive(a), Bound::Exclusive(b)) if a == b => Some(vec![format!("!={a}")]),
        (Bound::Exclusive(start), Bound::Inclusive(end)) => {
            let end = minor_series(end)?;
            let mut series = minor_series(start)?;
            let mut exclusions = Vec::new();
            while series < end {
                let (major, minor) = series;
                match FINAL_MINOR.iter().find(|(m, _)| *m == major) {
                    Some(&(_, last)) if minor > last => {
                        series = (major + 1, 0);
                        continue;
                    }
                    None if end.0 > major => return None,
                    _ => {}
                }
                exclusions.push(format!("!={major}.{minor}.*"));
                series = (major, minor + 1);
            }
            Some(exclusions)
        }
        _ => None,
    }
}

/// `(major, minor)` of a version that opens a minor series (`3.6`, `3.6.0`).
fn minor_series(v: &Version) -> Option<(u64, u64)> {
    let aligned = v.is_final() && v.release().iter().skip(2).all(|c| *c == 0);
    aligned.then(|| (v.major(), v.minor()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(name: &str, constraint: &str) -> Dependency {
        Dependency::new(name, constraint).unwrap()
    }

    fn compact(reqs: &[Requirement]) -> Vec<String> {
        reqs.iter().map(Requirement::compact).collect()
    }

    fn package() -> Package {
        Package::new("foo", "1.2.3".parse().unwrap())
    }

    const PY_27_36: &str = "(python_version >= \"2.7\" and python_version < \"2.8\") \
                            or (python_version >= \"3.6\" and python_version < \"4.0\")";

    #[test]
    fn plain_dependencies_render_sorted() {
        let result = project(
            &package(),
            &[dep("C", "1.2.3"), dep("A", "^1.0"), dep("B", "~1.0")],
        )
        .unwrap();

        assert_eq!(
            result.install_requires(),
            vec!["A>=1.0,<2.0", "B>=1.0,<1.1", "C==1.2.3"]
        );
        assert!(result.grouped.is_empty());
    }

    #[test]
    fn optional_dependency_groups_under_its_extra() {
        let mut pkg = package();
        pkg.extras.insert("bar".into(), vec!["A".into()]);

        let result = project(
            &pkg,
            &[
                dep("A", ">=1.2").optional(),
                dep("B", ">=1.0 <2.0"),
                dep("C", "==1.2.3"),
            ],
        )
        .unwrap();

        assert_eq!(result.install_requires(), vec!["B>=1.0,<2.0", "C==1.2.3"]);
        assert_eq!(
            result.extras_require(),
            BTreeMap::from([("bar".to_string(), vec!["A>=1.2".to_string()])])
        );
    }

    #[test]
    fn interpreter_restrictions_become_marker_groups() {
        let mut pkg = package();
        pkg.extras.insert("baz".into(), vec!["D".into()]);

        let c = dep("C", "1.2.3").with_python("~2.7 || ^3.6").unwrap();
        let d = dep("D", "3.4.5")
            .optional()
            .with_python("~2.7 || ^3.4")
            .unwrap();

        let result = project(
            &pkg,
            &[dep("A", ">=1.2").optional(), dep("B", "~1.0"), c, d],
        )
        .unwrap();

        assert_eq!(result.install_requires(), vec!["B>=1.0,<1.1"]);

        let c_key = format!(":{PY_27_36}");
        let d_key = "baz:(python_version >= \"2.7\" and python_version < \"2.8\") \
                     or (python_version >= \"3.4\" and python_version < \"4.0\")";
        assert_eq!(
            result.extras_require(),
            BTreeMap::from([
                (c_key, vec!["C==1.2.3".to_string()]),
                (d_key.to_string(), vec!["D==3.4.5".to_string()]),
            ])
        );
    }

    #[test]
    fn identical_keys_merge_into_one_group() {
        let mut pkg = package();
        pkg.extras.insert("web".into(), vec!["flask".into(), "jinja2".into()]);

        let result = project(
            &pkg,
            &[
                dep("jinja2", "^2.10").optional(),
                dep("flask", "^1.0").optional(),
            ],
        )
        .unwrap();

        assert_eq!(result.grouped.len(), 1);
        assert_eq!(
            compact(&result.grouped[&GroupKey::extra("web")]),
            vec!["flask>=1.0,<2.0", "jinja2>=2.10,<3.0"]
        );
    }

    #[test]
    fn extra_and_marker_keys_stay_distinct() {
        let mut pkg = package();
        pkg.extras.insert("bar".into(), vec!["A".into(), "B".into()]);

        let result = project(
            &pkg,
            &[
                dep("A", "*").optional(),
                dep("B", "*").optional().with_python("^3.6").unwrap(),
            ],
        )
        .unwrap();

        assert_eq!(result.grouped.len(), 2);
        assert!(result.grouped.contains_key(&GroupKey::extra("bar")));
        let marked = GroupKey {
            extra: Some("bar".into()),
            marker: Some("python_version >= \"3.6\" and python_version < \"4.0\"".into()),
        };
        assert_eq!(compact(&result.grouped[&marked]), vec!["B"]);
    }

    #[test]
    fn restriction_covering_package_range_adds_no_marker() {
        let mut pkg = package();
        pkg.python = "^3.6".parse().unwrap();

        let result = project(
            &pkg,
            &[dep("C", "1.2.3").with_python("~2.7 || ^3.6").unwrap()],
        )
        .unwrap();
        assert_eq!(result.install_requires(), vec!["C==1.2.3"]);
    }

    #[test]
    fn restriction_is_narrowed_to_package_range() {
        let mut pkg = package();
        pkg.python = ">=2.7".parse().unwrap();

        let result = project(
            &pkg,
            &[dep("C", "1.2.3").with_python("~2.7 || ^3.6").unwrap()],
        )
        .unwrap();
        assert_eq!(
            result.grouped.keys().next().and_then(|k| k.marker.clone()),
            Some(PY_27_36.to_string())
        );
    }

    #[test]
    fn impossible_restriction_is_an_error() {
        let mut pkg = package();
        pkg.python = "^3.6".parse().unwrap();

        let err = project(&pkg, &[dep("C", "*").with_python("~2.7").unwrap()]).unwrap_err();
        assert!(matches!(err, BuildError::ConstraintRender { ref dependency, .. } if dependency == "C"));
    }

    #[test]
    fn disjoint_constraint_cannot_render() {
        let err = project(&package(), &[dep("X", "^1.0 || ^3.0")]).unwrap_err();
        assert!(matches!(err, BuildError::ConstraintRender { ref dependency, .. } if dependency == "X"));
    }

    #[test]
    fn single_point_gaps_render_as_exclusions() {
        let set: VersionSet = ">=1.0,!=1.5,<2.0".parse().unwrap();
        assert_eq!(render_specifier(&set).unwrap(), ">=1.0,!=1.5,<2.0");
        let set: VersionSet = "!=1.5".parse().unwrap();
        assert_eq!(render_specifier(&set).unwrap(), "!=1.5");
    }

    #[test]
    fn requires_dist_attaches_markers() {
        let mut pkg = package();
        pkg.extras.insert("baz".into(), vec!["D".into()]);
        let c = dep("C", "1.2.3").with_python("~2.7 || ^3.6").unwrap();
        let d = dep("D", "^3.4").optional().with_python(">=3.6").unwrap();

        let result = project(&pkg, &[dep("B", "~1.0"), c, d, dep("E", "*")]).unwrap();
        assert_eq!(
            result.requires_dist(),
            vec![
                "B (>=1.0,<1.1)".to_string(),
                "E".to_string(),
                format!("C (==1.2.3); {PY_27_36}"),
                "D (>=3.4,<4.0); python_version >= \"3.6\" and extra == \"baz\"".to_string(),
            ]
        );
    }

    #[test]
    fn union_marker_is_parenthesized_before_extra() {
        let key = GroupKey {
            extra: Some("baz".into()),
            marker: Some(PY_27_36.into()),
        };
        assert_eq!(
            key.pep508_marker(),
            format!("({PY_27_36}) and extra == \"baz\"")
        );
    }

    #[test]
    fn requires_python_excludes_gaps_by_minor_series() {
        assert_eq!(requires_python(&VersionSet::any()).unwrap(), None);
        assert_eq!(
            requires_python(&"^3.6".parse().unwrap()).unwrap().as_deref(),
            Some(">=3.6,<4.0")
        );
        assert_eq!(
            requires_python(&"~2.7 || ^3.4".parse().unwrap()).unwrap().as_deref(),
            Some(">=2.7,!=3.0.*,!=3.1.*,!=3.2.*,!=3.3.*,<4.0")
        );
    }

    #[test]
    fn rendered_interpreter_range_admits_only_supported_versions() {
        let python: VersionSet = "~2.7 || ^3.6".parse().unwrap();
        let rendered = requires_python(&python).unwrap().unwrap();
        assert_eq!(
            rendered,
            ">=2.7,!=3.0.*,!=3.1.*,!=3.2.*,!=3.3.*,!=3.4.*,!=3.5.*,<4.0"
        );

        let reparsed: VersionSet = rendered.parse().unwrap();
        for version in ["2.7", "2.7.18", "3.6", "3.9.1"] {
            assert!(reparsed.contains(&version.parse().unwrap()), "{version}");
        }
        for version in ["3.0", "3.4", "3.5.9", "4.0"] {
            assert!(!reparsed.contains(&version.parse().unwrap()), "{version}");
        }
    }

    #[test]
    fn misaligned_interpreter_gap_is_an_error() {
        let python: VersionSet = ">=3.6,<3.7.2 || >=3.8".parse().unwrap();
        let err = requires_python(&python).unwrap_err();
        assert!(matches!(err, BuildError::ConstraintRender { ref dependency, .. } if dependency == "python"));

        let open_series: VersionSet = "^3.6 || ^5.0".parse().unwrap();
        assert!(requires_python(&open_series).is_err());
    }

    #[test]
    fn patch_level_bounds_use_full_version() {
        let set: VersionSet = ">=3.6.1,<4.0".parse().unwrap();
        assert_eq!(
            render_marker(PYTHON_VERSION, &set),
            "python_full_version >= \"3.6.1\" and python_version < \"4.0\""
        );
        assert_eq!(
            render_marker(PYTHON_VERSION, &VersionSet::exact("3.7.4".parse().unwrap())),
            "python_full_version == \"3.7.4\""
        );
    }

    #[test]
    fn features_are_kept_in_requirement_names() {
        let cachy = dep("cachy", "^0.2.0").with_features(["msgpack"]);
        let result = project(&package(), &[cachy]).unwrap();
        assert_eq!(result.install_requires(), vec!["cachy[msgpack]>=0.2.0,<0.3.0"]);
    }
}
