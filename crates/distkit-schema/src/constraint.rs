//! Version constraints as sets of disjoint intervals.
//!
//! Every constraint the project file can express (`^1.2`, `~2.7 || ^3.6`,
//! `>=1.0,<2.0`, `!=1.5`, `1.2.*`) parses into a [`VersionSet`]: a sorted list
//! of non-overlapping, non-adjacent [`Interval`]s. Intersection, union and
//! containment are interval arithmetic, so composing constraints never has to
//! reason about their textual form.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::version::Version;

/// Errors raised while parsing versions and constraints.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    /// The text is not a version.
    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    /// The text is not a constraint this parser understands.
    #[error("invalid constraint '{0}'")]
    InvalidConstraint(String),
}

/// One end of an [`Interval`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    /// No limit on this side.
    Unbounded,
    /// The version itself is part of the interval.
    Inclusive(Version),
    /// The version itself is excluded.
    Exclusive(Version),
}

impl Bound {
    /// The bounding version, if any.
    pub fn version(&self) -> Option<&Version> {
        match self {
            Self::Unbounded => None,
            Self::Inclusive(v) | Self::Exclusive(v) => Some(v),
        }
    }

    fn is_inclusive(&self) -> bool {
        matches!(self, Self::Inclusive(_))
    }
}

fn cmp_lower(a: &Bound, b: &Bound) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Less,
        (_, Bound::Unbounded) => Ordering::Greater,
        (a, b) => a
            .version()
            .cmp(&b.version())
            .then_with(|| b.is_inclusive().cmp(&a.is_inclusive())),
    }
}

fn cmp_upper(a: &Bound, b: &Bound) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Greater,
        (_, Bound::Unbounded) => Ordering::Less,
        (a, b) => a
            .version()
            .cmp(&b.version())
            .then_with(|| a.is_inclusive().cmp(&b.is_inclusive())),
    }
}

/// A contiguous range of versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    /// Lower end.
    pub lower: Bound,
    /// Upper end.
    pub upper: Bound,
}

impl Interval {
    /// Build an interval; returns `None` when it would contain nothing.
    pub fn new(lower: Bound, upper: Bound) -> Option<Self> {
        let interval = Self { lower, upper };
        (!interval.is_empty()).then_some(interval)
    }

    /// The single version `v`.
    pub fn point(v: Version) -> Self {
        Self {
            lower: Bound::Inclusive(v.clone()),
            upper: Bound::Inclusive(v),
        }
    }

    /// If the interval holds exactly one version, return it.
    pub fn as_point(&self) -> Option<&Version> {
        match (&self.lower, &self.upper) {
            (Bound::Inclusive(a), Bound::Inclusive(b)) if a == b => Some(a),
            _ => None,
        }
    }

    /// Whether both ends are unbounded.
    pub fn is_full(&self) -> bool {
        self.lower == Bound::Unbounded && self.upper == Bound::Unbounded
    }

    fn is_empty(&self) -> bool {
        match (self.lower.version(), self.upper.version()) {
            (Some(lo), Some(hi)) => match lo.cmp(hi) {
                Ordering::Greater => true,
                Ordering::Equal => !(self.lower.is_inclusive() && self.upper.is_inclusive()),
                Ordering::Less => false,
            },
            _ => false,
        }
    }

    /// Whether `v` lies inside the interval.
    pub fn contains(&self, v: &Version) -> bool {
        let above = match &self.lower {
            Bound::Unbounded => true,
            Bound::Inclusive(lo) => v >= lo,
            Bound::Exclusive(lo) => v > lo,
        };
        let below = match &self.upper {
            Bound::Unbounded => true,
            Bound::Inclusive(hi) => v <= hi,
            Bound::Exclusive(hi) => v < hi,
        };
        above && below
    }

    fn intersect(&self, other: &Self) -> Option<Self> {
        let lower = if cmp_lower(&self.lower, &other.lower).is_ge() {
            self.lower.clone()
        } else {
            other.lower.clone()
        };
        let upper = if cmp_upper(&self.upper, &other.upper).is_le() {
            self.upper.clone()
        } else {
            other.upper.clone()
        };
        Self::new(lower, upper)
    }

    /// Whether `next` (which starts no earlier than `self`) overlaps or abuts
    /// `self` so that the two can be merged into one interval.
    fn touches(&self, next: &Self) -> bool {
        match (self.upper.version(), next.lower.version()) {
            (None, _) | (_, None) => true,
            (Some(hi), Some(lo)) => match lo.cmp(hi) {
                Ordering::Less => true,
                Ordering::Equal => self.upper.is_inclusive() || next.lower.is_inclusive(),
                Ordering::Greater => false,
            },
        }
    }
}

/// A set of versions: the union of disjoint, sorted intervals.
///
/// # Example
///
/// ```
/// use distkit_schema::VersionSet;
///
/// let python: VersionSet = "~2.7 || ^3.6".parse().unwrap();
/// assert_eq!(python.intervals().len(), 2);
/// assert!(python.allows_any(&">=2.0,<3.0".parse().unwrap()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSet {
    intervals: Vec<Interval>,
}

impl Default for VersionSet {
    fn default() -> Self {
        Self::any()
    }
}

impl VersionSet {
    /// Every version.
    pub fn any() -> Self {
        Self {
            intervals: vec![Interval {
                lower: Bound::Unbounded,
                upper: Bound::Unbounded,
            }],
        }
    }

    /// No version at all.
    pub fn empty() -> Self {
        Self {
            intervals: Vec::new(),
        }
    }

    /// Exactly `v`.
    pub fn exact(v: Version) -> Self {
        Self {
            intervals: vec![Interval::point(v)],
        }
    }

    /// A single range; empty if the bounds cross.
    pub fn range(lower: Bound, upper: Bound) -> Self {
        Self::from_intervals(Interval::new(lower, upper).into_iter().collect())
    }

    /// Normalize arbitrary intervals into sorted, merged form.
    pub fn from_intervals(mut intervals: Vec<Interval>) -> Self {
        intervals.retain(|i| !i.is_empty());
        intervals.sort_by(|a, b| cmp_lower(&a.lower, &b.lower));

        let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
        for next in intervals {
            match merged.last_mut() {
                Some(last) if last.touches(&next) => {
                    if cmp_upper(&next.upper, &last.upper).is_gt() {
                        last.upper = next.upper;
                    }
                }
                _ => merged.push(next),
            }
        }
        Self { intervals: merged }
    }

    /// The disjoint intervals, lowest first.
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Whether every version is allowed.
    pub fn is_any(&self) -> bool {
        self.intervals.len() == 1 && self.intervals[0].is_full()
    }

    /// Whether no version is allowed.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Whether `v` is in the set.
    pub fn contains(&self, v: &Version) -> bool {
        self.intervals.iter().any(|i| i.contains(v))
    }

    /// Versions allowed by both sets.
    pub fn intersect(&self, other: &Self) -> Self {
        let pieces = self
            .intervals
            .iter()
            .flat_map(|a| other.intervals.iter().filter_map(move |b| a.intersect(b)))
            .collect();
        Self::from_intervals(pieces)
    }

    /// Versions allowed by either set.
    pub fn union(&self, other: &Self) -> Self {
        let mut pieces = self.intervals.clone();
        pieces.extend(other.intervals.iter().cloned());
        Self::from_intervals(pieces)
    }

    /// Whether at least one version satisfies both sets.
    pub fn allows_any(&self, other: &Self) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Whether every version in `self` is also in `other`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        &self.intersect(other) == self
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(v) = self.as_point() {
            return write!(f, "=={v}");
        }
        let lower = match &self.lower {
            Bound::Unbounded => None,
            Bound::Inclusive(v) => Some(format!(">={v}")),
            Bound::Exclusive(v) => Some(format!(">{v}")),
        };
        let upper = match &self.upper {
            Bound::Unbounded => None,
            Bound::Inclusive(v) => Some(format!("<={v}")),
            Bound::Exclusive(v) => Some(format!("<{v}")),
        };
        match (lower, upper) {
            (None, None) => f.write_str("*"),
            (Some(lo), None) => f.write_str(&lo),
            (None, Some(hi)) => f.write_str(&hi),
            (Some(lo), Some(hi)) => write!(f, "{lo},{hi}"),
        }
    }
}

impl fmt::Display for VersionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("<empty>");
        }
        let parts: Vec<String> = self.intervals.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(" || "))
    }
}

impl FromStr for VersionSet {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() {
            return Err(ConstraintError::InvalidConstraint(s.to_string()));
        }

        let mut result = Self::empty();
        for alternative in text.split("||").flat_map(|a| a.split('|')) {
            let terms = terms(alternative);
            if terms.is_empty() {
                return Err(ConstraintError::InvalidConstraint(s.to_string()));
            }
            let mut set = Self::any();
            for term in terms {
                set = set.intersect(&parse_term(&term)?);
            }
            result = result.union(&set);
        }
        Ok(result)
    }
}

/// Split one `||` alternative into its AND-ed terms, gluing an operator that
/// was separated from its version by whitespace (`>= 1.0`).
fn terms(alternative: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;
    for token in alternative
        .split(',')
        .flat_map(str::split_whitespace)
        .filter(|t| !t.is_empty())
    {
        if token.chars().all(|c| "<>=!~^".contains(c)) {
            pending_op = Some(token.to_string());
            continue;
        }
        match pending_op.take() {
            Some(op) => out.push(format!("{op}{token}")),
            None => out.push(token.to_string()),
        }
    }
    if let Some(op) = pending_op {
        out.push(op);
    }
    out
}

fn parse_version(text: &str, whole: &str) -> Result<Version, ConstraintError> {
    text.parse()
        .map_err(|_| ConstraintError::InvalidConstraint(whole.to_string()))
}

/// `1.2.*` → `>=1.2,<1.3`
fn wildcard(prefix: &str, whole: &str) -> Result<VersionSet, ConstraintError> {
    if prefix.is_empty() {
        return Ok(VersionSet::any());
    }
    let base = parse_version(prefix, whole)?;
    let upper = base.bump(base.precision() - 1);
    Ok(VersionSet::range(
        Bound::Inclusive(base),
        Bound::Exclusive(upper),
    ))
}

fn not_equal(v: Version) -> VersionSet {
    VersionSet::from_intervals(vec![
        Interval {
            lower: Bound::Unbounded,
            upper: Bound::Exclusive(v.clone()),
        },
        Interval {
            lower: Bound::Exclusive(v),
            upper: Bound::Unbounded,
        },
    ])
}

fn parse_term(term: &str) -> Result<VersionSet, ConstraintError> {
    use Bound::{Exclusive, Inclusive, Unbounded};

    if term == "*" {
        return Ok(VersionSet::any());
    }

    if let Some(rest) = term.strip_prefix('^') {
        let v = parse_version(rest, term)?;
        let upper = v.next_breaking();
        return Ok(VersionSet::range(Inclusive(v), Exclusive(upper)));
    }
    if let Some(rest) = term.strip_prefix("~=") {
        let v = parse_version(rest, term)?;
        if v.precision() < 2 {
            return Err(ConstraintError::InvalidConstraint(term.to_string()));
        }
        let upper = v.bump(v.precision() - 2);
        return Ok(VersionSet::range(Inclusive(v), Exclusive(upper)));
    }
    if let Some(rest) = term.strip_prefix('~') {
        let v = parse_version(rest, term)?;
        let upper = if v.precision() == 1 {
            v.next_major()
        } else {
            v.next_minor()
        };
        return Ok(VersionSet::range(Inclusive(v), Exclusive(upper)));
    }

    let (op, rest) = ["==", "!=", ">=", "<=", ">", "<", "="]
        .iter()
        .find_map(|op| term.strip_prefix(op).map(|rest| (*op, rest)))
        .unwrap_or(("==", term));

    if let Some(prefix) = rest.strip_suffix(".*").or_else(|| rest.strip_suffix('*')) {
        let prefix = prefix.trim_end_matches('.');
        return match op {
            "==" | "=" => wildcard(prefix, term),
            "!=" => {
                let excluded = wildcard(prefix, term)?;
                Ok(match excluded.intervals() {
                    [Interval {
                        lower: Inclusive(lo),
                        upper: Exclusive(hi),
                    }] => VersionSet::from_intervals(vec![
                        Interval {
                            lower: Unbounded,
                            upper: Exclusive(lo.clone()),
                        },
                        Interval {
                            lower: Inclusive(hi.clone()),
                            upper: Unbounded,
                        },
                    ]),
                    _ => VersionSet::empty(),
                })
            }
            _ => Err(ConstraintError::InvalidConstraint(term.to_string())),
        };
    }

    let v = parse_version(rest, term)?;
    Ok(match op {
        "==" | "=" => VersionSet::exact(v),
        "!=" => not_equal(v),
        ">=" => VersionSet::range(Inclusive(v), Unbounded),
        ">" => VersionSet::range(Exclusive(v), Unbounded),
        "<=" => VersionSet::range(Unbounded, Inclusive(v)),
        _ => VersionSet::range(Unbounded, Exclusive(v)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(s: &str) -> VersionSet {
        s.parse().unwrap()
    }

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn caret_and_tilde_render_with_original_precision() {
        assert_eq!(set("^1.0").to_string(), ">=1.0,<2.0");
        assert_eq!(set("~1.0").to_string(), ">=1.0,<1.1");
        assert_eq!(set("^0.2.0").to_string(), ">=0.2.0,<0.3.0");
        assert_eq!(set("~=1.2").to_string(), ">=1.2,<2.0");
        assert_eq!(set("~=1.2.3").to_string(), ">=1.2.3,<1.3.0");
        assert_eq!(set("1.2.3").to_string(), "==1.2.3");
    }

    #[test]
    fn comma_and_space_both_mean_and() {
        assert_eq!(set(">=1.0,<2.0"), set(">=1.0 <2.0"));
        assert_eq!(set(">= 1.0, < 2.0").to_string(), ">=1.0,<2.0");
    }

    #[test]
    fn union_keeps_disjoint_ranges_apart() {
        let s = set("~2.7 || ^3.6");
        assert_eq!(s.intervals().len(), 2);
        assert_eq!(s.to_string(), ">=2.7,<2.8 || >=3.6,<4.0");
        assert!(s.contains(&v("2.7.15")));
        assert!(!s.contains(&v("3.5")));
    }

    #[test]
    fn union_merges_adjacent_ranges() {
        let s = set(">=1.0,<2.0 || >=2.0,<3.0");
        assert_eq!(s.to_string(), ">=1.0,<3.0");

        let s = set(">=1.0,<2.0 || >1.5,<2.5");
        assert_eq!(s.to_string(), ">=1.0,<2.5");
    }

    #[test]
    fn gap_at_single_point_is_not_merged() {
        let s = set(">=1.0,<2.0 || >2.0,<3.0");
        assert_eq!(s.intervals().len(), 2);
        assert!(!s.contains(&v("2.0")));
    }

    #[test]
    fn not_equal_splits_the_line() {
        let s = set(">=1.0,!=1.5,<2.0");
        assert_eq!(s.intervals().len(), 2);
        assert!(!s.contains(&v("1.5")));
        assert!(s.contains(&v("1.5.1")));
    }

    #[test]
    fn wildcards_become_ranges() {
        assert_eq!(set("1.2.*").to_string(), ">=1.2,<1.3");
        assert_eq!(set("==3.*").to_string(), ">=3,<4");
        assert!(set("*").is_any());
        let s = set("!=1.*");
        assert!(!s.contains(&v("1.4")));
        assert!(s.contains(&v("2.0")));
    }

    #[test]
    fn intersection_and_overlap() {
        let python = set("~2.7 || ^3.4");
        let py2 = set(">=2.0.0 <3.0.0");
        assert!(python.allows_any(&py2));
        assert!(!set(">=3.6").allows_any(&py2));
        assert_eq!(python.intersect(&set(">=3.6")).to_string(), ">=3.6,<4.0");
        assert!(set("^3.6").is_subset_of(&python));
        assert!(!python.is_subset_of(&set("^3.6")));
        assert!(set(">=2.0").intersect(&set("<1.0")).is_empty());
    }

    #[test]
    fn rejects_malformed_terms() {
        assert!("".parse::<VersionSet>().is_err());
        assert!(">=banana".parse::<VersionSet>().is_err());
        assert!("~=1".parse::<VersionSet>().is_err());
        assert!(">1.*".parse::<VersionSet>().is_err());
    }
}
