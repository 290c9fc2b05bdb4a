//! Release versions that remember how they were written.
//!
//! Requirement strings are rendered from the bounds of parsed constraints, and
//! installers compare them textually against what the author wrote: `^1.0`
//! must come back out as `>=1.0,<2.0`, not `>=1.0.0,<2.0.0`. [`Version`]
//! therefore keeps its original precision (the number of release components)
//! while still comparing numerically, with missing components treated as zero.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::constraint::ConstraintError;

/// Pre-release phase, ordered the way installers order them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreLabel {
    /// `.dev` snapshots sort before every other pre-release.
    Dev,
    /// `a` / `alpha`
    Alpha,
    /// `b` / `beta`
    Beta,
    /// `rc` / `c` / `pre` / `preview`
    Rc,
}

impl PreLabel {
    fn parse(label: &str) -> Option<Self> {
        match label {
            "dev" => Some(Self::Dev),
            "a" | "alpha" => Some(Self::Alpha),
            "b" | "beta" => Some(Self::Beta),
            "rc" | "c" | "pre" | "preview" => Some(Self::Rc),
            _ => None,
        }
    }
}

/// A pre-release marker such as `b1` or `rc2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PreRelease {
    /// Phase of the pre-release.
    pub label: PreLabel,
    /// Sequence number within the phase (`0` when omitted).
    pub number: u64,
}

/// A parsed release version.
///
/// Two versions are equal when they compare equal numerically, so `1.0` and
/// `1.0.0` are the same version even though they display differently.
///
/// # Example
///
/// ```
/// use distkit_schema::Version;
///
/// let v: Version = "3.6".parse().unwrap();
/// assert_eq!(v.next_major().to_string(), "4.0");
/// assert_eq!(v, "3.6.0".parse().unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct Version {
    release: Vec<u64>,
    pre: Option<PreRelease>,
    post: Option<u64>,
    local: Option<String>,
    text: String,
}

impl Version {
    /// Build a final release from its components, e.g. `&[2, 7]`.
    ///
    /// # Panics
    ///
    /// Panics if `release` is empty.
    pub fn from_release(release: &[u64]) -> Self {
        assert!(!release.is_empty(), "a version needs at least one component");
        let text = release
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".");
        Self {
            release: release.to_vec(),
            pre: None,
            post: None,
            local: None,
            text,
        }
    }

    /// Release components as written (`1.2` has two).
    pub fn release(&self) -> &[u64] {
        &self.release
    }

    /// Number of release components the version was written with.
    pub fn precision(&self) -> usize {
        self.release.len()
    }

    /// Pre-release marker, if any.
    pub fn pre(&self) -> Option<PreRelease> {
        self.pre
    }

    /// Whether this is a pre-release.
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }

    /// Post-release number (`1.0.post2` → `2`).
    pub fn post(&self) -> Option<u64> {
        self.post
    }

    /// Local version label, normalized to `.`-separated lowercase.
    pub fn local(&self) -> Option<&str> {
        self.local.as_deref()
    }

    /// A plain release: no pre-release, post-release or local label.
    pub fn is_final(&self) -> bool {
        self.pre.is_none() && self.post.is_none() && self.local.is_none()
    }

    /// Component at `index`, zero when the version was written shorter.
    pub fn component(&self, index: usize) -> u64 {
        self.release.get(index).copied().unwrap_or(0)
    }

    /// Major component.
    pub fn major(&self) -> u64 {
        self.component(0)
    }

    /// Minor component.
    pub fn minor(&self) -> u64 {
        self.component(1)
    }

    /// Patch component.
    pub fn patch(&self) -> u64 {
        self.component(2)
    }

    /// Increment the component at `index`, zero everything after it, and keep
    /// the original precision (extended to `index + 1` components if needed).
    pub fn bump(&self, index: usize) -> Self {
        let len = self.precision().max(index + 1);
        let mut release: Vec<u64> = (0..len).map(|i| self.component(i)).collect();
        release[index] += 1;
        for part in &mut release[index + 1..] {
            *part = 0;
        }
        Self::from_release(&release)
    }

    /// Next major release: `1.2` → `2.0`.
    pub fn next_major(&self) -> Self {
        self.bump(0)
    }

    /// Next minor release: `2.7` → `2.8`, `1` → `1.1`.
    pub fn next_minor(&self) -> Self {
        self.bump(1)
    }

    /// Next patch release: `0.0.3` → `0.0.4`.
    pub fn next_patch(&self) -> Self {
        self.bump(2)
    }

    /// Upper bound of a caret range.
    ///
    /// The left-most non-zero component is the breaking one, but only among
    /// the components that were actually written: `^0.2.0` → `0.3.0`,
    /// `^0.0.3` → `0.0.4`, `^0` → `1`.
    pub fn next_breaking(&self) -> Self {
        if self.major() > 0 || self.precision() == 1 {
            return self.next_major();
        }
        if self.minor() > 0 || self.precision() == 2 {
            return self.next_minor();
        }
        self.next_patch()
    }

    fn padded_cmp(&self, other: &Self) -> Ordering {
        let len = self.precision().max(other.precision());
        for i in 0..len {
            match self.component(i).cmp(&other.component(i)) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }
        let pre = match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(b),
        };
        pre.then(self.post.cmp(&other.post))
            .then_with(|| cmp_local(self.local.as_deref(), other.local.as_deref()))
    }
}

/// Local labels compare segment by segment; numeric segments sort after
/// alphanumeric ones and against each other by value.
fn cmp_local(a: Option<&str>, b: Option<&str>) -> Ordering {
    let (a, b) = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
        (Some(a), Some(b)) => (a, b),
    };
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        let ordering = match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match (x.parse::<u64>(), y.parse::<u64>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                (Ok(_), Err(_)) => Ordering::Greater,
                (Err(_), Ok(_)) => Ordering::Less,
                (Err(_), Err(_)) => x.cmp(y),
            },
        };
        if ordering.is_ne() {
            return ordering;
        }
    }
}

/// Everything after the release components.
#[derive(Default)]
struct Suffix {
    pre: Option<PreRelease>,
    post: Option<u64>,
    local: Option<String>,
}

impl Suffix {
    /// Parse `b1`, `.post2`, `-3`, `rc1.post1` and `+local.7`.
    fn parse(text: &str) -> Option<Self> {
        let (public, local) = match text.split_once('+') {
            Some((public, local)) => (public, Some(local)),
            None => (text, None),
        };
        let local = match local {
            Some(local) => Some(parse_local(local)?),
            None => None,
        };
        let mut suffix = Self {
            local,
            ..Self::default()
        };

        let public = public.to_ascii_lowercase();
        let mut rest = public.as_str();
        while !rest.is_empty() {
            let implicit_post = rest.starts_with('-');
            rest = rest.trim_start_matches(['-', '_', '.']);
            let label_end = rest
                .find(|c: char| !c.is_ascii_alphabetic())
                .unwrap_or(rest.len());
            let (label, tail) = rest.split_at(label_end);
            let tail = tail.trim_start_matches(['-', '_', '.']);
            let digits_end = tail
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(tail.len());
            let (digits, tail) = tail.split_at(digits_end);
            let number = if digits.is_empty() {
                0
            } else {
                digits.parse().ok()?
            };

            match label {
                "post" | "rev" | "r" if suffix.post.is_none() => suffix.post = Some(number),
                "" if implicit_post && !digits.is_empty() && suffix.post.is_none() => {
                    suffix.post = Some(number);
                }
                _ => {
                    let label = PreLabel::parse(label)?;
                    if suffix.pre.is_some() || suffix.post.is_some() {
                        return None;
                    }
                    suffix.pre = Some(PreRelease { label, number });
                }
            }
            rest = tail;
        }
        Some(suffix)
    }
}

/// `ubuntu-1_2` → `ubuntu.1.2`; `None` for empty or non-alphanumeric segments.
fn parse_local(local: &str) -> Option<String> {
    let segments: Vec<&str> = local.split(['.', '-', '_']).collect();
    let valid = segments
        .iter()
        .all(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()));
    valid.then(|| segments.join(".").to_ascii_lowercase())
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.padded_cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.padded_cmp(other)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Version {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let body = text.strip_prefix('v').unwrap_or(text);
        let invalid = || ConstraintError::InvalidVersion(text.to_string());

        let release_end = body
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(body.len());
        let (release_text, rest) = body.split_at(release_end);
        let release_text = release_text.trim_end_matches('.');

        if release_text.is_empty() {
            return Err(invalid());
        }
        let release = release_text
            .split('.')
            .map(str::parse::<u64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;

        let suffix = Suffix::parse(rest).ok_or_else(invalid)?;

        Ok(Self {
            release,
            pre: suffix.pre,
            post: suffix.post,
            local: suffix.local,
            text: body.to_string(),
        })
    }
}

impl serde::Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> serde::Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
