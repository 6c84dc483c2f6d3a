//! Semantic versions, branch versions, and version ranges.
//!
//! `Version` is either a numeric semver-like triple with optional
//! pre-release identifiers, or a named branch that tracks a moving
//! reference rather than a fixed point. `VersionRange` is a small
//! normalized expression tree that can match either kind.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// A single dot-separated pre-release or build identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Identifier {
    Numeric(u64),
    Alphanumeric(String),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(n) => write!(f, "{n}"),
            Identifier::Alphanumeric(s) => write!(f, "{s}"),
        }
    }
}

impl Identifier {
    fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidVersion(format!("empty identifier in {s:?}")));
        }
        if s.chars().all(|c| c.is_ascii_digit()) && !(s.len() > 1 && s.starts_with('0')) {
            if let Ok(n) = s.parse::<u64>() {
                return Ok(Identifier::Numeric(n));
            }
        }
        if s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            Ok(Identifier::Alphanumeric(s.to_string()))
        } else {
            Err(Error::InvalidVersion(format!("invalid identifier: {s:?}")))
        }
    }
}

/// A single version: either a numeric release or a named branch.
///
/// Numeric versions order by major.minor.patch, then pre-release
/// identifiers (a version with no pre-release is greater than one with
/// pre-release identifiers at equal major.minor.patch). Build metadata is
/// preserved but never participates in ordering or equality.
#[derive(Debug, Clone)]
pub enum Version {
    Numeric {
        major: u64,
        minor: u64,
        patch: u64,
        pre: Vec<Identifier>,
        build: Vec<String>,
    },
    Branch(String),
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version::Numeric {
            major,
            minor,
            patch,
            pre: Vec::new(),
            build: Vec::new(),
        }
    }

    pub fn branch(name: impl Into<String>) -> Self {
        Version::Branch(name.into())
    }

    pub fn is_pre_release(&self) -> bool {
        matches!(self, Version::Numeric { pre, .. } if !pre.is_empty())
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Version::Branch(_))
    }

    /// Parse `major.minor[.patch][-pre][+build]`, or a bare branch
    /// identifier prefixed with `branch:`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(name) = s.strip_prefix("branch:") {
            if name.is_empty() {
                return Err(Error::InvalidVersion("empty branch name".into()));
            }
            return Ok(Version::Branch(name.to_string()));
        }

        let (core_and_pre, build) = match s.split_once('+') {
            Some((a, b)) => (a, Some(b)),
            None => (s, None),
        };
        let (core, pre) = match core_and_pre.split_once('-') {
            Some((a, b)) => (a, Some(b)),
            None => (core_and_pre, None),
        };

        let mut parts = core.split('.');
        let major = parts
            .next()
            .ok_or_else(|| Error::InvalidVersion(s.to_string()))?
            .parse::<u64>()
            .map_err(|_| Error::InvalidVersion(s.to_string()))?;
        let minor = parts
            .next()
            .map(|p| p.parse::<u64>())
            .transpose()
            .map_err(|_| Error::InvalidVersion(s.to_string()))?
            .unwrap_or(0);
        let patch = parts
            .next()
            .map(|p| p.parse::<u64>())
            .transpose()
            .map_err(|_| Error::InvalidVersion(s.to_string()))?
            .unwrap_or(0);
        if parts.next().is_some() {
            return Err(Error::InvalidVersion(s.to_string()));
        }

        let pre = pre
            .map(|p| p.split('.').map(Identifier::parse).collect())
            .transpose()?
            .unwrap_or_default();
        let build = build
            .map(|b| b.split('.').map(|s| s.to_string()).collect())
            .unwrap_or_default();

        Ok(Version::Numeric {
            major,
            minor,
            patch,
            pre,
            build,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Branch(name) => write!(f, "branch:{name}"),
            Version::Numeric {
                major,
                minor,
                patch,
                pre,
                build,
            } => {
                write!(f, "{major}.{minor}.{patch}")?;
                if !pre.is_empty() {
                    write!(f, "-")?;
                    for (i, id) in pre.iter().enumerate() {
                        if i > 0 {
                            write!(f, ".")?;
                        }
                        write!(f, "{id}")?;
                    }
                }
                if !build.is_empty() {
                    write!(f, "+{}", build.join("."))?;
                }
                Ok(())
            }
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Version::Branch(a), Version::Branch(b)) => a == b,
            (
                Version::Numeric {
                    major: am,
                    minor: ami,
                    patch: ap,
                    pre: apre,
                    ..
                },
                Version::Numeric {
                    major: bm,
                    minor: bmi,
                    patch: bp,
                    pre: bpre,
                    ..
                },
            ) => am == bm && ami == bmi && ap == bp && apre == bpre,
            _ => false,
        }
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    /// Numeric versions compare totally among themselves. A branch
    /// version is unordered (`None`) against anything except an equal
    /// branch, per spec: branches are matched only by explicit equality.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Version::Branch(a), Version::Branch(b)) => {
                if a == b {
                    Some(Ordering::Equal)
                } else {
                    None
                }
            }
            (Version::Branch(_), _) | (_, Version::Branch(_)) => None,
            (
                Version::Numeric {
                    major: am,
                    minor: ami,
                    patch: ap,
                    pre: apre,
                    ..
                },
                Version::Numeric {
                    major: bm,
                    minor: bmi,
                    patch: bp,
                    pre: bpre,
                    ..
                },
            ) => {
                let core = (am, ami, ap).cmp(&(bm, bmi, bp));
                if core != Ordering::Equal {
                    return Some(core);
                }
                // No pre-release outranks any pre-release at equal core.
                Some(match (apre.is_empty(), bpre.is_empty()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => apre.cmp(bpre),
                })
            }
        }
    }
}

/// A version-matching expression, stored normalized at parse time.
#[derive(Debug, Clone)]
pub enum VersionRange {
    Any,
    Empty,
    Exact(Version),
    Branch(String),
    Interval {
        lo: Option<Version>,
        lo_inclusive: bool,
        hi: Option<Version>,
        hi_inclusive: bool,
    },
    And(Box<VersionRange>, Box<VersionRange>),
    Or(Vec<VersionRange>),
}

impl VersionRange {
    pub fn any() -> Self {
        VersionRange::Any
    }

    pub fn exact(v: Version) -> Self {
        VersionRange::Exact(v)
    }

    pub fn at_least(v: Version) -> Self {
        VersionRange::Interval {
            lo: Some(v),
            lo_inclusive: true,
            hi: None,
            hi_inclusive: false,
        }
    }

    pub fn less_than(v: Version) -> Self {
        VersionRange::Interval {
            lo: None,
            lo_inclusive: false,
            hi: Some(v),
            hi_inclusive: false,
        }
    }

    fn interval(lo: Version, hi: Version) -> Self {
        if lo >= hi {
            return VersionRange::Empty;
        }
        VersionRange::Interval {
            lo: Some(lo),
            lo_inclusive: true,
            hi: Some(hi),
            hi_inclusive: false,
        }
    }

    pub fn intersection(self, other: VersionRange) -> VersionRange {
        match (&self, &other) {
            (VersionRange::Empty, _) | (_, VersionRange::Empty) => VersionRange::Empty,
            (VersionRange::Any, _) => other,
            (_, VersionRange::Any) => self,
            _ => VersionRange::And(Box::new(self), Box::new(other)),
        }
    }

    /// `range.matches(v)` is defined for every (range, version) pair.
    /// Branch versions only ever match `Any`, their own `Branch` variant,
    /// or an `Exact` branch version equal to them.
    pub fn matches(&self, v: &Version) -> bool {
        match self {
            VersionRange::Any => true,
            VersionRange::Empty => false,
            VersionRange::Exact(r) => r == v,
            VersionRange::Branch(name) => matches!(v, Version::Branch(b) if b == name),
            VersionRange::Interval {
                lo,
                lo_inclusive,
                hi,
                hi_inclusive,
            } => {
                if v.is_branch() {
                    return false;
                }
                let lo_ok = match lo {
                    None => true,
                    Some(lo) => match v.partial_cmp(lo) {
                        Some(Ordering::Greater) => true,
                        Some(Ordering::Equal) => *lo_inclusive,
                        _ => false,
                    },
                };
                let hi_ok = match hi {
                    None => true,
                    Some(hi) => match v.partial_cmp(hi) {
                        Some(Ordering::Less) => true,
                        Some(Ordering::Equal) => *hi_inclusive,
                        _ => false,
                    },
                };
                lo_ok && hi_ok
            }
            VersionRange::And(a, b) => a.matches(v) && b.matches(v),
            VersionRange::Or(parts) => parts.iter().any(|p| p.matches(v)),
        }
    }

    /// Parse the npm/cargo-like surface syntax: `*`, `^1.2.3`, `~1.2.3`,
    /// `=1.2.3`, `>=`/`>`/`<=`/`<` comparators, space-joined
    /// conjunctions, and a bare `branch:name` form.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "*" || s.is_empty() {
            return Ok(VersionRange::Any);
        }
        if let Some(name) = s.strip_prefix("branch:") {
            return Ok(VersionRange::Branch(name.to_string()));
        }
        if s.contains(' ') {
            let mut ranges = s.split_whitespace().map(VersionRange::parse);
            let mut acc = ranges
                .next()
                .ok_or_else(|| Error::InvalidRange(s.to_string()))??;
            for r in ranges {
                acc = acc.intersection(r?);
            }
            return Ok(acc);
        }
        if let Some(rest) = s.strip_prefix('^') {
            let base = Version::parse(rest)?;
            let (major, minor, patch) = Self::numeric_parts(&base)?;
            let upper = if major > 0 {
                Version::new(major + 1, 0, 0)
            } else if minor > 0 {
                Version::new(0, minor + 1, 0)
            } else {
                Version::new(0, 0, patch + 1)
            };
            return Ok(Self::interval(base, upper));
        }
        if let Some(rest) = s.strip_prefix('~') {
            let base = Version::parse(rest)?;
            let (major, minor, _) = Self::numeric_parts(&base)?;
            let upper = Version::new(major, minor + 1, 0);
            return Ok(Self::interval(base, upper));
        }
        if let Some(rest) = s.strip_prefix(">=") {
            return Ok(VersionRange::at_least(Version::parse(rest)?));
        }
        if let Some(rest) = s.strip_prefix("<=") {
            let v = Version::parse(rest)?;
            let (major, minor, patch) = Self::numeric_parts(&v)?;
            return Ok(VersionRange::less_than(Version::new(major, minor, patch + 1)));
        }
        if let Some(rest) = s.strip_prefix('>') {
            let v = Version::parse(rest)?;
            let (major, minor, patch) = Self::numeric_parts(&v)?;
            return Ok(VersionRange::at_least(Version::new(major, minor, patch + 1)));
        }
        if let Some(rest) = s.strip_prefix("<") {
            return Ok(VersionRange::less_than(Version::parse(rest)?));
        }
        if let Some(rest) = s.strip_prefix('=') {
            return Ok(VersionRange::Exact(Version::parse(rest)?));
        }
        // Bare version defaults to caret-style, npm convention.
        let v = Version::parse(s)?;
        if v.is_branch() {
            return Ok(VersionRange::Exact(v));
        }
        let (major, minor, patch) = Self::numeric_parts(&v)?;
        let upper = if major > 0 {
            Version::new(major + 1, 0, 0)
        } else if minor > 0 {
            Version::new(0, minor + 1, 0)
        } else {
            Version::new(0, 0, patch + 1)
        };
        Ok(Self::interval(v, upper))
    }

    fn numeric_parts(v: &Version) -> Result<(u64, u64, u64)> {
        match v {
            Version::Numeric {
                major, minor, patch, ..
            } => Ok((*major, *minor, *patch)),
            Version::Branch(_) => Err(Error::InvalidRange(
                "branch versions cannot anchor a range operator".into(),
            )),
        }
    }
}
