//! Version parsing and range matching for the manifest compatibility gate.
//!
//! Parsing is deliberately lenient about shorthand (`v` prefix, `2` or `2.1`
//! for `2.0.0`/`2.1.0`) because manifest authors write versions by hand.
//! Range syntax: `||`-separated alternatives, whitespace-separated
//! comparators that must all hold, `^`/`~`/`=`/`>`/`>=`/`<`/`<=` operators,
//! and `*`/`x` wildcards. An empty range accepts everything.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SemverError {
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("invalid comparator: {0}")]
    InvalidComparator(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

impl Version {
    /// Parses a version, tolerating a `v` prefix and omitted minor/patch
    /// segments (treated as 0).
    pub fn parse(s: &str) -> Result<Self, SemverError> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);
        if s.is_empty() {
            return Err(SemverError::InvalidVersion(s.to_string()));
        }

        let (version_part, build) = match s.find('+') {
            Some(pos) => (&s[..pos], Some(s[pos + 1..].to_string())),
            None => (s, None),
        };
        let (core, prerelease) = match version_part.find('-') {
            Some(pos) => (
                &version_part[..pos],
                Some(version_part[pos + 1..].to_string()),
            ),
            None => (version_part, None),
        };

        let mut segments = core.split('.');
        let major = parse_segment(segments.next(), s)?;
        let minor = match segments.next() {
            Some(seg) => parse_segment(Some(seg), s)?,
            None => 0,
        };
        let patch = match segments.next() {
            Some(seg) => parse_segment(Some(seg), s)?,
            None => 0,
        };
        if segments.next().is_some() {
            return Err(SemverError::InvalidVersion(s.to_string()));
        }

        Ok(Version {
            major,
            minor,
            patch,
            prerelease,
            build,
        })
    }

    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
        }
    }
}

fn parse_segment(segment: Option<&str>, whole: &str) -> Result<u64, SemverError> {
    segment
        .and_then(|seg| seg.parse().ok())
        .ok_or_else(|| SemverError::InvalidVersion(whole.to_string()))
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }
        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.major.cmp(&other.major) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.minor.cmp(&other.minor) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.patch.cmp(&other.patch) {
            Ordering::Equal => {}
            ord => return ord,
        }
        // A prerelease sorts below its release.
        match (&self.prerelease, &other.prerelease) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

/// One comparator in a range.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Any,
    Exact(Version),
    Caret(Version),
    Tilde(Version),
    GreaterThan(Version),
    GreaterThanOrEqual(Version),
    LessThan(Version),
    LessThanOrEqual(Version),
    Wildcard(u64, Option<u64>),
}

impl Constraint {
    pub fn parse(s: &str) -> Result<Self, SemverError> {
        let s = s.trim();
        if s.is_empty() || s == "*" || s.eq_ignore_ascii_case("x") {
            return Ok(Constraint::Any);
        }
        if let Some(rest) = s.strip_prefix(">=") {
            return Ok(Constraint::GreaterThanOrEqual(Version::parse(rest)?));
        }
        if let Some(rest) = s.strip_prefix("<=") {
            return Ok(Constraint::LessThanOrEqual(Version::parse(rest)?));
        }
        if let Some(rest) = s.strip_prefix('>') {
            return Ok(Constraint::GreaterThan(Version::parse(rest)?));
        }
        if let Some(rest) = s.strip_prefix('<') {
            return Ok(Constraint::LessThan(Version::parse(rest)?));
        }
        if let Some(rest) = s.strip_prefix('^') {
            return Ok(Constraint::Caret(Version::parse(rest)?));
        }
        if let Some(rest) = s.strip_prefix('~') {
            return Ok(Constraint::Tilde(Version::parse(rest)?));
        }
        if let Some(rest) = s.strip_prefix('=') {
            return Ok(Constraint::Exact(Version::parse(rest)?));
        }
        if has_wild_segment(s) {
            return Self::parse_wildcard(s);
        }
        Ok(Constraint::Exact(Version::parse(s)?))
    }

    /// `1.*`, `1.x`, `1.2.*`, `1.2.x`.
    fn parse_wildcard(s: &str) -> Result<Self, SemverError> {
        let bad = || SemverError::InvalidComparator(s.to_string());
        let parts: Vec<&str> = s.split('.').collect();
        let major: u64 = parts
            .first()
            .and_then(|p| p.parse().ok())
            .ok_or_else(bad)?;
        match parts.len() {
            2 if is_wild(parts[1]) => Ok(Constraint::Wildcard(major, None)),
            3 if is_wild(parts[1]) => Ok(Constraint::Wildcard(major, None)),
            3 if is_wild(parts[2]) => {
                let minor = parts[1].parse().map_err(|_| bad())?;
                Ok(Constraint::Wildcard(major, Some(minor)))
            }
            _ => Err(bad()),
        }
    }

    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Constraint::Any => true,
            Constraint::Exact(v) => {
                version.major == v.major
                    && version.minor == v.minor
                    && version.patch == v.patch
                    && version.prerelease == v.prerelease
            }
            Constraint::Caret(v) => {
                // ^1.2.3 allows <2.0.0, ^0.2.3 allows <0.3.0, ^0.0.3 only 0.0.3.
                if v.major > 0 {
                    version >= v && version.major == v.major
                } else if v.minor > 0 {
                    version >= v && version.major == 0 && version.minor == v.minor
                } else {
                    version >= v
                        && version.major == 0
                        && version.minor == 0
                        && version.patch == v.patch
                }
            }
            Constraint::Tilde(v) => {
                version >= v && version.major == v.major && version.minor == v.minor
            }
            Constraint::GreaterThan(v) => version > v,
            Constraint::GreaterThanOrEqual(v) => version >= v,
            Constraint::LessThan(v) => version < v,
            Constraint::LessThanOrEqual(v) => version <= v,
            Constraint::Wildcard(major, minor) => match minor {
                Some(minor) => version.major == *major && version.minor == *minor,
                None => version.major == *major,
            },
        }
    }
}

fn has_wild_segment(s: &str) -> bool {
    s.split('.').any(is_wild)
}

fn is_wild(segment: &str) -> bool {
    segment == "*" || segment.eq_ignore_ascii_case("x")
}

/// True when `a` sorts strictly before `b`. Unparseable input compares
/// false, so callers can feed manifest fields through without pre-checking.
pub fn version_lt(a: &str, b: &str) -> bool {
    match (Version::parse(a), Version::parse(b)) {
        (Ok(a), Ok(b)) => a < b,
        _ => false,
    }
}

/// True when `version` satisfies `range`: any `||` alternative whose
/// whitespace-separated comparators all match. An empty range accepts every
/// parseable version; an unparseable version satisfies nothing.
pub fn satisfy(version: &str, range: &str) -> bool {
    let version = match Version::parse(version) {
        Ok(v) => v,
        Err(_) => return false,
    };
    let range = range.trim();
    if range.is_empty() {
        return true;
    }
    range.split("||").any(|alternative| {
        let alternative = alternative.trim();
        if alternative.is_empty() {
            return true;
        }
        alternative.split_whitespace().all(|comparator| {
            Constraint::parse(comparator)
                .map(|c| c.matches(&version))
                .unwrap_or(false)
        })
    })
}
