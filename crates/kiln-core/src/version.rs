//! Version parsing, total ordering, and range matching.
//!
//! Versions are split into segments on `.` and `-`:
//! - numeric segments compare as numbers
//! - non-numeric segments compare lexicographically (case-insensitive)
//! - a numeric segment sorts above a non-numeric one
//! - missing trailing segments behave like `0`, so `1.0 == 1.0.0`, while a
//!   trailing non-numeric segment sorts below them (`1.0-rc < 1.0`)

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ModelError;

/// A parsed version with comparable segments.
#[derive(Debug, Clone)]
pub struct Version {
    original: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
enum Segment {
    Numeric(u64),
    Text(String),
}

/// Placeholder version carried by dependencies that have no real version.
pub const UNSPECIFIED: &str = "unspecified";

impl Version {
    pub fn parse(version: &str) -> Self {
        Self {
            original: version.trim().to_string(),
            segments: parse_segments(version.trim()),
        }
    }

    pub fn unspecified() -> Self {
        Self::parse(UNSPECIFIED)
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Segments with trailing zeros removed; equal versions share this form.
    fn normalized(&self) -> &[Segment] {
        let mut end = self.segments.len();
        while end > 0 && self.segments[end - 1] == Segment::Numeric(0) {
            end -= 1;
        }
        &self.segments[..end]
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let max_len = self.segments.len().max(other.segments.len());
        for i in 0..max_len {
            let ord = compare_segments(self.segments.get(i), other.segments.get(i));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.original)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Version::parse(&s))
    }
}

fn compare_segments(a: Option<&Segment>, b: Option<&Segment>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(s), None) => compare_segment_to_missing(s),
        (None, Some(s)) => compare_segment_to_missing(s).reverse(),
        (Some(a), Some(b)) => compare_two_segments(a, b),
    }
}

fn compare_segment_to_missing(seg: &Segment) -> Ordering {
    match seg {
        Segment::Numeric(n) => n.cmp(&0),
        Segment::Text(_) => Ordering::Less,
    }
}

fn compare_two_segments(a: &Segment, b: &Segment) -> Ordering {
    match (a, b) {
        (Segment::Numeric(a), Segment::Numeric(b)) => a.cmp(b),
        (Segment::Numeric(_), Segment::Text(_)) => Ordering::Greater,
        (Segment::Text(_), Segment::Numeric(_)) => Ordering::Less,
        (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
    }
}

fn parse_segments(version: &str) -> Vec<Segment> {
    version
        .split(['.', '-'])
        .filter(|token| !token.is_empty())
        .map(|token| match token.parse::<u64>() {
            Ok(n) => Segment::Numeric(n),
            Err(_) => Segment::Text(token.to_lowercase()),
        })
        .collect()
}

/// A version range, either bracket notation or an open-ended lower bound.
///
/// Supports: `[1.0,2.0)`, `[1.0,]`, `(,2.0)`, `[1.0]` (exact), `>=1.0` and
/// a bare `1.0` (both meaning "at least 1.0").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bound {
    pub version: Version,
    pub inclusive: bool,
}

impl VersionRange {
    /// `[version,)`: the version itself or anything newer.
    pub fn at_least(version: Version) -> Self {
        Self {
            lower: Some(Bound {
                version,
                inclusive: true,
            }),
            upper: None,
        }
    }

    pub fn parse(spec: &str) -> Result<Self, ModelError> {
        let s = spec.trim();
        let invalid = |reason: &str| ModelError::InvalidNotation {
            input: spec.to_string(),
            reason: reason.to_string(),
        };

        if let Some(rest) = s.strip_prefix(">=") {
            let rest = rest.trim();
            if rest.is_empty() {
                return Err(invalid("missing version after `>=`"));
            }
            return Ok(Self::at_least(Version::parse(rest)));
        }
        if !s.starts_with('[') && !s.starts_with('(') {
            if s.is_empty() {
                return Err(invalid("empty version"));
            }
            return Ok(Self::at_least(Version::parse(s)));
        }
        if s.len() < 2 || !(s.ends_with(']') || s.ends_with(')')) {
            return Err(invalid("unterminated range"));
        }

        let open_inclusive = s.starts_with('[');
        let close_inclusive = s.ends_with(']');
        let inner = &s[1..s.len() - 1];

        let bound = |text: &str, inclusive: bool| {
            let text = text.trim();
            (!text.is_empty()).then(|| Bound {
                version: Version::parse(text),
                inclusive,
            })
        };

        match inner.split_once(',') {
            Some((lower, upper)) => Ok(Self {
                lower: bound(lower, open_inclusive),
                upper: bound(upper, close_inclusive),
            }),
            None => {
                // `[1.0]` means exactly 1.0
                if !(open_inclusive && close_inclusive) || inner.trim().is_empty() {
                    return Err(invalid("exact ranges use `[version]`"));
                }
                let v = Version::parse(inner.trim());
                Ok(Self {
                    lower: Some(Bound {
                        version: v.clone(),
                        inclusive: true,
                    }),
                    upper: Some(Bound {
                        version: v,
                        inclusive: true,
                    }),
                })
            }
        }
    }

    /// Check if a version satisfies this range.
    pub fn contains(&self, version: &Version) -> bool {
        if let Some(ref lower) = self.lower {
            let cmp = version.cmp(&lower.version);
            if cmp == Ordering::Less || (cmp == Ordering::Equal && !lower.inclusive) {
                return false;
            }
        }
        if let Some(ref upper) = self.upper {
            let cmp = version.cmp(&upper.version);
            if cmp == Ordering::Greater || (cmp == Ordering::Equal && !upper.inclusive) {
                return false;
            }
        }
        true
    }

    /// The version this range asks for when one has to be picked: its lower
    /// bound, else its inclusive upper bound.
    pub fn requested(&self) -> Option<&Version> {
        match (&self.lower, &self.upper) {
            (Some(lower), _) => Some(&lower.version),
            (None, Some(upper)) if upper.inclusive => Some(&upper.version),
            _ => None,
        }
    }

    /// `>=v`: an inclusive lower bound and nothing above.
    pub fn is_at_least(&self) -> bool {
        self.upper.is_none() && self.lower.as_ref().is_some_and(|l| l.inclusive)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_at_least() {
            if let Some(lower) = &self.lower {
                return write!(f, ">={}", lower.version);
            }
        }
        let open = match &self.lower {
            Some(b) if b.inclusive => '[',
            _ => '(',
        };
        let close = match &self.upper {
            Some(b) if b.inclusive => ']',
            _ => ')',
        };
        let lower = self.lower.as_ref().map(|b| b.version.to_string());
        let upper = self.upper.as_ref().map(|b| b.version.to_string());
        if lower.is_some() && lower == upper {
            return write!(f, "[{}]", lower.unwrap_or_default());
        }
        write!(
            f,
            "{open}{},{}{close}",
            lower.unwrap_or_default(),
            upper.unwrap_or_default()
        )
    }
}
