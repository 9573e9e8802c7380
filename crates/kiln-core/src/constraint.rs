//! Version constraints attached to dependency declarations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::version::{Version, VersionRange};

/// How strongly a declaration asks for a version.
///
/// | notation     | constraint |
/// |--------------|------------|
/// | `~1.0`       | preferred  |
/// | `1.1`, `>=1.1`, `[1.0,2.0)` | required |
/// | `=1.0`       | strict     |
/// | `!1.0`       | forced     |
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VersionConstraint {
    /// A soft preference; admits any version.
    Preferred(Version),
    /// A version range (usually "at least"); may be upgraded within it.
    Required(VersionRange),
    /// Exactly this version; every other requester must admit it.
    Strict(Version),
    /// This version wins unconditionally.
    Forced(Version),
}

/// Constraint strength, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConstraintKind {
    Preferred,
    Required,
    Strict,
    Forced,
}

impl VersionConstraint {
    /// Shorthand for the common "at least this version" requirement.
    pub fn required(version: &str) -> Self {
        Self::Required(VersionRange::at_least(Version::parse(version)))
    }

    pub fn strict(version: &str) -> Self {
        Self::Strict(Version::parse(version))
    }

    pub fn forced(version: &str) -> Self {
        Self::Forced(Version::parse(version))
    }

    pub fn preferred(version: &str) -> Self {
        Self::Preferred(Version::parse(version))
    }

    pub fn kind(&self) -> ConstraintKind {
        match self {
            Self::Preferred(_) => ConstraintKind::Preferred,
            Self::Required(_) => ConstraintKind::Required,
            Self::Strict(_) => ConstraintKind::Strict,
            Self::Forced(_) => ConstraintKind::Forced,
        }
    }

    /// The concrete version this constraint asks for, if it names one.
    pub fn requested_version(&self) -> Option<&Version> {
        match self {
            Self::Preferred(v) | Self::Strict(v) | Self::Forced(v) => Some(v),
            Self::Required(range) => range.requested(),
        }
    }

    /// Whether selecting `version` would satisfy this constraint.
    pub fn admits(&self, version: &Version) -> bool {
        match self {
            Self::Preferred(_) => true,
            Self::Required(range) => range.contains(version),
            Self::Strict(v) | Self::Forced(v) => v == version,
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preferred(v) => write!(f, "~{v}"),
            Self::Required(range) => write!(f, "{range}"),
            Self::Strict(v) => write!(f, "={v}"),
            Self::Forced(v) => write!(f, "!{v}"),
        }
    }
}

impl FromStr for VersionConstraint {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let exact = |rest: &str| {
            let rest = rest.trim();
            if rest.is_empty() {
                Err(ModelError::InvalidNotation {
                    input: s.to_string(),
                    reason: "missing version".to_string(),
                })
            } else {
                Ok(Version::parse(rest))
            }
        };
        if let Some(rest) = s.strip_prefix('~') {
            Ok(Self::Preferred(exact(rest)?))
        } else if let Some(rest) = s.strip_prefix('!') {
            Ok(Self::Forced(exact(rest)?))
        } else if let Some(rest) = s.strip_prefix('=') {
            Ok(Self::Strict(exact(rest)?))
        } else {
            VersionRange::parse(s).map(Self::Required)
        }
    }
}

impl TryFrom<String> for VersionConstraint {
    type Error = ModelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<VersionConstraint> for String {
    fn from(c: VersionConstraint) -> Self {
        c.to_string()
    }
}
