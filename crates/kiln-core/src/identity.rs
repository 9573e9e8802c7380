use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Version-independent identity of a module: `group:name`.
///
/// This is the key used for deduplication and conflict grouping; two
/// requests for different versions of the same module share one identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleIdentity {
    pub group: String,
    pub name: String,
}

impl ModuleIdentity {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Parse `"group:name"`.
    pub fn parse(s: &str) -> Result<Self, ModelError> {
        match s.split_once(':') {
            Some((group, name)) if !group.is_empty() && !name.is_empty() && !name.contains(':') => {
                Ok(Self::new(group, name))
            }
            _ => Err(ModelError::InvalidNotation {
                input: s.to_string(),
                reason: "expected `group:name`".to_string(),
            }),
        }
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let id = ModuleIdentity::parse("org.example:lib").unwrap();
        assert_eq!(id.group, "org.example");
        assert_eq!(id.name, "lib");
        assert_eq!(id.to_string(), "org.example:lib");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(ModuleIdentity::parse("lib").is_err());
        assert!(ModuleIdentity::parse(":lib").is_err());
        assert!(ModuleIdentity::parse("org:lib:1.0").is_err());
    }
}
