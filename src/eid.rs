use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::{fmt::Display, ops::Deref};

/// Identifier for users and posts. ULID strings, lexicographically
/// sortable by creation time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash, PartialOrd, Ord)]
pub struct Eid(String);

impl Display for Eid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deref for Eid {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for Eid {
    fn from(fr: &str) -> Self {
        Eid(fr.to_string())
    }
}

impl From<String> for Eid {
    fn from(fr: String) -> Self {
        Eid(fr)
    }
}

impl From<Eid> for String {
    fn from(fr: Eid) -> Self {
        fr.0
    }
}

impl Eid {
    #[inline]
    pub fn new() -> Eid {
        Eid(rusty_ulid::generate_ulid_string())
    }

    /// Strict parse for externally supplied identifiers. Anything that
    /// is not a well-formed ULID is rejected so malformed ids surface
    /// as a validation error instead of an empty lookup.
    pub fn parse(s: &str) -> Result<Eid, InvalidEid> {
        let trimmed = s.trim();
        rusty_ulid::Ulid::from_str(trimmed).map_err(|_| InvalidEid(trimmed.to_string()))?;
        Ok(Eid(trimmed.to_string()))
    }
}

impl Default for Eid {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid identifier: {0:?}")]
pub struct InvalidEid(pub String);
