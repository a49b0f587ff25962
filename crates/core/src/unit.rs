// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifiers for constraint units and their consumers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key identifying a contended resource, e.g. `git:push:<account>:<token>`.
///
/// Units are opaque to this crate. They come into existence with their
/// first registration and are never explicitly deleted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintUnit(pub String);

impl ConstraintUnit {
    pub fn new(unit: impl Into<String>) -> Self {
        Self(unit.into())
    }

    /// Build a unit key from its parts, joined with `:`
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = parts
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(":");
        Self(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConstraintUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConstraintUnit {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConstraintUnit {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Caller-chosen identifier of one registration, unique within a unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsumerId(pub String);

impl ConsumerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConsumerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConsumerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_from_parts_joins_with_colons() {
        let unit = ConstraintUnit::from_parts(["git-push", "acct-1", "token-9"]);
        assert_eq!(unit.as_str(), "git-push:acct-1:token-9");
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&ConsumerId::new("step-1")).unwrap();
        assert_eq!(json, "\"step-1\"");
        let unit: ConstraintUnit = serde_json::from_str("\"u\"").unwrap();
        assert_eq!(unit, ConstraintUnit::from("u"));
    }
}
