//! Remote status values and the operations that wait on them

use serde::{Deserialize, Serialize};

/// A status reported by the remote control plane, kept verbatim
///
/// The set of values is owned by the remote API and may grow, so this is an
/// open string rather than an enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(String);

impl Status {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this status is one of `set`
    pub fn is_in(&self, set: &[&str]) -> bool {
        set.contains(&self.0.as_str())
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Status {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Status {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A mutating operation on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Read => write!(f, "read"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_membership() {
        let status = Status::from("CREATING");
        assert!(status.is_in(&["PENDING", "CREATING"]));
        assert!(!status.is_in(&["RUNNING"]));
        assert!(!status.is_in(&[]));
    }

    #[test]
    fn status_serializes_as_plain_string() {
        let json = serde_json::to_string(&Status::from("RUNNING")).unwrap();
        assert_eq!(json, "\"RUNNING\"");
    }
}
