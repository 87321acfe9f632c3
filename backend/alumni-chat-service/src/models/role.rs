//! Account roles as reported by the identity service.
//!
//! The set is closed: every authorization decision matches on it
//! exhaustively, so introducing a role forces each rule to be revisited.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Current student
    Student,
    /// Graduate with an approved alumni account
    Alumni,
    /// Platform administrator
    Admin,
    /// Account awaiting approval
    Pending,
}

impl Role {
    /// Parse role from the identity service's string field.
    ///
    /// Unknown values map to `Pending`, the least privileged role.
    pub fn from_db(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Self::Student,
            "alumni" => Self::Alumni,
            "admin" => Self::Admin,
            _ => Self::Pending,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Alumni => "alumni",
            Self::Admin => "admin",
            Self::Pending => "pending",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db())
    }
}

/// Strict parse (for API requests)
impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "alumni" => Ok(Self::Alumni),
            "admin" => Ok(Self::Admin),
            "pending" => Ok(Self::Pending),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}
