//! Voting chambers and proposal categories.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two constituencies that must independently approve a proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chamber {
    /// General members.
    Users,
    /// Maintainers. Sessions in this chamber only accept maintainer votes.
    Guardians,
}

impl Chamber {
    pub const ALL: [Chamber; 2] = [Chamber::Users, Chamber::Guardians];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Guardians => "guardians",
        }
    }
}

impl fmt::Display for Chamber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much scrutiny a proposal needs. Ordered from least to most.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Minor,
    Standard,
    Major,
    /// Touches axioms. Such proposals are always rejected downstream, but
    /// they are still categorised at the highest level.
    Constitutional,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minor => "minor",
            Self::Standard => "standard",
            Self::Major => "major",
            Self::Constitutional => "constitutional",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
