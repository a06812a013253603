//! String-backed identifiers for every entity the engine manages.
//!
//! Components refer to each other's entities by id only, never by shared
//! references, so these are cheap to clone and compare.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chamber::Chamber;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// A participant: general member, maintainer, justice, or signer.
    MemberId
);
string_id!(
    /// A proposal to amend the constitution.
    ProposalId
);
string_id!(
    /// A voting session (one per proposal per chamber).
    SessionId
);
string_id!(
    /// A constitutional court ruling.
    RulingId
);
string_id!(
    /// A derivative copy of the rule set.
    ForkId
);
string_id!(
    /// A member-initiated exit request.
    ExitId
);
string_id!(
    /// A version lineage of the constitution.
    LineageId
);

impl SessionId {
    /// The session for a proposal in one chamber. Votes are keyed by
    /// proposal + chamber, so there is exactly one session per pair.
    pub fn for_proposal(proposal: &ProposalId, chamber: Chamber) -> Self {
        Self(format!("{}:{}", proposal, chamber.as_str()))
    }
}

impl RulingId {
    /// The court review for a proposal.
    pub fn for_proposal(proposal: &ProposalId) -> Self {
        Self(format!("ruling:{}", proposal))
    }
}
