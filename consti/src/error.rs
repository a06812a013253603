use charter_crypto::CanonicalError;
use charter_types::{ErrorClass, MemberId, ProposalId};
use thiserror::Error;

use crate::proposal::ProposalStatus;
use crate::validator::ValidationReport;

#[derive(Debug, Error)]
pub enum ConstiError {
    #[error("invalid content path: {0:?}")]
    InvalidPath(String),

    #[error("content path {0} runs through a non-object value")]
    PathConflict(String),

    #[error("proposal cannot move from {from} to {to}")]
    InvalidTransition {
        from: ProposalStatus,
        to: ProposalStatus,
    },

    #[error("proposal can no longer be edited (status {0})")]
    NotEditable(ProposalStatus),

    #[error("only the proposer can withdraw a proposal, not {0}")]
    NotProposer(MemberId),

    #[error("proposal {0} content hash does not match its contents")]
    HashMismatch(ProposalId),

    #[error("proposal rejected: {0}")]
    Rejected(ValidationReport),

    #[error("{0}")]
    Canonical(#[from] CanonicalError),
}

impl ConstiError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Rejected(report) if report.has_constitutional_violation() => {
                ErrorClass::ConstitutionalViolation
            }
            Self::InvalidTransition { .. } | Self::NotEditable(_) => ErrorClass::StateTransition,
            Self::HashMismatch(_) => ErrorClass::Integrity,
            _ => ErrorClass::Invalid,
        }
    }
}
