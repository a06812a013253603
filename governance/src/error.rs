use charter_types::{ErrorClass, MemberId, SessionId, Timestamp};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("voting session {0} not found")]
    SessionNotFound(SessionId),

    #[error("voting session {0} already exists")]
    SessionExists(SessionId),

    #[error("voting session {session} is not open at {now}")]
    SessionNotOpen { session: SessionId, now: Timestamp },

    #[error("voting session {session} is still open until {closes_at}")]
    SessionStillOpen {
        session: SessionId,
        closes_at: Timestamp,
    },

    #[error("voting session {0} was cancelled")]
    SessionCancelled(SessionId),

    #[error("voting session {0} is already finalized")]
    SessionFinalized(SessionId),

    #[error("{0} has already voted in this session")]
    AlreadyVoted(MemberId),

    #[error("{0} has no vote in this session to change")]
    NoVoteToChange(MemberId),

    #[error("{voter} is not on the {chamber} roster")]
    NotEligible { voter: MemberId, chamber: String },

    #[error("cannot delegate to self")]
    SelfDelegation,

    #[error("delegation weight must be in (0, 1], got {0}")]
    InvalidDelegationWeight(f64),

    #[error("delegation {from} -> {to} would close a cycle")]
    DelegationCycle { from: MemberId, to: MemberId },

    #[error("{delegator} would delegate {total} of their weight, more than 1.0")]
    DelegationCapExceeded { delegator: MemberId, total: f64 },

    #[error("no active delegation from {from} to {to}")]
    DelegationNotFound { from: MemberId, to: MemberId },

    #[error("delegation state could not be decoded: {0}")]
    DelegationState(String),

    #[error("internal lock poisoned")]
    LockPoisoned,
}

impl GovernanceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::SessionNotFound(_) | Self::DelegationNotFound { .. } => ErrorClass::NotFound,
            Self::SessionNotOpen { .. }
            | Self::SessionStillOpen { .. }
            | Self::SessionCancelled(_)
            | Self::SessionFinalized(_)
            | Self::SessionExists(_) => ErrorClass::StateTransition,
            Self::DelegationState(_) => ErrorClass::Integrity,
            _ => ErrorClass::Invalid,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for GovernanceError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}
