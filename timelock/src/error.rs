use charter_types::{ErrorClass, MemberId, ProposalId};
use thiserror::Error;

use crate::timelock::TimelockStatus;

#[derive(Debug, Error)]
pub enum TimelockError {
    #[error("no timelock for proposal {0}")]
    NotFound(ProposalId),

    #[error("timelock for proposal {0} already exists")]
    Exists(ProposalId),

    #[error("invalid timelock transition from {from} to {to}")]
    InvalidTransition {
        from: TimelockStatus,
        to: TimelockStatus,
    },

    #[error("timelock for {proposal} is not ready (status {status})")]
    NotReady {
        proposal: ProposalId,
        status: TimelockStatus,
    },

    #[error("halt signature from {0} does not verify")]
    InvalidSignature(MemberId),

    #[error("extension of {requested} days exceeds the remaining allowance of {remaining}")]
    ExtensionCapExceeded { requested: u64, remaining: u64 },

    #[error("a {0} timelock cannot be extended")]
    NotExtendable(TimelockStatus),

    #[error("extension must be at least one day")]
    EmptyExtension,

    #[error("no extension request {0}")]
    ExtensionNotFound(usize),

    #[error("extension request {0} is already approved")]
    ExtensionApproved(usize),

    #[error("internal lock poisoned")]
    LockPoisoned,
}

impl TimelockError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) | Self::ExtensionNotFound(_) => ErrorClass::NotFound,
            Self::InvalidTransition { .. }
            | Self::NotReady { .. }
            | Self::Exists(_)
            | Self::NotExtendable(_)
            | Self::ExtensionApproved(_) => ErrorClass::StateTransition,
            _ => ErrorClass::Invalid,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for TimelockError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}
