use charter_store::StoreError;
use charter_types::{ErrorClass, ExitId, ForkId, MemberId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExitError {
    #[error("exit request {0} not found")]
    NotFound(ExitId),

    #[error("fork {0} is not registered")]
    UnknownFork(ForkId),

    #[error("fork {0} is already registered")]
    ForkExists(ForkId),

    #[error("fork {0} is illegitimate and cannot be a migration destination")]
    IllegitimateDestination(ForkId),

    #[error("{member} did not request exit {exit}")]
    NotRequester { exit: ExitId, member: MemberId },

    #[error("exit {0} is already completed")]
    AlreadyCompleted(ExitId),

    #[error("exit {0} was cancelled")]
    Cancelled(ExitId),

    #[error("exit {0} has no prepared export")]
    NotPrepared(ExitId),

    #[error("{member} already has active exit {existing} of another type; cancel it first")]
    ExitInProgress { member: MemberId, existing: ExitId },

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("internal lock poisoned")]
    LockPoisoned,
}

impl ExitError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) | Self::UnknownFork(_) => ErrorClass::NotFound,
            Self::AlreadyCompleted(_)
            | Self::Cancelled(_)
            | Self::NotPrepared(_)
            | Self::ForkExists(_)
            | Self::ExitInProgress { .. } => ErrorClass::StateTransition,
            Self::Store(e) => e.class(),
            _ => ErrorClass::Invalid,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for ExitError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}
