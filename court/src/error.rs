use charter_types::{ErrorClass, MemberId, RulingId, Timestamp};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CourtError {
    #[error("ruling {0} not found")]
    RulingNotFound(RulingId),

    #[error("ruling {0} already exists")]
    RulingExists(RulingId),

    #[error("ruling {0} is already finalized")]
    AlreadyFinalized(RulingId),

    #[error("justice {0} has already voted on this ruling")]
    AlreadyVoted(MemberId),

    #[error("{member} is not an active justice at {now}")]
    NotActiveJustice { member: MemberId, now: Timestamp },

    #[error("justice {0} is already appointed")]
    AlreadyAppointed(MemberId),

    #[error("justice {0} not found")]
    JusticeNotFound(MemberId),

    #[error("court quorum not met: {voted} of {active} active justices voted, need {required}")]
    QuorumNotMet {
        voted: usize,
        active: usize,
        required: usize,
    },

    #[error("no active justices")]
    NoActiveJustices,

    #[error("ruling has no modification {0}")]
    ModificationNotFound(usize),

    #[error("internal lock poisoned")]
    LockPoisoned,
}

impl CourtError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RulingNotFound(_) | Self::JusticeNotFound(_) | Self::ModificationNotFound(_) => {
                ErrorClass::NotFound
            }
            Self::QuorumNotMet { .. } | Self::NoActiveJustices => ErrorClass::QuorumOrThresholdNotMet,
            Self::AlreadyFinalized(_) | Self::RulingExists(_) => ErrorClass::StateTransition,
            _ => ErrorClass::Invalid,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for CourtError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}
