use charter_consti::ValidationIssue;
use charter_types::{ErrorClass, ProposalId};
use std::sync::PoisonError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("proposal error: {0}")]
    Consti(#[from] charter_consti::ConstiError),

    #[error("governance error: {0}")]
    Governance(#[from] charter_governance::GovernanceError),

    #[error("court error: {0}")]
    Court(#[from] charter_court::CourtError),

    #[error("timelock error: {0}")]
    Timelock(#[from] charter_timelock::TimelockError),

    #[error("ledger error: {0}")]
    Ledger(#[from] charter_ledger::LedgerError),

    #[error("exit error: {0}")]
    Exit(#[from] charter_exit::ExitError),

    #[error("store error: {0}")]
    Store(#[from] charter_store::StoreError),

    /// Validation failed. The issues are surfaced to the proposer as-is.
    #[error("proposal {proposal} failed validation: {}", render_issues(.issues))]
    Validation {
        proposal: ProposalId,
        issues: Vec<ValidationIssue>,
    },

    #[error("proposal not found: {0}")]
    ProposalNotFound(ProposalId),

    #[error("proposal already exists: {0}")]
    ProposalExists(ProposalId),

    #[error("proposal {proposal} is {status}, expected {expected}")]
    WrongStage {
        proposal: ProposalId,
        status: String,
        expected: &'static str,
    },

    #[error("{0} is not a member of either chamber")]
    NotAMember(charter_types::MemberId),

    #[error("no halt key registered for {0}")]
    UnknownHaltKey(charter_types::MemberId),

    #[error("config error: {0}")]
    Config(String),

    #[error("lock poisoned")]
    LockPoisoned,

    #[error("{0}")]
    Other(String),
}

impl<T> From<PoisonError<T>> for NodeError {
    fn from(_: PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}

fn render_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl NodeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Consti(e) => e.class(),
            Self::Governance(e) => e.class(),
            Self::Court(e) => e.class(),
            Self::Timelock(e) => e.class(),
            Self::Ledger(e) => e.class(),
            Self::Exit(e) => e.class(),
            Self::Store(e) => e.class(),
            Self::Validation { issues, .. } => {
                if issues.iter().any(ValidationIssue::is_constitutional) {
                    ErrorClass::ConstitutionalViolation
                } else {
                    ErrorClass::Invalid
                }
            }
            Self::ProposalNotFound(_) => ErrorClass::NotFound,
            Self::WrongStage { .. } | Self::ProposalExists(_) => ErrorClass::StateTransition,
            Self::NotAMember(_)
            | Self::UnknownHaltKey(_)
            | Self::Config(_)
            | Self::LockPoisoned
            | Self::Other(_) => ErrorClass::Invalid,
        }
    }

    /// True only for transient storage failures.
    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }

    /// The validation issues, if this is a validation failure.
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            Self::Validation { issues, .. } => issues,
            _ => &[],
        }
    }
}
