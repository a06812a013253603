//! Error taxonomy shared across crates.
//!
//! Each crate keeps its own error enum; `ErrorClass` is how callers decide
//! what to do with one without matching on every variant.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Axiom touch or invariant weakening. Fatal to the proposal, never retried,
    /// surfaced verbatim to the proposer.
    ConstitutionalViolation,
    /// A normal rejection outcome, not a system failure.
    QuorumOrThresholdNotMet,
    /// Operation attempted in the wrong state. Had no side effect.
    StateTransition,
    /// Hash mismatch on a version or audit chain. Operator-facing.
    Integrity,
    /// A migration step failed; automatic rollback was attempted.
    MigrationStepFailure,
    /// Storage backend failure. `transient` failures may be retried.
    Storage { transient: bool },
    /// The referenced entity does not exist.
    NotFound,
    /// Malformed input or a rule violation that is not constitutional.
    Invalid,
}

impl ErrorClass {
    /// Whether this class must raise an operator-visible alert.
    pub fn is_operator_alert(&self) -> bool {
        matches!(self, Self::Integrity)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage { transient: true })
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ConstitutionalViolation => "constitutional_violation",
            Self::QuorumOrThresholdNotMet => "quorum_or_threshold_not_met",
            Self::StateTransition => "state_transition",
            Self::Integrity => "integrity",
            Self::MigrationStepFailure => "migration_step_failure",
            Self::Storage { transient: true } => "storage_transient",
            Self::Storage { transient: false } => "storage",
            Self::NotFound => "not_found",
            Self::Invalid => "invalid",
        };
        f.write_str(s)
    }
}
