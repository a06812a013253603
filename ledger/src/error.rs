use charter_consti::Breach;
use charter_types::{ErrorClass, LineageId};
use thiserror::Error;

use crate::chain::LineageHealth;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("lineage {0} already has a genesis version")]
    GenesisExists(LineageId),

    #[error("lineage {0} has no versions")]
    EmptyLineage(LineageId),

    #[error("version {0} not found")]
    VersionNotFound(String),

    #[error("invalid version string {0:?}")]
    InvalidVersion(String),

    #[error("content hash mismatch for version {version}")]
    HashMismatch { version: String },

    #[error("version chain broken at {version}: {reason}")]
    ChainBroken { version: String, reason: String },

    #[error("lineage {lineage} is {health}; writes are blocked until the incident is acknowledged")]
    LineageBlocked {
        lineage: LineageId,
        health: LineageHealth,
    },

    #[error("imported version {version} does not follow current version {current:?}")]
    ImportOutOfOrder {
        version: String,
        current: Option<String>,
    },

    #[error("malformed version record: {0}")]
    MalformedRecord(String),

    #[error("migration step {index} ({name}) failed: {reason}; {rolled_back} applied steps rolled back")]
    MigrationFailed {
        index: usize,
        name: String,
        reason: String,
        rolled_back: usize,
    },

    #[error("rollback of migration step {index} ({name}) failed; lineage left inconsistent")]
    RollbackFailed { index: usize, name: String },

    #[error("{action} would give up protected rules: {}", join_breaches(.breaches))]
    ProtectionBreached {
        action: &'static str,
        breaches: Vec<Breach>,
    },

    #[error("audit chain broken at entry {sequence}")]
    AuditChainBroken { sequence: u64 },

    #[error("content error: {0}")]
    Content(#[from] charter_consti::ConstiError),

    #[error("canonical encoding failed: {0}")]
    Canonical(#[from] charter_crypto::CanonicalError),

    #[error("internal lock poisoned")]
    LockPoisoned,
}

impl LedgerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::HashMismatch { .. }
            | Self::ChainBroken { .. }
            | Self::AuditChainBroken { .. }
            | Self::LineageBlocked { .. } => ErrorClass::Integrity,
            Self::MigrationFailed { .. } | Self::RollbackFailed { .. } => ErrorClass::MigrationStepFailure,
            Self::ProtectionBreached { .. } => ErrorClass::ConstitutionalViolation,
            Self::VersionNotFound(_) | Self::EmptyLineage(_) => ErrorClass::NotFound,
            Self::GenesisExists(_) | Self::ImportOutOfOrder { .. } => ErrorClass::StateTransition,
            _ => ErrorClass::Invalid,
        }
    }

    /// Whether this error must be surfaced to an operator.
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            Self::HashMismatch { .. }
                | Self::ChainBroken { .. }
                | Self::AuditChainBroken { .. }
                | Self::RollbackFailed { .. }
        )
    }
}

fn join_breaches(breaches: &[Breach]) -> String {
    let parts: Vec<String> = breaches.iter().map(ToString::to_string).collect();
    parts.join("; ")
}

impl<T> From<std::sync::PoisonError<T>> for LedgerError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}
