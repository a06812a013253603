//! The constitution's version history.
//!
//! Versions form a hash chain per lineage: each records its content hash and
//! a chain hash linking it to its parent. Content changes go through
//! migrations that either apply every step or roll all of them back.
//! Every write is recorded in a hash-chained audit log.

pub mod audit;
pub mod chain;
pub mod diff;
pub mod error;
pub mod export;
pub mod migration;
pub mod version;

pub use audit::{verify_audit_chain, AuditCursor, AuditEntry};
pub use chain::{LineageHealth, VersionManager};
pub use diff::{diff, Modification, VersionDiff};
pub use error::LedgerError;
pub use export::{VersionMetadata, VersionRecord};
pub use migration::{
    CustomCheck, CustomTransform, MigrationOutcome, MigrationPlan, MigrationStep, Precondition, Rollback,
    StepAction,
};
pub use version::{chain_hash, ConstitutionVersion, SemVer, VersionBump};
