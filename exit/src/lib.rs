//! Forks and exit rights.
//!
//! Members may always leave, take their data, or move to a fork. Forks are
//! judged against the canonical axioms and invariants, and a member can only
//! migrate to a fork that keeps them.

pub mod error;
pub mod fork;
pub mod registry;
pub mod rights;

pub use error::ExitError;
pub use fork::{ForkAssessment, ForkEvaluator, ForkIssue, Legitimacy};
pub use registry::{ForkRecord, ForkRegistry};
pub use rights::{ExitRequest, ExitRightsManager, ExitStatus, ExitType, ExportSummary};
