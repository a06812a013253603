//! The constitution: its protected tables, amendment proposals, and the
//! validator every proposal passes through before submission and enactment.
//!
//! - **Axioms** can never change. A proposal touching one is rejected with
//!   no override.
//! - **Invariants** may only be strengthened. Whether a change strengthens
//!   is decided by a best-effort heuristic; when it cannot tell, the proposal
//!   is flagged for mandatory court review.

pub mod axioms;
pub mod content;
pub mod error;
pub mod proposal;
pub mod strengthening;
pub mod validator;

pub use axioms::{
    axiom_touched, default_constitution, exit_allowed, exit_axiom_voided, invariant_touched,
    touches_invariant_table, Breach, ConstitutionTables, Invariant, AXIOM_IDS, EXIT_SETTING,
};
pub use error::ConstiError;
pub use proposal::{
    ChangeKind, Proposal, ProposalChange, ProposalStatus, RecordedRuling, RecordedVote,
};
pub use strengthening::{assess, Strengthening};
pub use validator::{ProposalValidator, ValidationIssue, ValidationReport};
