//! Bicameral voting for constitutional amendments.
//!
//! Votes are weighted by liquid delegation and then dampened with a square
//! root, so no single stake dominates. Each proposal is voted on separately
//! by general members and maintainers; both chambers must pass it.
//!
//! Minority protection: when opposition reaches a configured share of the
//! votes cast, the chamber's threshold escalates to the supermajority and
//! the escalation is recorded on the result.

pub mod bicameral;
pub mod delegation;
pub mod error;
pub mod quadratic;
pub mod session;
pub mod voting;

pub use bicameral::{BicameralEvaluator, BicameralResult, ChamberEvaluation};
pub use delegation::{Delegation, DelegationGraph, DelegationSnapshot, Resolution};
pub use error::GovernanceError;
pub use quadratic::QuadraticWeighting;
pub use session::{tally, SessionStatus, TallyResult, TallyRules, VoteChoice, VoteRecord, VotingSession};
pub use voting::VotingEngine;
