//! Pre-built [`tracing::Span`] constructors for the amendment pipeline.
//!
//! Consistent span names and field sets make it easy to follow one proposal
//! through every stage in collected traces.

use tracing::{info_span, Span};

/// Submission, withdrawal and other whole-proposal operations.
pub fn proposal_span(proposal: &str, op: &str) -> Span {
    info_span!("proposal", proposal = %proposal, op = %op)
}

/// Casting, changing or finalizing chamber votes.
pub fn vote_span(proposal: &str, chamber: &str) -> Span {
    info_span!("vote", proposal = %proposal, chamber = %chamber)
}

pub fn court_span(proposal: &str) -> Span {
    info_span!("court", proposal = %proposal)
}

/// Timelock creation, halt signatures and extensions.
pub fn timelock_span(proposal: &str, op: &str) -> Span {
    info_span!("timelock", proposal = %proposal, op = %op)
}

/// Executing a ready proposal into a new constitution version.
pub fn enact_span(proposal: &str, lineage: &str) -> Span {
    info_span!("enact", proposal = %proposal, lineage = %lineage)
}

/// A single storage call, including its retries.
pub fn store_span(op: &str) -> Span {
    info_span!("store", op = %op)
}

pub fn exit_span(member: &str) -> Span {
    info_span!("exit", member = %member)
}
