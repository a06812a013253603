//! Violations and the automatic detectors that find them.

use charter_consti::{Proposal, Strengthening};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    AxiomModification,
    InvariantWeakening,
    /// An invariant change whose direction could not be determined.
    IndeterminateInvariantChange,
    ProceduralDefect,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Forces an incompatible ruling regardless of votes.
    Blocking,
    Major,
    Advisory,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub target: Option<String>,
    pub description: String,
    pub severity: Severity,
}

impl Violation {
    pub fn blocking(kind: ViolationKind, target: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            target: Some(target.into()),
            description: description.into(),
            severity: Severity::Blocking,
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

/// Run the automatic detectors over a proposal.
///
/// Axiom touches and invariant weakening are blocking. Invariant changes the
/// heuristic cannot classify are reported as major findings so a human
/// justice has to look at them.
pub fn detect_violations(proposal: &Proposal) -> Vec<Violation> {
    let mut found = Vec::new();
    if !proposal.verify_hash() {
        found.push(Violation {
            kind: ViolationKind::ProceduralDefect,
            target: None,
            description: "content hash does not match the proposal".to_string(),
            severity: Severity::Blocking,
        });
    }
    for change in proposal.changes() {
        if let Some(axiom) = change.axiom() {
            found.push(Violation::blocking(
                ViolationKind::AxiomModification,
                change.target.clone(),
                format!("modifies axiom {axiom}"),
            ));
            continue;
        }
        if !change.touches_invariant() {
            continue;
        }
        match change.strengthening() {
            Strengthening::Strengthens => {}
            Strengthening::Weakens => found.push(Violation::blocking(
                ViolationKind::InvariantWeakening,
                change.target.clone(),
                "removes or loosens an invariant constraint",
            )),
            Strengthening::Indeterminate => found.push(Violation {
                kind: ViolationKind::IndeterminateInvariantChange,
                target: Some(change.target.clone()),
                description: "direction of invariant change could not be determined".to_string(),
                severity: Severity::Major,
            }),
        }
    }
    found
}
