//! Court rulings and how a verdict is reached from the votes on them.

use charter_consti::RecordedRuling;
use charter_types::{MemberId, ProposalId, RulingId, Timestamp, Verdict};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::violation::Violation;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JusticeVote {
    pub justice: MemberId,
    pub verdict: Verdict,
    pub reasoning: String,
    pub violations: Vec<Violation>,
    pub cast_at: Timestamp,
}

/// A change the court requires before the proposal can proceed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredModification {
    pub description: String,
    pub requested_by: MemberId,
    pub resolved_at: Option<Timestamp>,
}

impl RequiredModification {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CourtRuling {
    pub id: RulingId,
    pub proposal: ProposalId,
    pub opened_at: Timestamp,
    /// Findings of the automatic detectors at the time the review opened.
    pub automatic_findings: Vec<Violation>,
    pub votes: BTreeMap<MemberId, JusticeVote>,
    pub modifications: Vec<RequiredModification>,
    pub verdict: Option<Verdict>,
    pub finalized_at: Option<Timestamp>,
}

impl CourtRuling {
    pub fn open(proposal: ProposalId, automatic_findings: Vec<Violation>, now: Timestamp) -> Self {
        Self {
            id: RulingId::for_proposal(&proposal),
            proposal,
            opened_at: now,
            automatic_findings,
            votes: BTreeMap::new(),
            modifications: Vec::new(),
            verdict: None,
            finalized_at: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.verdict.is_some()
    }

    /// Every violation on record: automatic findings plus those cited by justices.
    pub fn violations(&self) -> impl Iterator<Item = &Violation> {
        self.automatic_findings
            .iter()
            .chain(self.votes.values().flat_map(|v| v.violations.iter()))
    }

    pub fn has_blocking_violation(&self) -> bool {
        self.violations().any(Violation::is_blocking)
    }

    pub fn unresolved_modifications(&self) -> usize {
        self.modifications.iter().filter(|m| !m.is_resolved()).count()
    }

    /// The verdict the current record supports.
    ///
    /// A blocking violation wins over everything, then unresolved required
    /// modifications, then the plurality of non-abstaining votes. A tie at the
    /// top, or no non-abstaining votes at all, is incompatible.
    pub fn decide(&self) -> Verdict {
        if self.has_blocking_violation() {
            return Verdict::Incompatible;
        }
        if self.unresolved_modifications() > 0 {
            return Verdict::Conditional;
        }
        let mut counts: BTreeMap<Verdict, usize> = BTreeMap::new();
        for vote in self.votes.values() {
            if vote.verdict != Verdict::Abstain {
                *counts.entry(vote.verdict).or_default() += 1;
            }
        }
        let Some(top) = counts.values().copied().max() else {
            return Verdict::Incompatible;
        };
        let mut leaders = counts.iter().filter(|(_, n)| **n == top).map(|(v, _)| *v);
        match (leaders.next(), leaders.next()) {
            (Some(verdict), None) => verdict,
            _ => Verdict::Incompatible,
        }
    }

    /// Summary recorded on the proposal once finalized.
    pub fn recorded(&self) -> Option<RecordedRuling> {
        self.verdict.map(|verdict| RecordedRuling {
            ruling_id: self.id.clone(),
            verdict,
        })
    }
}
