//! Bicameral anti-capture evaluation.
//!
//! A proposal passes only if the general-member chamber and the maintainer
//! chamber each independently reach quorum and their (possibly
//! minority-escalated) threshold. Neither chamber alone can carry a change.

use charter_consti::axioms::GOVERNANCE_ROOT;
use charter_consti::{ChangeKind, Proposal, Strengthening};
use charter_types::{Category, Chamber, ChamberRequirements, GovernanceParams, ProposalId};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::session::TallyResult;

/// Words in a proposal's text or targets that mark it as touching a
/// sensitive area.
const SENSITIVE_KEYWORDS: &[&str] = &[
    "security",
    "privacy",
    "governance",
    "voting",
    "vote",
    "court",
    "timelock",
    "exit",
    "delegation",
    "quorum",
    "threshold",
    "moderation",
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChamberEvaluation {
    pub chamber: Chamber,
    pub quorum_met: bool,
    pub threshold_required: f64,
    pub threshold_met: bool,
    pub minority_protection_triggered: bool,
    pub passed: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BicameralResult {
    pub proposal: ProposalId,
    pub category: Category,
    pub users: ChamberEvaluation,
    pub guardians: ChamberEvaluation,
    pub user_passed: bool,
    pub guardian_passed: bool,
    pub both_passed: bool,
    /// Escalation happened in either chamber.
    pub minority_protection_triggered: bool,
    pub fast_tracked: bool,
    /// Timelock to apply if the proposal proceeds.
    pub timelock_days: u64,
}

pub struct BicameralEvaluator {
    params: GovernanceParams,
}

impl BicameralEvaluator {
    pub fn new(params: GovernanceParams) -> Self {
        Self { params }
    }

    /// Decide how much scrutiny a proposal needs.
    ///
    /// Axiom touches are always constitutional (and are rejected elsewhere).
    /// Governance changes and invariant changes not known to strengthen are
    /// major. Strengthening invariant changes, feature changes and anything
    /// mentioning a sensitive area are standard. What remains is minor.
    pub fn categorize(&self, proposal: &Proposal) -> Category {
        let changes = proposal.changes();
        if changes.iter().any(|c| c.axiom().is_some()) {
            return Category::Constitutional;
        }
        let major = changes.iter().any(|c| {
            c.kind == ChangeKind::GovernanceModify
                || c.target.split('.').next() == Some(GOVERNANCE_ROOT)
                || (c.touches_invariant() && c.strengthening() != Strengthening::Strengthens)
        });
        if major {
            return Category::Major;
        }
        let standard = changes.iter().any(|c| {
            c.touches_invariant()
                || matches!(
                    c.kind,
                    ChangeKind::InvariantModify
                        | ChangeKind::InvariantAdd
                        | ChangeKind::FeatureAdd
                        | ChangeKind::FeatureModify
                )
        });
        if standard || mentions_sensitive_area(proposal) {
            Category::Standard
        } else {
            Category::Minor
        }
    }

    pub fn requirements(&self, category: Category, chamber: Chamber) -> ChamberRequirements {
        self.params.requirements(category).for_chamber(chamber)
    }

    /// Timelock for a category: the longer of the two chambers' durations.
    pub fn timelock_days(&self, category: Category) -> u64 {
        self.params.timelock_days(category)
    }

    fn evaluate_chamber(&self, category: Category, result: &TallyResult) -> ChamberEvaluation {
        let req = self.requirements(category, result.chamber);
        let total = result.total_power();
        let minority = total > 0.0
            && result.against_power / total >= self.params.minority_protection_fraction;
        let threshold_required = if minority {
            req.threshold.max(self.params.supermajority)
        } else {
            req.threshold
        };
        let quorum_met = result.eligible > 0 && result.quorum >= req.quorum;
        let threshold_met =
            result.for_power + result.against_power > 0.0 && result.approval >= threshold_required;
        ChamberEvaluation {
            chamber: result.chamber,
            quorum_met,
            threshold_required,
            threshold_met,
            minority_protection_triggered: minority,
            passed: quorum_met && threshold_met,
        }
    }

    /// Combine the two chambers' results against the category's requirements.
    pub fn evaluate(
        &self,
        proposal: &ProposalId,
        user_result: &TallyResult,
        guardian_result: &TallyResult,
        category: Category,
    ) -> BicameralResult {
        let users = self.evaluate_chamber(category, user_result);
        let guardians = self.evaluate_chamber(category, guardian_result);
        let both_passed = users.passed && guardians.passed;
        let unanimous_guardians =
            guardian_result.against_count == 0 && guardian_result.for_count > 0;
        let fast_tracked = both_passed && category == Category::Minor && unanimous_guardians;
        let full = self.timelock_days(category);
        // Fast-tracking never lengthens the timelock.
        let timelock_days = if fast_tracked {
            (full / 2).max(self.params.fast_track_min_timelock_days).min(full)
        } else {
            full
        };
        let result = BicameralResult {
            proposal: proposal.clone(),
            category,
            user_passed: users.passed,
            guardian_passed: guardians.passed,
            both_passed,
            minority_protection_triggered: users.minority_protection_triggered
                || guardians.minority_protection_triggered,
            fast_tracked,
            timelock_days,
            users,
            guardians,
        };
        info!(
            proposal = %proposal,
            %category,
            user_passed = result.user_passed,
            guardian_passed = result.guardian_passed,
            minority_protection = result.minority_protection_triggered,
            fast_tracked,
            "bicameral evaluation"
        );
        result
    }
}

fn mentions_sensitive_area(proposal: &Proposal) -> bool {
    let text = format!("{} {}", proposal.title(), proposal.summary()).to_lowercase();
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let in_targets = proposal.changes().iter().any(|c| {
        c.target
            .to_lowercase()
            .split(['.', '_'])
            .any(|seg| SENSITIVE_KEYWORDS.contains(&seg))
    });
    in_targets || words.iter().any(|w| SENSITIVE_KEYWORDS.contains(w))
}
