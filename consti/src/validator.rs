//! Proposal validation at submission and, strictly, before enactment.

use charter_types::{Chamber, GovernanceParams, Timestamp, Verdict};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::axioms::{Breach, ConstitutionTables, AXIOMS_ROOT, EXIT_SETTING, INVARIANTS_ROOT};
use crate::content::{remove_path, set_path};
use crate::proposal::Proposal;
use crate::strengthening::Strengthening;

/// One finding from validation.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ValidationIssue {
    #[error("title must be at least {min} characters")]
    TitleTooShort { min: usize },

    #[error("summary must be at least {min} characters")]
    SummaryTooShort { min: usize },

    #[error("rationale must be at least {min} characters")]
    RationaleTooShort { min: usize },

    #[error("proposal has no changes")]
    NoChanges,

    #[error("change {index} has no target")]
    MissingTarget { index: usize },

    #[error("change {index} has no rationale")]
    MissingRationale { index: usize },

    #[error("axiom violation: change to {target} touches axiom {axiom}")]
    AxiomViolation { target: String, axiom: String },

    #[error("invariant weakened: change to {target} removes or loosens a constraint")]
    InvariantWeakened { target: String },

    #[error("cannot tell whether change to {target} strengthens its invariant; court review required")]
    NeedsCourtReview { target: String },

    #[error("no vote result recorded for the {chamber} chamber")]
    MissingVoteResult { chamber: Chamber },

    #[error("the {chamber} chamber did not pass the proposal")]
    ChamberNotPassed { chamber: Chamber },

    #[error("no court ruling recorded")]
    MissingCourtRuling,

    #[error("court ruled incompatible")]
    CourtRuledIncompatible,

    #[error("no timelock recorded")]
    MissingTimelock,

    #[error("timelock has not elapsed (ends at {ends_at})")]
    TimelockNotElapsed { ends_at: Timestamp },

    #[error("content hash does not match the proposal's text and changes")]
    HashMismatch,
}

impl ValidationIssue {
    /// Axiom touches and invariant weakening.
    pub fn is_constitutional(&self) -> bool {
        matches!(
            self,
            Self::AxiomViolation { .. } | Self::InvariantWeakened { .. }
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_constitutional_violation(&self) -> bool {
        self.errors.iter().any(ValidationIssue::is_constitutional)
    }

    /// Whether a human court must look at this proposal before it can pass.
    pub fn requires_court_review(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, ValidationIssue::NeedsCourtReview { .. }))
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return f.write_str("valid");
        }
        let msgs: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        f.write_str(&msgs.join("; "))
    }
}

/// Minimum text lengths. Taken from [`GovernanceParams`].
#[derive(Clone, Copy, Debug)]
pub struct ProposalValidator {
    min_title_len: usize,
    min_summary_len: usize,
    min_rationale_len: usize,
}

impl ProposalValidator {
    pub fn new(params: &GovernanceParams) -> Self {
        Self {
            min_title_len: params.min_title_len,
            min_summary_len: params.min_summary_len,
            min_rationale_len: params.min_rationale_len,
        }
    }

    /// Structural checks plus the axiom and invariant rules.
    pub fn validate_for_submission(&self, proposal: &Proposal) -> ValidationReport {
        let mut report = ValidationReport::default();
        self.check_text(proposal, &mut report);
        check_changes(proposal, &mut report);
        debug!(
            proposal = %proposal.id(),
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "validated for submission"
        );
        report
    }

    /// Everything checked at submission, plus recorded outcomes of every
    /// later stage. `timelock_ends_at` is `None` when no timelock exists.
    pub fn validate_for_enactment(
        &self,
        proposal: &Proposal,
        timelock_ends_at: Option<Timestamp>,
        now: Timestamp,
    ) -> ValidationReport {
        let mut report = self.validate_for_submission(proposal);
        if !proposal.verify_hash() {
            report.errors.push(ValidationIssue::HashMismatch);
        }
        for chamber in Chamber::ALL {
            match proposal.vote_results().get(&chamber) {
                None => report
                    .errors
                    .push(ValidationIssue::MissingVoteResult { chamber }),
                Some(v) if !v.passed => report
                    .errors
                    .push(ValidationIssue::ChamberNotPassed { chamber }),
                Some(_) => {}
            }
        }
        match proposal.court_ruling() {
            None => report.errors.push(ValidationIssue::MissingCourtRuling),
            Some(r) if r.verdict == Verdict::Incompatible => {
                report.errors.push(ValidationIssue::CourtRuledIncompatible)
            }
            Some(_) => {}
        }
        match timelock_ends_at {
            None => report.errors.push(ValidationIssue::MissingTimelock),
            Some(ends_at) if now < ends_at => report
                .errors
                .push(ValidationIssue::TimelockNotElapsed { ends_at }),
            Some(_) => {}
        }
        debug!(
            proposal = %proposal.id(),
            errors = report.errors.len(),
            "validated for enactment"
        );
        report
    }

    /// Apply the proposal's changes to `current` and report every axiom or
    /// invariant the result gives up. Catches writes the per-change rules
    /// cannot see, such as replacing a whole table with declared old values
    /// that do not match the content.
    pub fn check_effect(&self, proposal: &Proposal, current: &Value, report: &mut ValidationReport) {
        let mut candidate = current.clone();
        for change in proposal.changes() {
            let applied = if change.new_value.is_null() {
                remove_path(&mut candidate, &change.target).map(drop)
            } else {
                set_path(&mut candidate, &change.target, change.new_value.clone()).map(drop)
            };
            if applied.is_err() {
                // The migration rejects malformed targets on its own.
                return;
            }
        }
        for breach in ConstitutionTables::from_content(current).breaches(&candidate) {
            let issue = breach_issue(breach);
            if !report.errors.contains(&issue) {
                report.errors.push(issue);
            }
        }
    }

    fn check_text(&self, proposal: &Proposal, report: &mut ValidationReport) {
        let len = |s: &str| s.trim().chars().count();
        if len(proposal.title()) < self.min_title_len {
            report.errors.push(ValidationIssue::TitleTooShort {
                min: self.min_title_len,
            });
        }
        if len(proposal.summary()) < self.min_summary_len {
            report.errors.push(ValidationIssue::SummaryTooShort {
                min: self.min_summary_len,
            });
        }
        if len(proposal.rationale()) < self.min_rationale_len {
            report.errors.push(ValidationIssue::RationaleTooShort {
                min: self.min_rationale_len,
            });
        }
    }
}

fn breach_issue(breach: Breach) -> ValidationIssue {
    match breach {
        Breach::AxiomRemoved { axiom } | Breach::AxiomAltered { axiom } => ValidationIssue::AxiomViolation {
            target: format!("{AXIOMS_ROOT}.{axiom}"),
            axiom,
        },
        Breach::ExitDisabled => ValidationIssue::AxiomViolation {
            target: EXIT_SETTING.to_string(),
            axiom: "right_to_exit".to_string(),
        },
        Breach::InvariantRemoved { invariant } | Breach::InvariantWeakened { invariant, .. } => {
            ValidationIssue::InvariantWeakened {
                target: format!("{INVARIANTS_ROOT}.{invariant}"),
            }
        }
    }
}

fn check_changes(proposal: &Proposal, report: &mut ValidationReport) {
    if proposal.changes().is_empty() {
        report.errors.push(ValidationIssue::NoChanges);
    }
    for (index, change) in proposal.changes().iter().enumerate() {
        if change.target.trim().is_empty() {
            report.errors.push(ValidationIssue::MissingTarget { index });
            continue;
        }
        if change.rationale.trim().is_empty() {
            report.errors.push(ValidationIssue::MissingRationale { index });
        }
        if let Some(axiom) = change.axiom() {
            report.errors.push(ValidationIssue::AxiomViolation {
                target: change.target.clone(),
                axiom,
            });
            continue;
        }
        if change.touches_invariant() {
            match change.strengthening() {
                Strengthening::Strengthens => {}
                Strengthening::Weakens => report.errors.push(ValidationIssue::InvariantWeakened {
                    target: change.target.clone(),
                }),
                Strengthening::Indeterminate => {
                    report.warnings.push(ValidationIssue::NeedsCourtReview {
                        target: change.target.clone(),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::{ChangeKind, ProposalChange, RecordedRuling, RecordedVote};
    use serde_json::json;

    fn validator() -> ProposalValidator {
        ProposalValidator::new(&GovernanceParams::default())
    }

    fn proposal(changes: Vec<ProposalChange>) -> Proposal {
        Proposal::draft(
            "alice".into(),
            "Add pause right",
            "Let members pause their participation.",
            "Pausing is a gentler alternative to leaving.",
            changes,
            Timestamp::new(1_000),
        )
        .unwrap()
    }

    fn add_pause() -> ProposalChange {
        ProposalChange::new(
            ChangeKind::InvariantModify,
            "invariants.user_control.constraints",
            json!(["can_export", "can_delete"]),
            json!(["can_export", "can_delete", "can_pause"]),
            "members should be able to pause",
        )
    }

    fn passed() -> RecordedVote {
        RecordedVote {
            passed: true,
            quorum: 0.8,
            approval: 0.8,
            minority_protection_triggered: false,
        }
    }

    fn approved(verdict: Verdict) -> Proposal {
        let mut p = proposal(vec![add_pause()]);
        p.record_vote(Chamber::Users, passed());
        p.record_vote(Chamber::Guardians, passed());
        p.record_ruling(RecordedRuling {
            ruling_id: "ruling:x".into(),
            verdict,
        });
        p
    }

    #[test]
    fn strengthening_invariant_is_valid() {
        let report = validator().validate_for_submission(&proposal(vec![add_pause()]));
        assert!(report.is_valid(), "{report}");
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn axiom_touch_is_always_an_error() {
        let change = ProposalChange::new(
            ChangeKind::Documentation,
            "axioms.right_to_exit",
            json!("old"),
            json!("clearer wording"),
            "typo fix",
        );
        let report = validator().validate_for_submission(&proposal(vec![change]));
        assert!(!report.is_valid());
        assert!(report.has_constitutional_violation());
    }

    #[test]
    fn weakening_is_an_error() {
        let change = ProposalChange::new(
            ChangeKind::InvariantModify,
            "invariants.user_control.constraints",
            json!(["can_export", "can_delete"]),
            json!(["can_export"]),
            "deleting is expensive",
        );
        let report = validator().validate_for_submission(&proposal(vec![change]));
        assert!(matches!(
            report.errors.as_slice(),
            [ValidationIssue::InvariantWeakened { .. }]
        ));
    }

    #[test]
    fn indeterminate_warns_for_court() {
        let change = ProposalChange::new(
            ChangeKind::InvariantModify,
            "invariants.user_control.description",
            json!("Members control their own participation."),
            json!("Members decide how they participate."),
            "wording",
        );
        let report = validator().validate_for_submission(&proposal(vec![change]));
        assert!(report.is_valid());
        assert!(report.requires_court_review());
    }

    #[test]
    fn short_text_and_missing_fields() {
        let change = ProposalChange::new(ChangeKind::FeatureAdd, " ", json!(null), json!(1), "");
        let p = Proposal::draft(
            "alice".into(),
            "Hi",
            "short",
            "short",
            vec![change],
            Timestamp::new(1),
        )
        .unwrap();
        let report = validator().validate_for_submission(&p);
        assert!(report.errors.contains(&ValidationIssue::TitleTooShort { min: 5 }));
        assert!(report.errors.contains(&ValidationIssue::MissingTarget { index: 0 }));
    }

    #[test]
    fn enactment_needs_every_stage() {
        let p = proposal(vec![add_pause()]);
        let report = validator().validate_for_enactment(&p, None, Timestamp::new(5_000));
        assert!(report.errors.contains(&ValidationIssue::MissingCourtRuling));
        assert!(report.errors.contains(&ValidationIssue::MissingTimelock));
        assert!(report.errors.contains(&ValidationIssue::MissingVoteResult {
            chamber: Chamber::Users
        }));
    }

    #[test]
    fn enactment_passes_after_timelock() {
        let p = approved(Verdict::Compatible);
        let v = validator();
        let early = v.validate_for_enactment(&p, Some(Timestamp::new(10_000)), Timestamp::new(9_999));
        assert!(!early.is_valid());
        let on_time = v.validate_for_enactment(&p, Some(Timestamp::new(10_000)), Timestamp::new(10_000));
        assert!(on_time.is_valid(), "{on_time}");
    }

    #[test]
    fn incompatible_ruling_blocks_enactment() {
        let p = approved(Verdict::Incompatible);
        let report =
            validator().validate_for_enactment(&p, Some(Timestamp::new(1)), Timestamp::new(2));
        assert!(report.to_string().contains("court ruled incompatible"));
    }

    #[test]
    fn replacing_invariant_root_is_weakening() {
        let change = ProposalChange::new(
            ChangeKind::FeatureModify,
            "invariants",
            json!({}),
            json!({}),
            "start over",
        );
        let p = proposal(vec![change]);
        let v = validator();
        let mut report = v.validate_for_submission(&p);
        v.check_effect(&p, &crate::default_constitution(), &mut report);
        assert!(report.has_constitutional_violation());
        assert!(report.errors.contains(&ValidationIssue::InvariantWeakened {
            target: "invariants.user_control".into()
        }));
        assert!(report.errors.contains(&ValidationIssue::InvariantWeakened {
            target: "invariants.audit_trail".into()
        }));
    }

    #[test]
    fn misdeclared_old_value_is_caught_by_effect() {
        // Declares an empty list as the old value so the change reads as an addition.
        let change = ProposalChange::new(
            ChangeKind::InvariantModify,
            "invariants.user_control.constraints",
            json!([]),
            json!(["can_export"]),
            "narrow",
        );
        let p = proposal(vec![change]);
        let v = validator();
        let mut report = v.validate_for_submission(&p);
        assert!(report.is_valid());
        v.check_effect(&p, &crate::default_constitution(), &mut report);
        assert_eq!(
            report.errors,
            vec![ValidationIssue::InvariantWeakened {
                target: "invariants.user_control".into()
            }]
        );
    }

    #[test]
    fn disabling_exit_is_an_axiom_violation() {
        let change = ProposalChange::new(
            ChangeKind::GovernanceModify,
            "governance.allow_exit",
            json!(true),
            json!(false),
            "stability",
        );
        let p = proposal(vec![change]);
        let v = validator();
        let mut report = v.validate_for_submission(&p);
        v.check_effect(&p, &crate::default_constitution(), &mut report);
        assert_eq!(
            report.errors,
            vec![ValidationIssue::AxiomViolation {
                target: "governance.allow_exit".into(),
                axiom: "right_to_exit".into()
            }]
        );
    }

    #[test]
    fn harmless_effect_adds_nothing() {
        let p = proposal(vec![add_pause()]);
        let mut report = ValidationReport::default();
        validator().check_effect(&p, &crate::default_constitution(), &mut report);
        assert!(report.is_valid(), "{report}");
    }

    #[test]
    fn status_does_not_bypass_axiom_rule() {
        let change = ProposalChange::new(
            ChangeKind::GovernanceModify,
            "human_agency",
            json!("x"),
            json!("y"),
            "because",
        );
        let mut p = approved(Verdict::Compatible);
        p.set_changes(vec![change], Timestamp::new(2)).unwrap();
        let report =
            validator().validate_for_enactment(&p, Some(Timestamp::new(1)), Timestamp::new(2));
        assert!(report.has_constitutional_violation());
    }
}
