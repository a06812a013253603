//! Amendment proposals and their lifecycle.

use charter_crypto::{blake2b_256_multi, hash_canonical};
use charter_types::{Category, Chamber, ContentHash, MemberId, ProposalId, RulingId, Timestamp, Verdict};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::axioms::{axiom_touched, exit_axiom_voided, touches_invariant_table};
use crate::strengthening::{assess, Strengthening};
use crate::ConstiError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    InvariantModify,
    InvariantAdd,
    FeatureAdd,
    FeatureModify,
    GovernanceModify,
    Documentation,
}

/// One edit to the content tree.
///
/// `strengthening` is derived from the values and never taken from input:
/// deserialization recomputes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawChange")]
pub struct ProposalChange {
    pub kind: ChangeKind,
    /// Dotted path into the content tree.
    pub target: String,
    pub old_value: Value,
    pub new_value: Value,
    pub rationale: String,
    strengthening: Strengthening,
}

#[derive(Deserialize)]
struct RawChange {
    kind: ChangeKind,
    target: String,
    #[serde(default)]
    old_value: Value,
    #[serde(default)]
    new_value: Value,
    #[serde(default)]
    rationale: String,
}

impl From<RawChange> for ProposalChange {
    fn from(raw: RawChange) -> Self {
        Self::new(raw.kind, raw.target, raw.old_value, raw.new_value, raw.rationale)
    }
}

impl ProposalChange {
    pub fn new(
        kind: ChangeKind,
        target: impl Into<String>,
        old_value: Value,
        new_value: Value,
        rationale: impl Into<String>,
    ) -> Self {
        let target = target.into();
        let strengthening = assess(&target, &old_value, &new_value);
        Self {
            kind,
            target,
            old_value,
            new_value,
            rationale: rationale.into(),
            strengthening,
        }
    }

    pub fn strengthening(&self) -> Strengthening {
        self.strengthening
    }

    /// The axiom this change touches, if any. Turning off exit counts as
    /// touching `right_to_exit`.
    pub fn axiom(&self) -> Option<String> {
        axiom_touched(&self.target).or_else(|| exit_axiom_voided(&self.target, &self.new_value))
    }

    /// Whether the change is subject to the invariant monotonicity rule.
    pub fn touches_invariant(&self) -> bool {
        matches!(self.kind, ChangeKind::InvariantModify | ChangeKind::InvariantAdd)
            || touches_invariant_table(&self.target)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Draft,
    Submitted,
    Voting,
    CourtReview,
    Timelocked,
    Enacted,
    Rejected,
    Halted,
    Withdrawn,
}

impl ProposalStatus {
    pub fn can_transition_to(self, next: ProposalStatus) -> bool {
        use ProposalStatus::*;
        matches!(
            (self, next),
            (Draft, Submitted)
                | (Draft, Withdrawn)
                | (Submitted, Voting)
                | (Submitted, Rejected)
                | (Submitted, Withdrawn)
                | (Voting, CourtReview)
                | (Voting, Rejected)
                | (Voting, Withdrawn)
                | (CourtReview, Timelocked)
                | (CourtReview, Rejected)
                | (Timelocked, Enacted)
                | (Timelocked, Halted)
                | (Timelocked, Rejected)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Enacted | Self::Rejected | Self::Halted | Self::Withdrawn
        )
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Voting => "voting",
            Self::CourtReview => "court_review",
            Self::Timelocked => "timelocked",
            Self::Enacted => "enacted",
            Self::Rejected => "rejected",
            Self::Halted => "halted",
            Self::Withdrawn => "withdrawn",
        };
        f.write_str(s)
    }
}

/// A chamber's vote outcome as recorded on the proposal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedVote {
    pub passed: bool,
    pub quorum: f64,
    pub approval: f64,
    pub minority_protection_triggered: bool,
}

/// The court's aggregate ruling as recorded on the proposal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedRuling {
    pub ruling_id: RulingId,
    pub verdict: Verdict,
}

#[derive(Serialize)]
struct HashInput<'a> {
    title: &'a str,
    rationale: &'a str,
    changes: &'a [ProposalChange],
}

/// A proposal to amend the constitution.
///
/// Text and changes are private: every edit goes through a method that
/// recomputes the content hash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    id: ProposalId,
    proposer: MemberId,
    title: String,
    summary: String,
    rationale: String,
    changes: Vec<ProposalChange>,
    content_hash: ContentHash,
    status: ProposalStatus,
    category: Option<Category>,
    vote_results: BTreeMap<Chamber, RecordedVote>,
    court_ruling: Option<RecordedRuling>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl Proposal {
    /// Create a draft. The id is derived from the proposer, title and time.
    pub fn draft(
        proposer: MemberId,
        title: impl Into<String>,
        summary: impl Into<String>,
        rationale: impl Into<String>,
        changes: Vec<ProposalChange>,
        now: Timestamp,
    ) -> Result<Self, ConstiError> {
        let title = title.into();
        let id = Self::derive_id(&proposer, &title, now);
        let mut proposal = Self {
            id,
            proposer,
            title,
            summary: summary.into(),
            rationale: rationale.into(),
            changes,
            content_hash: ContentHash::ZERO,
            status: ProposalStatus::Draft,
            category: None,
            vote_results: BTreeMap::new(),
            court_ruling: None,
            created_at: now,
            updated_at: now,
        };
        proposal.content_hash = proposal.compute_hash()?;
        Ok(proposal)
    }

    pub fn derive_id(proposer: &MemberId, title: &str, created_at: Timestamp) -> ProposalId {
        let digest = blake2b_256_multi(&[
            proposer.as_str().as_bytes(),
            title.as_bytes(),
            &created_at.as_secs().to_le_bytes(),
        ]);
        let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
        ProposalId::new(format!("prop-{hex}"))
    }

    pub fn id(&self) -> &ProposalId {
        &self.id
    }

    pub fn proposer(&self) -> &MemberId {
        &self.proposer
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn changes(&self) -> &[ProposalChange] {
        &self.changes
    }

    pub fn content_hash(&self) -> ContentHash {
        self.content_hash
    }

    pub fn status(&self) -> ProposalStatus {
        self.status
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    pub fn vote_results(&self) -> &BTreeMap<Chamber, RecordedVote> {
        &self.vote_results
    }

    pub fn court_ruling(&self) -> Option<&RecordedRuling> {
        self.court_ruling.as_ref()
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    pub fn compute_hash(&self) -> Result<ContentHash, ConstiError> {
        Ok(hash_canonical(&HashInput {
            title: &self.title,
            rationale: &self.rationale,
            changes: &self.changes,
        })?)
    }

    /// Whether the stored hash still matches the text and changes.
    pub fn verify_hash(&self) -> bool {
        self.compute_hash()
            .map(|h| h == self.content_hash)
            .unwrap_or(false)
    }

    fn ensure_editable(&self) -> Result<(), ConstiError> {
        if self.status == ProposalStatus::Draft {
            Ok(())
        } else {
            Err(ConstiError::NotEditable(self.status))
        }
    }

    /// Replace the changes of a draft.
    pub fn set_changes(&mut self, changes: Vec<ProposalChange>, now: Timestamp) -> Result<(), ConstiError> {
        self.ensure_editable()?;
        self.changes = changes;
        self.content_hash = self.compute_hash()?;
        self.updated_at = now;
        Ok(())
    }

    /// Replace the text of a draft.
    pub fn set_text(
        &mut self,
        title: impl Into<String>,
        summary: impl Into<String>,
        rationale: impl Into<String>,
        now: Timestamp,
    ) -> Result<(), ConstiError> {
        self.ensure_editable()?;
        self.title = title.into();
        self.summary = summary.into();
        self.rationale = rationale.into();
        self.content_hash = self.compute_hash()?;
        self.updated_at = now;
        Ok(())
    }

    pub fn transition(&mut self, next: ProposalStatus, now: Timestamp) -> Result<(), ConstiError> {
        if !self.status.can_transition_to(next) {
            return Err(ConstiError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Withdraw. Only the proposer may, and only before voting closes.
    pub fn withdraw(&mut self, by: &MemberId, now: Timestamp) -> Result<(), ConstiError> {
        if by != &self.proposer {
            return Err(ConstiError::NotProposer(by.clone()));
        }
        self.transition(ProposalStatus::Withdrawn, now)
    }

    pub fn set_category(&mut self, category: Category) {
        self.category = Some(category);
    }

    pub fn record_vote(&mut self, chamber: Chamber, vote: RecordedVote) {
        self.vote_results.insert(chamber, vote);
    }

    pub fn record_ruling(&mut self, ruling: RecordedRuling) {
        self.court_ruling = Some(ruling);
    }

    pub fn touches_axiom(&self) -> bool {
        self.changes.iter().any(|c| c.axiom().is_some())
    }
}
