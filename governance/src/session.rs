//! Voting sessions and tallies.

use charter_consti::RecordedVote;
use charter_types::{Chamber, ChamberRequirements, GovernanceParams, MemberId, ProposalId, SessionId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::GovernanceError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    For,
    Against,
    Abstain,
}

/// A cast vote. `weight` is post-delegation, post-quadratic vote power.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter: MemberId,
    pub choice: VoteChoice,
    pub weight: f64,
    /// Effective weight before quadratic dampening.
    pub effective_weight: f64,
    pub chamber: Chamber,
    pub cast_at: Timestamp,
    /// Members whose delegated weight reached this voter.
    pub delegation_chain: Vec<MemberId>,
}

/// Thresholds a session is tallied against, fixed when it opens.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TallyRules {
    pub quorum: f64,
    pub threshold: f64,
    pub supermajority: f64,
    pub minority_protection_fraction: f64,
}

impl TallyRules {
    pub fn new(requirements: ChamberRequirements, params: &GovernanceParams) -> Self {
        Self {
            quorum: requirements.quorum,
            threshold: requirements.threshold,
            supermajority: params.supermajority,
            minority_protection_fraction: params.minority_protection_fraction,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    Open,
    Closed,
    Finalized,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TallyResult {
    pub session: SessionId,
    pub chamber: Chamber,
    pub for_power: f64,
    pub against_power: f64,
    pub abstain_power: f64,
    pub for_count: usize,
    pub against_count: usize,
    pub abstain_count: usize,
    pub eligible: usize,
    /// Voters over eligible roster size.
    pub quorum: f64,
    pub quorum_required: f64,
    pub quorum_met: bool,
    /// for / (for + against), by power.
    pub approval: f64,
    /// The threshold actually applied, after any minority escalation.
    pub threshold_required: f64,
    pub threshold_met: bool,
    pub minority_protection_triggered: bool,
    pub passed: bool,
}

impl TallyResult {
    pub fn voters(&self) -> usize {
        self.for_count + self.against_count + self.abstain_count
    }

    pub fn total_power(&self) -> f64 {
        self.for_power + self.against_power + self.abstain_power
    }
}

impl From<&TallyResult> for RecordedVote {
    fn from(t: &TallyResult) -> Self {
        RecordedVote {
            passed: t.passed,
            quorum: t.quorum,
            approval: t.approval,
            minority_protection_triggered: t.minority_protection_triggered,
        }
    }
}

/// Tally a set of votes. Pure: the same records and rules always give the
/// same result.
pub fn tally(
    session: &SessionId,
    chamber: Chamber,
    votes: &BTreeMap<MemberId, VoteRecord>,
    eligible: usize,
    rules: &TallyRules,
) -> TallyResult {
    let (mut for_power, mut against_power, mut abstain_power) = (0.0, 0.0, 0.0);
    let (mut for_count, mut against_count, mut abstain_count) = (0, 0, 0);
    // BTreeMap iteration fixes the summation order.
    for record in votes.values() {
        match record.choice {
            VoteChoice::For => {
                for_power += record.weight;
                for_count += 1;
            }
            VoteChoice::Against => {
                against_power += record.weight;
                against_count += 1;
            }
            VoteChoice::Abstain => {
                abstain_power += record.weight;
                abstain_count += 1;
            }
        }
    }
    let voters = for_count + against_count + abstain_count;
    let quorum = if eligible == 0 {
        0.0
    } else {
        voters as f64 / eligible as f64
    };
    let decisive = for_power + against_power;
    let approval = if decisive > 0.0 { for_power / decisive } else { 0.0 };
    let total = decisive + abstain_power;
    let minority_protection_triggered =
        total > 0.0 && against_power / total >= rules.minority_protection_fraction;
    let threshold_required = if minority_protection_triggered {
        rules.threshold.max(rules.supermajority)
    } else {
        rules.threshold
    };
    let quorum_met = eligible > 0 && quorum >= rules.quorum;
    let threshold_met = decisive > 0.0 && approval >= threshold_required;
    TallyResult {
        session: session.clone(),
        chamber,
        for_power,
        against_power,
        abstain_power,
        for_count,
        against_count,
        abstain_count,
        eligible,
        quorum,
        quorum_required: rules.quorum,
        quorum_met,
        approval,
        threshold_required,
        threshold_met,
        minority_protection_triggered,
        passed: quorum_met && threshold_met,
    }
}

/// A timed vote of one chamber on one proposal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VotingSession {
    pub id: SessionId,
    pub proposal: ProposalId,
    pub chamber: Chamber,
    /// Delegation topic this vote resolves under.
    pub topic: Option<String>,
    pub opens_at: Timestamp,
    pub closes_at: Timestamp,
    /// Roster size when the session opened.
    pub eligible: usize,
    pub rules: TallyRules,
    votes: BTreeMap<MemberId, VoteRecord>,
    result: Option<TallyResult>,
    cancelled_at: Option<Timestamp>,
}

impl VotingSession {
    pub fn new(
        proposal: ProposalId,
        chamber: Chamber,
        topic: Option<String>,
        opens_at: Timestamp,
        closes_at: Timestamp,
        eligible: usize,
        rules: TallyRules,
    ) -> Self {
        Self {
            id: SessionId::for_proposal(&proposal, chamber),
            proposal,
            chamber,
            topic,
            opens_at,
            closes_at,
            eligible,
            rules,
            votes: BTreeMap::new(),
            result: None,
            cancelled_at: None,
        }
    }

    pub fn status(&self, now: Timestamp) -> SessionStatus {
        if self.cancelled_at.is_some() {
            SessionStatus::Cancelled
        } else if self.result.is_some() {
            SessionStatus::Finalized
        } else if now < self.opens_at {
            SessionStatus::Scheduled
        } else if now < self.closes_at {
            SessionStatus::Open
        } else {
            SessionStatus::Closed
        }
    }

    pub fn votes(&self) -> &BTreeMap<MemberId, VoteRecord> {
        &self.votes
    }

    pub fn result(&self) -> Option<&TallyResult> {
        self.result.as_ref()
    }

    fn ensure_open(&self, now: Timestamp) -> Result<(), GovernanceError> {
        if self.status(now) == SessionStatus::Open {
            Ok(())
        } else {
            Err(GovernanceError::SessionNotOpen {
                session: self.id.clone(),
                now,
            })
        }
    }

    /// Record a first vote. A second cast by the same voter is rejected.
    pub fn cast(&mut self, record: VoteRecord, now: Timestamp) -> Result<(), GovernanceError> {
        self.ensure_open(now)?;
        if self.votes.contains_key(&record.voter) {
            return Err(GovernanceError::AlreadyVoted(record.voter));
        }
        self.votes.insert(record.voter.clone(), record);
        Ok(())
    }

    /// Replace an existing vote.
    pub fn change(&mut self, record: VoteRecord, now: Timestamp) -> Result<(), GovernanceError> {
        self.ensure_open(now)?;
        if !self.votes.contains_key(&record.voter) {
            return Err(GovernanceError::NoVoteToChange(record.voter));
        }
        self.votes.insert(record.voter.clone(), record);
        Ok(())
    }

    /// The current tally. Does not finalize.
    pub fn tally(&self) -> TallyResult {
        tally(&self.id, self.chamber, &self.votes, self.eligible, &self.rules)
    }

    /// Finalize once the window has closed. Later calls return the cached
    /// result without re-tallying.
    pub fn finalize(&mut self, now: Timestamp) -> Result<TallyResult, GovernanceError> {
        if let Some(result) = &self.result {
            return Ok(result.clone());
        }
        match self.status(now) {
            SessionStatus::Cancelled => Err(GovernanceError::SessionCancelled(self.id.clone())),
            SessionStatus::Scheduled | SessionStatus::Open => Err(GovernanceError::SessionStillOpen {
                session: self.id.clone(),
                closes_at: self.closes_at,
            }),
            SessionStatus::Closed | SessionStatus::Finalized => {
                let result = self.tally();
                self.result = Some(result.clone());
                Ok(result)
            }
        }
    }

    /// Cancel an unfinalized session.
    pub fn cancel(&mut self, now: Timestamp) -> Result<(), GovernanceError> {
        if self.result.is_some() {
            return Err(GovernanceError::SessionFinalized(self.id.clone()));
        }
        if self.cancelled_at.is_some() {
            return Err(GovernanceError::SessionCancelled(self.id.clone()));
        }
        self.cancelled_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> TallyRules {
        TallyRules {
            quorum: 0.2,
            threshold: 0.5,
            supermajority: 0.67,
            minority_protection_fraction: 0.10,
        }
    }

    fn record(voter: &str, choice: VoteChoice, weight: f64) -> VoteRecord {
        VoteRecord {
            voter: voter.into(),
            choice,
            weight,
            effective_weight: weight * weight,
            chamber: Chamber::Users,
            cast_at: Timestamp::new(150),
            delegation_chain: vec![],
        }
    }

    fn session() -> VotingSession {
        VotingSession::new(
            "p-1".into(),
            Chamber::Users,
            None,
            Timestamp::new(100),
            Timestamp::new(200),
            10,
            rules(),
        )
    }

    #[test]
    fn cast_only_while_open() {
        let mut s = session();
        let early = s.cast(record("a", VoteChoice::For, 1.0), Timestamp::new(99));
        assert!(matches!(early, Err(GovernanceError::SessionNotOpen { .. })));
        s.cast(record("a", VoteChoice::For, 1.0), Timestamp::new(100)).unwrap();
        let late = s.cast(record("b", VoteChoice::For, 1.0), Timestamp::new(200));
        assert!(matches!(late, Err(GovernanceError::SessionNotOpen { .. })));
    }

    #[test]
    fn duplicate_cast_rejected_but_change_replaces() {
        let mut s = session();
        let now = Timestamp::new(150);
        s.cast(record("a", VoteChoice::For, 1.0), now).unwrap();
        assert!(matches!(
            s.cast(record("a", VoteChoice::Against, 1.0), now),
            Err(GovernanceError::AlreadyVoted(_))
        ));
        s.change(record("a", VoteChoice::Against, 1.0), now).unwrap();
        assert_eq!(s.votes().len(), 1);
        assert_eq!(s.tally().against_count, 1);
        assert!(s.change(record("b", VoteChoice::For, 1.0), now).is_err());
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut s = session();
        s.cast(record("a", VoteChoice::For, 1.0), Timestamp::new(150)).unwrap();
        s.cast(record("b", VoteChoice::For, 1.0), Timestamp::new(150)).unwrap();
        assert!(s.finalize(Timestamp::new(199)).is_err());
        let first = s.finalize(Timestamp::new(200)).unwrap();
        let second = s.finalize(Timestamp::new(10_000)).unwrap();
        assert_eq!(first, second);
        assert_eq!(s.status(Timestamp::new(300)), SessionStatus::Finalized);
    }

    #[test]
    fn minority_protection_escalates() {
        let mut votes: BTreeMap<MemberId, VoteRecord> = BTreeMap::new();
        for i in 0..8 {
            votes.insert(format!("f{i}").into(), record(&format!("f{i}"), VoteChoice::For, 1.0));
        }
        for i in 0..2 {
            votes.insert(format!("a{i}").into(), record(&format!("a{i}"), VoteChoice::Against, 1.0));
        }
        let r = tally(&"s".into(), Chamber::Users, &votes, 20, &rules());
        assert!(r.minority_protection_triggered);
        assert_eq!(r.threshold_required, 0.67);
        assert!(r.passed);

        votes.insert("f8".into(), record("f8", VoteChoice::Against, 1.0));
        votes.insert("f7".into(), record("f7", VoteChoice::Against, 1.0));
        let r = tally(&"s".into(), Chamber::Users, &votes, 20, &rules());
        // 7 for / 4 against: a simple majority, but below the escalated bar.
        assert!(r.minority_protection_triggered);
        assert!(!r.threshold_met);
        assert!(!r.passed);
    }

    #[test]
    fn quorum_counts_heads_not_power() {
        let mut votes: BTreeMap<MemberId, VoteRecord> = BTreeMap::new();
        votes.insert("whale".into(), record("whale", VoteChoice::For, 100.0));
        let r = tally(&"s".into(), Chamber::Users, &votes, 10, &rules());
        assert_eq!(r.quorum, 0.1);
        assert!(!r.quorum_met);
        assert!(!r.passed);
    }

    #[test]
    fn no_decisive_votes_fails() {
        let mut votes: BTreeMap<MemberId, VoteRecord> = BTreeMap::new();
        votes.insert("a".into(), record("a", VoteChoice::Abstain, 1.0));
        votes.insert("b".into(), record("b", VoteChoice::Abstain, 1.0));
        let r = tally(&"s".into(), Chamber::Users, &votes, 2, &rules());
        assert!(r.quorum_met);
        assert!(!r.threshold_met);
    }

    #[test]
    fn cancelled_sessions_reject_everything() {
        let mut s = session();
        s.cancel(Timestamp::new(120)).unwrap();
        assert!(s.cast(record("a", VoteChoice::For, 1.0), Timestamp::new(150)).is_err());
        assert!(matches!(
            s.finalize(Timestamp::new(300)),
            Err(GovernanceError::SessionCancelled(_))
        ));
        assert!(s.cancel(Timestamp::new(121)).is_err());
    }
}
