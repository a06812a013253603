//! The voting engine: opens sessions, weighs and records votes, tallies.
//!
//! Each session sits behind its own lock so votes on different proposals
//! never contend, while casts and finalization on one session serialize.

use charter_types::{Category, Chamber, GovernanceParams, MemberId, ProposalId, Roster, SessionId, Timestamp};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::delegation::{Delegation, DelegationGraph, Resolution};
use crate::error::GovernanceError;
use crate::quadratic::QuadraticWeighting;
use crate::session::{TallyResult, TallyRules, VoteChoice, VoteRecord, VotingSession};

pub struct VotingEngine {
    params: GovernanceParams,
    weighting: QuadraticWeighting,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<VotingSession>>>>,
    delegations: RwLock<DelegationGraph>,
}

impl VotingEngine {
    pub fn new(params: GovernanceParams) -> Self {
        Self {
            weighting: QuadraticWeighting::from_params(&params),
            delegations: RwLock::new(DelegationGraph::new(params.delegation_max_depth)),
            params,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn handle(&self, id: &SessionId) -> Result<Arc<Mutex<VotingSession>>, GovernanceError> {
        self.sessions
            .read()?
            .get(id)
            .cloned()
            .ok_or_else(|| GovernanceError::SessionNotFound(id.clone()))
    }

    /// Open a session for one chamber. Requirements are fixed from the
    /// proposal's category at this point.
    #[allow(clippy::too_many_arguments)]
    pub fn open_session(
        &self,
        proposal: &ProposalId,
        chamber: Chamber,
        category: Category,
        topic: Option<String>,
        roster: &Roster,
        now: Timestamp,
        duration_secs: u64,
    ) -> Result<VotingSession, GovernanceError> {
        let rules = TallyRules::new(self.params.requirements(category).for_chamber(chamber), &self.params);
        let session = VotingSession::new(
            proposal.clone(),
            chamber,
            topic,
            now,
            now.plus_secs(duration_secs),
            roster.len(),
            rules,
        );
        let mut sessions = self.sessions.write()?;
        if sessions.contains_key(&session.id) {
            return Err(GovernanceError::SessionExists(session.id));
        }
        info!(
            session = %session.id,
            %category,
            eligible = session.eligible,
            closes_at = %session.closes_at,
            "voting session opened"
        );
        sessions.insert(session.id.clone(), Arc::new(Mutex::new(session.clone())));
        Ok(session)
    }

    /// Put back a session loaded from storage.
    pub fn restore_session(&self, session: VotingSession) -> Result<(), GovernanceError> {
        self.sessions
            .write()?
            .insert(session.id.clone(), Arc::new(Mutex::new(session)));
        Ok(())
    }

    /// Vote power for a voter: delegation-resolved weight through sqrt.
    pub fn weigh(
        &self,
        voter: &MemberId,
        roster: &Roster,
        topic: Option<&str>,
        now: Timestamp,
    ) -> Result<(f64, Resolution), GovernanceError> {
        let resolution = self.delegations.read()?.resolve(voter, roster, topic, now);
        Ok((self.weighting.power(resolution.effective_weight), resolution))
    }

    fn build_record(
        &self,
        session: &VotingSession,
        voter: &MemberId,
        choice: VoteChoice,
        roster: &Roster,
        now: Timestamp,
    ) -> Result<VoteRecord, GovernanceError> {
        if !roster.contains(voter) {
            warn!(session = %session.id, voter = %voter, "vote from outside the roster rejected");
            return Err(GovernanceError::NotEligible {
                voter: voter.clone(),
                chamber: session.chamber.to_string(),
            });
        }
        let (weight, resolution) = self.weigh(voter, roster, session.topic.as_deref(), now)?;
        Ok(VoteRecord {
            voter: voter.clone(),
            choice,
            weight,
            effective_weight: resolution.effective_weight,
            chamber: session.chamber,
            cast_at: now,
            delegation_chain: resolution.chain,
        })
    }

    /// Cast a first vote. `roster` is the session chamber's roster.
    pub fn cast(
        &self,
        id: &SessionId,
        voter: &MemberId,
        choice: VoteChoice,
        roster: &Roster,
        now: Timestamp,
    ) -> Result<VoteRecord, GovernanceError> {
        let handle = self.handle(id)?;
        let mut session = handle.lock()?;
        let record = self.build_record(&session, voter, choice, roster, now)?;
        session.cast(record.clone(), now)?;
        debug!(session = %id, voter = %voter, ?choice, weight = record.weight, "vote cast");
        Ok(record)
    }

    /// Change an existing vote while the session is open.
    pub fn change(
        &self,
        id: &SessionId,
        voter: &MemberId,
        choice: VoteChoice,
        roster: &Roster,
        now: Timestamp,
    ) -> Result<VoteRecord, GovernanceError> {
        let handle = self.handle(id)?;
        let mut session = handle.lock()?;
        let record = self.build_record(&session, voter, choice, roster, now)?;
        session.change(record.clone(), now)?;
        debug!(session = %id, voter = %voter, ?choice, "vote changed");
        Ok(record)
    }

    pub fn tally(&self, id: &SessionId) -> Result<TallyResult, GovernanceError> {
        let handle = self.handle(id)?;
        let session = handle.lock()?;
        Ok(session.tally())
    }

    /// Finalize after the window closes. Concurrent callers all get the one
    /// result computed first.
    pub fn finalize(&self, id: &SessionId, now: Timestamp) -> Result<TallyResult, GovernanceError> {
        let handle = self.handle(id)?;
        let mut session = handle.lock()?;
        let already = session.result().is_some();
        let result = session.finalize(now)?;
        if !already {
            info!(
                session = %id,
                passed = result.passed,
                quorum = result.quorum,
                approval = result.approval,
                minority_protection = result.minority_protection_triggered,
                "voting session finalized"
            );
        }
        Ok(result)
    }

    pub fn cancel(&self, id: &SessionId, now: Timestamp) -> Result<(), GovernanceError> {
        let handle = self.handle(id)?;
        handle.lock()?.cancel(now)?;
        info!(session = %id, "voting session cancelled");
        Ok(())
    }

    /// A copy of the session's current state.
    pub fn session(&self, id: &SessionId) -> Result<VotingSession, GovernanceError> {
        let handle = self.handle(id)?;
        let session = handle.lock()?;
        Ok(session.clone())
    }

    pub fn session_count(&self) -> Result<usize, GovernanceError> {
        Ok(self.sessions.read()?.len())
    }

    // ── Delegation ───────────────────────────────────────────────────────

    pub fn delegate(&self, delegation: Delegation, now: Timestamp) -> Result<(), GovernanceError> {
        self.delegations.write()?.delegate(delegation, now)
    }

    pub fn revoke_delegation(
        &self,
        from: &MemberId,
        to: &MemberId,
        topic: Option<&str>,
        now: Timestamp,
    ) -> Result<(), GovernanceError> {
        self.delegations.write()?.revoke(from, to, topic, now)
    }

    pub fn delegations_of(&self, member: &MemberId) -> Result<Vec<Delegation>, GovernanceError> {
        Ok(self
            .delegations
            .read()?
            .delegations()
            .filter(|d| &d.delegator == member)
            .cloned()
            .collect())
    }

    pub fn save_delegations(&self) -> Result<Vec<u8>, GovernanceError> {
        self.delegations.read()?.save_state()
    }

    pub fn load_delegations(&self, data: &[u8]) -> Result<(), GovernanceError> {
        let graph = DelegationGraph::load_state(data)?;
        *self.delegations.write()? = graph;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const DAY: u64 = 86_400;

    fn engine() -> VotingEngine {
        VotingEngine::new(GovernanceParams::default())
    }

    fn users(n: usize) -> Roster {
        Roster::uniform((0..n).map(|i| format!("u{i}")))
    }

    fn open(e: &VotingEngine, chamber: Chamber, roster: &Roster) -> SessionId {
        e.open_session(
            &"p-1".into(),
            chamber,
            Category::Standard,
            None,
            roster,
            Timestamp::new(0),
            7 * DAY,
        )
        .unwrap()
        .id
    }

    #[test]
    fn test_open_twice_rejected() {
        let e = engine();
        let r = users(3);
        open(&e, Chamber::Users, &r);
        let again = e.open_session(&"p-1".into(), Chamber::Users, Category::Standard, None, &r, Timestamp::new(0), DAY);
        assert!(matches!(again, Err(GovernanceError::SessionExists(_))));
    }

    #[test]
    fn test_guardian_session_rejects_outsiders() {
        let e = engine();
        let guardians = Roster::uniform(["g1", "g2"]);
        let id = open(&e, Chamber::Guardians, &guardians);
        let err = e.cast(&id, &"u1".into(), VoteChoice::For, &guardians, Timestamp::new(10));
        assert!(matches!(err, Err(GovernanceError::NotEligible { .. })));
        e.cast(&id, &"g1".into(), VoteChoice::For, &guardians, Timestamp::new(10)).unwrap();
    }

    #[test]
    fn test_delegated_weight_recorded_on_vote() {
        let e = engine();
        let r = Roster::new().with("a", 1.0).with("b", 1.0).with("c", 2.0);
        e.delegate(Delegation::new("a", "c", 1.0, Timestamp::new(0)), Timestamp::new(0)).unwrap();
        e.delegate(Delegation::new("b", "c", 1.0, Timestamp::new(0)), Timestamp::new(0)).unwrap();
        let id = open(&e, Chamber::Users, &r);
        let record = e.cast(&id, &"c".into(), VoteChoice::For, &r, Timestamp::new(5)).unwrap();
        assert_eq!(record.effective_weight, 4.0);
        assert_eq!(record.weight, 2.0);
        assert_eq!(record.delegation_chain, vec![MemberId::new("a"), MemberId::new("b")]);
    }

    #[test]
    fn test_finalize_requires_closed_window() {
        let e = engine();
        let r = users(5);
        let id = open(&e, Chamber::Users, &r);
        e.cast(&id, &"u0".into(), VoteChoice::For, &r, Timestamp::new(1)).unwrap();
        assert!(matches!(
            e.finalize(&id, Timestamp::new(DAY)),
            Err(GovernanceError::SessionStillOpen { .. })
        ));
        let result = e.finalize(&id, Timestamp::new(7 * DAY)).unwrap();
        assert_eq!(result.for_count, 1);
    }

    #[test]
    fn test_concurrent_casts_lose_nothing() {
        let e = Arc::new(engine());
        let r = Arc::new(users(64));
        let id = open(&e, Chamber::Users, &r);
        let handles: Vec<_> = (0..64)
            .map(|i| {
                let (e, r, id) = (Arc::clone(&e), Arc::clone(&r), id.clone());
                thread::spawn(move || {
                    e.cast(&id, &format!("u{i}").into(), VoteChoice::For, &r, Timestamp::new(10))
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(e.tally(&id).unwrap().for_count, 64);
    }

    #[test]
    fn test_concurrent_finalize_agrees() {
        let e = Arc::new(engine());
        let r = users(10);
        let id = open(&e, Chamber::Users, &r);
        for i in 0..6 {
            let choice = if i < 4 { VoteChoice::For } else { VoteChoice::Against };
            e.cast(&id, &format!("u{i}").into(), choice, &r, Timestamp::new(10)).unwrap();
        }
        let results: Vec<TallyResult> = (0..8)
            .map(|_| {
                let (e, id) = (Arc::clone(&e), id.clone());
                thread::spawn(move || e.finalize(&id, Timestamp::new(8 * DAY)).unwrap())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_delegation_state_roundtrip() {
        let e = engine();
        e.delegate(Delegation::new("a", "b", 0.5, Timestamp::new(0)), Timestamp::new(0)).unwrap();
        let bytes = e.save_delegations().unwrap();
        let other = engine();
        other.load_delegations(&bytes).unwrap();
        assert_eq!(other.delegations_of(&"a".into()).unwrap().len(), 1);
    }
}
