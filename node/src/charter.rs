//! The amendment pipeline.
//!
//! [`Charter`] wires the components together: a proposal is validated,
//! voted on by both chambers, reviewed by the court, held under a timelock
//! and finally enacted as a new constitution version. Every state change is
//! persisted through the [`StoreGateway`] before it becomes visible.
//!
//! Operations on different proposals run concurrently. Operations on one
//! proposal are serialized by [`PipelineLocks`]; keys are always taken in the
//! order proposal, session, lineage.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn, Instrument};

use charter_consti::{
    default_constitution, Proposal, ProposalChange, ProposalStatus, ProposalValidator, RecordedVote,
    ValidationReport,
};
use charter_court::{ConstitutionalCourt, CourtRuling, Justice, JusticeVote, Violation};
use charter_exit::{ExitRequest, ExitRightsManager, ForkEvaluator, ForkRecord, ForkRegistry};
use charter_governance::{
    BicameralEvaluator, BicameralResult, Delegation, SessionStatus, VoteChoice, VoteRecord, VotingEngine,
    VotingSession,
};
use charter_ledger::{
    AuditEntry, ConstitutionVersion, LedgerError, LineageHealth, MigrationOutcome, MigrationPlan, SemVer,
    VersionBump, VersionDiff, VersionManager, VersionRecord,
};
use charter_store::{CharterStore, MemberItem, MemberItemKind};
use charter_timelock::{Timelock, TimelockManager};
use charter_types::{
    Chamber, Clock, MemberId, ProposalId, PublicKey, Roster, RulingId, SessionId, Signature, Timestamp, Verdict,
    SECS_PER_DAY,
};
use charter_utils::format_remaining;

use crate::config::CharterConfig;
use crate::gateway::{encode, StoreGateway};
use crate::metrics::CharterMetrics;
use crate::pipeline_locks::PipelineLocks;
use crate::tracing_spans::{court_span, enact_span, proposal_span, timelock_span, vote_span};
use crate::NodeError;

/// A proposal accepted at submission, with any validation warnings.
#[derive(Clone, Debug)]
pub struct Submission {
    pub proposal: Proposal,
    pub report: ValidationReport,
}

/// Result of adding a halt signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HaltOutcome {
    pub signatures: usize,
    /// The signature pushed the count over the threshold and the timelock
    /// is now halted.
    pub halted: bool,
}

const DELEGATIONS_KEY: &str = "delegations";

pub struct Charter<S> {
    pub(crate) config: CharterConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) gateway: StoreGateway<S>,
    pub(crate) metrics: Arc<CharterMetrics>,
    pub(crate) locks: PipelineLocks,
    validator: ProposalValidator,
    bicameral: BicameralEvaluator,
    voting: VotingEngine,
    court: ConstitutionalCourt,
    timelocks: TimelockManager,
    versions: VersionManager,
    pub(crate) forks: Arc<ForkRegistry>,
    pub(crate) exits: Arc<ExitRightsManager>,
    proposals: RwLock<HashMap<ProposalId, Proposal>>,
    halt_keys: RwLock<HashMap<MemberId, PublicKey>>,
}

impl<S: CharterStore + 'static> Charter<S> {
    /// Build an engine over `store`, reloading everything already persisted.
    pub async fn open(config: CharterConfig, store: Arc<S>, clock: Arc<dyn Clock>) -> Result<Self, NodeError> {
        config.validate()?;
        let metrics = Arc::new(CharterMetrics::new());
        let gateway = StoreGateway::new(store, config.store_timeout(), config.retry_policy(), Arc::clone(&metrics));

        let lineage = config.lineage_id();
        let mut stored: Vec<ConstitutionVersion> = gateway.load_versions(&lineage).await?;
        let last = stored.len().saturating_sub(1);
        for (i, v) in stored.iter_mut().enumerate() {
            v.is_current = i == last;
        }
        // TODO: persist audit entries once the store has an audit collection;
        // until then the audit chain restarts with each process.
        let versions = if stored.is_empty() {
            VersionManager::new(lineage)
        } else {
            VersionManager::restore(lineage, stored, Vec::new())
        };
        if versions.health()? != LineageHealth::Healthy {
            metrics.integrity_failures.inc();
        }
        let canonical = versions
            .current()
            .map(|v| v.content)
            .unwrap_or_else(|_| default_constitution());

        let params = config.governance.clone();
        let charter = Self {
            validator: ProposalValidator::new(&params),
            bicameral: BicameralEvaluator::new(params.clone()),
            voting: VotingEngine::new(params.clone()),
            court: ConstitutionalCourt::new(&params),
            timelocks: TimelockManager::new(params),
            versions,
            forks: Arc::new(ForkRegistry::new(ForkEvaluator::new(&canonical))),
            exits: Arc::new(ExitRightsManager::new()),
            proposals: RwLock::new(HashMap::new()),
            halt_keys: RwLock::new(config.halt_keys()?),
            locks: PipelineLocks::new(config.max_concurrent),
            clock,
            gateway,
            metrics,
            config,
        };
        charter.reload().await?;
        Ok(charter)
    }

    async fn reload(&self) -> Result<(), NodeError> {
        let now = self.clock.now();
        let proposals: Vec<Proposal> = self
            .gateway
            .load_all("list_proposals", S::list_proposals, S::get_proposal)
            .await?;
        let sessions: Vec<VotingSession> = self
            .gateway
            .load_all("list_sessions", S::list_sessions, S::get_session)
            .await?;
        let rulings: Vec<CourtRuling> = self
            .gateway
            .load_all("list_rulings", S::list_rulings, S::get_ruling)
            .await?;
        let timelocks: Vec<Timelock> = self
            .gateway
            .load_all("list_timelocks", S::list_timelocks, S::get_timelock)
            .await?;
        let forks: Vec<ForkRecord> = self
            .gateway
            .load_all("list_forks", S::list_forks, S::get_fork)
            .await?;
        let exits: Vec<ExitRequest> = self
            .gateway
            .load_all("list_exits", S::list_exits, S::get_exit)
            .await?;
        let delegations = self.gateway.delegations().await?;

        let mut open_sessions = 0;
        for session in sessions {
            if !matches!(session.status(now), SessionStatus::Finalized | SessionStatus::Cancelled) {
                open_sessions += 1;
            }
            self.voting.restore_session(session)?;
        }
        for ruling in rulings {
            self.court.restore(ruling)?;
        }
        for timelock in timelocks {
            self.timelocks.restore(timelock)?;
        }
        for fork in forks {
            self.forks.restore(fork)?;
        }
        for exit in exits {
            self.exits.restore(exit)?;
        }
        if let Some(graph) = delegations {
            self.voting.load_delegations(&graph)?;
        }
        let count = proposals.len();
        {
            let mut map = self.proposals.write()?;
            for proposal in proposals {
                if !proposal.verify_hash() {
                    warn!(proposal = %proposal.id(), "stored proposal fails its content hash");
                }
                map.insert(proposal.id().clone(), proposal);
            }
        }
        self.metrics.open_sessions.set(open_sessions);
        self.refresh_timelock_gauge()?;
        info!(proposals = count, open_sessions, lineage = %self.versions.lineage(), "state restored");
        Ok(())
    }

    pub fn config(&self) -> &CharterConfig {
        &self.config
    }

    pub fn metrics(&self) -> &CharterMetrics {
        &self.metrics
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn snapshot(&self, id: &ProposalId) -> Result<Proposal, NodeError> {
        self.proposals
            .read()?
            .get(id)
            .cloned()
            .ok_or_else(|| NodeError::ProposalNotFound(id.clone()))
    }

    fn expect_stage(proposal: &Proposal, status: ProposalStatus) -> Result<(), NodeError> {
        if proposal.status() == status {
            return Ok(());
        }
        Err(NodeError::WrongStage {
            proposal: proposal.id().clone(),
            status: proposal.status().to_string(),
            expected: match status {
                ProposalStatus::Submitted => "submitted",
                ProposalStatus::Voting => "voting",
                ProposalStatus::CourtReview => "court_review",
                ProposalStatus::Timelocked => "timelocked",
                _ => "another status",
            },
        })
    }

    async fn save(&self, proposal: Proposal) -> Result<Proposal, NodeError> {
        self.gateway
            .put("put_proposal", proposal.id(), &proposal, S::put_proposal, S::get_proposal)
            .await?;
        self.proposals
            .write()?
            .insert(proposal.id().clone(), proposal.clone());
        Ok(proposal)
    }

    async fn persist_session(&self, id: &SessionId) -> Result<VotingSession, NodeError> {
        let session = self.voting.session(id)?;
        self.gateway
            .put("put_session", id, &session, S::put_session, S::get_session)
            .await?;
        Ok(session)
    }

    async fn persist_ruling(&self, ruling: &CourtRuling) -> Result<(), NodeError> {
        self.gateway
            .put("put_ruling", &ruling.id, ruling, S::put_ruling, S::get_ruling)
            .await?;
        Ok(())
    }

    async fn persist_timelock(&self, timelock: &Timelock) -> Result<(), NodeError> {
        self.gateway
            .put("put_timelock", &timelock.proposal, timelock, S::put_timelock, S::get_timelock)
            .await?;
        self.refresh_timelock_gauge()
    }

    /// Store a version already appended in memory. On failure the lineage
    /// is marked inconsistent.
    async fn persist_version(&self, version: &ConstitutionVersion) -> Result<(), NodeError> {
        let result = self
            .gateway
            .append_version(self.versions.lineage(), version.version.to_string(), version)
            .await;
        if let Err(e) = &result {
            self.mark_diverged(&format!("version {} created but not persisted: {e}", version.version));
        }
        Ok(result?)
    }

    /// Memory holds state the store does not. Writes to the lineage stop
    /// until an operator acknowledges the incident, which writes the
    /// missing state back.
    fn mark_diverged(&self, reason: &str) {
        self.metrics.integrity_failures.inc();
        if let Err(e) = self.versions.mark_inconsistent(reason, self.clock.now()) {
            error!(target: "charter::alert", error = %e, %reason, "could not mark lineage inconsistent");
        }
    }

    /// Apply the proposal's changes to the current content and add any
    /// protection they would give up to `report`.
    fn check_effect(&self, proposal: &Proposal, report: &mut ValidationReport) -> Result<(), NodeError> {
        match self.versions.current() {
            Ok(current) => {
                self.validator.check_effect(proposal, &current.content, report);
                Ok(())
            }
            Err(LedgerError::EmptyLineage(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn attribute<T: Serialize>(
        &self,
        member: &MemberId,
        kind: MemberItemKind,
        key: String,
        value: &T,
    ) -> Result<(), NodeError> {
        let item = MemberItem {
            kind,
            key,
            data: encode(value)?,
        };
        self.gateway.put_member_item(member, item).await?;
        Ok(())
    }

    fn refresh_timelock_gauge(&self) -> Result<(), NodeError> {
        self.metrics
            .active_timelocks
            .set(self.timelocks.open_count()? as i64);
        Ok(())
    }

    // ── Constitution lineage ────────────────────────────────────────────

    /// Create the first version of the lineage.
    pub async fn bootstrap(&self, content: Value) -> Result<ConstitutionVersion, NodeError> {
        let _guard = self.locks.acquire(self.versions.lineage().as_str()).await?;
        let genesis = self.versions.create_genesis(content, self.clock.now())?;
        self.persist_version(&genesis).await?;
        self.refresh_forks(&genesis.content).await?;
        Ok(genesis)
    }

    pub fn current_version(&self) -> Result<ConstitutionVersion, NodeError> {
        Ok(self.versions.current()?)
    }

    pub fn version(&self, version: SemVer) -> Result<ConstitutionVersion, NodeError> {
        Ok(self.versions.version(version)?)
    }

    pub fn versions(&self) -> Result<Vec<ConstitutionVersion>, NodeError> {
        Ok(self.versions.versions()?)
    }

    pub fn diff(&self, from: SemVer, to: SemVer) -> Result<VersionDiff, NodeError> {
        Ok(self.versions.diff(from, to)?)
    }

    pub fn lineage_health(&self) -> Result<LineageHealth, NodeError> {
        Ok(self.versions.health()?)
    }

    pub fn audit_log(&self) -> Result<Vec<AuditEntry>, NodeError> {
        Ok(self.versions.audit_log()?)
    }

    pub fn verify_audit(&self) -> Result<(), NodeError> {
        let result = self.versions.verify_audit();
        if result.is_err() {
            self.metrics.integrity_failures.inc();
        }
        Ok(result?)
    }

    /// Re-read a version from storage and recompute its hashes. A mismatch
    /// freezes the lineage.
    pub async fn verify_stored_version(&self, version: SemVer) -> Result<bool, NodeError> {
        let record: ConstitutionVersion = self
            .gateway
            .load_version(self.versions.lineage(), version.to_string())
            .await?;
        let intact = self.versions.verify_integrity(&record)?;
        if !intact {
            self.metrics.integrity_failures.inc();
        }
        Ok(intact)
    }

    /// Walk the whole in-memory chain.
    pub fn verify_chain(&self) -> Result<(), NodeError> {
        let result = self.versions.verify_chain();
        if result.is_err() {
            self.metrics.integrity_failures.inc();
        }
        Ok(result?)
    }

    /// Clear a frozen or inconsistent lineage. State held in memory but
    /// missing from the store is written back first, so the lineage only
    /// reopens once both agree.
    pub async fn acknowledge_incident(&self, by: MemberId, note: impl Into<String>) -> Result<(), NodeError> {
        let note = note.into();
        let _guard = self.locks.acquire(self.versions.lineage().as_str()).await?;
        self.resync().await?;
        self.versions.acknowledge_incident(by, note, self.clock.now())?;
        Ok(())
    }

    /// Write back versions the store lacks, then the timelock and status of
    /// every proposal those versions enacted. Runs under the lineage lock, so
    /// no proposal lock is taken.
    async fn resync(&self) -> Result<(), NodeError> {
        let stored: Vec<ConstitutionVersion> = self.gateway.load_versions(self.versions.lineage()).await?;
        let known: BTreeSet<SemVer> = stored.iter().map(|v| v.version).collect();
        let versions = self.versions.versions()?;
        let mut written = 0;
        for version in versions.iter().filter(|v| !known.contains(&v.version)) {
            self.gateway
                .append_version(self.versions.lineage(), version.version.to_string(), version)
                .await?;
            written += 1;
        }
        let now = self.clock.now();
        for id in versions.iter().filter_map(|v| v.proposal.as_ref()) {
            let Ok(mut proposal) = self.snapshot(id) else {
                continue;
            };
            if proposal.status() != ProposalStatus::Timelocked {
                continue;
            }
            self.persist_timelock(&self.timelocks.timelock(id)?).await?;
            proposal.transition(ProposalStatus::Enacted, now)?;
            self.save(proposal).await?;
            self.metrics.proposals_enacted.inc();
            written += 1;
        }
        if let Some(current) = versions.last() {
            self.refresh_forks(&current.content).await?;
        }
        info!(lineage = %self.versions.lineage(), written, "store resynchronised");
        Ok(())
    }

    /// Create a new version carrying the content of `target`. An operator
    /// action: protections are not checked, so restoring any recorded
    /// version is always possible.
    pub async fn rollback_to(&self, target: SemVer, actor: Option<MemberId>) -> Result<ConstitutionVersion, NodeError> {
        let _guard = self.locks.acquire(self.versions.lineage().as_str()).await?;
        let version = self.versions.rollback_to(target, actor, self.clock.now())?;
        self.persist_version(&version).await?;
        self.refresh_forks(&version.content).await?;
        Ok(version)
    }

    /// Export a version as a self-verifying JSON record.
    pub fn export_version(&self, version: SemVer) -> Result<String, NodeError> {
        Ok(self.versions.export(version)?.to_json()?)
    }

    /// Import a JSON record as the next version. Records whose content does
    /// not match their hash, or that give up an axiom or invariant of the
    /// current version, are rejected.
    pub async fn import_version(&self, json: &str) -> Result<ConstitutionVersion, NodeError> {
        let record = VersionRecord::parse(json)?;
        let _guard = self.locks.acquire(self.versions.lineage().as_str()).await?;
        let version = self.versions.import(record, self.clock.now())?;
        self.persist_version(&version).await?;
        self.refresh_forks(&version.content).await?;
        Ok(version)
    }

    // ── Proposals ───────────────────────────────────────────────────────

    pub fn proposal(&self, id: &ProposalId) -> Result<Proposal, NodeError> {
        self.snapshot(id)
    }

    pub fn proposals(&self) -> Result<Vec<Proposal>, NodeError> {
        let mut all: Vec<Proposal> = self.proposals.read()?.values().cloned().collect();
        all.sort_by_key(|p| (p.created_at(), p.id().clone()));
        Ok(all)
    }

    /// Draft, validate and submit a proposal. A proposal that fails
    /// validation is stored as rejected and its issues are returned.
    pub async fn submit(
        &self,
        proposer: MemberId,
        title: impl Into<String>,
        summary: impl Into<String>,
        rationale: impl Into<String>,
        changes: Vec<ProposalChange>,
    ) -> Result<Submission, NodeError> {
        let now = self.clock.now();
        let mut proposal = Proposal::draft(proposer.clone(), title, summary, rationale, changes, now)?;
        let id = proposal.id().clone();
        async {
            let _guard = self.locks.acquire(id.as_str()).await?;
            if self.proposals.read()?.contains_key(&id) {
                return Err(NodeError::ProposalExists(id.clone()));
            }
            let mut report = self.validator.validate_for_submission(&proposal);
            self.check_effect(&proposal, &mut report)?;
            proposal.transition(ProposalStatus::Submitted, now)?;
            proposal.set_category(self.bicameral.categorize(&proposal));
            self.metrics.proposals_submitted.inc();

            if !report.is_valid() {
                proposal.transition(ProposalStatus::Rejected, now)?;
                self.save(proposal).await?;
                self.attribute(&proposer, MemberItemKind::Proposal, id.to_string(), &id).await?;
                self.metrics.proposals_rejected.inc();
                warn!(
                    errors = report.errors.len(),
                    constitutional = report.has_constitutional_violation(),
                    "proposal rejected at submission"
                );
                return Err(NodeError::Validation {
                    proposal: id.clone(),
                    issues: report.errors,
                });
            }

            let proposal = self.save(proposal).await?;
            self.attribute(&proposer, MemberItemKind::Proposal, id.to_string(), &id).await?;
            info!(
                category = ?proposal.category(),
                court_review = report.requires_court_review(),
                "proposal submitted"
            );
            Ok::<_, NodeError>(Submission { proposal, report })
        }
        .instrument(proposal_span(id.as_str(), "submit"))
        .await
    }

    /// Withdraw before voting closes. Open sessions are cancelled.
    pub async fn withdraw(&self, id: &ProposalId, by: &MemberId) -> Result<Proposal, NodeError> {
        let now = self.clock.now();
        async {
            let _guard = self.locks.acquire(id.as_str()).await?;
            let mut proposal = self.snapshot(id)?;
            let was_voting = proposal.status() == ProposalStatus::Voting;
            proposal.withdraw(by, now)?;
            if was_voting {
                for chamber in Chamber::ALL {
                    let sid = SessionId::for_proposal(id, chamber);
                    let _session = self.locks.lock(sid.as_str()).await;
                    self.voting.cancel(&sid, now)?;
                    self.persist_session(&sid).await?;
                    self.metrics.open_sessions.dec();
                }
            }
            let proposal = self.save(proposal).await?;
            info!(by = %by, "proposal withdrawn");
            Ok::<_, NodeError>(proposal)
        }
        .instrument(proposal_span(id.as_str(), "withdraw"))
        .await
    }

    // ── Voting ──────────────────────────────────────────────────────────

    pub async fn set_roster(&self, chamber: Chamber, roster: Roster) -> Result<(), NodeError> {
        self.gateway.put_roster(chamber, roster).await?;
        Ok(())
    }

    /// Open one session per chamber. `duration_days` defaults to the
    /// configured voting window.
    pub async fn open_voting(&self, id: &ProposalId, duration_days: Option<u64>) -> Result<Vec<VotingSession>, NodeError> {
        let now = self.clock.now();
        async {
            let _guard = self.locks.acquire(id.as_str()).await?;
            let mut proposal = self.snapshot(id)?;
            Self::expect_stage(&proposal, ProposalStatus::Submitted)?;
            let category = match proposal.category() {
                Some(c) => c,
                None => self.bicameral.categorize(&proposal),
            };
            let days = duration_days.unwrap_or(self.config.governance.default_voting_days);
            let mut sessions = Vec::with_capacity(2);
            for chamber in Chamber::ALL {
                let roster = self.gateway.roster(chamber).await?;
                let session = self.voting.open_session(
                    id,
                    chamber,
                    category,
                    Some(category.as_str().to_string()),
                    &roster,
                    now,
                    days * SECS_PER_DAY,
                )?;
                self.persist_session(&session.id).await?;
                self.metrics.open_sessions.inc();
                sessions.push(session);
            }
            proposal.transition(ProposalStatus::Voting, now)?;
            self.save(proposal).await?;
            Ok::<_, NodeError>(sessions)
        }
        .instrument(proposal_span(id.as_str(), "open_voting"))
        .await
    }

    pub fn session(&self, id: &ProposalId, chamber: Chamber) -> Result<VotingSession, NodeError> {
        Ok(self.voting.session(&SessionId::for_proposal(id, chamber))?)
    }

    /// Cast a first vote in one chamber.
    pub async fn cast_vote(
        &self,
        id: &ProposalId,
        chamber: Chamber,
        voter: &MemberId,
        choice: VoteChoice,
    ) -> Result<VoteRecord, NodeError> {
        self.record_vote(id, chamber, voter, choice, false).await
    }

    /// Change an earlier vote while the session is open.
    pub async fn change_vote(
        &self,
        id: &ProposalId,
        chamber: Chamber,
        voter: &MemberId,
        choice: VoteChoice,
    ) -> Result<VoteRecord, NodeError> {
        self.record_vote(id, chamber, voter, choice, true).await
    }

    async fn record_vote(
        &self,
        id: &ProposalId,
        chamber: Chamber,
        voter: &MemberId,
        choice: VoteChoice,
        change: bool,
    ) -> Result<VoteRecord, NodeError> {
        let now = self.clock.now();
        let sid = SessionId::for_proposal(id, chamber);
        async {
            let _guard = self.locks.acquire(sid.as_str()).await?;
            let roster = self.gateway.roster(chamber).await?;
            let record = if change {
                self.voting.change(&sid, voter, choice, &roster, now)?
            } else {
                self.voting.cast(&sid, voter, choice, &roster, now)?
            };
            self.persist_session(&sid).await?;
            self.attribute(voter, MemberItemKind::Vote, sid.to_string(), &record).await?;
            self.metrics.votes_cast.inc();
            Ok::<_, NodeError>(record)
        }
        .instrument(vote_span(id.as_str(), chamber.as_str()))
        .await
    }

    pub async fn delegate(&self, delegation: Delegation) -> Result<(), NodeError> {
        let _guard = self.locks.acquire(DELEGATIONS_KEY).await?;
        let delegator = delegation.delegator.clone();
        let key = format!(
            "delegation:{}:{}",
            delegation.delegate,
            delegation.topic.as_deref().unwrap_or("*")
        );
        self.voting.delegate(delegation.clone(), self.clock.now())?;
        self.gateway.put_delegations(self.voting.save_delegations()?).await?;
        self.attribute(&delegator, MemberItemKind::Delegation, key, &delegation).await
    }

    pub async fn revoke_delegation(&self, from: &MemberId, to: &MemberId, topic: Option<&str>) -> Result<(), NodeError> {
        let _guard = self.locks.acquire(DELEGATIONS_KEY).await?;
        self.voting.revoke_delegation(from, to, topic, self.clock.now())?;
        self.gateway.put_delegations(self.voting.save_delegations()?).await?;
        Ok(())
    }

    pub fn delegations_of(&self, member: &MemberId) -> Result<Vec<Delegation>, NodeError> {
        Ok(self.voting.delegations_of(member)?)
    }

    /// Evaluate the finalized sessions of a proposal against its category.
    fn evaluation(&self, proposal: &Proposal) -> Result<BicameralResult, NodeError> {
        let id = proposal.id();
        let finalized = |chamber: Chamber| -> Result<_, NodeError> {
            self.voting
                .session(&SessionId::for_proposal(id, chamber))?
                .result()
                .cloned()
                .ok_or_else(|| NodeError::WrongStage {
                    proposal: id.clone(),
                    status: proposal.status().to_string(),
                    expected: "finalized voting",
                })
        };
        let users = finalized(Chamber::Users)?;
        let guardians = finalized(Chamber::Guardians)?;
        let category = match proposal.category() {
            Some(c) => c,
            None => self.bicameral.categorize(proposal),
        };
        Ok(self.bicameral.evaluate(id, &users, &guardians, category))
    }

    /// Finalize both sessions once the window has closed and evaluate them
    /// together. A proposal that passes both chambers goes to the court.
    pub async fn close_voting(&self, id: &ProposalId) -> Result<BicameralResult, NodeError> {
        let now = self.clock.now();
        async {
            let _guard = self.locks.acquire(id.as_str()).await?;
            let mut proposal = self.snapshot(id)?;
            Self::expect_stage(&proposal, ProposalStatus::Voting)?;
            for chamber in Chamber::ALL {
                let sid = SessionId::for_proposal(id, chamber);
                let _session = self.locks.lock(sid.as_str()).await;
                let already = self.voting.session(&sid)?.result().is_some();
                self.voting.finalize(&sid, now)?;
                self.persist_session(&sid).await?;
                if !already {
                    self.metrics.open_sessions.dec();
                }
            }
            let evaluation = self.evaluation(&proposal)?;
            for (chamber, eval) in [(Chamber::Users, &evaluation.users), (Chamber::Guardians, &evaluation.guardians)] {
                let session = self.voting.session(&SessionId::for_proposal(id, chamber))?;
                if let Some(tally) = session.result() {
                    proposal.record_vote(
                        chamber,
                        RecordedVote {
                            passed: eval.passed,
                            minority_protection_triggered: eval.minority_protection_triggered,
                            ..RecordedVote::from(tally)
                        },
                    );
                }
            }

            if evaluation.both_passed {
                proposal.transition(ProposalStatus::CourtReview, now)?;
                let ruling = self.court.open_review(&proposal, now)?;
                self.persist_ruling(&ruling).await?;
                if ruling.is_finalized() {
                    self.apply_ruling(&mut proposal, &ruling, now).await?;
                }
            } else {
                proposal.transition(ProposalStatus::Rejected, now)?;
                self.metrics.proposals_rejected.inc();
                info!(
                    user_passed = evaluation.user_passed,
                    guardian_passed = evaluation.guardian_passed,
                    "proposal rejected by vote"
                );
            }
            self.save(proposal).await?;
            Ok::<_, NodeError>(evaluation)
        }
        .instrument(proposal_span(id.as_str(), "close_voting"))
        .await
    }

    // ── Court ───────────────────────────────────────────────────────────

    /// Appoint a justice whose term starts now. `term_days` defaults to the
    /// configured term length.
    pub fn appoint_justice(&self, id: MemberId, term_days: Option<u64>) -> Result<Justice, NodeError> {
        let days = term_days.unwrap_or(self.config.justice_term_days);
        Ok(self.court.appoint(id, self.clock.now(), days)?)
    }

    pub fn remove_justice(&self, id: &MemberId) -> Result<(), NodeError> {
        Ok(self.court.remove(id, self.clock.now())?)
    }

    pub fn active_justices(&self) -> Result<Vec<MemberId>, NodeError> {
        Ok(self.court.active_justices(self.clock.now())?)
    }

    pub fn ruling(&self, id: &ProposalId) -> Result<CourtRuling, NodeError> {
        Ok(self.court.ruling(&RulingId::for_proposal(id))?)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn court_vote(
        &self,
        id: &ProposalId,
        justice: &MemberId,
        verdict: Verdict,
        reasoning: impl Into<String>,
        violations: Vec<Violation>,
        modifications: Vec<String>,
    ) -> Result<JusticeVote, NodeError> {
        let now = self.clock.now();
        let reasoning = reasoning.into();
        async {
            let _guard = self.locks.acquire(id.as_str()).await?;
            Self::expect_stage(&self.snapshot(id)?, ProposalStatus::CourtReview)?;
            let rid = RulingId::for_proposal(id);
            let vote = self
                .court
                .vote(&rid, justice, verdict, reasoning, violations, modifications, now)?;
            self.persist_ruling(&self.court.ruling(&rid)?).await?;
            Ok::<_, NodeError>(vote)
        }
        .instrument(court_span(id.as_str()))
        .await
    }

    pub async fn resolve_modification(&self, id: &ProposalId, index: usize) -> Result<CourtRuling, NodeError> {
        let now = self.clock.now();
        async {
            let _guard = self.locks.acquire(id.as_str()).await?;
            let rid = RulingId::for_proposal(id);
            self.court.resolve_modification(&rid, index, now)?;
            let ruling = self.court.ruling(&rid)?;
            self.persist_ruling(&ruling).await?;
            Ok::<_, NodeError>(ruling)
        }
        .instrument(court_span(id.as_str()))
        .await
    }

    /// Finalize the court's ruling. Compatible and conditional rulings move
    /// the proposal under a started timelock; incompatible ones reject it.
    pub async fn finalize_ruling(&self, id: &ProposalId) -> Result<CourtRuling, NodeError> {
        let now = self.clock.now();
        async {
            let _guard = self.locks.acquire(id.as_str()).await?;
            let mut proposal = self.snapshot(id)?;
            Self::expect_stage(&proposal, ProposalStatus::CourtReview)?;
            let ruling = self.court.finalize(&RulingId::for_proposal(id), now)?;
            self.persist_ruling(&ruling).await?;
            self.apply_ruling(&mut proposal, &ruling, now).await?;
            self.save(proposal).await?;
            Ok::<_, NodeError>(ruling)
        }
        .instrument(court_span(id.as_str()))
        .await
    }

    async fn apply_ruling(&self, proposal: &mut Proposal, ruling: &CourtRuling, now: Timestamp) -> Result<(), NodeError> {
        let Some(recorded) = ruling.recorded() else {
            return Ok(());
        };
        let verdict = recorded.verdict;
        proposal.record_ruling(recorded);
        self.metrics.court_rulings.inc();
        match verdict {
            Verdict::Compatible | Verdict::Conditional => {
                let evaluation = self.evaluation(proposal)?;
                let id = proposal.id().clone();
                if evaluation.fast_tracked {
                    self.timelocks
                        .create_fast_tracked(id.clone(), evaluation.category, evaluation.timelock_days, now)?;
                } else {
                    self.timelocks.create(id.clone(), evaluation.category, now)?;
                }
                let timelock = self.timelocks.start(&id, now)?;
                self.persist_timelock(&timelock).await?;
                proposal.transition(ProposalStatus::Timelocked, now)?;
                let remaining = timelock
                    .ends_at()
                    .map(|end| format_remaining(now, end))
                    .unwrap_or_default();
                info!(%verdict, %remaining, "proposal timelocked");
            }
            Verdict::Incompatible | Verdict::Abstain => {
                proposal.transition(ProposalStatus::Rejected, now)?;
                self.metrics.proposals_rejected.inc();
                warn!(%verdict, "proposal rejected by the court");
            }
        }
        Ok(())
    }

    // ── Timelock ────────────────────────────────────────────────────────

    pub fn timelock(&self, id: &ProposalId) -> Result<Timelock, NodeError> {
        Ok(self.timelocks.timelock(id)?)
    }

    /// Whether the timelock has elapsed. Records the move to ready.
    pub async fn check_ready(&self, id: &ProposalId) -> Result<bool, NodeError> {
        let _guard = self.locks.acquire(id.as_str()).await?;
        let before = self.timelocks.timelock(id)?.status();
        let ready = self.timelocks.check_ready(id, self.clock.now())?;
        let timelock = self.timelocks.timelock(id)?;
        if timelock.status() != before {
            self.persist_timelock(&timelock).await?;
        }
        Ok(ready)
    }

    pub fn register_halt_key(&self, member: MemberId, key: PublicKey) -> Result<(), NodeError> {
        self.halt_keys.write()?.insert(member, key);
        Ok(())
    }

    /// Every member of either chamber may sign a halt.
    async fn halt_electorate(&self) -> Result<BTreeSet<MemberId>, NodeError> {
        let users = self.gateway.roster(Chamber::Users).await?;
        let guardians = self.gateway.roster(Chamber::Guardians).await?;
        Ok(users.members().chain(guardians.members()).cloned().collect())
    }

    /// Add a halt signature and halt the timelock if the threshold is met.
    pub async fn sign_halt(&self, id: &ProposalId, signer: MemberId, reason: Option<String>) -> Result<HaltOutcome, NodeError> {
        self.collect_halt(id, signer, reason, None).await
    }

    /// Like [`Charter::sign_halt`], with an Ed25519 signature over
    /// [`charter_timelock::halt_message`] checked against the signer's
    /// registered key.
    pub async fn sign_halt_attested(
        &self,
        id: &ProposalId,
        signer: MemberId,
        signature: Signature,
        reason: Option<String>,
    ) -> Result<HaltOutcome, NodeError> {
        self.collect_halt(id, signer, reason, Some(signature)).await
    }

    async fn collect_halt(
        &self,
        id: &ProposalId,
        signer: MemberId,
        reason: Option<String>,
        signature: Option<Signature>,
    ) -> Result<HaltOutcome, NodeError> {
        let now = self.clock.now();
        async {
            let _guard = self.locks.acquire(id.as_str()).await?;
            let electorate = self.halt_electorate().await?;
            if !electorate.contains(&signer) {
                return Err(NodeError::NotAMember(signer));
            }
            let summary = reason.clone().unwrap_or_else(|| "emergency halt".to_string());
            let signatures = match &signature {
                None => self.timelocks.sign_halt(id, signer, reason, now)?,
                Some(sig) => {
                    let key = self
                        .halt_keys
                        .read()?
                        .get(&signer)
                        .cloned()
                        .ok_or_else(|| NodeError::UnknownHaltKey(signer.clone()))?;
                    self.timelocks
                        .sign_halt_attested(id, signer, &key, sig, reason, now)?
                }
            };
            let halted = self.timelocks.try_halt(id, electorate.len(), summary, now)?;
            self.persist_timelock(&self.timelocks.timelock(id)?).await?;
            if halted {
                let mut proposal = self.snapshot(id)?;
                proposal.transition(ProposalStatus::Halted, now)?;
                self.save(proposal).await?;
                self.metrics.halts.inc();
            }
            Ok::<_, NodeError>(HaltOutcome { signatures, halted })
        }
        .instrument(timelock_span(id.as_str(), "halt"))
        .await
    }

    pub async fn request_extension(
        &self,
        id: &ProposalId,
        by: MemberId,
        days: u64,
        reason: impl Into<String>,
    ) -> Result<usize, NodeError> {
        let reason = reason.into();
        async {
            let _guard = self.locks.acquire(id.as_str()).await?;
            let index = self
                .timelocks
                .request_extension(id, by, days, reason, self.clock.now())?;
            self.persist_timelock(&self.timelocks.timelock(id)?).await?;
            Ok::<_, NodeError>(index)
        }
        .instrument(timelock_span(id.as_str(), "request_extension"))
        .await
    }

    pub async fn approve_extension(&self, id: &ProposalId, index: usize) -> Result<Timelock, NodeError> {
        async {
            let _guard = self.locks.acquire(id.as_str()).await?;
            let timelock = self.timelocks.approve_extension(id, index, self.clock.now())?;
            self.persist_timelock(&timelock).await?;
            Ok::<_, NodeError>(timelock)
        }
        .instrument(timelock_span(id.as_str(), "approve_extension"))
        .await
    }

    /// Cancel a timelock before it becomes ready. The proposal is rejected.
    pub async fn cancel_timelock(&self, id: &ProposalId) -> Result<Timelock, NodeError> {
        let now = self.clock.now();
        async {
            let _guard = self.locks.acquire(id.as_str()).await?;
            let mut proposal = self.snapshot(id)?;
            let timelock = self.timelocks.cancel(id, now)?;
            self.persist_timelock(&timelock).await?;
            proposal.transition(ProposalStatus::Rejected, now)?;
            self.save(proposal).await?;
            Ok::<_, NodeError>(timelock)
        }
        .instrument(timelock_span(id.as_str(), "cancel"))
        .await
    }

    // ── Enactment ───────────────────────────────────────────────────────

    /// Run the proposal's migration against the current content without
    /// recording anything.
    pub fn dry_run(&self, id: &ProposalId) -> Result<MigrationOutcome, NodeError> {
        let proposal = self.snapshot(id)?;
        Ok(self.versions.dry_run(&MigrationPlan::from_proposal(&proposal))?)
    }

    /// Enact a timelocked proposal whose delay has elapsed.
    ///
    /// The proposal is validated strictly first. The migration then runs
    /// inside the timelock's execute section, so a halt cannot land between
    /// the readiness check and the new version.
    pub async fn enact(&self, id: &ProposalId) -> Result<ConstitutionVersion, NodeError> {
        let now = self.clock.now();
        async {
            let _guard = self.locks.acquire(id.as_str()).await?;
            let proposal = self.snapshot(id)?;
            let timelock = self.timelocks.timelock(id).ok();
            let mut report = self.validator.validate_for_enactment(
                &proposal,
                timelock.as_ref().and_then(Timelock::ends_at),
                now,
            );
            self.check_effect(&proposal, &mut report)?;
            if !report.is_valid() {
                warn!(errors = report.errors.len(), "proposal failed enactment validation");
                return Err(NodeError::Validation {
                    proposal: id.clone(),
                    issues: report.errors,
                });
            }
            Self::expect_stage(&proposal, ProposalStatus::Timelocked)?;

            let _lineage = self.locks.lock(self.versions.lineage().as_str()).await;
            let plan = MigrationPlan::from_proposal(&proposal);
            let category = match proposal.category() {
                Some(c) => c,
                None => self.bicameral.categorize(&proposal),
            };
            let summary = proposal.title().to_string();
            let executed = self.timelocks.execute_with(id, now, |_| {
                self.versions
                    .execute_migration(&plan, Some(id.clone()), summary, VersionBump::for_category(category), now)
                    .map_err(NodeError::from)
            });
            let (timelock, version) = match executed {
                Ok(done) => done,
                Err(e) => {
                    if matches!(
                        e,
                        NodeError::Ledger(LedgerError::MigrationFailed { .. } | LedgerError::RollbackFailed { .. })
                    ) {
                        self.metrics.migration_rollbacks.inc();
                    }
                    return Err(e);
                }
            };
            self.persist_version(&version).await?;
            if let Err(e) = self.record_enactment(proposal, &timelock, now).await {
                self.mark_diverged(&format!("proposal {id} enacted as {} but not recorded: {e}", version.version));
                return Err(e);
            }
            self.refresh_forks(&version.content).await?;
            self.metrics.proposals_enacted.inc();
            info!(version = %version.version, "proposal enacted");
            Ok::<_, NodeError>(version)
        }
        .instrument(enact_span(id.as_str(), self.versions.lineage().as_str()))
        .await
    }

    async fn record_enactment(&self, mut proposal: Proposal, timelock: &Timelock, now: Timestamp) -> Result<(), NodeError> {
        self.persist_timelock(timelock).await?;
        proposal.transition(ProposalStatus::Enacted, now)?;
        self.save(proposal).await?;
        Ok(())
    }

    /// Run the strict enactment checks without enacting.
    pub fn check_enactment(&self, id: &ProposalId) -> Result<ValidationReport, NodeError> {
        let proposal = self.snapshot(id)?;
        let ends_at = self.timelocks.timelock(id).ok().and_then(|t| t.ends_at());
        let mut report = self
            .validator
            .validate_for_enactment(&proposal, ends_at, self.clock.now());
        self.check_effect(&proposal, &mut report)?;
        Ok(report)
    }
}
