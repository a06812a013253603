//! The constitutional court: a roster of justices and the rulings they decide.

use charter_consti::Proposal;
use charter_types::{GovernanceParams, MemberId, RulingId, Timestamp, Verdict};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

use crate::error::CourtError;
use crate::justice::Justice;
use crate::ruling::{CourtRuling, JusticeVote, RequiredModification};
use crate::violation::{detect_violations, Violation};

pub struct ConstitutionalCourt {
    quorum_fraction: f64,
    auto_finalize_blocking: bool,
    justices: RwLock<BTreeMap<MemberId, Justice>>,
    rulings: RwLock<HashMap<RulingId, Arc<Mutex<CourtRuling>>>>,
}

impl ConstitutionalCourt {
    pub fn new(params: &GovernanceParams) -> Self {
        Self {
            quorum_fraction: params.court_quorum_fraction,
            auto_finalize_blocking: params.court_auto_finalize_blocking,
            justices: RwLock::new(BTreeMap::new()),
            rulings: RwLock::new(HashMap::new()),
        }
    }

    fn handle(&self, id: &RulingId) -> Result<Arc<Mutex<CourtRuling>>, CourtError> {
        self.rulings
            .read()?
            .get(id)
            .cloned()
            .ok_or_else(|| CourtError::RulingNotFound(id.clone()))
    }

    pub fn appoint(&self, id: MemberId, term_start: Timestamp, term_days: u64) -> Result<Justice, CourtError> {
        let mut justices = self.justices.write()?;
        if justices.get(&id).is_some_and(|j| j.is_active(term_start)) {
            return Err(CourtError::AlreadyAppointed(id));
        }
        let justice = Justice::new(id.clone(), term_start, term_days);
        info!(justice = %id, term_end = %justice.term_end, "justice appointed");
        justices.insert(id, justice.clone());
        Ok(justice)
    }

    /// End a justice's service. Rulings already finalized keep their votes.
    pub fn remove(&self, id: &MemberId, now: Timestamp) -> Result<(), CourtError> {
        let mut justices = self.justices.write()?;
        let justice = justices
            .get_mut(id)
            .ok_or_else(|| CourtError::JusticeNotFound(id.clone()))?;
        justice.removed_at = Some(now);
        info!(justice = %id, "justice removed");
        Ok(())
    }

    pub fn active_justices(&self, now: Timestamp) -> Result<Vec<MemberId>, CourtError> {
        Ok(self
            .justices
            .read()?
            .values()
            .filter(|j| j.is_active(now))
            .map(|j| j.id.clone())
            .collect())
    }

    fn require_active(&self, member: &MemberId, now: Timestamp) -> Result<(), CourtError> {
        let justices = self.justices.read()?;
        match justices.get(member) {
            Some(j) if j.is_active(now) => Ok(()),
            _ => Err(CourtError::NotActiveJustice {
                member: member.clone(),
                now,
            }),
        }
    }

    /// Open a review for a proposal and run the automatic detectors over it.
    ///
    /// When automatic finalization is configured, a blocking finding closes
    /// the ruling as incompatible straight away.
    pub fn open_review(&self, proposal: &Proposal, now: Timestamp) -> Result<CourtRuling, CourtError> {
        let findings = detect_violations(proposal);
        let mut ruling = CourtRuling::open(proposal.id().clone(), findings, now);
        for finding in &ruling.automatic_findings {
            warn!(
                ruling = %ruling.id,
                kind = ?finding.kind,
                severity = ?finding.severity,
                target = finding.target.as_deref().unwrap_or(""),
                "automatic finding"
            );
        }
        if self.auto_finalize_blocking && ruling.has_blocking_violation() {
            ruling.verdict = Some(Verdict::Incompatible);
            ruling.finalized_at = Some(now);
        }

        let mut rulings = self.rulings.write()?;
        if rulings.contains_key(&ruling.id) {
            return Err(CourtError::RulingExists(ruling.id));
        }
        info!(
            ruling = %ruling.id,
            findings = ruling.automatic_findings.len(),
            finalized = ruling.is_finalized(),
            "court review opened"
        );
        rulings.insert(ruling.id.clone(), Arc::new(Mutex::new(ruling.clone())));
        Ok(ruling)
    }

    pub fn restore(&self, ruling: CourtRuling) -> Result<(), CourtError> {
        self.rulings
            .write()?
            .insert(ruling.id.clone(), Arc::new(Mutex::new(ruling)));
        Ok(())
    }

    /// Record one justice's vote. Each justice votes once per ruling.
    #[allow(clippy::too_many_arguments)]
    pub fn vote(
        &self,
        id: &RulingId,
        justice: &MemberId,
        verdict: Verdict,
        reasoning: impl Into<String>,
        violations: Vec<Violation>,
        modifications: Vec<String>,
        now: Timestamp,
    ) -> Result<JusticeVote, CourtError> {
        self.require_active(justice, now)?;
        let handle = self.handle(id)?;
        let mut ruling = handle.lock()?;
        if ruling.is_finalized() {
            return Err(CourtError::AlreadyFinalized(id.clone()));
        }
        if ruling.votes.contains_key(justice) {
            return Err(CourtError::AlreadyVoted(justice.clone()));
        }
        let vote = JusticeVote {
            justice: justice.clone(),
            verdict,
            reasoning: reasoning.into(),
            violations,
            cast_at: now,
        };
        ruling
            .modifications
            .extend(modifications.into_iter().map(|description| RequiredModification {
                description,
                requested_by: justice.clone(),
                resolved_at: None,
            }));
        ruling.votes.insert(justice.clone(), vote.clone());
        info!(ruling = %id, %justice, %verdict, "justice voted");
        Ok(vote)
    }

    /// Mark a required modification as addressed.
    pub fn resolve_modification(&self, id: &RulingId, index: usize, now: Timestamp) -> Result<(), CourtError> {
        let handle = self.handle(id)?;
        let mut ruling = handle.lock()?;
        if ruling.is_finalized() {
            return Err(CourtError::AlreadyFinalized(id.clone()));
        }
        let modification = ruling
            .modifications
            .get_mut(index)
            .ok_or(CourtError::ModificationNotFound(index))?;
        modification.resolved_at.get_or_insert(now);
        Ok(())
    }

    /// Decide the ruling. Needs the configured share of active justices to
    /// have voted. Finalizing twice returns the first result.
    pub fn finalize(&self, id: &RulingId, now: Timestamp) -> Result<CourtRuling, CourtError> {
        let active = self.active_justices(now)?;
        let handle = self.handle(id)?;
        let mut ruling = handle.lock()?;
        if ruling.is_finalized() {
            return Ok(ruling.clone());
        }
        if active.is_empty() {
            return Err(CourtError::NoActiveJustices);
        }
        let voted = active.iter().filter(|j| ruling.votes.contains_key(*j)).count();
        let required = (self.quorum_fraction * active.len() as f64).ceil() as usize;
        if voted < required.max(1) {
            return Err(CourtError::QuorumNotMet {
                voted,
                active: active.len(),
                required: required.max(1),
            });
        }
        let verdict = ruling.decide();
        ruling.verdict = Some(verdict);
        ruling.finalized_at = Some(now);
        info!(ruling = %id, %verdict, voted, active = active.len(), "ruling finalized");
        Ok(ruling.clone())
    }

    pub fn ruling(&self, id: &RulingId) -> Result<CourtRuling, CourtError> {
        let handle = self.handle(id)?;
        let ruling = handle.lock()?.clone();
        Ok(ruling)
    }
}
