//! Registry of timelocks, one per approved proposal.
//!
//! Every timelock has its own lock. The ready check, the halt decision and
//! execution all happen under it, so a timelock that became ready can never
//! also be halted.

use charter_crypto::verify_signature;
use charter_types::{Category, GovernanceParams, MemberId, ProposalId, PublicKey, Signature, Timestamp};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

use crate::error::TimelockError;
use crate::timelock::{Extension, HaltSignature, Timelock, TimelockStatus};

/// The bytes a signer attests to when asking for a halt.
pub fn halt_message(proposal: &ProposalId) -> Vec<u8> {
    format!("charter-halt:{proposal}").into_bytes()
}

pub struct TimelockManager {
    params: GovernanceParams,
    timelocks: RwLock<HashMap<ProposalId, Arc<Mutex<Timelock>>>>,
}

impl TimelockManager {
    pub fn new(params: GovernanceParams) -> Self {
        Self {
            params,
            timelocks: RwLock::new(HashMap::new()),
        }
    }

    fn handle(&self, id: &ProposalId) -> Result<Arc<Mutex<Timelock>>, TimelockError> {
        self.timelocks
            .read()?
            .get(id)
            .cloned()
            .ok_or_else(|| TimelockError::NotFound(id.clone()))
    }

    fn insert(&self, timelock: Timelock) -> Result<Timelock, TimelockError> {
        let mut timelocks = self.timelocks.write()?;
        if timelocks.contains_key(&timelock.proposal) {
            return Err(TimelockError::Exists(timelock.proposal));
        }
        info!(
            proposal = %timelock.proposal,
            category = %timelock.category,
            days = timelock.duration_days,
            fast_tracked = timelock.fast_tracked,
            "timelock created"
        );
        timelocks.insert(timelock.proposal.clone(), Arc::new(Mutex::new(timelock.clone())));
        Ok(timelock)
    }

    /// Create a pending timelock with the category's configured delay.
    pub fn create(&self, proposal: ProposalId, category: Category, now: Timestamp) -> Result<Timelock, TimelockError> {
        let days = self.params.timelock_days(category);
        self.insert(Timelock::new(proposal, category, days, now))
    }

    /// Create a pending timelock with an explicit, shortened delay.
    pub fn create_fast_tracked(
        &self,
        proposal: ProposalId,
        category: Category,
        days: u64,
        now: Timestamp,
    ) -> Result<Timelock, TimelockError> {
        let mut timelock = Timelock::new(proposal, category, days, now);
        timelock.fast_tracked = true;
        self.insert(timelock)
    }

    pub fn restore(&self, timelock: Timelock) -> Result<(), TimelockError> {
        self.timelocks
            .write()?
            .insert(timelock.proposal.clone(), Arc::new(Mutex::new(timelock)));
        Ok(())
    }

    pub fn start(&self, id: &ProposalId, now: Timestamp) -> Result<Timelock, TimelockError> {
        let handle = self.handle(id)?;
        let mut timelock = handle.lock()?;
        timelock.start(now)?;
        info!(proposal = %id, ends_at = ?timelock.ends_at(), "timelock started");
        Ok(timelock.clone())
    }

    /// Whether the delay has elapsed; moves Active to Ready when it has.
    pub fn check_ready(&self, id: &ProposalId, now: Timestamp) -> Result<bool, TimelockError> {
        let handle = self.handle(id)?;
        let mut timelock = handle.lock()?;
        let was = timelock.status();
        let ready = timelock.refresh(now);
        if ready && was != TimelockStatus::Ready {
            info!(proposal = %id, "timelock ready");
        }
        Ok(ready)
    }

    pub fn execute(&self, id: &ProposalId, now: Timestamp) -> Result<Timelock, TimelockError> {
        self.execute_with(id, now, |_| Ok::<_, TimelockError>(()))
            .map(|(timelock, ())| timelock)
    }

    /// Execute the timelock, running `enact` while it is held.
    ///
    /// `enact` runs only when the timelock is ready and not halted. If it
    /// fails the timelock stays ready and the error is returned.
    pub fn execute_with<T, E, F>(&self, id: &ProposalId, now: Timestamp, enact: F) -> Result<(Timelock, T), E>
    where
        F: FnOnce(&Timelock) -> Result<T, E>,
        E: From<TimelockError>,
    {
        let handle = self.handle(id)?;
        let mut timelock = handle.lock().map_err(TimelockError::from)?;
        if !timelock.refresh(now) {
            return Err(TimelockError::NotReady {
                proposal: id.clone(),
                status: timelock.status(),
            }
            .into());
        }
        let output = enact(&timelock)?;
        timelock.mark_executed(now)?;
        info!(proposal = %id, "timelock executed");
        Ok((timelock.clone(), output))
    }

    /// Add a halt signature and return how many distinct signers there are.
    pub fn sign_halt(
        &self,
        id: &ProposalId,
        signer: MemberId,
        reason: Option<String>,
        now: Timestamp,
    ) -> Result<usize, TimelockError> {
        self.add_signature(
            id,
            HaltSignature {
                signer,
                reason,
                signed_at: now,
                attested: false,
            },
        )
    }

    /// Add a halt signature that carries an Ed25519 signature over
    /// [`halt_message`] by the signer's registered key.
    pub fn sign_halt_attested(
        &self,
        id: &ProposalId,
        signer: MemberId,
        key: &PublicKey,
        signature: &Signature,
        reason: Option<String>,
        now: Timestamp,
    ) -> Result<usize, TimelockError> {
        if !verify_signature(&halt_message(id), signature, key) {
            warn!(proposal = %id, %signer, "halt signature rejected");
            return Err(TimelockError::InvalidSignature(signer));
        }
        self.add_signature(
            id,
            HaltSignature {
                signer,
                reason,
                signed_at: now,
                attested: true,
            },
        )
    }

    fn add_signature(&self, id: &ProposalId, signature: HaltSignature) -> Result<usize, TimelockError> {
        let handle = self.handle(id)?;
        let mut timelock = handle.lock()?;
        let signer = signature.signer.clone();
        let count = timelock.add_signature(signature)?;
        info!(proposal = %id, %signer, count, "halt signature recorded");
        Ok(count)
    }

    fn threshold_met(&self, count: usize, total_eligible: usize) -> bool {
        if total_eligible == 0 {
            return false;
        }
        count >= self.params.halt_min_signatures
            && count as f64 / total_eligible as f64 >= self.params.halt_fraction
    }

    /// Whether the signatures reach both the absolute minimum and the
    /// configured share of `total_eligible` signers.
    pub fn check_halt_threshold(&self, id: &ProposalId, total_eligible: usize) -> Result<bool, TimelockError> {
        let handle = self.handle(id)?;
        let count = handle.lock()?.signature_count();
        Ok(self.threshold_met(count, total_eligible))
    }

    pub fn halt(&self, id: &ProposalId, reason: impl Into<String>, now: Timestamp) -> Result<Timelock, TimelockError> {
        let handle = self.handle(id)?;
        let mut timelock = handle.lock()?;
        let reason = reason.into();
        timelock.halt(reason.clone(), now)?;
        warn!(proposal = %id, %reason, "timelock halted");
        Ok(timelock.clone())
    }

    /// Halt if the signature threshold is met, checked and applied atomically.
    pub fn try_halt(
        &self,
        id: &ProposalId,
        total_eligible: usize,
        reason: impl Into<String>,
        now: Timestamp,
    ) -> Result<bool, TimelockError> {
        let handle = self.handle(id)?;
        let mut timelock = handle.lock()?;
        if timelock.status().is_terminal() || !self.threshold_met(timelock.signature_count(), total_eligible) {
            return Ok(false);
        }
        let reason = reason.into();
        timelock.halt(reason.clone(), now)?;
        warn!(
            proposal = %id,
            signatures = timelock.signature_count(),
            total_eligible,
            %reason,
            "timelock halted by signers"
        );
        Ok(true)
    }

    pub fn cancel(&self, id: &ProposalId, now: Timestamp) -> Result<Timelock, TimelockError> {
        let handle = self.handle(id)?;
        let mut timelock = handle.lock()?;
        timelock.cancel(now)?;
        info!(proposal = %id, "timelock cancelled");
        Ok(timelock.clone())
    }

    pub fn request_extension(
        &self,
        id: &ProposalId,
        by: MemberId,
        days: u64,
        reason: impl Into<String>,
        now: Timestamp,
    ) -> Result<usize, TimelockError> {
        let handle = self.handle(id)?;
        let mut timelock = handle.lock()?;
        let index = timelock.request_extension(Extension {
            requested_by: by,
            days,
            reason: reason.into(),
            requested_at: now,
            approved_at: None,
        })?;
        info!(proposal = %id, index, days, "timelock extension requested");
        Ok(index)
    }

    pub fn approve_extension(&self, id: &ProposalId, index: usize, now: Timestamp) -> Result<Timelock, TimelockError> {
        let handle = self.handle(id)?;
        let mut timelock = handle.lock()?;
        timelock.approve_extension(index, self.params.max_extension_days, now)?;
        info!(proposal = %id, index, ends_at = ?timelock.ends_at(), "timelock extension approved");
        Ok(timelock.clone())
    }

    pub fn timelock(&self, id: &ProposalId) -> Result<Timelock, TimelockError> {
        let handle = self.handle(id)?;
        let timelock = handle.lock()?.clone();
        Ok(timelock)
    }

    /// Timelocks not yet in a terminal state.
    pub fn open_count(&self) -> Result<usize, TimelockError> {
        let handles: Vec<_> = self.timelocks.read()?.values().cloned().collect();
        let mut open = 0;
        for handle in handles {
            if !handle.lock()?.status().is_terminal() {
                open += 1;
            }
        }
        Ok(open)
    }
}
