//! The timelock entity and its state machine.
//!
//! ```text
//! Pending -> Active -> Ready -> Executed
//!    |         |        |
//!    +---------+--------+--> Halted
//!    +---------+-----------> Cancelled
//! ```

use charter_types::{Category, MemberId, ProposalId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::TimelockError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelockStatus {
    Pending,
    Active,
    Ready,
    Executed,
    Halted,
    Cancelled,
}

impl TimelockStatus {
    pub fn can_transition_to(self, next: TimelockStatus) -> bool {
        use TimelockStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Active, Ready)
                | (Ready, Executed)
                | (Pending | Active | Ready, Halted)
                | (Pending | Active, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Halted | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Ready => "ready",
            Self::Executed => "executed",
            Self::Halted => "halted",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TimelockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaltSignature {
    pub signer: MemberId,
    pub reason: Option<String>,
    pub signed_at: Timestamp,
    /// Whether an Ed25519 signature over the halt message was verified.
    pub attested: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub requested_by: MemberId,
    pub days: u64,
    pub reason: String,
    pub requested_at: Timestamp,
    pub approved_at: Option<Timestamp>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timelock {
    pub proposal: ProposalId,
    pub category: Category,
    pub duration_days: u64,
    pub fast_tracked: bool,
    status: TimelockStatus,
    pub created_at: Timestamp,
    started_at: Option<Timestamp>,
    ends_at: Option<Timestamp>,
    halt_signatures: BTreeMap<MemberId, HaltSignature>,
    extensions: Vec<Extension>,
    extended_days: u64,
    halt_reason: Option<String>,
    closed_at: Option<Timestamp>,
}

impl Timelock {
    pub fn new(proposal: ProposalId, category: Category, duration_days: u64, now: Timestamp) -> Self {
        Self {
            proposal,
            category,
            duration_days,
            fast_tracked: false,
            status: TimelockStatus::Pending,
            created_at: now,
            started_at: None,
            ends_at: None,
            halt_signatures: BTreeMap::new(),
            extensions: Vec::new(),
            extended_days: 0,
            halt_reason: None,
            closed_at: None,
        }
    }

    pub fn status(&self) -> TimelockStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<Timestamp> {
        self.started_at
    }

    pub fn ends_at(&self) -> Option<Timestamp> {
        self.ends_at
    }

    pub fn halt_signatures(&self) -> impl Iterator<Item = &HaltSignature> {
        self.halt_signatures.values()
    }

    pub fn signature_count(&self) -> usize {
        self.halt_signatures.len()
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    pub fn extended_days(&self) -> u64 {
        self.extended_days
    }

    pub fn halt_reason(&self) -> Option<&str> {
        self.halt_reason.as_deref()
    }

    /// When the timelock reached a terminal state.
    pub fn closed_at(&self) -> Option<Timestamp> {
        self.closed_at
    }

    fn transition(&mut self, next: TimelockStatus) -> Result<(), TimelockError> {
        if !self.status.can_transition_to(next) {
            return Err(TimelockError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self, now: Timestamp) -> Result<(), TimelockError> {
        self.transition(TimelockStatus::Active)?;
        self.started_at = Some(now);
        self.ends_at = Some(now.plus_days(self.duration_days + self.extended_days));
        Ok(())
    }

    /// Move Active to Ready once the delay has elapsed.
    pub fn refresh(&mut self, now: Timestamp) -> bool {
        if self.status == TimelockStatus::Active && self.ends_at.is_some_and(|end| now >= end) {
            self.status = TimelockStatus::Ready;
        }
        self.status == TimelockStatus::Ready
    }

    pub fn mark_executed(&mut self, now: Timestamp) -> Result<(), TimelockError> {
        if self.status != TimelockStatus::Ready {
            return Err(TimelockError::NotReady {
                proposal: self.proposal.clone(),
                status: self.status,
            });
        }
        self.transition(TimelockStatus::Executed)?;
        self.closed_at = Some(now);
        Ok(())
    }

    /// Record a halt signature. Signing again is a no-op; returns the count.
    pub fn add_signature(&mut self, signature: HaltSignature) -> Result<usize, TimelockError> {
        if !self.status.can_transition_to(TimelockStatus::Halted) {
            return Err(TimelockError::InvalidTransition {
                from: self.status,
                to: TimelockStatus::Halted,
            });
        }
        self.halt_signatures
            .entry(signature.signer.clone())
            .or_insert(signature);
        Ok(self.halt_signatures.len())
    }

    pub fn halt(&mut self, reason: impl Into<String>, now: Timestamp) -> Result<(), TimelockError> {
        self.transition(TimelockStatus::Halted)?;
        self.halt_reason = Some(reason.into());
        self.closed_at = Some(now);
        Ok(())
    }

    pub fn cancel(&mut self, now: Timestamp) -> Result<(), TimelockError> {
        self.transition(TimelockStatus::Cancelled)?;
        self.closed_at = Some(now);
        Ok(())
    }

    fn require_extendable(&self) -> Result<(), TimelockError> {
        match self.status {
            TimelockStatus::Pending | TimelockStatus::Active => Ok(()),
            other => Err(TimelockError::NotExtendable(other)),
        }
    }

    pub fn request_extension(&mut self, extension: Extension) -> Result<usize, TimelockError> {
        self.require_extendable()?;
        if extension.days == 0 {
            return Err(TimelockError::EmptyExtension);
        }
        self.extensions.push(extension);
        Ok(self.extensions.len() - 1)
    }

    /// Approve a pending extension, pushing the end time back. The total of
    /// approved extensions never exceeds `max_days`.
    pub fn approve_extension(&mut self, index: usize, max_days: u64, now: Timestamp) -> Result<(), TimelockError> {
        self.require_extendable()?;
        let remaining = max_days.saturating_sub(self.extended_days);
        let extension = self
            .extensions
            .get_mut(index)
            .ok_or(TimelockError::ExtensionNotFound(index))?;
        if extension.approved_at.is_some() {
            return Err(TimelockError::ExtensionApproved(index));
        }
        if extension.days > remaining {
            return Err(TimelockError::ExtensionCapExceeded {
                requested: extension.days,
                remaining,
            });
        }
        extension.approved_at = Some(now);
        let days = extension.days;
        self.extended_days += days;
        if let Some(end) = self.ends_at {
            self.ends_at = Some(end.plus_days(days));
        }
        Ok(())
    }
}
