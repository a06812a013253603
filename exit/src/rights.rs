//! Exit rights.
//!
//! A member can always leave. Nothing here looks at proposals, votes,
//! timelocks or lineage health, so no governance state can hold an exit up.

use charter_store::{MemberDataStore, MemberItemKind};
use charter_types::{ExitId, ForkId, MemberId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::info;

use crate::error::ExitError;
use crate::fork::Legitimacy;
use crate::registry::ForkRegistry;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExitType {
    /// Leave and have all data erased after export.
    Complete,
    /// Move to another fork.
    Migrate { destination: ForkId },
    /// Stop participating without leaving.
    Pause,
    ExportOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    Requested,
    Ready,
    Completed,
    Cancelled,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub profile: usize,
    pub proposals: usize,
    pub votes: usize,
    pub delegations: usize,
    pub total: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRequest {
    pub id: ExitId,
    pub member: MemberId,
    pub exit_type: ExitType,
    pub status: ExitStatus,
    pub requested_at: Timestamp,
    pub prepared_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
    pub export: Option<ExportSummary>,
    /// Items erased when a complete exit finished.
    pub erased: Option<usize>,
}

impl ExitRequest {
    pub fn is_active(&self) -> bool {
        matches!(self.status, ExitStatus::Requested | ExitStatus::Ready)
    }
}

#[derive(Default)]
pub struct ExitRightsManager {
    next_id: AtomicU64,
    requests: RwLock<HashMap<ExitId, Arc<Mutex<ExitRequest>>>>,
    paused: RwLock<BTreeSet<MemberId>>,
}

impl ExitRightsManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, id: &ExitId) -> Result<Arc<Mutex<ExitRequest>>, ExitError> {
        self.requests
            .read()?
            .get(id)
            .cloned()
            .ok_or_else(|| ExitError::NotFound(id.clone()))
    }

    /// Open an exit request. Asking again for the same type returns the
    /// member's active request; asking for a different type while one is
    /// active is refused. A migration must target a registered fork that is
    /// not illegitimate.
    pub fn request(
        &self,
        member: MemberId,
        exit_type: ExitType,
        forks: &ForkRegistry,
        now: Timestamp,
    ) -> Result<ExitRequest, ExitError> {
        if let ExitType::Migrate { destination } = &exit_type {
            if forks.legitimacy(destination)? == Legitimacy::Illegitimate {
                return Err(ExitError::IllegitimateDestination(destination.clone()));
            }
        }
        let mut requests = self.requests.write()?;
        for handle in requests.values() {
            let existing = handle.lock()?;
            if existing.member != member || !existing.is_active() {
                continue;
            }
            if existing.exit_type == exit_type {
                return Ok(existing.clone());
            }
            return Err(ExitError::ExitInProgress {
                member,
                existing: existing.id.clone(),
            });
        }
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = ExitRequest {
            id: ExitId::new(format!("exit-{member}-{n}")),
            member,
            exit_type,
            status: ExitStatus::Requested,
            requested_at: now,
            prepared_at: None,
            completed_at: None,
            cancelled_at: None,
            export: None,
            erased: None,
        };
        info!(exit = %request.id, member = %request.member, exit_type = ?request.exit_type, "exit requested");
        requests.insert(request.id.clone(), Arc::new(Mutex::new(request.clone())));
        Ok(request)
    }

    pub fn restore(&self, request: ExitRequest) -> Result<(), ExitError> {
        self.next_id.fetch_add(1, Ordering::Relaxed);
        if request.status == ExitStatus::Completed && request.exit_type == ExitType::Pause {
            self.paused.write()?.insert(request.member.clone());
        }
        self.requests
            .write()?
            .insert(request.id.clone(), Arc::new(Mutex::new(request)));
        Ok(())
    }

    /// Gather the member's data for export and mark the request ready.
    pub fn prepare_export(
        &self,
        id: &ExitId,
        store: &dyn MemberDataStore,
        now: Timestamp,
    ) -> Result<ExportSummary, ExitError> {
        let handle = self.handle(id)?;
        let mut request = handle.lock()?;
        match request.status {
            ExitStatus::Completed => return Err(ExitError::AlreadyCompleted(id.clone())),
            ExitStatus::Cancelled => return Err(ExitError::Cancelled(id.clone())),
            ExitStatus::Requested | ExitStatus::Ready => {}
        }
        let export = store.export_member(&request.member)?;
        let summary = ExportSummary {
            profile: export.count(MemberItemKind::Profile),
            proposals: export.count(MemberItemKind::Proposal),
            votes: export.count(MemberItemKind::Vote),
            delegations: export.count(MemberItemKind::Delegation),
            total: export.items.len(),
        };
        request.export = Some(summary.clone());
        request.prepared_at = Some(now);
        request.status = ExitStatus::Ready;
        info!(exit = %id, items = summary.total, "exit export prepared");
        Ok(summary)
    }

    /// Finish the exit. A complete exit erases the member's data.
    pub fn complete(&self, id: &ExitId, store: &dyn MemberDataStore, now: Timestamp) -> Result<ExitRequest, ExitError> {
        let handle = self.handle(id)?;
        let mut request = handle.lock()?;
        match request.status {
            ExitStatus::Ready => {}
            ExitStatus::Requested => return Err(ExitError::NotPrepared(id.clone())),
            ExitStatus::Completed => return Err(ExitError::AlreadyCompleted(id.clone())),
            ExitStatus::Cancelled => return Err(ExitError::Cancelled(id.clone())),
        }
        match &request.exit_type {
            ExitType::Complete => {
                let erased = store.erase_member(&request.member)?;
                request.erased = Some(erased);
                info!(exit = %id, erased, "member data erased");
            }
            ExitType::Pause => {
                self.paused.write()?.insert(request.member.clone());
            }
            ExitType::Migrate { destination } => {
                info!(exit = %id, %destination, "member migrated");
            }
            ExitType::ExportOnly => {}
        }
        request.status = ExitStatus::Completed;
        request.completed_at = Some(now);
        info!(exit = %id, member = %request.member, "exit completed");
        Ok(request.clone())
    }

    /// Withdraw an exit request. Only its requester may, and only before it completes.
    pub fn cancel(&self, id: &ExitId, by: &MemberId, now: Timestamp) -> Result<ExitRequest, ExitError> {
        let handle = self.handle(id)?;
        let mut request = handle.lock()?;
        if &request.member != by {
            return Err(ExitError::NotRequester {
                exit: id.clone(),
                member: by.clone(),
            });
        }
        match request.status {
            ExitStatus::Completed => return Err(ExitError::AlreadyCompleted(id.clone())),
            ExitStatus::Cancelled => return Err(ExitError::Cancelled(id.clone())),
            ExitStatus::Requested | ExitStatus::Ready => {}
        }
        request.status = ExitStatus::Cancelled;
        request.cancelled_at = Some(now);
        info!(exit = %id, "exit cancelled");
        Ok(request.clone())
    }

    pub fn get(&self, id: &ExitId) -> Result<ExitRequest, ExitError> {
        let handle = self.handle(id)?;
        let request = handle.lock()?.clone();
        Ok(request)
    }

    pub fn is_paused(&self, member: &MemberId) -> Result<bool, ExitError> {
        Ok(self.paused.read()?.contains(member))
    }

    /// Bring a paused member back.
    pub fn resume(&self, member: &MemberId) -> Result<bool, ExitError> {
        Ok(self.paused.write()?.remove(member))
    }
}
