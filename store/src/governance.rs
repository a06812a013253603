//! Storage traits for governance entities.

use charter_types::{ExitId, ForkId, ProposalId, RulingId, SessionId};

use crate::StoreError;

/// Proposals, keyed by proposal id.
pub trait ProposalStore {
    fn put_proposal(&self, id: &ProposalId, data: &[u8]) -> Result<(), StoreError>;
    fn get_proposal(&self, id: &ProposalId) -> Result<Vec<u8>, StoreError>;
    fn list_proposals(&self) -> Result<Vec<ProposalId>, StoreError>;
}

/// Voting sessions with their vote records, keyed by proposal + chamber.
pub trait VoteStore {
    fn put_session(&self, id: &SessionId, data: &[u8]) -> Result<(), StoreError>;
    fn get_session(&self, id: &SessionId) -> Result<Vec<u8>, StoreError>;
    fn list_sessions(&self) -> Result<Vec<SessionId>, StoreError>;
}

/// Timelocks, keyed by the proposal they guard.
pub trait TimelockStore {
    fn put_timelock(&self, id: &ProposalId, data: &[u8]) -> Result<(), StoreError>;
    fn get_timelock(&self, id: &ProposalId) -> Result<Vec<u8>, StoreError>;
    fn list_timelocks(&self) -> Result<Vec<ProposalId>, StoreError>;
}

pub trait RulingStore {
    fn put_ruling(&self, id: &RulingId, data: &[u8]) -> Result<(), StoreError>;
    fn get_ruling(&self, id: &RulingId) -> Result<Vec<u8>, StoreError>;
    fn list_rulings(&self) -> Result<Vec<RulingId>, StoreError>;
}

pub trait ForkStore {
    fn put_fork(&self, id: &ForkId, data: &[u8]) -> Result<(), StoreError>;
    fn get_fork(&self, id: &ForkId) -> Result<Vec<u8>, StoreError>;
    fn list_forks(&self) -> Result<Vec<ForkId>, StoreError>;
}

pub trait ExitStore {
    fn put_exit(&self, id: &ExitId, data: &[u8]) -> Result<(), StoreError>;
    fn get_exit(&self, id: &ExitId) -> Result<Vec<u8>, StoreError>;
    fn list_exits(&self) -> Result<Vec<ExitId>, StoreError>;
}

/// The delegation graph, persisted as a single snapshot.
pub trait DelegationStore {
    fn put_delegation_graph(&self, data: &[u8]) -> Result<(), StoreError>;
    fn get_delegation_graph(&self) -> Result<Option<Vec<u8>>, StoreError>;
}
