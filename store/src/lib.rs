//! Abstract storage traits for Charter.
//!
//! Every storage backend (a durable database, or the in-memory nullables for
//! testing) implements these traits. The rest of the codebase depends only on
//! the traits. Entities are stored as opaque serialized bytes keyed by id;
//! the owning component decides the encoding.
//!
//! All calls are synchronous and may block. Callers that need bounded latency
//! wrap them in a timeout and apply [`RetryPolicy`].

pub mod error;
pub mod governance;
pub mod member;
pub mod retry;
pub mod roster;
pub mod version;

pub use error::StoreError;
pub use governance::{
    DelegationStore, ExitStore, ForkStore, ProposalStore, RulingStore, TimelockStore, VoteStore,
};
pub use member::{MemberDataStore, MemberExport, MemberItem, MemberItemKind};
pub use retry::{ReadDecision, RetryPolicy, WriteDecision};
pub use roster::RosterStore;
pub use version::VersionStore;

/// Everything the engine consumes from storage.
pub trait CharterStore:
    ProposalStore
    + VoteStore
    + VersionStore
    + TimelockStore
    + RulingStore
    + ForkStore
    + ExitStore
    + DelegationStore
    + RosterStore
    + MemberDataStore
    + Send
    + Sync
{
}

impl<T> CharterStore for T where
    T: ProposalStore
        + VoteStore
        + VersionStore
        + TimelockStore
        + RulingStore
        + ForkStore
        + ExitStore
        + DelegationStore
        + RosterStore
        + MemberDataStore
        + Send
        + Sync
{
}
