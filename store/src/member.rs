//! Per-member data held for export and erasure.

use charter_types::MemberId;
use serde::{Deserialize, Serialize};

use crate::StoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberItemKind {
    Profile,
    Proposal,
    Vote,
    Delegation,
}

/// One piece of member-attributed data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberItem {
    pub kind: MemberItemKind,
    pub key: String,
    pub data: Vec<u8>,
}

/// Everything held about one member.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberExport {
    pub items: Vec<MemberItem>,
}

impl MemberExport {
    pub fn count(&self, kind: MemberItemKind) -> usize {
        self.items.iter().filter(|i| i.kind == kind).count()
    }
}

/// Member-attributed data. Writing the same (kind, key) again replaces it.
pub trait MemberDataStore {
    fn put_member_item(&self, member: &MemberId, item: MemberItem) -> Result<(), StoreError>;
    fn export_member(&self, member: &MemberId) -> Result<MemberExport, StoreError>;
    /// Permanently delete a member's data. Returns the number of items removed.
    fn erase_member(&self, member: &MemberId) -> Result<usize, StoreError>;
}
