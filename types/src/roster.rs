//! Membership rosters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::MemberId;

/// The eligible voters of one chamber with their base stake.
///
/// Backed by a `BTreeMap` so iteration order (and therefore any arithmetic
/// folded over it) is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    members: BTreeMap<MemberId, f64>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster where every member has a base stake of 1.0.
    pub fn uniform<I, M>(members: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<MemberId>,
    {
        Self {
            members: members.into_iter().map(|m| (m.into(), 1.0)).collect(),
        }
    }

    /// Insert or replace a member. Negative or non-finite stakes are stored as 0.
    pub fn insert(&mut self, member: MemberId, stake: f64) {
        let stake = if stake.is_finite() && stake > 0.0 { stake } else { 0.0 };
        self.members.insert(member, stake);
    }

    pub fn with(mut self, member: impl Into<MemberId>, stake: f64) -> Self {
        self.insert(member.into(), stake);
        self
    }

    pub fn remove(&mut self, member: &MemberId) -> bool {
        self.members.remove(member).is_some()
    }

    pub fn contains(&self, member: &MemberId) -> bool {
        self.members.contains_key(member)
    }

    /// Base stake of a member; 0 for non-members.
    pub fn weight_of(&self, member: &MemberId) -> f64 {
        self.members.get(member).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> impl Iterator<Item = &MemberId> {
        self.members.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_roster_has_unit_stakes() {
        let r = Roster::uniform(["a", "b"]);
        assert_eq!(r.len(), 2);
        assert_eq!(r.weight_of(&MemberId::new("a")), 1.0);
        assert_eq!(r.weight_of(&MemberId::new("zed")), 0.0);
    }

    #[test]
    fn invalid_stake_clamps_to_zero() {
        let r = Roster::new().with("a", -3.0).with("b", f64::NAN);
        assert_eq!(r.weight_of(&MemberId::new("a")), 0.0);
        assert_eq!(r.weight_of(&MemberId::new("b")), 0.0);
        assert!(r.contains(&MemberId::new("b")));
    }
}
