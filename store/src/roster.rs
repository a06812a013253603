//! Membership roster storage.

use charter_types::{Chamber, Roster};

use crate::StoreError;

/// The two membership rosters: general members and maintainers.
pub trait RosterStore {
    fn roster(&self, chamber: Chamber) -> Result<Roster, StoreError>;
    fn put_roster(&self, chamber: Chamber, roster: &Roster) -> Result<(), StoreError>;
}
