//! Justices and their terms of service.

use charter_types::{MemberId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Justice {
    pub id: MemberId,
    pub term_start: Timestamp,
    pub term_end: Timestamp,
    pub removed_at: Option<Timestamp>,
}

impl Justice {
    pub fn new(id: MemberId, term_start: Timestamp, term_days: u64) -> Self {
        Self {
            id,
            term_start,
            term_end: term_start.plus_days(term_days),
            removed_at: None,
        }
    }

    /// Active inside `[term_start, term_end)` and not removed by `now`.
    pub fn is_active(&self, now: Timestamp) -> bool {
        if self.removed_at.is_some_and(|at| at <= now) {
            return false;
        }
        self.term_start <= now && now < self.term_end
    }
}
