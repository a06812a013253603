//! Retry rules for storage calls.
//!
//! Reads are idempotent and retried on transient failure up to a fixed
//! number of attempts. Writes are not blindly retried: a write that timed out
//! may already have landed, so its effect is resolved by re-reading first and
//! the write is re-applied only when the re-read shows it is missing.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::StoreError;

/// What to do after a failed read attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadDecision {
    Retry,
    GiveUp,
}

/// What to do after a failed write attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteDecision {
    /// The re-read shows the write landed.
    Confirmed,
    /// The re-read shows it did not; apply it again.
    Reapply,
    GiveUp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts for a read, including the first.
    pub read_attempts: u32,
    /// Total attempts for a write whose outcome was unknown.
    pub write_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            read_attempts: 3,
            write_attempts: 2,
        }
    }
}

impl RetryPolicy {
    /// `attempt` is 1-based: the attempt that just failed.
    pub fn on_read_error(&self, attempt: u32, err: &StoreError) -> ReadDecision {
        if err.is_transient() && attempt < self.read_attempts {
            ReadDecision::Retry
        } else {
            ReadDecision::GiveUp
        }
    }

    /// Decide after a failed write, given whether a re-read found the
    /// written value. `confirmed` is `None` when the re-read itself failed.
    pub fn on_write_error(
        &self,
        attempt: u32,
        err: &StoreError,
        confirmed: Option<bool>,
    ) -> WriteDecision {
        if !err.is_transient() {
            return WriteDecision::GiveUp;
        }
        match confirmed {
            Some(true) => WriteDecision::Confirmed,
            Some(false) if attempt < self.write_attempts => WriteDecision::Reapply,
            _ => WriteDecision::GiveUp,
        }
    }

    /// Run a read with retries.
    pub fn read<T>(
        &self,
        op: &str,
        mut f: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut attempt = 1;
        loop {
            match f() {
                Ok(v) => return Ok(v),
                Err(e) => match self.on_read_error(attempt, &e) {
                    ReadDecision::Retry => {
                        debug!(op, attempt, error = %e, "retrying storage read");
                        attempt += 1;
                    }
                    ReadDecision::GiveUp => return Err(e),
                },
            }
        }
    }

    /// Run a write, resolving unknown outcomes with `confirm` before
    /// re-applying. `confirm` returns whether the write is visible.
    pub fn write(
        &self,
        op: &str,
        mut apply: impl FnMut() -> Result<(), StoreError>,
        mut confirm: impl FnMut() -> Result<bool, StoreError>,
    ) -> Result<(), StoreError> {
        let mut attempt = 1;
        loop {
            let err = match apply() {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            let confirmed = if err.is_transient() {
                self.read(op, &mut confirm).ok()
            } else {
                None
            };
            match self.on_write_error(attempt, &err, confirmed) {
                WriteDecision::Confirmed => {
                    debug!(op, attempt, "write landed despite error");
                    return Ok(());
                }
                WriteDecision::Reapply => {
                    warn!(op, attempt, error = %err, "re-applying storage write");
                    attempt += 1;
                }
                WriteDecision::GiveUp => return Err(err),
            }
        }
    }
}
