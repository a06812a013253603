//! Timelocks: the mandatory delay between approval and enactment.
//!
//! A timelock can be halted by a large enough group of signers at any point
//! before it executes. Nothing the halted proposal does can disable that.

pub mod error;
pub mod manager;
pub mod timelock;

pub use error::TimelockError;
pub use manager::{halt_message, TimelockManager};
pub use timelock::{Extension, HaltSignature, Timelock, TimelockStatus};
