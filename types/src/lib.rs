//! Fundamental types for the Charter governance engine.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! identifiers, timestamps and clocks, content hashes, chambers and proposal
//! categories, court verdicts, membership rosters, governance parameters, and the error taxonomy.

pub mod chamber;
pub mod error;
pub mod hash;
pub mod ids;
pub mod keys;
pub mod params;
pub mod roster;
pub mod time;
pub mod verdict;

pub use chamber::{Category, Chamber};
pub use error::ErrorClass;
pub use hash::ContentHash;
pub use ids::{ExitId, ForkId, LineageId, MemberId, ProposalId, RulingId, SessionId};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use params::{CategoryRequirements, ChamberRequirements, GovernanceParams};
pub use roster::Roster;
pub use time::{Clock, SystemClock, Timestamp, SECS_PER_DAY};
pub use verdict::Verdict;
