//! Constitutional court.
//!
//! Justices serve fixed terms and vote on whether a proposal is compatible
//! with the constitution. Automatic detectors seed each review with findings;
//! a blocking finding, whether automatic or cited by a justice, makes the
//! ruling incompatible no matter how the votes fall.

pub mod court;
pub mod error;
pub mod justice;
pub mod ruling;
pub mod violation;

pub use court::ConstitutionalCourt;
pub use error::CourtError;
pub use justice::Justice;
pub use ruling::{CourtRuling, JusticeVote, RequiredModification};
pub use violation::{detect_violations, Severity, Violation, ViolationKind};
