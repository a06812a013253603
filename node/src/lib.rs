//! Charter engine node: runs constitutional amendments end to end.
//!
//! The node is the coordinator that:
//! - Validates and submits proposals
//! - Runs bicameral voting with delegation and quadratic weighting
//! - Sends passed proposals to the constitutional court
//! - Holds approved proposals under a haltable timelock
//! - Enacts ready proposals as new constitution versions
//! - Services forks and member exits, independent of governance state
//!
//! All storage goes through a bounded-latency gateway, and every stage is
//! traced and counted in [`CharterMetrics`].

pub mod charter;
pub mod config;
pub mod error;
pub mod exits;
pub mod gateway;
pub mod metrics;
pub mod pipeline_locks;
pub mod tracing_spans;

pub use charter::{Charter, HaltOutcome, Submission};
pub use charter_utils::{init_logging, LogFormat};
pub use config::CharterConfig;
pub use error::NodeError;
pub use gateway::StoreGateway;
pub use metrics::CharterMetrics;
pub use pipeline_locks::{PipelineGuard, PipelineLocks};
