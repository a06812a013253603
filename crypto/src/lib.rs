//! Cryptographic primitives for Charter.
//!
//! - **Blake2b-256** for content hashes (proposals, constitution snapshots,
//!   version chain links, audit entries)
//! - **Ed25519** for attested emergency-halt signatures

pub mod hash;
pub mod keys;
pub mod sign;

pub use hash::{blake2b_256, blake2b_256_multi, canonical_bytes, hash_canonical, CanonicalError};
pub use keys::{keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
