//! Blake2b hashing and canonical content hashing.
//!
//! Content trees are hashed over their canonical JSON encoding. `serde_json`
//! objects are `BTreeMap`-backed, so keys serialize in sorted order and two
//! structurally equal trees always hash the same.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use charter_types::ContentHash;
use serde::Serialize;
use thiserror::Error;

type Blake2b256 = Blake2b<U32>;

#[derive(Debug, Error)]
#[error("value cannot be canonically encoded: {0}")]
pub struct CanonicalError(String);

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Hash multiple byte slices in sequence.
///
/// Each part is length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Canonical JSON bytes of a serializable value.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    // Round-trip through `Value` so map keys come out sorted regardless of
    // the source type's field or insertion order.
    let tree = serde_json::to_value(value).map_err(|e| CanonicalError(e.to_string()))?;
    serde_json::to_vec(&tree).map_err(|e| CanonicalError(e.to_string()))
}

/// Hash the canonical encoding of a serializable value.
pub fn hash_canonical<T: Serialize + ?Sized>(value: &T) -> Result<ContentHash, CanonicalError> {
    Ok(ContentHash::new(blake2b_256(&canonical_bytes(value)?)))
}
