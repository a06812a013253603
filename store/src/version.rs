//! Constitution version storage.

use charter_types::LineageId;

use crate::StoreError;

/// Append-only storage of constitution versions.
///
/// Versions are never overwritten: appending an existing version string is a
/// [`StoreError::Duplicate`]. Iteration returns versions in the order they
/// were appended, which is creation order.
pub trait VersionStore {
    fn append_version(
        &self,
        lineage: &LineageId,
        version: &str,
        data: &[u8],
    ) -> Result<(), StoreError>;

    fn get_version(&self, lineage: &LineageId, version: &str) -> Result<Vec<u8>, StoreError>;

    /// All versions of a lineage, oldest first.
    fn list_versions(&self, lineage: &LineageId) -> Result<Vec<Vec<u8>>, StoreError>;

    fn set_current_version(&self, lineage: &LineageId, version: &str) -> Result<(), StoreError>;

    fn current_version(&self, lineage: &LineageId) -> Result<Option<String>, StoreError>;
}
