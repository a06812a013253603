use charter_types::ErrorClass;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("stored data is corrupted: {0}")]
    Corruption(String),

    /// The operation did not complete within the caller's deadline. For
    /// writes the effect is unknown: the write may or may not have landed.
    #[error("storage {op} timed out (write: {write})")]
    Timeout { op: String, write: bool },
}

impl StoreError {
    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Backend(_))
    }

    /// A write whose outcome is unknown and must be resolved by re-reading.
    pub fn is_ambiguous_write(&self) -> bool {
        matches!(self, Self::Timeout { write: true, .. })
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Corruption(_) => ErrorClass::Integrity,
            _ => ErrorClass::Storage {
                transient: self.is_transient(),
            },
        }
    }
}
