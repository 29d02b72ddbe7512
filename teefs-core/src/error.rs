//! Error types for the secure storage engine.

use thiserror::Error;

/// Result type alias for storage engine operations.
pub type FsResult<T> = Result<T, FsError>;

/// Errors raised by the storage engine and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    /// An input parameter is invalid (null/overlong path, out-of-range
    /// seek, truncate or write).
    #[error("bad parameters")]
    BadParameters,

    /// A scratch buffer or collaborator allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    /// The backing file does not exist.
    #[error("item not found")]
    ItemNotFound,

    /// The backing store failed an integrity check: short counter read, or
    /// authentication failure on a meta or data block.
    #[error("corrupt object")]
    CorruptObject,

    /// Authentication failure reported by the key manager. Internal only;
    /// upgraded to [`FsError::CorruptObject`] before leaving the engine.
    #[error("invalid MAC")]
    MacInvalid,

    /// The operation is not provided by this storage engine.
    #[error("operation not supported")]
    NotSupported,

    /// A host I/O failure reported by the RPC transport.
    #[error("host I/O failure: {0}")]
    Generic(String),
}

impl FsError {
    /// Creates a transport failure with context.
    pub fn generic<S: Into<String>>(context: S) -> Self {
        Self::Generic(context.into())
    }

    /// Upgrades [`FsError::MacInvalid`] to [`FsError::CorruptObject`].
    ///
    /// MAC failures never cross the engine boundary; callers of the
    /// decrypting read paths apply this before propagating.
    #[must_use]
    pub(crate) fn upgrade_mac(self) -> Self {
        match self {
            Self::MacInvalid => Self::CorruptObject,
            other => other,
        }
    }
}
