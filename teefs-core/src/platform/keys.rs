//! Key-manager and session collaborator traits.
//!
//! The engine never sees plaintext data on the wire and never sees a
//! plaintext File Encryption Key at all: the key manager hands out the FEK
//! only in wrapped form, and performs all encryption and decryption on the
//! engine's behalf.

use uuid::Uuid;

use crate::error::FsResult;

/// The two payload kinds the key manager distinguishes. Each has its own
/// authenticated-encryption header size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// File meta info (length, backup-version table, generation counter).
    Meta,
    /// A data block payload.
    Block,
}

/// A File Encryption Key wrapped under the creating client's identity.
///
/// Opaque to the engine: it is carried in the meta header on disk and fed
/// back to the key manager as associated key material for block I/O.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedFek(Vec<u8>);

impl EncryptedFek {
    /// Wraps raw bytes produced by a key manager.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the wrapped key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the wrapped key in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the wrapped key is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for EncryptedFek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFek")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Identity of the client currently driving the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// UUID of the trusted application owning the session.
    pub client_uuid: Uuid,
}

/// Accessor for the current client session.
///
/// Process-wide collaborator; implementations must be safe to share across
/// handles.
pub trait SessionProvider: Send + Sync {
    /// Returns the session on whose behalf the engine is operating.
    fn current_session(&self) -> Session;
}

/// Key-management collaborator.
///
/// Produces self-describing authenticated ciphertexts: the ciphertext for a
/// payload of `n` bytes is exactly `header_size(kind) + n` bytes, with the
/// header carrying nonce, tag and (for [`FileKind::Meta`]) the wrapped FEK.
pub trait KeyManager: Send + Sync {
    /// Authenticated-encryption header size for the given payload kind.
    fn header_size(&self, kind: FileKind) -> usize;

    /// Byte length of a wrapped FEK.
    fn fek_size(&self) -> usize;

    /// Number of data blocks per container; sizes the backup-version table.
    fn num_blocks_per_file(&self) -> usize;

    /// Generates a fresh FEK wrapped under `client_uuid`.
    ///
    /// # Errors
    ///
    /// Returns an error if entropy gathering or wrapping fails.
    fn generate_fek(&self, client_uuid: &Uuid) -> FsResult<EncryptedFek>;

    /// Encrypts `plaintext` into a self-describing ciphertext.
    ///
    /// For [`FileKind::Meta`] the wrapped FEK is embedded in the header; for
    /// [`FileKind::Block`] it acts as associated key material only.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    fn encrypt(&self, kind: FileKind, plaintext: &[u8], fek: &EncryptedFek) -> FsResult<Vec<u8>>;

    /// Decrypts and authenticates a meta ciphertext, recovering both the
    /// plaintext meta info and the wrapped FEK from the header.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::MacInvalid`](crate::FsError::MacInvalid) on
    /// authentication failure.
    fn decrypt_meta(&self, ciphertext: &[u8]) -> FsResult<(Vec<u8>, EncryptedFek)>;

    /// Decrypts and authenticates a block ciphertext under `fek`.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::MacInvalid`](crate::FsError::MacInvalid) on
    /// authentication failure.
    fn decrypt_block(&self, ciphertext: &[u8], fek: &EncryptedFek) -> FsResult<Vec<u8>>;
}
