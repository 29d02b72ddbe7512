//! Encrypted I/O paths between the engine and the RPC transport.
//!
//! Every byte crossing the transport is a self-describing authenticated
//! ciphertext produced by the key manager; plaintext payloads and plaintext
//! FEKs never leave the engine. A read that returns no bytes means the slot
//! was never written, which the callers treat as logical content of their
//! choosing rather than an error.

use crate::error::FsResult;
use crate::platform::{EncryptedFek, FileKind, KeyManager, RpcFd, RpcFs};

/// Encrypts `plaintext` and writes the resulting ciphertext at `offset`.
pub(crate) fn encrypt_and_write<R: RpcFs, K: KeyManager>(
    rpc: &R,
    km: &K,
    fd: RpcFd,
    kind: FileKind,
    offset: u64,
    plaintext: &[u8],
    fek: &EncryptedFek,
) -> FsResult<()> {
    let ciphertext = km.encrypt(kind, plaintext, fek)?;
    debug_assert_eq!(ciphertext.len(), km.header_size(kind) + plaintext.len());
    rpc.write_at(fd, offset, &ciphertext)
}

/// Reads and decrypts a meta slot, recovering the wrapped FEK from its
/// header. Returns `None` when the slot was never written.
///
/// MAC failures surface as [`FsError::CorruptObject`].
pub(crate) fn read_and_decrypt_meta<R: RpcFs, K: KeyManager>(
    rpc: &R,
    km: &K,
    fd: RpcFd,
    offset: u64,
    slot_len: u64,
) -> FsResult<Option<(Vec<u8>, EncryptedFek)>> {
    let ciphertext = rpc.read_at(fd, offset, slot_len as usize)?;
    if ciphertext.is_empty() {
        return Ok(None);
    }
    log::debug!("meta slot at {offset}: {} ciphertext bytes", ciphertext.len());

    match km.decrypt_meta(&ciphertext) {
        Ok(decrypted) => Ok(Some(decrypted)),
        Err(err) => {
            log::error!("meta slot at {offset} failed authentication");
            Err(err.upgrade_mac())
        }
    }
}

/// Reads and decrypts a block slot. Returns `None` when the slot was never
/// written.
///
/// MAC failures surface as [`FsError::CorruptObject`].
pub(crate) fn read_and_decrypt_block<R: RpcFs, K: KeyManager>(
    rpc: &R,
    km: &K,
    fd: RpcFd,
    offset: u64,
    slot_len: u64,
    fek: &EncryptedFek,
) -> FsResult<Option<Vec<u8>>> {
    let ciphertext = rpc.read_at(fd, offset, slot_len as usize)?;
    if ciphertext.is_empty() {
        return Ok(None);
    }
    log::debug!("block slot at {offset}: {} ciphertext bytes", ciphertext.len());

    match km.decrypt_block(&ciphertext, fek) {
        Ok(plaintext) => Ok(Some(plaintext)),
        Err(err) => {
            log::error!("block slot at {offset} failed authentication");
            Err(err.upgrade_mac())
        }
    }
}
