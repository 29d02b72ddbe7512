//! Bundled key-manager implementation.
//!
//! XChaCha20-Poly1305 AEAD with per-file keys derived by HKDF-SHA256 from a
//! device master key. The wrapped FEK handed to the engine is the raw FEK
//! XOR-masked under a pad bound to the master key and the creating client's
//! UUID; unwrapping with a different identity yields a different file key
//! and every authentication check fails.

use std::sync::Arc;

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{FsError, FsResult};
use crate::platform::{EncryptedFek, FileKind, KeyManager, SessionProvider};

/// Byte length of a wrapped FEK.
pub const FEK_SIZE: usize = 16;

/// Size of an XChaCha20-Poly1305 nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Default number of data blocks per container (256 KiB of payload).
pub const DEFAULT_NUM_BLOCKS: usize = 1024;

const LABEL_META: &[u8] = b"teefs:meta:v1";
const LABEL_BLOCK: &[u8] = b"teefs:block:v1";
const LABEL_FEK_WRAP: &[u8] = b"teefs:fek-wrap:v1";

/// Device master key (256-bit), zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct MasterKey([u8; 32]);

/// Key manager backed by XChaCha20-Poly1305 and HKDF-SHA256.
pub struct AeadKeyManager {
    master: MasterKey,
    sessions: Arc<dyn SessionProvider>,
    num_blocks: usize,
}

impl AeadKeyManager {
    /// Creates a key manager around a device master key.
    #[must_use]
    pub fn new(master: [u8; 32], sessions: Arc<dyn SessionProvider>) -> Self {
        Self {
            master: MasterKey(master),
            sessions,
            num_blocks: DEFAULT_NUM_BLOCKS,
        }
    }

    /// Overrides the per-container block count.
    #[must_use]
    pub fn with_num_blocks(mut self, num_blocks: usize) -> Self {
        self.num_blocks = num_blocks;
        self
    }

    /// Pad masking a FEK for the given client identity.
    fn wrap_pad(&self, client_uuid: &Uuid) -> Zeroizing<[u8; FEK_SIZE]> {
        let mut hasher = Sha256::new();
        hasher.update(self.master.0);
        hasher.update(client_uuid.as_bytes());
        hasher.update(LABEL_FEK_WRAP);
        let digest = hasher.finalize();

        let mut pad = Zeroizing::new([0u8; FEK_SIZE]);
        pad.copy_from_slice(&digest[..FEK_SIZE]);
        pad
    }

    /// Recovers the raw FEK for the current session's identity.
    fn unwrap_fek(&self, fek: &EncryptedFek, client_uuid: &Uuid) -> Zeroizing<[u8; FEK_SIZE]> {
        let pad = self.wrap_pad(client_uuid);
        let mut raw = Zeroizing::new([0u8; FEK_SIZE]);
        for (i, byte) in fek.as_bytes().iter().enumerate().take(FEK_SIZE) {
            raw[i] = byte ^ pad[i];
        }
        raw
    }

    /// Derives the per-file AEAD key for one payload kind.
    fn file_key(
        &self,
        kind: FileKind,
        fek: &EncryptedFek,
        client_uuid: &Uuid,
    ) -> Zeroizing<[u8; 32]> {
        let raw = self.unwrap_fek(fek, client_uuid);
        let hk = Hkdf::<Sha256>::new(Some(label(kind)), raw.as_ref());
        let mut key = Zeroizing::new([0u8; 32]);
        hk.expand(client_uuid.as_bytes(), key.as_mut())
            .expect("32 bytes is a valid HKDF-SHA256 output length");
        key
    }

    /// Associated data binding a ciphertext to its wrapped FEK and client.
    fn associated_data(fek: &EncryptedFek, client_uuid: &Uuid) -> Vec<u8> {
        let mut aad = Vec::with_capacity(fek.len() + 16);
        aad.extend_from_slice(fek.as_bytes());
        aad.extend_from_slice(client_uuid.as_bytes());
        aad
    }
}

const fn label(kind: FileKind) -> &'static [u8] {
    match kind {
        FileKind::Meta => LABEL_META,
        FileKind::Block => LABEL_BLOCK,
    }
}

fn random_nonce() -> FsResult<[u8; NONCE_SIZE]> {
    let mut nonce = [0u8; NONCE_SIZE];
    getrandom::getrandom(&mut nonce).map_err(|e| FsError::generic(format!("rng failure: {e}")))?;
    Ok(nonce)
}

impl KeyManager for AeadKeyManager {
    fn header_size(&self, kind: FileKind) -> usize {
        match kind {
            FileKind::Meta => FEK_SIZE + NONCE_SIZE + TAG_SIZE,
            FileKind::Block => NONCE_SIZE + TAG_SIZE,
        }
    }

    fn fek_size(&self) -> usize {
        FEK_SIZE
    }

    fn num_blocks_per_file(&self) -> usize {
        self.num_blocks
    }

    fn generate_fek(&self, client_uuid: &Uuid) -> FsResult<EncryptedFek> {
        let mut raw = Zeroizing::new([0u8; FEK_SIZE]);
        getrandom::getrandom(raw.as_mut())
            .map_err(|e| FsError::generic(format!("rng failure: {e}")))?;

        let pad = self.wrap_pad(client_uuid);
        let wrapped = raw.iter().zip(pad.iter()).map(|(r, p)| r ^ p).collect();
        Ok(EncryptedFek::from_bytes(wrapped))
    }

    fn encrypt(&self, kind: FileKind, plaintext: &[u8], fek: &EncryptedFek) -> FsResult<Vec<u8>> {
        let client_uuid = self.sessions.current_session().client_uuid;
        let key = self.file_key(kind, fek, &client_uuid);
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));

        let nonce_bytes = random_nonce()?;
        let aad = Self::associated_data(fek, &client_uuid);
        let sealed = cipher
            .encrypt(
                XNonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| FsError::generic("AEAD encryption failure"))?;

        let mut out = Vec::with_capacity(self.header_size(kind) + plaintext.len());
        if kind == FileKind::Meta {
            out.extend_from_slice(fek.as_bytes());
        }
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt_meta(&self, ciphertext: &[u8]) -> FsResult<(Vec<u8>, EncryptedFek)> {
        if ciphertext.len() < self.header_size(FileKind::Meta) {
            return Err(FsError::MacInvalid);
        }
        let fek = EncryptedFek::from_bytes(ciphertext[..FEK_SIZE].to_vec());
        let nonce = &ciphertext[FEK_SIZE..FEK_SIZE + NONCE_SIZE];
        let sealed = &ciphertext[FEK_SIZE + NONCE_SIZE..];

        let client_uuid = self.sessions.current_session().client_uuid;
        let key = self.file_key(FileKind::Meta, &fek, &client_uuid);
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));
        let aad = Self::associated_data(&fek, &client_uuid);

        let plaintext = cipher
            .decrypt(
                XNonce::from_slice(nonce),
                Payload { msg: sealed, aad: &aad },
            )
            .map_err(|_| FsError::MacInvalid)?;
        Ok((plaintext, fek))
    }

    fn decrypt_block(&self, ciphertext: &[u8], fek: &EncryptedFek) -> FsResult<Vec<u8>> {
        if ciphertext.len() < self.header_size(FileKind::Block) {
            return Err(FsError::MacInvalid);
        }
        let nonce = &ciphertext[..NONCE_SIZE];
        let sealed = &ciphertext[NONCE_SIZE..];

        let client_uuid = self.sessions.current_session().client_uuid;
        let key = self.file_key(FileKind::Block, fek, &client_uuid);
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));
        let aad = Self::associated_data(fek, &client_uuid);

        cipher
            .decrypt(
                XNonce::from_slice(nonce),
                Payload { msg: sealed, aad: &aad },
            )
            .map_err(|_| FsError::MacInvalid)
    }
}

impl std::fmt::Debug for AeadKeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadKeyManager")
            .field("master", &"[REDACTED]")
            .field("num_blocks", &self.num_blocks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::memory::FixedSession;

    fn manager() -> AeadKeyManager {
        manager_for(Uuid::from_bytes([0x11; 16]))
    }

    fn manager_for(uuid: Uuid) -> AeadKeyManager {
        AeadKeyManager::new([0x42; 32], Arc::new(FixedSession::new(uuid))).with_num_blocks(8)
    }

    #[test]
    fn test_header_sizes() {
        let km = manager();
        assert_eq!(km.header_size(FileKind::Meta), 56);
        assert_eq!(km.header_size(FileKind::Block), 40);
        assert_eq!(km.fek_size(), FEK_SIZE);
    }

    #[test]
    fn test_generate_fek_is_random() {
        let km = manager();
        let uuid = Uuid::from_bytes([0x11; 16]);
        let a = km.generate_fek(&uuid).unwrap();
        let b = km.generate_fek(&uuid).unwrap();
        assert_eq!(a.len(), FEK_SIZE);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_meta_roundtrip_recovers_fek() {
        let km = manager();
        let uuid = Uuid::from_bytes([0x11; 16]);
        let fek = km.generate_fek(&uuid).unwrap();

        let ct = km.encrypt(FileKind::Meta, b"meta payload", &fek).unwrap();
        assert_eq!(ct.len(), 56 + 12);

        let (pt, recovered) = km.decrypt_meta(&ct).unwrap();
        assert_eq!(pt, b"meta payload");
        assert_eq!(recovered, fek);
    }

    #[test]
    fn test_block_roundtrip() {
        let km = manager();
        let uuid = Uuid::from_bytes([0x11; 16]);
        let fek = km.generate_fek(&uuid).unwrap();

        let block = vec![0x5A; 256];
        let ct = km.encrypt(FileKind::Block, &block, &fek).unwrap();
        assert_eq!(ct.len(), 40 + 256);
        assert_eq!(km.decrypt_block(&ct, &fek).unwrap(), block);
    }

    #[test]
    fn test_tampered_ciphertext_fails_mac() {
        let km = manager();
        let uuid = Uuid::from_bytes([0x11; 16]);
        let fek = km.generate_fek(&uuid).unwrap();

        let mut ct = km.encrypt(FileKind::Block, &[0xAB; 256], &fek).unwrap();
        ct[NONCE_SIZE + 3] ^= 0x01;
        assert_eq!(km.decrypt_block(&ct, &fek), Err(FsError::MacInvalid));

        let mut ct = km.encrypt(FileKind::Meta, b"payload", &fek).unwrap();
        ct[FEK_SIZE + NONCE_SIZE] ^= 0x80;
        assert_eq!(km.decrypt_meta(&ct).unwrap_err(), FsError::MacInvalid);
    }

    #[test]
    fn test_truncated_ciphertext_fails_mac() {
        let km = manager();
        assert_eq!(km.decrypt_meta(&[0u8; 10]).unwrap_err(), FsError::MacInvalid);
        let fek = EncryptedFek::from_bytes(vec![0; FEK_SIZE]);
        assert_eq!(
            km.decrypt_block(&[0u8; 39], &fek).unwrap_err(),
            FsError::MacInvalid
        );
    }

    #[test]
    fn test_wrong_kind_fails_mac() {
        let km = manager();
        let uuid = Uuid::from_bytes([0x11; 16]);
        let fek = km.generate_fek(&uuid).unwrap();

        // A block ciphertext is not decryptable as a block of another key
        // domain: strip the meta FEK prefix and try it as a block.
        let ct = km.encrypt(FileKind::Meta, &[0u8; 256], &fek).unwrap();
        assert_eq!(
            km.decrypt_block(&ct[FEK_SIZE..], &fek).unwrap_err(),
            FsError::MacInvalid
        );
    }

    #[test]
    fn test_other_identity_cannot_open() {
        let creator = manager_for(Uuid::from_bytes([0x11; 16]));
        let uuid = Uuid::from_bytes([0x11; 16]);
        let fek = creator.generate_fek(&uuid).unwrap();
        let ct = creator.encrypt(FileKind::Meta, b"secret", &fek).unwrap();

        let other = manager_for(Uuid::from_bytes([0x22; 16]));
        assert_eq!(other.decrypt_meta(&ct).unwrap_err(), FsError::MacInvalid);
    }

    #[test]
    fn test_debug_redacts_master_key() {
        let debug = format!("{:?}", manager());
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("66")); // 0x42 = 66
    }
}
