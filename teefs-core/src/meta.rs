//! File meta records: logical length, backup-version table, generation
//! counter.
//!
//! The meta info travels encrypted inside a meta slot; the wrapped FEK rides
//! in the slot's authenticated header. The generation counter is serialized
//! into the encrypted payload as well, alongside the plaintext counter word
//! at offset 0 of the container.

use crate::error::{FsError, FsResult};
use crate::platform::EncryptedFek;

/// Plaintext semantics of one meta slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetaInfo {
    /// Logical file size in bytes.
    pub length: u64,
    /// One bit per logical block; bit *n* selects which of block *n*'s two
    /// physical slots is authoritative.
    backup_version_table: Vec<u32>,
}

impl FileMetaInfo {
    /// Creates the meta info of a fresh, empty file.
    ///
    /// The backup-version table starts all-ones, so the first write of every
    /// block lands in slot 1 and flips the block's bit.
    #[must_use]
    pub fn new(num_blocks: usize) -> Self {
        Self {
            length: 0,
            backup_version_table: vec![u32::MAX; table_words(num_blocks)],
        }
    }

    /// Returns bit `block_num` of the backup-version table.
    #[must_use]
    pub fn backup_version(&self, block_num: u64) -> bool {
        let index = (block_num / 32) as usize;
        let mask = 1u32 << (block_num % 32);
        self.backup_version_table[index] & mask != 0
    }

    /// Flips bit `block_num` of the backup-version table.
    pub fn toggle_backup_version(&mut self, block_num: u64) {
        let index = (block_num / 32) as usize;
        let mask = 1u32 << (block_num % 32);
        self.backup_version_table[index] ^= mask;
    }

    /// Serialized size of a meta info covering `num_blocks` blocks.
    #[must_use]
    pub fn encoded_len(num_blocks: usize) -> usize {
        8 + table_words(num_blocks) * 4
    }
}

/// Number of `u32` words backing a bitmap of `num_blocks` bits.
fn table_words(num_blocks: usize) -> usize {
    num_blocks.div_ceil(32)
}

/// A meta slot's full content: info plus the wrapped FEK recovered from (or
/// destined for) the slot header, plus the generation this meta belongs to.
///
/// Treated by value throughout: updates build a candidate copy and the
/// commit is the moment the copy replaces the handle's current meta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// Encrypted meta info payload semantics.
    pub info: FileMetaInfo,
    /// File Encryption Key wrapped under the creating client's identity.
    pub encrypted_fek: EncryptedFek,
    /// Generation counter this meta was (or will be) committed under.
    pub counter: u32,
}

impl FileMeta {
    /// Encodes the info and counter into the encrypted meta payload.
    ///
    /// Layout (little-endian): `length (u32) | counter (u32) | table words`.
    #[must_use]
    pub fn encode_info(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.info.backup_version_table.len() * 4);
        #[allow(clippy::cast_possible_truncation)] // length <= MAX_FILE_SIZE < 4 GiB
        buf.extend_from_slice(&(self.info.length as u32).to_le_bytes());
        buf.extend_from_slice(&self.counter.to_le_bytes());
        for word in &self.info.backup_version_table {
            buf.extend_from_slice(&word.to_le_bytes());
        }
        buf
    }

    /// Decodes a meta payload produced by [`FileMeta::encode_info`].
    ///
    /// # Errors
    ///
    /// Returns [`FsError::CorruptObject`] if the payload does not match the
    /// expected size for `num_blocks`.
    pub fn decode_info(
        payload: &[u8],
        num_blocks: usize,
        encrypted_fek: EncryptedFek,
    ) -> FsResult<Self> {
        if payload.len() != FileMetaInfo::encoded_len(num_blocks) {
            log::error!(
                "meta payload size mismatch: expected {}, got {}",
                FileMetaInfo::encoded_len(num_blocks),
                payload.len()
            );
            return Err(FsError::CorruptObject);
        }

        let length = u64::from(u32::from_le_bytes([
            payload[0], payload[1], payload[2], payload[3],
        ]));
        let counter = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);

        let backup_version_table = payload[8..]
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect();

        Ok(Self {
            info: FileMetaInfo {
                length,
                backup_version_table,
            },
            encrypted_fek,
            counter,
        })
    }
}
