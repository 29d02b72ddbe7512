//! Container offset arithmetic.
//!
//! Pure functions mapping (block number, active/shadow, meta-counter parity)
//! to byte offsets in the backing file. No I/O happens here.

use crate::format::{BLOCK_SHIFT, BLOCK_SIZE, COUNTER_SIZE};
use crate::meta::{FileMetaInfo, FileMeta};
use crate::platform::{FileKind, KeyManager};

/// Byte geometry of one container.
///
/// Derived from the key manager's header sizes and block count; both are
/// ABI-visible, so a `Layout` is fixed for the lifetime of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Size of one meta slot: meta header plus encrypted meta info.
    meta_size: u64,
    /// Size of one block slot: block header plus [`BLOCK_SIZE`] payload.
    block_size: u64,
    /// Number of logical blocks per container.
    num_blocks: u64,
}

impl Layout {
    /// Computes the layout imposed by a key manager.
    pub fn from_key_manager<K: KeyManager + ?Sized>(km: &K) -> Self {
        let num_blocks = km.num_blocks_per_file();
        Self {
            meta_size: (km.header_size(FileKind::Meta) + FileMetaInfo::encoded_len(num_blocks))
                as u64,
            block_size: (km.header_size(FileKind::Block) + BLOCK_SIZE) as u64,
            num_blocks: num_blocks as u64,
        }
    }

    /// Logical block containing byte position `pos`.
    #[must_use]
    pub const fn block_of(pos: u64) -> u64 {
        pos >> BLOCK_SHIFT
    }

    /// Number of logical blocks per container.
    #[must_use]
    pub const fn num_blocks(&self) -> u64 {
        self.num_blocks
    }

    /// Largest logical file size this container can hold.
    #[must_use]
    pub const fn max_file_size(&self) -> u64 {
        self.num_blocks * BLOCK_SIZE as u64
    }

    /// On-disk size of one meta slot.
    #[must_use]
    pub const fn meta_slot_size(&self) -> u64 {
        self.meta_size
    }

    /// On-disk size of one block slot.
    #[must_use]
    pub const fn block_slot_size(&self) -> u64 {
        self.block_size
    }

    /// Byte offset of a meta slot.
    ///
    /// The lowest bit of `counter` is the index of the active slot; the
    /// shadow slot is its complement. Reads pass `want_active = true`,
    /// shadow writes `false`.
    #[must_use]
    pub const fn meta_offset(&self, counter: u32, want_active: bool) -> u64 {
        let active = (counter & 1) as u64;
        let slot = if want_active { active } else { 1 - active };
        COUNTER_SIZE + slot * self.meta_size
    }

    /// Byte offset of a slot of logical block `block_num` under `meta`.
    ///
    /// Slot 0 when the block's backup-version bit equals the caller's
    /// desire, slot 1 otherwise.
    #[must_use]
    pub fn block_offset(&self, meta: &FileMeta, block_num: u64, want_active: bool) -> u64 {
        let slot = u64::from(want_active != meta.info.backup_version(block_num));
        COUNTER_SIZE + 2 * self.meta_size + (2 * block_num + slot) * self.block_size
    }
}
