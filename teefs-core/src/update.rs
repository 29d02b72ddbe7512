//! Out-of-place updates: shadow block writes, range writes, truncation and
//! the write operation.
//!
//! No update ever touches an active slot. New data lands in shadow block
//! slots while a candidate copy of the meta accumulates the flipped
//! backup-version bits and the new length; committing the candidate is the
//! single moment the update becomes visible. Any failure before that leaves
//! the on-disk counter, and therefore the readable file, at the previous
//! committed state.

// Cursor arithmetic casts are bounded by MAX_POSITION and BLOCK_SIZE
#![allow(clippy::cast_possible_truncation)]

use crate::crypto_io::encrypt_and_write;
use crate::error::{FsError, FsResult};
use crate::file::SecureFile;
use crate::format::BLOCK_SIZE;
use crate::layout::Layout;
use crate::meta::FileMeta;
use crate::platform::{FileKind, KeyManager, RpcFs};

impl<R: RpcFs, K: KeyManager> SecureFile<R, K> {
    /// Encrypts `data` into the shadow slot of `block_num` relative to the
    /// candidate meta, then flips the candidate's backup-version bit so the
    /// commit will select the slot just written.
    ///
    /// On failure the candidate is untouched and the on-disk state remains
    /// consistent with the still-current meta.
    fn write_block(&self, block_num: u64, data: &[u8], new_meta: &mut FileMeta) -> FsResult<()> {
        let offset = self.layout().block_offset(new_meta, block_num, false);
        log::debug!("writing block {block_num} at offset {offset}");
        encrypt_and_write(
            self.rpc(),
            self.km(),
            self.live_fd()?,
            FileKind::Block,
            offset,
            data,
            &new_meta.encrypted_fek,
        )?;
        new_meta.info.toggle_backup_version(block_num);
        Ok(())
    }

    /// Walks the blocks covering `len` bytes from the cursor, patching each
    /// with caller data (`Some`) or zero fill (`None`) and writing it out of
    /// place into the candidate meta.
    ///
    /// Advances the cursor past the written range on success; restores it on
    /// failure so the caller can discard the candidate cleanly.
    pub(crate) fn out_of_place_write(
        &mut self,
        data: Option<&[u8]>,
        len: u64,
        new_meta: &mut FileMeta,
    ) -> FsResult<()> {
        let orig_pos = self.position();
        let result = self.out_of_place_write_inner(data, len, new_meta);
        if result.is_err() {
            self.set_position(orig_pos);
        }
        result
    }

    fn out_of_place_write_inner(
        &mut self,
        mut data: Option<&[u8]>,
        len: u64,
        new_meta: &mut FileMeta,
    ) -> FsResult<()> {
        if len == 0 {
            return Ok(());
        }

        let mut remaining = len;
        let mut block_num = Layout::block_of(self.position());
        let end_block = Layout::block_of(self.position() + len - 1);
        log::debug!("out-of-place write covering blocks {block_num}..={end_block}");

        while block_num <= end_block {
            let offset = (self.position() % BLOCK_SIZE as u64) as usize;
            let mut chunk = remaining.min(BLOCK_SIZE as u64) as usize;
            if chunk + offset > BLOCK_SIZE {
                chunk = BLOCK_SIZE - offset;
            }

            // Partial blocks patch over the committed content; a block that
            // was never written reads back as zeros.
            let mut block = self.read_block(block_num)?;

            match data {
                Some(bytes) => {
                    block[offset..offset + chunk].copy_from_slice(&bytes[..chunk]);
                    data = Some(&bytes[chunk..]);
                }
                None => block[offset..offset + chunk].fill(0),
            }

            self.write_block(block_num, &block, new_meta)?;

            remaining -= chunk as u64;
            self.set_position(self.position() + chunk as u64);
            block_num += 1;
        }

        if self.position() > new_meta.info.length {
            new_meta.info.length = self.position();
            log::debug!("candidate length grows to {}", new_meta.info.length);
        }
        Ok(())
    }

    /// Truncates or extends the file to `new_len` and commits.
    ///
    /// Shrinking only rewrites the meta; blocks beyond the new length stay
    /// in place unreferenced. Extending zero-fills the new range through the
    /// out-of-place path before the commit.
    pub(crate) fn truncate_internal(&mut self, new_len: u64) -> FsResult<()> {
        if new_len > self.layout().max_file_size() {
            log::error!("truncate to {new_len} exceeds maximum file size");
            return Err(FsError::BadParameters);
        }

        let old_len = self.meta().info.length;
        let mut new_meta = self.meta().clone();
        new_meta.info.length = new_len;

        if new_len > old_len {
            let orig_pos = self.position();
            self.set_position(old_len);
            let result = self.out_of_place_write(None, new_len - old_len, &mut new_meta);
            self.set_position(orig_pos);
            result?;
        }

        self.commit_meta(new_meta)
    }

    /// Sets the logical file length to `new_len`.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::BadParameters`] if `new_len` exceeds the maximum
    /// file size, or a transport/crypto error; the file then remains at its
    /// previous committed state.
    pub fn truncate(&mut self, new_len: u64) -> FsResult<()> {
        self.truncate_internal(new_len)
    }

    /// Writes `data` at the cursor and commits.
    ///
    /// A cursor beyond the current length first extends the file to the
    /// cursor with zero fill as its own commit, then writes the caller data
    /// as a second commit. A crash between the two exposes a zero-filled
    /// file of length equal to the cursor, which is a committed state in its
    /// own right.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::BadParameters`] if the write would exceed the
    /// maximum file size, or a transport/crypto error; the file then remains
    /// at its last committed state.
    pub fn write(&mut self, data: &[u8]) -> FsResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let len = data.len() as u64;
        let end = self
            .position()
            .checked_add(len)
            .ok_or(FsError::BadParameters)?;
        if end > self.layout().max_file_size() {
            log::error!("write ending at {end} exceeds maximum file size");
            return Err(FsError::BadParameters);
        }

        if self.meta().info.length < self.position() {
            log::debug!("extending length to cursor {}", self.position());
            self.truncate_internal(self.position())?;
        }

        let mut new_meta = self.meta().clone();
        self.out_of_place_write(Some(data), len, &mut new_meta)?;
        self.commit_meta(new_meta)
    }
}
