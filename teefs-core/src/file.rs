//! Open-file handles: lifecycle, meta management and the read path.
//!
//! A [`SecureFile`] owns its RPC descriptor and an in-memory snapshot of the
//! last committed meta. Callers serialize operations against one handle;
//! different handles on the same backing file are not supported.

// Cursor arithmetic casts are bounded by MAX_POSITION and BLOCK_SIZE
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

use std::sync::Arc;

use crate::crypto_io::{encrypt_and_write, read_and_decrypt_block, read_and_decrypt_meta};
use crate::error::{FsError, FsResult};
use crate::format::{BLOCK_SIZE, COUNTER_SIZE, MAX_POSITION};
use crate::layout::Layout;
use crate::meta::{FileMeta, FileMetaInfo};
use crate::platform::{FileKind, KeyManager, RpcFd, RpcFs};

/// Reference point for [`SecureFile::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Relative to the start of the file.
    Set,
    /// Relative to the current cursor position.
    Cur,
    /// Relative to the end of the file.
    End,
}

/// Handle to one secure object in the untrusted backing store.
pub struct SecureFile<R: RpcFs, K: KeyManager> {
    rpc: Arc<R>,
    km: Arc<K>,
    layout: Layout,
    fd: Option<RpcFd>,
    meta: FileMeta,
    meta_counter: u32,
    pos: u64,
    is_new_file: bool,
}

impl<R: RpcFs, K: KeyManager> SecureFile<R, K> {
    /// Creates a new empty object at `path`.
    ///
    /// Generates a fresh wrapped FEK for `client_uuid`, opens the backing
    /// file in create mode, stages the initial meta in the slot counter 0
    /// selects as active, then publishes counter 0. The caller removes the
    /// backing file if any step fails.
    pub(crate) fn create(
        rpc: Arc<R>,
        km: Arc<K>,
        layout: Layout,
        path: &str,
        client_uuid: &uuid::Uuid,
    ) -> FsResult<Self> {
        let encrypted_fek = km.generate_fek(client_uuid)?;
        let info = FileMetaInfo::new(km.num_blocks_per_file());
        let fd = rpc.open(path, true)?;

        // From here on a failure drops the handle, which closes the fd.
        let file = Self {
            rpc,
            km,
            layout,
            fd: Some(fd),
            meta: FileMeta {
                info,
                encrypted_fek,
                counter: 0,
            },
            meta_counter: 0,
            pos: 0,
            is_new_file: true,
        };
        file.write_meta(&file.meta, true)?;
        file.write_meta_counter()?;
        Ok(file)
    }

    /// Opens the existing object at `path` and loads its committed state.
    pub(crate) fn open(rpc: Arc<R>, km: Arc<K>, layout: Layout, path: &str) -> FsResult<Self> {
        let fd = rpc.open(path, false)?;
        match Self::read_committed_state(&rpc, &km, layout, fd) {
            Ok((meta, meta_counter)) => Ok(Self {
                rpc,
                km,
                layout,
                fd: Some(fd),
                meta,
                meta_counter,
                pos: 0,
                is_new_file: false,
            }),
            Err(err) => {
                let _ = rpc.close(fd);
                Err(err)
            }
        }
    }

    /// Reads the counter word and the active meta slot it selects.
    fn read_committed_state(
        rpc: &R,
        km: &K,
        layout: Layout,
        fd: RpcFd,
    ) -> FsResult<(FileMeta, u32)> {
        let counter_bytes = rpc.read_at(fd, 0, COUNTER_SIZE as usize)?;
        if counter_bytes.len() != COUNTER_SIZE as usize {
            log::error!("meta counter read returned {} bytes", counter_bytes.len());
            return Err(FsError::CorruptObject);
        }
        let meta_counter = u32::from_le_bytes([
            counter_bytes[0],
            counter_bytes[1],
            counter_bytes[2],
            counter_bytes[3],
        ]);

        let offset = layout.meta_offset(meta_counter, true);
        log::debug!("opening at meta generation {meta_counter}, slot offset {offset}");
        let Some((payload, encrypted_fek)) =
            read_and_decrypt_meta(rpc, km, fd, offset, layout.meta_slot_size())?
        else {
            log::error!("active meta slot at {offset} was never written");
            return Err(FsError::CorruptObject);
        };

        let meta = FileMeta::decode_info(&payload, km.num_blocks_per_file(), encrypted_fek)?;
        Ok((meta, meta_counter))
    }

    /// Encrypts and writes `meta` into the active or shadow slot relative to
    /// the handle's current counter.
    ///
    /// Commits pass `want_active = false`: the shadow slot is never the one
    /// the on-disk counter selects, so the live meta cannot be clobbered.
    /// Only creation writes the active slot, before the counter exists.
    pub(crate) fn write_meta(&self, meta: &FileMeta, want_active: bool) -> FsResult<()> {
        let offset = self.layout.meta_offset(self.meta_counter, want_active);
        log::debug!("writing meta at offset {offset} (active: {want_active})");
        encrypt_and_write(
            self.rpc.as_ref(),
            self.km.as_ref(),
            self.live_fd()?,
            FileKind::Meta,
            offset,
            &meta.encode_info(),
            &meta.encrypted_fek,
        )
    }

    /// Publishes the handle's counter at offset 0.
    pub(crate) fn write_meta_counter(&self) -> FsResult<()> {
        self.rpc
            .write_at(self.live_fd()?, 0, &self.meta_counter.to_le_bytes())
    }

    /// Commits a candidate meta: shadow write, in-memory adoption, counter
    /// publication. The counter write is the linearization point; a crash
    /// before it leaves the previous committed state fully readable.
    pub(crate) fn commit_meta(&mut self, mut new_meta: FileMeta) -> FsResult<()> {
        new_meta.counter = self.meta_counter.wrapping_add(1);
        log::debug!("committing meta generation {}", new_meta.counter);
        self.write_meta(&new_meta, false)?;

        // The shadow slot is fully written; adopt the candidate before
        // publishing its counter.
        self.meta = new_meta;
        self.meta_counter = self.meta.counter;
        self.write_meta_counter()
    }

    /// Reads the active version of logical block `block_num`.
    ///
    /// A slot that was never written yields an all-zero block.
    pub(crate) fn read_block(&self, block_num: u64) -> FsResult<Vec<u8>> {
        let offset = self.layout.block_offset(&self.meta, block_num, true);
        match read_and_decrypt_block(
            self.rpc.as_ref(),
            self.km.as_ref(),
            self.live_fd()?,
            offset,
            self.layout.block_slot_size(),
            &self.meta.encrypted_fek,
        )? {
            None => Ok(vec![0u8; BLOCK_SIZE]),
            Some(block) => {
                if block.len() == BLOCK_SIZE {
                    Ok(block)
                } else {
                    log::error!("block {block_num} decrypted to {} bytes", block.len());
                    Err(FsError::CorruptObject)
                }
            }
        }
    }

    /// Reads from the cursor into `buf`, returning the number of bytes read.
    ///
    /// The requested count is clamped to the remaining file length; a cursor
    /// at or past the end reads zero bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::CorruptObject`] if any covered block fails
    /// authentication, or a transport error.
    pub fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        let mut remaining = buf.len() as u64;
        let length = self.meta.info.length;
        if self.pos > length || self.pos.checked_add(remaining).is_none() {
            remaining = 0;
        } else if self.pos + remaining > length {
            remaining = length - self.pos;
        }

        let total = remaining as usize;
        if total == 0 {
            return Ok(0);
        }

        let mut block_num = Layout::block_of(self.pos);
        let end_block = Layout::block_of(self.pos + remaining - 1);
        let mut out = 0usize;

        while block_num <= end_block {
            let offset = (self.pos % BLOCK_SIZE as u64) as usize;
            let mut chunk = remaining.min(BLOCK_SIZE as u64) as usize;
            if chunk + offset > BLOCK_SIZE {
                chunk = BLOCK_SIZE - offset;
            }

            let block = self.read_block(block_num)?;
            buf[out..out + chunk].copy_from_slice(&block[offset..offset + chunk]);

            out += chunk;
            remaining -= chunk as u64;
            self.pos += chunk as u64;
            block_num += 1;
        }

        Ok(total)
    }

    /// Moves the cursor and returns the new absolute position.
    ///
    /// A negative result clamps to 0. Seeking beyond the current length is
    /// legal and allocates nothing until a subsequent write.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::BadParameters`] if the target exceeds the maximum
    /// position.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> FsResult<u64> {
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => self.pos as i64,
            Whence::End => self.meta.info.length as i64,
        };

        let new_pos = base.checked_add(offset).ok_or(FsError::BadParameters)?;
        let new_pos = new_pos.max(0) as u64;
        if new_pos > MAX_POSITION {
            log::error!("seek target {new_pos} exceeds maximum position");
            return Err(FsError::BadParameters);
        }

        self.pos = new_pos;
        log::debug!("cursor moved to {new_pos}");
        Ok(new_pos)
    }

    /// Flushes the backing file to stable storage.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the host refuses the sync.
    pub fn fsync(&self) -> FsResult<()> {
        self.rpc.fsync(self.live_fd()?)
    }

    /// Closes the handle, releasing the RPC descriptor.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the host refuses the close; the handle
    /// is consumed either way.
    pub fn close(mut self) -> FsResult<()> {
        match self.fd.take() {
            Some(fd) => self.rpc.close(fd),
            None => Ok(()),
        }
    }

    /// Logical file length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.meta.info.length
    }

    /// Returns `true` if the file holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current cursor position.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.pos
    }

    /// Committed meta generation of this handle.
    #[must_use]
    pub const fn meta_generation(&self) -> u32 {
        self.meta_counter
    }

    /// Returns `true` if this handle created the object.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.is_new_file
    }

    pub(crate) fn live_fd(&self) -> FsResult<RpcFd> {
        self.fd.ok_or(FsError::BadParameters)
    }

    pub(crate) fn rpc(&self) -> &R {
        self.rpc.as_ref()
    }

    pub(crate) fn km(&self) -> &K {
        self.km.as_ref()
    }

    pub(crate) const fn layout(&self) -> Layout {
        self.layout
    }

    pub(crate) const fn meta(&self) -> &FileMeta {
        &self.meta
    }

    pub(crate) fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }
}

impl<R: RpcFs, K: KeyManager> Drop for SecureFile<R, K> {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            let _ = self.rpc.close(fd);
        }
    }
}

impl<R: RpcFs, K: KeyManager> std::fmt::Debug for SecureFile<R, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureFile")
            .field("length", &self.meta.info.length)
            .field("position", &self.pos)
            .field("meta_counter", &self.meta_counter)
            .field("is_new_file", &self.is_new_file)
            .finish_non_exhaustive()
    }
}
