//! RPC transport collaborator trait.
//!
//! The transport forwards positional file I/O to the untrusted normal-world
//! host. It is the only path by which container bytes reach stable storage,
//! and it only ever carries ciphertext.

use crate::error::FsResult;

/// Descriptor for an open backing file on the RPC transport.
///
/// Exactly one backing file per descriptor; the handle owns it exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcFd(pub i32);

/// Positional file I/O provided by the untrusted host.
///
/// Reads and writes take explicit offsets and may be short: a read that
/// returns fewer bytes than requested is not an error, and a read returning
/// no bytes at all means the range was never written. The transport provides
/// write-before-read ordering per descriptor; durability is only guaranteed
/// after [`RpcFs::fsync`].
///
/// The host may refuse any operation at any time. Such failures are
/// reported, not tolerated.
pub trait RpcFs: Send + Sync {
    /// Opens the backing file at `path`, creating it when `create` is set.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::ItemNotFound`](crate::FsError::ItemNotFound) when
    /// `create` is unset and the file does not exist, or a transport error.
    fn open(&self, path: &str, create: bool) -> FsResult<RpcFd>;

    /// Closes a descriptor returned by [`RpcFs::open`].
    ///
    /// # Errors
    ///
    /// Returns a transport error if the host refuses the close.
    fn close(&self, fd: RpcFd) -> FsResult<()>;

    /// Reads up to `len` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the host refuses the read. A short or
    /// empty result is success.
    fn read_at(&self, fd: RpcFd, offset: u64, len: usize) -> FsResult<Vec<u8>>;

    /// Writes `data` at `offset`, extending the file as needed.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the host refuses or truncates the write.
    fn write_at(&self, fd: RpcFd, offset: u64, data: &[u8]) -> FsResult<()>;

    /// Renames a backing file.
    ///
    /// # Errors
    ///
    /// Returns a transport error; when `overwrite` is unset and `new`
    /// exists, the host rejects the rename.
    fn rename(&self, old: &str, new: &str, overwrite: bool) -> FsResult<()>;

    /// Removes a backing file.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the host refuses the removal.
    fn remove(&self, path: &str) -> FsResult<()>;

    /// Flushes a descriptor's written data to stable storage.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the host refuses the sync.
    fn fsync(&self, fd: RpcFd) -> FsResult<()>;
}
