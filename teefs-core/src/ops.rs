//! The storage capability exposed to upper layers.
//!
//! Higher layers hold an [`ObjectStore`] capability and dispatch operations
//! through it; [`ReeFs`] is the variant backed by a single opaque file per
//! object in the untrusted normal-world filesystem. Directory enumeration is
//! deliberately answered with [`FsError::NotSupported`] rather than being
//! absent from the surface.

use std::sync::Arc;

use crate::error::{FsError, FsResult};
use crate::file::{SecureFile, Whence};
use crate::format::{NAME_MAX, STORAGE_ID_REE, STORAGE_ID_RPMB};
use crate::layout::Layout;
use crate::platform::{KeyManager, RpcFs, SessionProvider};

/// Which class of host transport backs the engine.
///
/// The engine logic is identical either way; the transport class only shifts
/// the storage identifier namespace upper layers dispatch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportClass {
    /// Plain REE filesystem transport.
    #[default]
    Ree,
    /// RPMB-backed transport.
    Rpmb,
}

/// Handle for directory enumeration. Uninhabited: no operation of this
/// engine can produce one.
#[derive(Debug)]
pub enum DirHandle {}

/// POSIX-like object storage capability.
pub trait ObjectStore {
    /// Handle type for open objects.
    type File;

    /// Opens an existing object.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::BadParameters`] for an overlong path,
    /// [`FsError::ItemNotFound`] if the object does not exist,
    /// [`FsError::CorruptObject`] if its committed state fails
    /// authentication, or a transport error.
    fn open(&self, path: &str) -> FsResult<Self::File>;

    /// Creates a new empty object.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::BadParameters`] for an overlong path, or a
    /// transport/crypto error; the backing file is removed on failure.
    fn create(&self, path: &str) -> FsResult<Self::File>;

    /// Closes an object handle.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the host refuses the close.
    fn close(&self, file: Self::File) -> FsResult<()>;

    /// Reads at the handle cursor; returns the byte count actually read.
    ///
    /// # Errors
    ///
    /// See [`SecureFile::read`].
    fn read(&self, file: &mut Self::File, buf: &mut [u8]) -> FsResult<usize>;

    /// Writes at the handle cursor and commits.
    ///
    /// # Errors
    ///
    /// See [`SecureFile::write`].
    fn write(&self, file: &mut Self::File, data: &[u8]) -> FsResult<()>;

    /// Moves the handle cursor.
    ///
    /// # Errors
    ///
    /// See [`SecureFile::seek`].
    fn seek(&self, file: &mut Self::File, offset: i64, whence: Whence) -> FsResult<u64>;

    /// Changes the object length.
    ///
    /// # Errors
    ///
    /// See [`SecureFile::truncate`].
    fn truncate(&self, file: &mut Self::File, new_len: u64) -> FsResult<()>;

    /// Renames an object.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the host refuses the rename.
    fn rename(&self, old: &str, new: &str, overwrite: bool) -> FsResult<()>;

    /// Removes an object.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the host refuses the removal.
    fn remove(&self, path: &str) -> FsResult<()>;

    /// Flushes an object to stable storage.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the host refuses the sync.
    fn fsync(&self, file: &mut Self::File) -> FsResult<()>;

    /// Opens a directory for enumeration.
    ///
    /// # Errors
    ///
    /// Unsupported by this engine.
    fn open_dir(&self, _path: &str) -> FsResult<DirHandle> {
        Err(FsError::NotSupported)
    }

    /// Reads the next directory entry.
    ///
    /// # Errors
    ///
    /// Unsupported by this engine.
    fn read_dir(&self, _dir: &mut DirHandle) -> FsResult<String> {
        Err(FsError::NotSupported)
    }

    /// Closes a directory handle.
    ///
    /// # Errors
    ///
    /// Unsupported by this engine.
    fn close_dir(&self, _dir: DirHandle) -> FsResult<()> {
        Err(FsError::NotSupported)
    }
}

/// Storage engine keeping each secure object in one opaque container file on
/// the untrusted host.
pub struct ReeFs<R: RpcFs, K: KeyManager> {
    rpc: Arc<R>,
    km: Arc<K>,
    sessions: Arc<dyn SessionProvider>,
    layout: Layout,
    transport: TransportClass,
}

impl<R: RpcFs, K: KeyManager> ReeFs<R, K> {
    /// Builds an engine from its collaborators.
    #[must_use]
    pub fn new(rpc: Arc<R>, km: Arc<K>, sessions: Arc<dyn SessionProvider>) -> Self {
        let layout = Layout::from_key_manager(km.as_ref());
        Self {
            rpc,
            km,
            sessions,
            layout,
            transport: TransportClass::default(),
        }
    }

    /// Selects the transport class the engine reports through
    /// [`ReeFs::storage_id`].
    #[must_use]
    pub fn with_transport(mut self, transport: TransportClass) -> Self {
        self.transport = transport;
        self
    }

    /// Storage-type identifier published to upper layers.
    #[must_use]
    pub const fn storage_id(&self) -> u32 {
        match self.transport {
            TransportClass::Ree => STORAGE_ID_REE,
            TransportClass::Rpmb => STORAGE_ID_RPMB,
        }
    }

    /// Byte geometry of containers managed by this engine.
    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    fn validate_path(path: &str) -> FsResult<()> {
        if path.len() + 1 > NAME_MAX {
            log::error!("path length {} exceeds limit", path.len());
            return Err(FsError::BadParameters);
        }
        Ok(())
    }
}

impl<R: RpcFs, K: KeyManager> ObjectStore for ReeFs<R, K> {
    type File = SecureFile<R, K>;

    fn open(&self, path: &str) -> FsResult<Self::File> {
        Self::validate_path(path)?;
        SecureFile::open(Arc::clone(&self.rpc), Arc::clone(&self.km), self.layout, path)
    }

    fn create(&self, path: &str) -> FsResult<Self::File> {
        Self::validate_path(path)?;
        let client_uuid = self.sessions.current_session().client_uuid;
        SecureFile::create(
            Arc::clone(&self.rpc),
            Arc::clone(&self.km),
            self.layout,
            path,
            &client_uuid,
        )
        .map_err(|err| {
            // A failed create never leaves a half-written container behind.
            log::error!("create of {path} failed, removing backing file");
            let _ = self.rpc.remove(path);
            err
        })
    }

    fn close(&self, file: Self::File) -> FsResult<()> {
        file.close()
    }

    fn read(&self, file: &mut Self::File, buf: &mut [u8]) -> FsResult<usize> {
        file.read(buf)
    }

    fn write(&self, file: &mut Self::File, data: &[u8]) -> FsResult<()> {
        file.write(data)
    }

    fn seek(&self, file: &mut Self::File, offset: i64, whence: Whence) -> FsResult<u64> {
        file.seek(offset, whence)
    }

    fn truncate(&self, file: &mut Self::File, new_len: u64) -> FsResult<()> {
        file.truncate(new_len)
    }

    fn rename(&self, old: &str, new: &str, overwrite: bool) -> FsResult<()> {
        self.rpc.rename(old, new, overwrite)
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        self.rpc.remove(path)
    }

    fn fsync(&self, file: &mut Self::File) -> FsResult<()> {
        file.fsync()
    }
}

impl<R: RpcFs, K: KeyManager> std::fmt::Debug for ReeFs<R, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReeFs")
            .field("storage_id", &self.storage_id())
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
