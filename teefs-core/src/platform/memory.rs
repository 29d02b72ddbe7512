//! In-memory implementations of the platform collaborators for testing.
//!
//! `MemoryRpcFs` simulates the untrusted host: files are byte vectors, reads
//! may be short, and a byte-granular write budget simulates power loss at an
//! arbitrary point in the RPC write stream. Not secure, not durable — test
//! infrastructure only.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use crate::error::{FsError, FsResult};
use crate::platform::{RpcFd, RpcFs, Session, SessionProvider};

/// Session accessor returning one fixed client identity.
#[derive(Debug, Clone, Copy)]
pub struct FixedSession {
    session: Session,
}

impl FixedSession {
    /// Creates a provider for the given client UUID.
    #[must_use]
    pub const fn new(client_uuid: Uuid) -> Self {
        Self {
            session: Session { client_uuid },
        }
    }
}

impl SessionProvider for FixedSession {
    fn current_session(&self) -> Session {
        self.session
    }
}

#[derive(Default)]
struct Inner {
    files: HashMap<String, Vec<u8>>,
    fds: HashMap<i32, String>,
    next_fd: i32,
    /// Remaining write bytes before the simulated power loss, when armed.
    write_budget: Option<u64>,
    write_bytes: u64,
    fsync_calls: u64,
}

/// In-memory RPC transport backed by a `HashMap` of byte vectors.
///
/// Renaming or removing a file while a descriptor to it is open leaves the
/// descriptor stale; subsequent I/O on it fails. The engine never does this,
/// and neither should tests that want realistic host behavior.
#[derive(Default)]
pub struct MemoryRpcFs {
    inner: Mutex<Inner>,
}

impl MemoryRpcFs {
    /// Creates an empty in-memory transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the power-loss simulation: the next `budget` written bytes are
    /// applied, the write that would exceed them is applied only up to the
    /// budget and fails, and every write after that fails outright.
    pub fn crash_after_bytes(&self, budget: u64) {
        self.inner.lock().unwrap().write_budget = Some(budget);
    }

    /// Disarms the power-loss simulation.
    pub fn heal(&self) {
        self.inner.lock().unwrap().write_budget = None;
    }

    /// Returns a copy of a file's bytes, if it exists.
    #[must_use]
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().files.get(path).cloned()
    }

    /// Returns `true` if the file exists.
    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.inner.lock().unwrap().files.contains_key(path)
    }

    /// XORs `0xFF` into one byte of a stored file.
    ///
    /// # Panics
    ///
    /// Panics if the file does not exist or `offset` is out of range.
    pub fn flip_byte(&self, path: &str, offset: u64) {
        let mut inner = self.inner.lock().unwrap();
        let file = inner.files.get_mut(path).expect("no such file");
        file[usize::try_from(offset).unwrap()] ^= 0xFF;
    }

    /// Total bytes accepted by [`RpcFs::write_at`] so far.
    #[must_use]
    pub fn write_bytes(&self) -> u64 {
        self.inner.lock().unwrap().write_bytes
    }

    /// Number of [`RpcFs::fsync`] calls so far.
    #[must_use]
    pub fn fsync_calls(&self) -> u64 {
        self.inner.lock().unwrap().fsync_calls
    }
}

impl RpcFs for MemoryRpcFs {
    fn open(&self, path: &str, create: bool) -> FsResult<RpcFd> {
        let mut inner = self.inner.lock().unwrap();
        if create {
            inner.files.insert(path.to_string(), Vec::new());
        } else if !inner.files.contains_key(path) {
            return Err(FsError::ItemNotFound);
        }
        let fd = inner.next_fd;
        inner.next_fd += 1;
        inner.fds.insert(fd, path.to_string());
        Ok(RpcFd(fd))
    }

    fn close(&self, fd: RpcFd) -> FsResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .fds
            .remove(&fd.0)
            .map(|_| ())
            .ok_or_else(|| FsError::generic("close of unknown descriptor"))
    }

    fn read_at(&self, fd: RpcFd, offset: u64, len: usize) -> FsResult<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let name = inner
            .fds
            .get(&fd.0)
            .ok_or_else(|| FsError::generic("read on stale descriptor"))?;
        let file = inner
            .files
            .get(name)
            .ok_or_else(|| FsError::generic("read on removed file"))?;

        let start = usize::try_from(offset).map_err(|_| FsError::BadParameters)?;
        if start >= file.len() {
            return Ok(Vec::new());
        }
        let end = file.len().min(start + len);
        Ok(file[start..end].to_vec())
    }

    fn write_at(&self, fd: RpcFd, offset: u64, data: &[u8]) -> FsResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let name = inner
            .fds
            .get(&fd.0)
            .cloned()
            .ok_or_else(|| FsError::generic("write on stale descriptor"))?;

        let affordable = match inner.write_budget {
            Some(budget) => usize::try_from(budget.min(data.len() as u64)).unwrap_or(usize::MAX),
            None => data.len(),
        };

        if affordable > 0 {
            let start = usize::try_from(offset).map_err(|_| FsError::BadParameters)?;
            let file = inner
                .files
                .get_mut(&name)
                .ok_or_else(|| FsError::generic("write on removed file"))?;
            if start + affordable > file.len() {
                file.resize(start + affordable, 0);
            }
            file[start..start + affordable].copy_from_slice(&data[..affordable]);
        }
        inner.write_bytes += affordable as u64;
        if let Some(budget) = inner.write_budget.as_mut() {
            *budget -= affordable as u64;
        }

        if affordable < data.len() {
            return Err(FsError::generic("simulated power loss"));
        }
        Ok(())
    }

    fn rename(&self, old: &str, new: &str, overwrite: bool) -> FsResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if !overwrite && inner.files.contains_key(new) {
            return Err(FsError::generic("rename destination exists"));
        }
        let data = inner.files.remove(old).ok_or(FsError::ItemNotFound)?;
        inner.files.insert(new.to_string(), data);
        Ok(())
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .files
            .remove(path)
            .map(|_| ())
            .ok_or(FsError::ItemNotFound)
    }

    fn fsync(&self, fd: RpcFd) -> FsResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.fds.contains_key(&fd.0) {
            return Err(FsError::generic("fsync on stale descriptor"));
        }
        inner.fsync_calls += 1;
        Ok(())
    }
}
