//! Secure persistent-object storage engine for trusted execution
//! environments.
//!
//! Each secure object lives in a single opaque container file in the
//! untrusted normal-world filesystem. The engine offers a POSIX-like file
//! interface — open, create, close, read, write, seek, truncate, rename,
//! remove, fsync — while guaranteeing confidentiality, integrity and
//! crash-atomicity even though the backing store may be interrupted or
//! corrupted at any moment.
//!
//! # Architecture
//!
//! Every field of the container exists in two physical slots. A 4-byte
//! counter at offset 0 selects the active meta slot by parity; the meta's
//! backup-version table selects the active slot of every data block. All
//! updates are out of place: new data lands in shadow slots while a
//! candidate copy of the meta accumulates the changes, and a single counter
//! write publishes the whole update atomically. A crash at any earlier point
//! leaves the previous committed state fully readable.
//!
//! The engine core performs no I/O and no cryptography itself; it drives
//! three injected collaborators (see [`platform`]):
//!
//! - [`RpcFs`] — positional file I/O on the untrusted host,
//! - [`KeyManager`] — authenticated encryption and FEK wrapping,
//! - [`SessionProvider`] — the client identity owning each object.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! use teefs_core::platform::{AeadKeyManager, FixedSession, MemoryRpcFs};
//! use teefs_core::{ObjectStore, ReeFs, Whence};
//!
//! # fn main() -> teefs_core::FsResult<()> {
//! let sessions = Arc::new(FixedSession::new(Uuid::from_bytes([7; 16])));
//! let km = Arc::new(AeadKeyManager::new([0x42; 32], sessions.clone()));
//! let fs = ReeFs::new(Arc::new(MemoryRpcFs::new()), km, sessions);
//!
//! let mut file = fs.create("/obj/demo")?;
//! fs.write(&mut file, b"secret payload")?;
//! fs.seek(&mut file, 0, Whence::Set)?;
//!
//! let mut buf = [0u8; 14];
//! assert_eq!(fs.read(&mut file, &mut buf)?, 14);
//! assert_eq!(&buf, b"secret payload");
//! fs.close(file)?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

mod crypto_io;
mod error;
pub mod format;
mod file;
mod layout;
mod meta;
mod ops;
pub mod platform;
mod update;

pub use error::{FsError, FsResult};
pub use file::{SecureFile, Whence};
pub use layout::Layout;
pub use meta::{FileMeta, FileMetaInfo};
pub use ops::{DirHandle, ObjectStore, ReeFs, TransportClass};
pub use platform::{KeyManager, RpcFs, SessionProvider};
