//! Injected collaborator traits and their bundled implementations.
//!
//! The engine core performs no I/O and no cryptography of its own; both are
//! reached through capabilities handed in at construction time:
//!
//! - [`RpcFs`] — positional file I/O forwarded to the untrusted host.
//! - [`KeyManager`] — authenticated encryption and FEK wrapping.
//! - [`SessionProvider`] — identity of the client driving the engine.
//!
//! Modeling the collaborators as traits rather than process-wide singletons
//! lets tests substitute the in-memory implementations in [`memory`].

mod aead;
mod keys;
pub mod memory;
mod rpc;

pub use aead::{AeadKeyManager, DEFAULT_NUM_BLOCKS, FEK_SIZE, NONCE_SIZE, TAG_SIZE};
pub use keys::{EncryptedFek, FileKind, KeyManager, Session, SessionProvider};
pub use memory::{FixedSession, MemoryRpcFs};
pub use rpc::{RpcFd, RpcFs};
