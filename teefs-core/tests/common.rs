//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use uuid::Uuid;

use teefs_core::platform::{AeadKeyManager, FixedSession, MemoryRpcFs};
use teefs_core::{ObjectStore, ReeFs, SecureFile, Whence};

/// Client identity used by every integration test.
pub const CLIENT_UUID: [u8; 16] = [0x77; 16];

/// Small containers keep the crash sweeps fast.
pub const NUM_BLOCKS: usize = 8;

pub type TestFs = ReeFs<MemoryRpcFs, AeadKeyManager>;
pub type TestFile = SecureFile<MemoryRpcFs, AeadKeyManager>;

/// Builds an engine over a fresh in-memory transport.
pub fn test_engine() -> (Arc<MemoryRpcFs>, TestFs) {
    let sessions = Arc::new(FixedSession::new(Uuid::from_bytes(CLIENT_UUID)));
    let km = Arc::new(
        AeadKeyManager::new([0xD0; 32], sessions.clone()).with_num_blocks(NUM_BLOCKS),
    );
    let rpc = Arc::new(MemoryRpcFs::new());
    let fs = ReeFs::new(Arc::clone(&rpc), km, sessions);
    (rpc, fs)
}

/// Reads the plaintext meta counter word from a container on disk.
pub fn disk_counter(rpc: &MemoryRpcFs, path: &str) -> u32 {
    let raw = rpc.contents(path).expect("no such container");
    u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
}

/// Reads `len` bytes starting at `pos`, asserting nothing about the count.
pub fn read_at(fs: &TestFs, file: &mut TestFile, pos: i64, len: usize) -> Vec<u8> {
    fs.seek(file, pos, Whence::Set).unwrap();
    let mut buf = vec![0u8; len];
    let n = fs.read(file, &mut buf).unwrap();
    buf.truncate(n);
    buf
}

/// Reads the complete logical content of a file.
pub fn read_all(fs: &TestFs, file: &mut TestFile) -> Vec<u8> {
    let len = usize::try_from(file.len()).unwrap();
    let data = read_at(fs, file, 0, len);
    assert_eq!(data.len(), len);
    data
}
