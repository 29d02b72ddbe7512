//! End-to-end scenarios driving the engine through its public capability.

mod common;

use common::{disk_counter, read_all, read_at, test_engine};
use teefs_core::{FsError, ObjectStore, Whence};

#[test]
fn test_write_close_reopen_read() {
    let (rpc, fs) = test_engine();

    let mut file = fs.create("/obj/a").unwrap();
    fs.write(&mut file, &[0x01, 0x02, 0x03]).unwrap();
    fs.close(file).unwrap();

    let mut file = fs.open("/obj/a").unwrap();
    assert_eq!(file.len(), 3);
    assert_eq!(read_at(&fs, &mut file, 0, 3), [0x01, 0x02, 0x03]);
    assert_eq!(disk_counter(&rpc, "/obj/a"), 1);
}

#[test]
fn test_sparse_write_zero_fills_and_allocates_blocks() {
    let (rpc, fs) = test_engine();

    let mut file = fs.create("/obj/b").unwrap();
    fs.seek(&mut file, 300, Whence::Set).unwrap();
    fs.write(&mut file, &[0xAA]).unwrap();
    assert_eq!(file.len(), 301);

    let data = read_at(&fs, &mut file, 0, 301);
    assert_eq!(data.len(), 301);
    assert!(data[..300].iter().all(|&b| b == 0));
    assert_eq!(data[300], 0xAA);

    // Both block 0 and block 1 were materialized on disk: the zero-fill and
    // the patch each landed a first version in slot 1 of their block.
    let layout = fs.layout();
    let blocks_base = 4 + 2 * layout.meta_slot_size();
    let expected = blocks_base + 4 * layout.block_slot_size();
    assert_eq!(rpc.contents("/obj/b").unwrap().len() as u64, expected);
}

#[test]
fn test_overwrite_within_block() {
    let (rpc, fs) = test_engine();

    let mut file = fs.create("/obj/c").unwrap();
    fs.write(&mut file, &[0x55; 256]).unwrap();
    fs.seek(&mut file, 100, Whence::Set).unwrap();
    fs.write(&mut file, &[0xFF; 10]).unwrap();

    let data = read_at(&fs, &mut file, 0, 256);
    assert_eq!(&data[..100], &[0x55; 100][..]);
    assert_eq!(&data[100..110], &[0xFF; 10][..]);
    assert_eq!(&data[110..], &[0x55; 146][..]);

    assert_eq!(file.meta_generation(), 2);
    assert_eq!(disk_counter(&rpc, "/obj/c"), 2);
}

#[test]
fn test_truncate_shrink_then_extend() {
    let (_, fs) = test_engine();

    let mut file = fs.create("/obj/d").unwrap();
    let original: Vec<u8> = (0..512u16).map(|i| (i % 241) as u8).collect();
    fs.write(&mut file, &original).unwrap();

    fs.truncate(&mut file, 100).unwrap();
    assert_eq!(file.len(), 100);

    let data = read_at(&fs, &mut file, 0, 1000);
    assert_eq!(data.len(), 100);
    assert_eq!(data, &original[..100]);

    fs.truncate(&mut file, 200).unwrap();
    let data = read_all(&fs, &mut file);
    assert_eq!(&data[..100], &original[..100]);
    assert_eq!(&data[100..200], &vec![0u8; 100][..]);
}

#[test]
fn test_crash_between_shadow_meta_and_counter_write() {
    let (rpc, fs) = test_engine();

    let mut file = fs.create("/obj/e").unwrap();
    fs.write(&mut file, &[0x11; 256]).unwrap();

    // Let the second write land its shadow block and shadow meta, then drop
    // everything from the counter write on.
    let layout = fs.layout();
    rpc.crash_after_bytes(layout.block_slot_size() + layout.meta_slot_size());
    fs.seek(&mut file, 0, Whence::Set).unwrap();
    assert!(fs.write(&mut file, &[0x22; 256]).is_err());
    rpc.heal();
    drop(file);

    let mut reopened = fs.open("/obj/e").unwrap();
    assert_eq!(reopened.meta_generation(), 1);
    assert_eq!(disk_counter(&rpc, "/obj/e"), 1);
    assert_eq!(read_all(&fs, &mut reopened), vec![0x11; 256]);
}

#[test]
fn test_tampered_meta_fails_open() {
    let (rpc, fs) = test_engine();

    let mut file = fs.create("/obj/f").unwrap();
    fs.write(&mut file, &[0x33; 100]).unwrap();
    fs.close(file).unwrap();

    // Counter is 1, so the active meta lives in slot 1.
    let offset = fs.layout().meta_offset(disk_counter(&rpc, "/obj/f"), true);
    rpc.flip_byte("/obj/f", offset + 10);

    assert_eq!(fs.open("/obj/f").unwrap_err(), FsError::CorruptObject);
}

#[test]
fn test_tampered_block_fails_read_but_not_open() {
    let (rpc, fs) = test_engine();

    let mut file = fs.create("/obj/g").unwrap();
    fs.write(&mut file, &[0x44; 1024]).unwrap();
    fs.close(file).unwrap();

    // Corrupt both physical slots of block 3; whichever is active, a read
    // covering the block must detect it.
    let layout = fs.layout();
    let blocks_base = 4 + 2 * layout.meta_slot_size();
    rpc.flip_byte("/obj/g", blocks_base + 6 * layout.block_slot_size() + 5);
    rpc.flip_byte("/obj/g", blocks_base + 7 * layout.block_slot_size() + 5);

    let mut file = fs.open("/obj/g").unwrap();

    // Blocks 0..=2 are intact.
    assert_eq!(read_at(&fs, &mut file, 0, 768), vec![0x44; 768]);

    // Any read touching block 3 surfaces the corruption.
    fs.seek(&mut file, 700, Whence::Set).unwrap();
    let mut buf = [0u8; 200];
    assert_eq!(fs.read(&mut file, &mut buf).unwrap_err(), FsError::CorruptObject);
}

#[test]
fn test_read_clamps_to_length() {
    let (_, fs) = test_engine();

    let mut file = fs.create("/obj/h").unwrap();
    fs.write(&mut file, &[0x66; 10]).unwrap();

    assert_eq!(read_at(&fs, &mut file, 5, 20).len(), 5);
    assert_eq!(read_at(&fs, &mut file, 10, 20).len(), 0);
    assert_eq!(read_at(&fs, &mut file, 11, 20).len(), 0);
    assert_eq!(read_at(&fs, &mut file, 0, 10).len(), 10);
}

#[test]
fn test_multi_block_pattern_roundtrip() {
    let (_, fs) = test_engine();

    let mut file = fs.create("/obj/i").unwrap();
    let pattern: Vec<u8> = (0..2000u32).map(|i| (i * 7 % 256) as u8).collect();
    fs.write(&mut file, &pattern).unwrap();
    fs.close(file).unwrap();

    let mut file = fs.open("/obj/i").unwrap();
    assert_eq!(read_all(&fs, &mut file), pattern);

    // Cross-block unaligned reads see the same bytes.
    assert_eq!(read_at(&fs, &mut file, 250, 20), &pattern[250..270]);
    assert_eq!(read_at(&fs, &mut file, 1023, 2), &pattern[1023..1025]);
}

#[test]
fn test_rename_preserves_content() {
    let (_, fs) = test_engine();

    let mut file = fs.create("/obj/old").unwrap();
    fs.write(&mut file, b"movable").unwrap();
    fs.close(file).unwrap();

    fs.rename("/obj/old", "/obj/new", false).unwrap();
    assert_eq!(fs.open("/obj/old").unwrap_err(), FsError::ItemNotFound);

    let mut file = fs.open("/obj/new").unwrap();
    assert_eq!(read_all(&fs, &mut file), b"movable");
}
