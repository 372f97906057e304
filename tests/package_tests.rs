use dbpf::{DbpfError, Package, ResourceKey, DIR_KEY, LOCAL_GROUP};
use std::collections::HashSet;
use std::io::Cursor;

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn v12_header(num_entries: u32, index_offset: u32, index_size: u32) -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(b"DBPF");
    put_u32(&mut b, 1); // major
    put_u32(&mut b, 2); // minor
    b.extend_from_slice(&[0u8; 12]);
    put_u32(&mut b, 0); // date created
    put_u32(&mut b, 0); // date modified
    put_u32(&mut b, 7); // index major
    put_u32(&mut b, num_entries);
    put_u32(&mut b, index_offset);
    put_u32(&mut b, index_size);
    b.extend_from_slice(&[0u8; 12]); // trash fields
    put_u32(&mut b, 2); // index minor
    b.extend_from_slice(&[0u8; 32]);
    assert_eq!(b.len(), 96);
    b
}

#[test]
fn empty_package_round_trips() {
    let mut pkg = Package::new();
    let bytes = pkg.serialize().unwrap();
    assert_eq!(&bytes[0..4], b"DBPF");

    let reparsed = Package::read(Cursor::new(bytes)).unwrap();
    assert!(reparsed.entries().is_empty());
    assert_eq!(reparsed.version(), (1, 2));
}

#[test]
fn single_raw_entry_round_trips() {
    let tgi = ResourceKey::new(0xDEAD, LOCAL_GROUP, 0xBEEF, 0);
    let mut pkg = Package::new();
    pkg.changes().set_bytes(tgi, vec![1, 2, 3], false);

    let bytes = pkg.serialize().unwrap();
    let mut reparsed = Package::read(Cursor::new(bytes)).unwrap();

    let entries = reparsed.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key, tgi);
    assert_eq!(entries[0].global_key.group_id, reparsed.group_id());
    assert_eq!(
        reparsed.get_bytes_by_tgi(tgi).unwrap().unwrap(),
        vec![1, 2, 3]
    );
}

#[test]
fn compressed_entry_round_trips_via_dir() {
    let tgi = ResourceKey::new(0xDEAD, LOCAL_GROUP, 0xBEEF, 0);
    let mut pkg = Package::new();
    pkg.changes().set_bytes(tgi, vec![1, 2, 3], true);

    let bytes = pkg.serialize().unwrap();
    let mut reparsed = Package::read(Cursor::new(bytes)).unwrap();

    let dir = reparsed.dir().expect("compression directory should exist");
    assert_eq!(dir.get(&tgi), Some(3));

    // the index records the compressed length, bounded by payload + overhead
    let entry = reparsed.get_entry_by_tgi(tgi).unwrap();
    assert!(entry.file_size as usize <= 3 + 16);

    assert_eq!(
        reparsed.get_bytes_by_tgi(tgi).unwrap().unwrap(),
        vec![1, 2, 3]
    );
    // payload entry plus the DIR entry itself
    assert_eq!(reparsed.entries().len(), 2);
    assert!(reparsed.get_entry_by_tgi(DIR_KEY).is_some());
}

#[test]
fn deletion_round_trips() {
    let mut pkg = Package::new();
    for i in 0..3u32 {
        pkg.changes()
            .set_bytes(ResourceKey::new(0x100, LOCAL_GROUP, i, 0), vec![i as u8; 4], false);
    }
    let bytes = pkg.serialize().unwrap();

    let mut pkg = Package::read(Cursor::new(bytes)).unwrap();
    assert_eq!(pkg.entries().len(), 3);

    let victim = ResourceKey::new(0x100, LOCAL_GROUP, 1, 0);
    pkg.changes().delete(victim);
    let bytes = pkg.serialize().unwrap();

    let mut reparsed = Package::read(Cursor::new(bytes)).unwrap();
    assert_eq!(reparsed.entries().len(), 2);
    assert!(reparsed.get_entry_by_tgi(victim).is_none());
    assert_eq!(
        reparsed
            .get_bytes_by_tgi(ResourceKey::new(0x100, LOCAL_GROUP, 0, 0))
            .unwrap()
            .unwrap(),
        vec![0u8; 4]
    );
    assert_eq!(
        reparsed
            .get_bytes_by_tgi(ResourceKey::new(0x100, LOCAL_GROUP, 2, 0))
            .unwrap()
            .unwrap(),
        vec![2u8; 4]
    );
}

#[test]
fn merged_view_orders_and_dedups() {
    let mut pkg = Package::new();
    let k0 = ResourceKey::new(0x200, 0x10, 0, 0);
    let k1 = ResourceKey::new(0x200, 0x10, 1, 0);
    let k2 = ResourceKey::new(0x200, 0x10, 2, 0);
    for k in [k0, k1, k2] {
        pkg.changes().set_bytes(k, vec![7], false);
    }
    let bytes = pkg.serialize().unwrap();
    let mut pkg = Package::read(Cursor::new(bytes)).unwrap();

    // replace an original and add a fresh key; replaced originals move to
    // the overlay tail in insertion order
    let k9 = ResourceKey::new(0x200, 0x10, 9, 0);
    pkg.changes().set_bytes(k0, vec![0xAA], false);
    pkg.changes().set_bytes(k9, vec![0xBB], false);

    let keys: Vec<ResourceKey> = pkg.entries().iter().map(|e| e.key).collect();
    assert_eq!(keys, vec![k1, k2, k0, k9]);

    let unique: HashSet<ResourceKey> = keys.iter().copied().collect();
    assert_eq!(unique.len(), keys.len());
}

#[test]
fn global_key_lookup_resolves_local_entries() {
    let tgi = ResourceKey::new(0x300, LOCAL_GROUP, 5, 0);
    let mut pkg = Package::new();
    pkg.changes().set_bytes(tgi, vec![1, 2], false);
    let bytes = pkg.serialize().unwrap();

    let mut pkg = Package::read(Cursor::new(bytes)).unwrap();
    let global = pkg.entries()[0].global_key;
    assert_ne!(global.group_id, LOCAL_GROUP);
    assert_eq!(pkg.get_bytes_by_tgi(global).unwrap().unwrap(), vec![1, 2]);
    assert_eq!(pkg.get_entry_by_tgi(global).unwrap().key, tgi);
}

#[test]
fn rejects_wrong_magic() {
    let mut file = b"NOPE".to_vec();
    file.extend_from_slice(&[0u8; 92]);
    assert!(matches!(
        Package::read(Cursor::new(file)),
        Err(DbpfError::NotDbpf(_))
    ));
}

#[test]
fn rejects_truncated_header() {
    let file = b"DBPF\x01\x00\x00\x00".to_vec();
    assert!(matches!(
        Package::read(Cursor::new(file)),
        Err(DbpfError::TruncatedHeader)
    ));
}

#[test]
fn rejects_index_larger_than_archive() {
    let file = v12_header(5, 96, 120);
    assert!(matches!(
        Package::read(Cursor::new(file)),
        Err(DbpfError::TruncatedIndex { expected: 5, .. })
    ));
}

#[test]
fn entry_pointing_past_the_end_fails_on_read() {
    let mut file = v12_header(1, 96, 24);
    put_u32(&mut file, 0x400);
    put_u32(&mut file, 0x10);
    put_u32(&mut file, 1);
    put_u32(&mut file, 0); // instance hi
    put_u32(&mut file, 1000); // offset beyond the archive
    put_u32(&mut file, 50);

    let mut pkg = Package::read(Cursor::new(file)).unwrap();
    let entry = pkg.entries()[0].clone();
    assert!(matches!(
        pkg.get_bytes(&entry),
        Err(DbpfError::EntryOutOfRange { .. })
    ));
}
