use dbpf::refpack;
use dbpf::DbpfError;
use proptest::prelude::*;

#[test]
fn round_trips_text() {
    let input = b"the quick brown fox jumps over the lazy dog, the quick brown fox again".to_vec();
    let packed = refpack::compress(&input);
    assert_eq!(refpack::decompress(&packed, input.len()).unwrap(), input);
}

#[test]
fn round_trips_empty_input() {
    let packed = refpack::compress(&[]);
    assert_eq!(refpack::decompress(&packed, 0).unwrap(), Vec::<u8>::new());
}

#[test]
fn round_trips_tiny_input() {
    let input = vec![0x42];
    let packed = refpack::compress(&input);
    assert_eq!(refpack::decompress(&packed, 1).unwrap(), input);
}

#[test]
fn round_trips_long_run() {
    let input = vec![0x5A; 10_000];
    let packed = refpack::compress(&input);
    assert!(packed.len() < 200, "run of one byte should pack tightly, got {}", packed.len());
    assert_eq!(refpack::decompress(&packed, input.len()).unwrap(), input);
}

#[test]
fn round_trips_incompressible_bytes() {
    // xorshift noise defeats the match finder, forcing literal runs
    let mut state = 0x2545_F491u32;
    let input: Vec<u8> = (0..4096)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect();
    let packed = refpack::compress(&input);
    assert_eq!(refpack::decompress(&packed, input.len()).unwrap(), input);
}

#[test]
fn blob_header_carries_signature_and_length() {
    let input = b"abcdefgh".to_vec();
    let packed = refpack::compress(&input);
    assert_eq!(packed[4], 0x10);
    assert_eq!(packed[5], 0xFB);
    let stored = ((packed[6] as usize) << 16) | ((packed[7] as usize) << 8) | packed[8] as usize;
    assert_eq!(stored, input.len());
}

#[test]
fn rejects_bad_signature() {
    let mut packed = refpack::compress(b"some data worth compressing, some data");
    packed[5] ^= 0xFF;
    assert!(matches!(
        refpack::decompress(&packed, 38),
        Err(DbpfError::CorruptCompression(_))
    ));
}

#[test]
fn rejects_truncated_stream() {
    let input = b"truncation target truncation target".to_vec();
    let mut packed = refpack::compress(&input);
    packed.truncate(packed.len() - 1);
    assert!(matches!(
        refpack::decompress(&packed, input.len()),
        Err(DbpfError::CorruptCompression(_))
    ));
}

#[test]
fn rejects_expected_length_mismatch() {
    let input = b"length checked against the directory".to_vec();
    let packed = refpack::compress(&input);
    assert!(matches!(
        refpack::decompress(&packed, input.len() + 1),
        Err(DbpfError::CorruptCompression(_))
    ));
    assert!(matches!(
        refpack::decompress(&packed, input.len() - 1),
        Err(DbpfError::CorruptCompression(_))
    ));
}

proptest! {
    #[test]
    fn compression_round_trips(input in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let packed = refpack::compress(&input);
        let out = refpack::decompress(&packed, input.len()).unwrap();
        prop_assert_eq!(out, input);
    }

    #[test]
    fn repetitive_input_round_trips(
        pattern in proptest::collection::vec(any::<u8>(), 1..32),
        reps in 1usize..256,
    ) {
        let input: Vec<u8> = pattern.iter().cycle().take(pattern.len() * reps).copied().collect();
        let packed = refpack::compress(&input);
        let out = refpack::decompress(&packed, input.len()).unwrap();
        prop_assert_eq!(out, input);
    }
}
