use std::time::{Duration, Instant};

use cozip_huffman::{
    ArtifactFormat, CoZipHuffman, CozipHuffmanError, DecodedArtifact, EncodedArtifact,
    HuffmanOptions,
};

fn build_mixed_dataset(bytes: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes);
    let mut state: u32 = 0x1234_5678;

    while out.len() < bytes {
        let zone = (out.len() / 4096) % 3;
        match zone {
            0 => out.extend_from_slice(b"cozip-huffman-thread-pool-"),
            1 => out.extend_from_slice(b"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"),
            _ => {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                out.push((state >> 24) as u8);
            }
        }
    }

    out.truncate(bytes);
    out
}

fn timed_roundtrip(
    input: &[u8],
    codec: &CoZipHuffman,
) -> (EncodedArtifact, DecodedArtifact, Duration, Duration) {
    let encode_start = Instant::now();
    let encoded = codec.encode(input).expect("encode should succeed");
    let encode_elapsed = encode_start.elapsed();

    let decode_start = Instant::now();
    let decoded = codec.decode(&encoded.bytes).expect("decode should succeed");
    let decode_elapsed = decode_start.elapsed();

    assert_eq!(decoded.bytes, input);
    (encoded, decoded, encode_elapsed, decode_elapsed)
}

#[test]
fn compare_single_partition_vs_parallel_with_nocapture() {
    let input = build_mixed_dataset(2 * 1024 * 1024 + 321);

    let single = CoZipHuffman::init(HuffmanOptions {
        worker_count: 1,
        partition_count: Some(1),
        ..HuffmanOptions::default()
    })
    .expect("init should succeed");
    let parallel = CoZipHuffman::init(HuffmanOptions {
        worker_count: 4,
        partition_count: Some(12),
        ..HuffmanOptions::default()
    })
    .expect("init should succeed");

    let (single_enc, _, single_et, single_dt) = timed_roundtrip(&input, &single);
    let (par_enc, par_dec, par_et, par_dt) = timed_roundtrip(&input, &parallel);

    println!("=== cozip_huffman integration compare ===");
    println!("input_bytes={}", input.len());
    println!(
        "[SINGLE  ] encode_ms={:.3} decode_ms={:.3} artifact_bytes={} ratio={:.4}",
        single_et.as_secs_f64() * 1000.0,
        single_dt.as_secs_f64() * 1000.0,
        single_enc.bytes.len(),
        single_enc.bytes.len() as f64 / input.len() as f64,
    );
    println!(
        "[PARALLEL] encode_ms={:.3} decode_ms={:.3} artifact_bytes={} ratio={:.4} partitions={}",
        par_et.as_secs_f64() * 1000.0,
        par_dt.as_secs_f64() * 1000.0,
        par_enc.bytes.len(),
        par_enc.bytes.len() as f64 / input.len() as f64,
        par_dec.stats.partition_count,
    );

    // same codebook, so only per-partition padding and metadata differ
    assert_eq!(par_enc.stats.distinct_symbols, single_enc.stats.distinct_symbols);
    assert!(par_enc.stats.payload_bytes >= single_enc.stats.payload_bytes);
    assert!(par_enc.stats.payload_bytes <= single_enc.stats.payload_bytes + 12);
}

#[test]
fn file_helpers_roundtrip_through_disk() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let source = dir.path().join("input.txt");
    let artifact = dir.path().join("encoded_file.bin");
    let restored = dir.path().join("decoded_output.txt");

    let input = build_mixed_dataset(300_000);
    std::fs::write(&source, &input).expect("input should be written");

    let codec = CoZipHuffman::init(HuffmanOptions {
        worker_count: 3,
        ..HuffmanOptions::default()
    })
    .expect("init should succeed");

    let encode_stats = codec
        .encode_file_from_name(&source, &artifact)
        .expect("encode should succeed");
    let decode_stats = codec
        .decode_file_from_name(&artifact, &restored)
        .expect("decode should succeed");

    assert_eq!(encode_stats.symbol_count, input.len());
    assert_eq!(decode_stats.symbol_count, input.len());
    assert_eq!(
        std::fs::read(&restored).expect("output should be readable"),
        input
    );
}

#[test]
fn legacy_file_roundtrip_through_disk() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let source = dir.path().join("input.txt");
    let artifact = dir.path().join("encoded_file.bin");
    let restored = dir.path().join("decoded_output.txt");
    std::fs::write(&source, b"aaabbc").expect("input should be written");

    let codec = CoZipHuffman::init(HuffmanOptions {
        worker_count: 2,
        artifact_format: ArtifactFormat::Legacy,
        ..HuffmanOptions::default()
    })
    .expect("init should succeed");
    codec
        .encode_file_from_name(&source, &artifact)
        .expect("encode should succeed");

    let written = std::fs::read(&artifact).expect("artifact should be readable");
    assert_eq!(
        written,
        vec![3, 0, 0, 0, b'a', 3, 0, 0, 0, b'b', 2, 0, 0, 0, b'c', 1, 0, 0, 0, 0x1f, 0x00]
    );

    codec
        .decode_file_from_name(&artifact, &restored)
        .expect("decode should succeed");
    assert_eq!(
        std::fs::read(&restored).expect("output should be readable"),
        b"aaabbc"
    );
}

#[test]
fn missing_input_file_is_an_io_failure() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let codec = CoZipHuffman::init(HuffmanOptions {
        worker_count: 1,
        ..HuffmanOptions::default()
    })
    .expect("init should succeed");

    let error = codec
        .encode_file_from_name(dir.path().join("absent.txt"), dir.path().join("out.bin"))
        .expect_err("missing input should fail");
    assert!(matches!(error, CozipHuffmanError::Io(_)));
}

#[tokio::test]
async fn async_file_helpers_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let source = dir.path().join("input.bin");
    let artifact = dir.path().join("encoded_file.bin");
    let restored = dir.path().join("decoded_output.bin");

    let input = build_mixed_dataset(64 * 1024 + 5);
    tokio::fs::write(&source, &input)
        .await
        .expect("input should be written");

    let codec = CoZipHuffman::init(HuffmanOptions {
        worker_count: 2,
        partition_count: Some(5),
        ..HuffmanOptions::default()
    })
    .expect("init should succeed");

    let encode_stats = codec
        .encode_file_from_name_async(&source, &artifact)
        .await
        .expect("encode should succeed");
    assert_eq!(encode_stats.partition_count, 5);

    codec
        .decode_file_from_name_async(&artifact, &restored)
        .await
        .expect("decode should succeed");
    assert_eq!(
        tokio::fs::read(&restored)
            .await
            .expect("output should be readable"),
        input
    );
}
