use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use super::*;
use crate::frame::{PartitionDescriptor, encode_artifact, parse_artifact};

/// Splits `len` items into `parts` contiguous ranges. The first
/// `len % parts` ranges are one item longer than the rest.
pub fn split_ranges(len: usize, parts: usize) -> Vec<Range<usize>> {
    if parts == 0 {
        return Vec::new();
    }

    let base = len / parts;
    let remainder = len % parts;
    let mut start = 0;
    (0..parts)
        .map(|index| {
            let end = start + base + usize::from(index < remainder);
            let range = start..end;
            start = end;
            range
        })
        .collect()
}

pub(crate) fn encode_with_pool(
    pool: &ThreadPool,
    input: &[u8],
    options: &HuffmanOptions,
) -> Result<EncodedArtifact, CozipHuffmanError> {
    let prepare_start = Instant::now();
    let table = FrequencyTable::from_data(input);
    let tree = if table.is_empty() {
        None
    } else {
        Some(HuffmanTree::build(&table)?)
    };
    let ranges = split_ranges(input.len(), encode_partition_count(options));
    let prepare = prepare_start.elapsed();

    let dispatch_start = Instant::now();
    let chunks = match tree {
        None => vec![EncodedChunk::default(); ranges.len()],
        Some(tree) => {
            let codes = Arc::new(tree.code_table());
            let data: Arc<[u8]> = Arc::from(input);
            let mut handles = Vec::with_capacity(ranges.len());
            for range in ranges {
                let codes = Arc::clone(&codes);
                let data = Arc::clone(&data);
                handles.push(pool.submit(move || huffman::encode(&data[range], &codes))?);
            }
            collect_in_order(handles)?
        }
    };
    let bytes = encode_artifact(options.artifact_format, &table, &chunks)?;
    let dispatch = dispatch_start.elapsed();

    let stats = HuffmanStats {
        format: options.artifact_format,
        partition_count: chunks.len(),
        symbol_count: input.len(),
        distinct_symbols: table.distinct_symbols(),
        payload_bytes: chunks.iter().map(|chunk| chunk.bytes.len()).sum(),
        prepare,
        dispatch,
    };
    if options.profile_timing {
        log_timing("encode", &stats);
    }

    Ok(EncodedArtifact { bytes, stats })
}

pub(crate) fn decode_with_pool(
    pool: &ThreadPool,
    artifact: &[u8],
    options: &HuffmanOptions,
) -> Result<DecodedArtifact, CozipHuffmanError> {
    let prepare_start = Instant::now();
    let parsed = parse_artifact(artifact)?;
    if parsed.format == ArtifactFormat::Legacy && options.effective_partition_count() > 1 {
        log::warn!(
            "[cozip-huffman][warn] legacy artifact has no partition offsets; decoding as 1 partition"
        );
    }

    let mut stats = HuffmanStats {
        format: parsed.format,
        partition_count: parsed.partitions.len(),
        symbol_count: 0,
        distinct_symbols: parsed.table.distinct_symbols(),
        payload_bytes: parsed.payload.len(),
        ..HuffmanStats::default()
    };

    if parsed.table.is_empty() {
        stats.prepare = prepare_start.elapsed();
        return Ok(DecodedArtifact {
            bytes: Vec::new(),
            stats,
        });
    }

    let tree = Arc::new(HuffmanTree::build(&parsed.table)?);
    let payload: Arc<[u8]> = Arc::from(parsed.payload);
    stats.prepare = prepare_start.elapsed();

    let dispatch_start = Instant::now();
    let verify_checksums = options.verify_checksums;
    let mut handles = Vec::with_capacity(parsed.partitions.len());
    for descriptor in parsed.partitions {
        let tree = Arc::clone(&tree);
        let payload = Arc::clone(&payload);
        handles.push(pool.submit(move || {
            decode_partition(&payload, &descriptor, &tree, verify_checksums)
        })?);
    }
    let decoded = collect_in_order(handles)?;

    let mut bytes = Vec::with_capacity(decoded.iter().map(Vec::len).sum());
    for part in decoded {
        bytes.extend_from_slice(&part);
    }
    stats.symbol_count = bytes.len();
    stats.dispatch = dispatch_start.elapsed();
    if options.profile_timing {
        log_timing("decode", &stats);
    }

    Ok(DecodedArtifact { bytes, stats })
}

/// Legacy artifacts carry no partition offsets, so they are always written
/// as a single partition.
fn encode_partition_count(options: &HuffmanOptions) -> usize {
    let requested = options.effective_partition_count();
    match options.artifact_format {
        ArtifactFormat::Partitioned => requested,
        ArtifactFormat::Legacy => {
            if requested > 1 {
                log::warn!(
                    "[cozip-huffman][warn] legacy artifact has no partition offsets; encoding as 1 partition instead of {requested}"
                );
            }
            1
        }
    }
}

fn decode_partition(
    payload: &[u8],
    descriptor: &PartitionDescriptor,
    tree: &HuffmanTree,
    verify_checksums: bool,
) -> Result<Vec<u8>, CozipHuffmanError> {
    let bytes = payload
        .get(descriptor.payload_range.clone())
        .ok_or(CozipHuffmanError::Internal("partition range out of payload"))?;

    if verify_checksums
        && let Some(expected) = descriptor.crc32
        && crc32fast::hash(bytes) != expected
    {
        return Err(CozipHuffmanError::ChecksumMismatch {
            partition: descriptor.index,
        });
    }

    huffman::decode(bytes, tree, descriptor.symbol_count)
}

/// Joins every handle in partition order. Any failure aborts the whole
/// operation with one aggregate error after all tasks have settled.
fn collect_in_order<T>(
    handles: Vec<TaskHandle<Result<T, CozipHuffmanError>>>,
) -> Result<Vec<T>, CozipHuffmanError> {
    let total = handles.len();
    let mut outputs = Vec::with_capacity(total);
    let mut failures = Vec::new();

    for (index, handle) in handles.into_iter().enumerate() {
        match handle.join().and_then(|result| result) {
            Ok(output) => outputs.push(output),
            Err(err) => {
                log::error!("[cozip-huffman] partition {index} failed: {err}");
                failures.push((index, err));
            }
        }
    }

    let failed = failures.len();
    match failures.into_iter().next() {
        None => Ok(outputs),
        Some((partition, source)) => Err(CozipHuffmanError::Partitions {
            failed,
            total,
            partition,
            source: Box::new(source),
        }),
    }
}

fn log_timing(operation: &str, stats: &HuffmanStats) {
    log::info!(
        "[cozip-huffman][timing] {operation} prepare_ms={:.3} dispatch_ms={:.3} partitions={} symbols={} payload_bytes={}",
        stats.prepare.as_secs_f64() * 1000.0,
        stats.dispatch.as_secs_f64() * 1000.0,
        stats.partition_count,
        stats.symbol_count,
        stats.payload_bytes,
    );
}
