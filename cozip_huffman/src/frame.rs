use std::ops::Range;

use super::*;

/// Where one partition's bits live inside the artifact payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct PartitionDescriptor {
    pub(super) index: usize,
    pub(super) symbol_count: usize,
    pub(super) payload_range: Range<usize>,
    pub(super) crc32: Option<u32>,
}

#[derive(Debug)]
pub(super) struct ParsedArtifact<'a> {
    pub(super) format: ArtifactFormat,
    pub(super) table: FrequencyTable,
    pub(super) partitions: Vec<PartitionDescriptor>,
    pub(super) payload: &'a [u8],
}

pub(super) fn encode_artifact(
    format: ArtifactFormat,
    table: &FrequencyTable,
    chunks: &[EncodedChunk],
) -> Result<Vec<u8>, CozipHuffmanError> {
    let payload_len: usize = chunks.iter().map(|chunk| chunk.bytes.len()).sum();
    let mut out = Vec::with_capacity(
        PREAMBLE_LEN + 4 + table.distinct_symbols() * 5 + 4 + chunks.len() * PARTITION_META_LEN
            + payload_len,
    );

    match format {
        ArtifactFormat::Legacy => table.write_entries(&mut out)?,
        ArtifactFormat::Partitioned => {
            out.extend_from_slice(&ARTIFACT_MAGIC);
            out.push(ARTIFACT_VERSION);
            out.push(0);
            table.write_entries(&mut out)?;
            write_u32(
                &mut out,
                u32::try_from(chunks.len()).map_err(|_| CozipHuffmanError::DataTooLarge)?,
            );
            for chunk in chunks {
                write_u32(
                    &mut out,
                    u32::try_from(chunk.symbol_count).map_err(|_| CozipHuffmanError::DataTooLarge)?,
                );
                write_u32(
                    &mut out,
                    u32::try_from(chunk.bytes.len()).map_err(|_| CozipHuffmanError::DataTooLarge)?,
                );
                write_u32(&mut out, crc32fast::hash(&chunk.bytes));
            }
        }
    }

    for chunk in chunks {
        out.extend_from_slice(&chunk.bytes);
    }

    Ok(out)
}

pub(super) fn parse_artifact(artifact: &[u8]) -> Result<ParsedArtifact<'_>, CozipHuffmanError> {
    if artifact.len() >= ARTIFACT_MAGIC.len() && artifact[..ARTIFACT_MAGIC.len()] == ARTIFACT_MAGIC
    {
        parse_partitioned(artifact)
    } else {
        parse_legacy(artifact)
    }
}

fn parse_legacy(artifact: &[u8]) -> Result<ParsedArtifact<'_>, CozipHuffmanError> {
    if artifact.len() < 4 {
        return Err(CozipHuffmanError::InvalidArtifact("artifact too short"));
    }

    let (table, payload_start) = FrequencyTable::read_entries(artifact, 0)?;
    let payload = &artifact[payload_start..];
    let symbol_count =
        usize::try_from(table.total()).map_err(|_| CozipHuffmanError::DataTooLarge)?;
    if symbol_count == 0 && !payload.is_empty() {
        return Err(CozipHuffmanError::InvalidArtifact(
            "payload without frequency table",
        ));
    }
    check_symbol_budget(symbol_count, payload.len())?;

    Ok(ParsedArtifact {
        format: ArtifactFormat::Legacy,
        table,
        partitions: vec![PartitionDescriptor {
            index: 0,
            symbol_count,
            payload_range: 0..payload.len(),
            crc32: None,
        }],
        payload,
    })
}

fn parse_partitioned(artifact: &[u8]) -> Result<ParsedArtifact<'_>, CozipHuffmanError> {
    if artifact.len() < PREAMBLE_LEN {
        return Err(CozipHuffmanError::InvalidArtifact("artifact too short"));
    }
    if artifact[4] != ARTIFACT_VERSION {
        return Err(CozipHuffmanError::InvalidArtifact(
            "unsupported artifact version",
        ));
    }

    let (table, cursor) = FrequencyTable::read_entries(artifact, PREAMBLE_LEN)?;
    let partition_count = read_u32(artifact, cursor)? as usize;
    let meta_start = cursor + 4;

    let meta_len = partition_count
        .checked_mul(PARTITION_META_LEN)
        .ok_or(CozipHuffmanError::InvalidArtifact("metadata overflow"))?;
    let payload_start = meta_start
        .checked_add(meta_len)
        .ok_or(CozipHuffmanError::InvalidArtifact("metadata overflow"))?;
    if artifact.len() < payload_start {
        return Err(CozipHuffmanError::InvalidArtifact(
            "incomplete partition metadata",
        ));
    }
    let payload = &artifact[payload_start..];

    let mut partitions = Vec::with_capacity(partition_count);
    let mut payload_cursor = 0_usize;
    let mut total_symbols = 0_u64;

    for index in 0..partition_count {
        let meta = meta_start + index * PARTITION_META_LEN;
        let symbol_count = read_u32(artifact, meta)? as usize;
        let byte_len = read_u32(artifact, meta + 4)? as usize;
        let crc32 = read_u32(artifact, meta + 8)?;

        let payload_end = payload_cursor
            .checked_add(byte_len)
            .ok_or(CozipHuffmanError::InvalidArtifact("payload overflow"))?;
        if payload_end > payload.len() {
            return Err(CozipHuffmanError::InvalidArtifact(
                "partition payload out of range",
            ));
        }
        check_symbol_budget(symbol_count, byte_len)?;

        total_symbols += symbol_count as u64;
        partitions.push(PartitionDescriptor {
            index,
            symbol_count,
            payload_range: payload_cursor..payload_end,
            crc32: Some(crc32),
        });
        payload_cursor = payload_end;
    }

    if payload_cursor != payload.len() {
        return Err(CozipHuffmanError::InvalidArtifact(
            "trailing bytes in artifact",
        ));
    }

    if total_symbols != table.total() {
        return Err(CozipHuffmanError::InvalidArtifact(
            "sum(symbol_count) does not match frequency total",
        ));
    }

    Ok(ParsedArtifact {
        format: ArtifactFormat::Partitioned,
        table,
        partitions,
        payload,
    })
}

/// Every code is at least one bit long, so a partition can never hold more
/// symbols than it has bits.
fn check_symbol_budget(symbol_count: usize, byte_len: usize) -> Result<(), CozipHuffmanError> {
    if symbol_count > byte_len.saturating_mul(8) {
        return Err(CozipHuffmanError::InvalidArtifact(
            "symbol count exceeds payload bits",
        ));
    }
    if symbol_count == 0 && byte_len > 0 {
        return Err(CozipHuffmanError::InvalidArtifact(
            "payload without symbols",
        ));
    }
    Ok(())
}

pub(crate) fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, CozipHuffmanError> {
    read_array(bytes, offset).map(u32::from_le_bytes)
}

pub(crate) fn read_i32(bytes: &[u8], offset: usize) -> Result<i32, CozipHuffmanError> {
    read_array(bytes, offset).map(i32::from_le_bytes)
}

fn read_array(bytes: &[u8], offset: usize) -> Result<[u8; 4], CozipHuffmanError> {
    let end = offset
        .checked_add(4)
        .ok_or(CozipHuffmanError::InvalidArtifact("u32 overflow"))?;
    let slice = bytes
        .get(offset..end)
        .ok_or(CozipHuffmanError::InvalidArtifact("u32 out of range"))?;
    slice
        .try_into()
        .map_err(|_| CozipHuffmanError::InvalidArtifact("u32 parse failed"))
}
