use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;

use crate::CozipHuffmanError;
use crate::frequency::{FrequencyTable, SYMBOL_COUNT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HuffmanNode {
    Leaf { symbol: u8, weight: u64 },
    Internal { left: usize, right: usize, weight: u64 },
}

impl HuffmanNode {
    pub fn weight(&self) -> u64 {
        match *self {
            Self::Leaf { weight, .. } | Self::Internal { weight, .. } => weight,
        }
    }
}

/// Arena-backed Huffman tree. Node indices double as the tie-break
/// sequence: leaves are numbered in ascending symbol order and each merged
/// node takes the next index, so equal weights always resolve the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanTree {
    nodes: Vec<HuffmanNode>,
    root: usize,
}

impl HuffmanTree {
    pub fn build(table: &FrequencyTable) -> Result<Self, CozipHuffmanError> {
        let mut nodes = Vec::with_capacity(SYMBOL_COUNT * 2);
        let mut heap: BinaryHeap<Reverse<(u64, usize)>> = BinaryHeap::new();

        for (symbol, weight) in table.iter() {
            let index = nodes.len();
            nodes.push(HuffmanNode::Leaf { symbol, weight });
            heap.push(Reverse((weight, index)));
        }

        if heap.is_empty() {
            return Err(CozipHuffmanError::EmptyFrequencyTable);
        }

        while heap.len() > 1 {
            let (Some(Reverse((left_weight, left))), Some(Reverse((right_weight, right)))) =
                (heap.pop(), heap.pop())
            else {
                return Err(CozipHuffmanError::Internal("huffman heap underflow"));
            };
            let weight = left_weight
                .checked_add(right_weight)
                .ok_or(CozipHuffmanError::DataTooLarge)?;
            let index = nodes.len();
            nodes.push(HuffmanNode::Internal {
                left,
                right,
                weight,
            });
            heap.push(Reverse((weight, index)));
        }

        let Some(Reverse((_, root))) = heap.pop() else {
            return Err(CozipHuffmanError::Internal("huffman heap underflow"));
        };
        Ok(Self { nodes, root })
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn node(&self, index: usize) -> Option<&HuffmanNode> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[HuffmanNode] {
        &self.nodes
    }

    pub fn weight(&self) -> u64 {
        self.nodes[self.root].weight()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, HuffmanNode::Leaf { .. }))
            .count()
    }

    /// A tree for a single distinct symbol has that leaf as its root.
    pub fn is_single_symbol(&self) -> bool {
        matches!(self.nodes[self.root], HuffmanNode::Leaf { .. })
    }

    /// Pre-order walk assigning `0` to left edges and `1` to right edges.
    /// A lone root leaf gets the one-bit code `0`.
    pub fn code_table(&self) -> CodeTable {
        let mut codes = CodeTable::empty();
        let mut stack = vec![(self.root, Code::default())];

        while let Some((index, prefix)) = stack.pop() {
            match self.nodes[index] {
                HuffmanNode::Leaf { symbol, .. } => {
                    let code = if prefix.is_empty() {
                        prefix.with_bit(false)
                    } else {
                        prefix
                    };
                    codes.codes[usize::from(symbol)] = Some(code);
                }
                HuffmanNode::Internal { left, right, .. } => {
                    stack.push((right, prefix.with_bit(true)));
                    stack.push((left, prefix.with_bit(false)));
                }
            }
        }

        codes
    }
}

/// Bit string packed MSB-first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Code {
    packed: Vec<u8>,
    len: usize,
}

impl Code {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bit(&self, index: usize) -> bool {
        index < self.len && self.packed[index / 8] & (0x80 >> (index % 8)) != 0
    }

    pub fn is_prefix_of(&self, other: &Code) -> bool {
        self.len <= other.len && (0..self.len).all(|index| self.bit(index) == other.bit(index))
    }

    fn push(&mut self, bit: bool) {
        if self.len % 8 == 0 {
            self.packed.push(0);
        }
        if bit && let Some(last) = self.packed.last_mut() {
            *last |= 0x80 >> (self.len % 8);
        }
        self.len += 1;
    }

    fn with_bit(&self, bit: bool) -> Self {
        let mut next = self.clone();
        next.push(bit);
        next
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for index in 0..self.len {
            f.write_str(if self.bit(index) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTable {
    codes: Vec<Option<Code>>,
}

impl CodeTable {
    fn empty() -> Self {
        Self {
            codes: vec![None; SYMBOL_COUNT],
        }
    }

    pub fn get(&self, symbol: u8) -> Option<&Code> {
        self.codes[usize::from(symbol)].as_ref()
    }

    pub fn len(&self) -> usize {
        self.codes.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &Code)> + '_ {
        (0..=u8::MAX)
            .zip(self.codes.iter())
            .filter_map(|(symbol, code)| code.as_ref().map(|code| (symbol, code)))
    }

    /// Total bits needed to encode data with the given frequencies.
    pub fn weighted_length(&self, table: &FrequencyTable) -> u64 {
        table
            .iter()
            .filter_map(|(symbol, count)| self.get(symbol).map(|code| count * code.len() as u64))
            .sum()
    }
}

/// One partition's bitstream, right-padded with zero bits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedChunk {
    pub bytes: Vec<u8>,
    pub bit_len: usize,
    pub symbol_count: usize,
}

struct BitWriter {
    out: Vec<u8>,
    bitbuf: u64,
    bitcount: u32,
    total_bits: usize,
}

impl BitWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            out: Vec::with_capacity(capacity),
            bitbuf: 0,
            bitcount: 0,
            total_bits: 0,
        }
    }

    fn write_bits(&mut self, value: u32, bits: u32) {
        if bits == 0 {
            return;
        }
        let mask = (1_u64 << bits) - 1;
        self.bitbuf = (self.bitbuf << bits) | (u64::from(value) & mask);
        self.bitcount += bits;
        self.total_bits += bits as usize;

        while self.bitcount >= 8 {
            self.bitcount -= 8;
            self.out.push((self.bitbuf >> self.bitcount) as u8);
        }
        self.bitbuf &= (1_u64 << self.bitcount) - 1;
    }

    fn write_code(&mut self, code: &Code) {
        let full_bytes = code.len / 8;
        for &byte in &code.packed[..full_bytes] {
            self.write_bits(u32::from(byte), 8);
        }
        let rem = (code.len % 8) as u32;
        if rem > 0 {
            self.write_bits(u32::from(code.packed[full_bytes] >> (8 - rem)), rem);
        }
    }

    fn bit_len(&self) -> usize {
        self.total_bits
    }

    fn finish(mut self) -> Vec<u8> {
        if self.bitcount > 0 {
            self.out.push((self.bitbuf << (8 - self.bitcount)) as u8);
        }
        self.out
    }
}

pub fn encode(data: &[u8], codes: &CodeTable) -> Result<EncodedChunk, CozipHuffmanError> {
    let mut writer = BitWriter::with_capacity(data.len() / 2 + 1);
    for &symbol in data {
        let code = codes
            .get(symbol)
            .ok_or(CozipHuffmanError::UnknownSymbol(symbol))?;
        writer.write_code(code);
    }

    let bit_len = writer.bit_len();
    Ok(EncodedChunk {
        bytes: writer.finish(),
        bit_len,
        symbol_count: data.len(),
    })
}

/// Walks `tree` bit by bit (MSB-first) until `symbol_count` symbols have
/// been produced. Bits left in the final byte after that are padding and
/// are ignored; whole bytes left over are rejected.
pub fn decode(
    bytes: &[u8],
    tree: &HuffmanTree,
    symbol_count: usize,
) -> Result<Vec<u8>, CozipHuffmanError> {
    if symbol_count == 0 {
        if !bytes.is_empty() {
            return Err(CozipHuffmanError::InvalidArtifact(
                "trailing bytes in partition",
            ));
        }
        return Ok(Vec::new());
    }

    if let HuffmanNode::Leaf { symbol, .. } = tree.nodes[tree.root] {
        return decode_single_symbol(bytes, symbol, symbol_count);
    }

    let mut out = Vec::with_capacity(symbol_count.min(bytes.len().saturating_mul(8)));
    let mut consumed = 0;
    let mut node = tree.root;
    'walk: for (index, &byte) in bytes.iter().enumerate() {
        for shift in (0..8).rev() {
            node = match tree.nodes[node] {
                HuffmanNode::Internal { left, right, .. } => {
                    if (byte >> shift) & 1 == 0 {
                        left
                    } else {
                        right
                    }
                }
                HuffmanNode::Leaf { .. } => {
                    return Err(CozipHuffmanError::Internal("tree walk resumed at a leaf"));
                }
            };

            if let HuffmanNode::Leaf { symbol, .. } = tree.nodes[node] {
                out.push(symbol);
                node = tree.root;
                if out.len() == symbol_count {
                    consumed = index + 1;
                    break 'walk;
                }
            }
        }
    }

    if out.len() < symbol_count {
        return Err(CozipHuffmanError::InvalidArtifact("truncated partition"));
    }
    if consumed != bytes.len() {
        return Err(CozipHuffmanError::InvalidArtifact(
            "trailing bytes in partition",
        ));
    }
    Ok(out)
}

fn decode_single_symbol(
    bytes: &[u8],
    symbol: u8,
    symbol_count: usize,
) -> Result<Vec<u8>, CozipHuffmanError> {
    let needed_bytes = symbol_count.div_ceil(8);
    if bytes.len() < needed_bytes {
        return Err(CozipHuffmanError::InvalidArtifact("truncated partition"));
    }
    if bytes.len() > needed_bytes {
        return Err(CozipHuffmanError::InvalidArtifact(
            "trailing bytes in partition",
        ));
    }

    let full_bytes = symbol_count / 8;
    let tail_bits = symbol_count % 8;
    let tail_ok = tail_bits == 0 || bytes[full_bytes] >> (8 - tail_bits) == 0;
    if bytes[..full_bytes].iter().any(|&byte| byte != 0) || !tail_ok {
        return Err(CozipHuffmanError::InvalidArtifact(
            "set bit in single-symbol stream",
        ));
    }

    Ok(vec![symbol; symbol_count])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_from_weights(weights: &[(u8, u64)]) -> FrequencyTable {
        let mut table = FrequencyTable::new();
        for &(symbol, weight) in weights {
            table.set(symbol, weight);
        }
        table
    }

    fn code_string(codes: &CodeTable, symbol: u8) -> String {
        codes
            .get(symbol)
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    #[test]
    fn builds_expected_codes_for_small_table() {
        let table = FrequencyTable::from_data(b"aaabbc");
        let tree = HuffmanTree::build(&table).expect("tree should build");
        let codes = tree.code_table();

        assert_eq!(tree.weight(), 6);
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(code_string(&codes, b'a'), "0");
        assert_eq!(code_string(&codes, b'c'), "10");
        assert_eq!(code_string(&codes, b'b'), "11");
    }

    #[test]
    fn encodes_msb_first_with_zero_padding() {
        let table = FrequencyTable::from_data(b"aaabbc");
        let codes = HuffmanTree::build(&table)
            .expect("tree should build")
            .code_table();
        let chunk = encode(b"aaabbc", &codes).expect("encode should succeed");

        // 000 11 11 10 -> 0001_1111 0(000_0000)
        assert_eq!(chunk.bytes, vec![0x1f, 0x00]);
        assert_eq!(chunk.bit_len, 9);
        assert_eq!(chunk.symbol_count, 6);
    }

    #[test]
    fn decode_stops_before_padding() {
        let table = FrequencyTable::from_data(b"aaabbc");
        let tree = HuffmanTree::build(&table).expect("tree should build");
        let chunk = encode(b"aaabbc", &tree.code_table()).expect("encode should succeed");

        // the seven padding zeros would otherwise decode as seven extra 'a'
        let decoded = decode(&chunk.bytes, &tree, chunk.symbol_count).expect("decode should succeed");
        assert_eq!(decoded, b"aaabbc");
    }

    #[test]
    fn decode_reports_truncated_stream() {
        let table = FrequencyTable::from_data(b"aaabbc");
        let tree = HuffmanTree::build(&table).expect("tree should build");
        let error = decode(&[0x1f], &tree, 6).expect_err("missing byte should fail");
        assert!(matches!(
            error,
            CozipHuffmanError::InvalidArtifact("truncated partition")
        ));
    }

    #[test]
    fn decode_rejects_whole_bytes_after_the_last_symbol() {
        let table = FrequencyTable::from_data(b"aaabbc");
        let tree = HuffmanTree::build(&table).expect("tree should build");
        for (bytes, count) in [(&[0x1f, 0x00, 0x00][..], 6), (&[0x00][..], 0)] {
            assert!(matches!(
                decode(bytes, &tree, count),
                Err(CozipHuffmanError::InvalidArtifact("trailing bytes in partition"))
            ));
        }

        let single = HuffmanTree::build(&FrequencyTable::from_data(b"zz")).expect("tree should build");
        assert!(matches!(
            decode(&[0, 0], &single, 2),
            Err(CozipHuffmanError::InvalidArtifact("trailing bytes in partition"))
        ));
    }

    #[test]
    fn empty_table_has_no_tree() {
        let error = HuffmanTree::build(&FrequencyTable::new()).expect_err("empty table");
        assert!(matches!(error, CozipHuffmanError::EmptyFrequencyTable));
    }

    #[test]
    fn single_symbol_uses_one_bit_code() {
        let table = FrequencyTable::from_data(b"zzzzzzzzzzz");
        let tree = HuffmanTree::build(&table).expect("tree should build");
        assert!(tree.is_single_symbol());

        let codes = tree.code_table();
        assert_eq!(code_string(&codes, b'z'), "0");

        let chunk = encode(b"zzzzzzzzzzz", &codes).expect("encode should succeed");
        assert_eq!(chunk.bit_len, 11);
        assert_eq!(chunk.bytes, vec![0, 0]);
        assert_eq!(
            decode(&chunk.bytes, &tree, 11).expect("decode should succeed"),
            b"zzzzzzzzzzz"
        );
        assert!(decode(&[0x80, 0], &tree, 11).is_err());
        assert!(decode(&[0], &tree, 11).is_err());
    }

    #[test]
    fn unknown_symbol_is_a_lookup_failure() {
        let codes = HuffmanTree::build(&FrequencyTable::from_data(b"ab"))
            .expect("tree should build")
            .code_table();
        let error = encode(b"abc", &codes).expect_err("'c' has no code");
        assert!(matches!(error, CozipHuffmanError::UnknownSymbol(b'c')));
    }

    #[test]
    fn equal_weights_build_the_same_tree_every_time() {
        let table = table_from_weights(&[(b'w', 4), (b'x', 4), (b'y', 4), (b'z', 4), (b'q', 8)]);
        let first = HuffmanTree::build(&table).expect("tree should build");
        for _ in 0..16 {
            assert_eq!(HuffmanTree::build(&table).expect("tree should build"), first);
        }

        let codes = first.code_table();
        // leaf q(8) is older than the merged (w,x) node of equal weight, so it pops first
        assert_eq!(code_string(&codes, b'y'), "00");
        assert_eq!(code_string(&codes, b'z'), "01");
        assert_eq!(code_string(&codes, b'q'), "10");
        assert_eq!(code_string(&codes, b'w'), "110");
        assert_eq!(code_string(&codes, b'x'), "111");
    }

    #[test]
    fn codes_are_prefix_free_and_satisfy_kraft_equality() {
        let data: Vec<u8> = (0..4096_u32).map(|i| ((i * i + 3 * i) % 97) as u8).collect();
        let table = FrequencyTable::from_data(&data);
        let codes = HuffmanTree::build(&table)
            .expect("tree should build")
            .code_table();
        let all: Vec<&Code> = codes.iter().map(|(_, code)| code).collect();

        for (i, a) in all.iter().enumerate() {
            for (j, b) in all.iter().enumerate() {
                if i != j {
                    assert!(!a.is_prefix_of(b), "{a} is a prefix of {b}");
                }
            }
        }

        let max_len = all.iter().map(|code| code.len()).max().unwrap_or(0);
        let kraft: u128 = all
            .iter()
            .map(|code| 1_u128 << (max_len - code.len()))
            .sum();
        assert_eq!(kraft, 1_u128 << max_len);
    }

    #[test]
    fn weighted_length_is_optimal_on_known_fixtures() {
        let fixtures: [(&[(u8, u64)], u64); 4] = [
            (&[(b'a', 3), (b'b', 2), (b'c', 1)], 9),
            (&[(1, 1), (2, 1), (3, 2), (4, 3), (5, 5), (6, 8)], 45),
            (&[(b'a', 5), (b'b', 9), (b'c', 12), (b'd', 13), (b'e', 16), (b'f', 45)], 224),
            (&[(b'a', 1), (b'b', 1), (b'c', 1), (b'd', 1)], 8),
        ];

        for (weights, optimal) in fixtures {
            let table = table_from_weights(weights);
            let codes = HuffmanTree::build(&table)
                .expect("tree should build")
                .code_table();
            assert_eq!(codes.weighted_length(&table), optimal, "weights {weights:?}");
        }
    }

    #[test]
    fn all_byte_values_roundtrip() {
        let data: Vec<u8> = (0..=u8::MAX).chain((0..=u8::MAX).rev()).chain([7; 64]).collect();
        let table = FrequencyTable::from_data(&data);
        let tree = HuffmanTree::build(&table).expect("tree should build");
        let chunk = encode(&data, &tree.code_table()).expect("encode should succeed");
        let decoded = decode(&chunk.bytes, &tree, chunk.symbol_count).expect("decode should succeed");
        assert_eq!(decoded, data);
    }

    #[test]
    fn long_codes_cross_byte_boundaries() {
        // fibonacci weights give a maximally skewed tree
        let mut weights = Vec::new();
        let (mut a, mut b) = (1_u64, 1_u64);
        for symbol in 0..20_u8 {
            weights.push((symbol, a));
            (a, b) = (b, a + b);
        }
        let table = table_from_weights(&weights);
        let tree = HuffmanTree::build(&table).expect("tree should build");
        let codes = tree.code_table();
        assert_eq!(codes.get(0).map(Code::len), Some(19));

        let data: Vec<u8> = (0..20_u8).cycle().take(200).collect();
        let chunk = encode(&data, &codes).expect("encode should succeed");
        assert_eq!(
            decode(&chunk.bytes, &tree, data.len()).expect("decode should succeed"),
            data
        );
    }
}
