use crate::CozipHuffmanError;
use crate::frame::{read_i32, read_u32, write_u32};

pub const SYMBOL_COUNT: usize = 256;
const ENTRY_LEN: usize = 5;

/// Occurrence count of every byte value in a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    counts: [u64; SYMBOL_COUNT],
}

impl Default for FrequencyTable {
    fn default() -> Self {
        Self {
            counts: [0; SYMBOL_COUNT],
        }
    }
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: &[u8]) -> Self {
        let mut table = Self::new();
        table.add(data);
        table
    }

    pub fn add(&mut self, data: &[u8]) {
        for &symbol in data {
            self.counts[usize::from(symbol)] += 1;
        }
    }

    pub fn set(&mut self, symbol: u8, count: u64) {
        self.counts[usize::from(symbol)] = count;
    }

    pub fn get(&self, symbol: u8) -> u64 {
        self.counts[usize::from(symbol)]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn distinct_symbols(&self) -> usize {
        self.counts.iter().filter(|&&count| count > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|&count| count == 0)
    }

    /// Symbols with a non-zero count, in ascending symbol order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, u64)> + '_ {
        (0..=u8::MAX)
            .zip(self.counts.iter().copied())
            .filter(|&(_, count)| count > 0)
    }

    /// Appends `[u32 entry_count]` followed by one `[u8 symbol][i32 count]`
    /// entry per present symbol, ascending.
    pub fn write_entries(&self, out: &mut Vec<u8>) -> Result<(), CozipHuffmanError> {
        let entry_count =
            u32::try_from(self.distinct_symbols()).map_err(|_| CozipHuffmanError::DataTooLarge)?;
        write_u32(out, entry_count);
        out.reserve(self.distinct_symbols() * ENTRY_LEN);

        for (symbol, count) in self.iter() {
            let count = i32::try_from(count).map_err(|_| CozipHuffmanError::DataTooLarge)?;
            out.push(symbol);
            out.extend_from_slice(&count.to_le_bytes());
        }
        Ok(())
    }

    /// Reads a table written by [`FrequencyTable::write_entries`] starting at
    /// `offset`. Returns the table and the offset just past it.
    ///
    /// Entries may come in any order; zero counts are skipped.
    pub fn read_entries(bytes: &[u8], offset: usize) -> Result<(Self, usize), CozipHuffmanError> {
        let entry_count = read_u32(bytes, offset)? as usize;
        if entry_count > SYMBOL_COUNT {
            return Err(CozipHuffmanError::InvalidArtifact(
                "frequency table has more than 256 entries",
            ));
        }

        let entries_start = offset + 4;
        let entries_end = entries_start + entry_count * ENTRY_LEN;
        if bytes.len() < entries_end {
            return Err(CozipHuffmanError::InvalidArtifact(
                "truncated frequency table",
            ));
        }

        let mut table = Self::new();
        let mut seen = [false; SYMBOL_COUNT];
        for cursor in (entries_start..entries_end).step_by(ENTRY_LEN) {
            let symbol = bytes[cursor];
            let count = read_i32(bytes, cursor + 1)?;
            if count < 0 {
                return Err(CozipHuffmanError::InvalidArtifact(
                    "negative symbol frequency",
                ));
            }
            if std::mem::replace(&mut seen[usize::from(symbol)], true) {
                return Err(CozipHuffmanError::InvalidArtifact(
                    "duplicate symbol in frequency table",
                ));
            }
            table.set(symbol, count.unsigned_abs().into());
        }

        Ok((table, entries_end))
    }
}
