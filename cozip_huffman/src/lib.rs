use std::fs::File as StdFile;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;

const ARTIFACT_MAGIC: [u8; 4] = *b"CZHF";
const ARTIFACT_VERSION: u8 = 1;
const PREAMBLE_LEN: usize = 6;
const PARTITION_META_LEN: usize = 12;
const FALLBACK_WORKER_COUNT: usize = 12;

mod frame;
mod frequency;
mod huffman;
mod pipeline;
mod pool;


pub use frequency::{FrequencyTable, SYMBOL_COUNT};
pub use huffman::{Code, CodeTable, EncodedChunk, HuffmanNode, HuffmanTree, decode, encode};
pub use pipeline::split_ranges;
pub use pool::{TaskHandle, ThreadPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactFormat {
    /// `[u32 entry_count][entries][payload]`, no partition metadata.
    Legacy,
    /// Magic-tagged header with a per-partition symbol count, byte length
    /// and CRC-32 ahead of the payload.
    #[default]
    Partitioned,
}

#[derive(Debug, Clone)]
pub struct HuffmanOptions {
    pub worker_count: usize,
    /// Defaults to one partition per worker.
    pub partition_count: Option<usize>,
    pub artifact_format: ArtifactFormat,
    pub verify_checksums: bool,
    pub profile_timing: bool,
}

impl Default for HuffmanOptions {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(FALLBACK_WORKER_COUNT),
            partition_count: None,
            artifact_format: ArtifactFormat::Partitioned,
            verify_checksums: true,
            profile_timing: false,
        }
    }
}

impl HuffmanOptions {
    pub fn effective_partition_count(&self) -> usize {
        self.partition_count.unwrap_or(self.worker_count)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HuffmanStats {
    pub format: ArtifactFormat,
    pub partition_count: usize,
    pub symbol_count: usize,
    pub distinct_symbols: usize,
    pub payload_bytes: usize,
    /// Frequency scan and tree build (encode), or header parse and tree
    /// rebuild (decode).
    pub prepare: Duration,
    /// Partition tasks plus assembly.
    pub dispatch: Duration,
}

impl HuffmanStats {
    /// `"<dispatch_ms> + <prepare_ms>"`.
    pub fn timing_label(&self) -> String {
        format!("{} + {}", self.dispatch.as_millis(), self.prepare.as_millis())
    }
}

#[derive(Debug, Clone)]
pub struct EncodedArtifact {
    pub bytes: Vec<u8>,
    pub stats: HuffmanStats,
}

#[derive(Debug, Clone)]
pub struct DecodedArtifact {
    pub bytes: Vec<u8>,
    pub stats: HuffmanStats,
}

/// Owns a worker pool and runs the partitioned encode and decode pipelines
/// on it.
#[derive(Debug)]
pub struct CoZipHuffman {
    options: HuffmanOptions,
    pool: ThreadPool,
}

impl CoZipHuffman {
    pub fn init(options: HuffmanOptions) -> Result<Self, CozipHuffmanError> {
        validate_options(&options)?;
        let pool = ThreadPool::new(options.worker_count)?;
        Ok(Self { options, pool })
    }

    pub fn options(&self) -> &HuffmanOptions {
        &self.options
    }

    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    pub fn encode(&self, input: &[u8]) -> Result<EncodedArtifact, CozipHuffmanError> {
        pipeline::encode_with_pool(&self.pool, input, &self.options)
    }

    pub fn decode(&self, artifact: &[u8]) -> Result<DecodedArtifact, CozipHuffmanError> {
        pipeline::decode_with_pool(&self.pool, artifact, &self.options)
    }

    pub fn encode_stream<R: Read, W: Write>(
        &self,
        reader: &mut R,
        writer: &mut W,
    ) -> Result<HuffmanStats, CozipHuffmanError> {
        let mut input = Vec::new();
        reader.read_to_end(&mut input)?;
        let encoded = self.encode(&input)?;
        writer.write_all(&encoded.bytes)?;
        writer.flush()?;
        Ok(encoded.stats)
    }

    pub fn decode_stream<R: Read, W: Write>(
        &self,
        reader: &mut R,
        writer: &mut W,
    ) -> Result<HuffmanStats, CozipHuffmanError> {
        let mut artifact = Vec::new();
        reader.read_to_end(&mut artifact)?;
        let decoded = self.decode(&artifact)?;
        writer.write_all(&decoded.bytes)?;
        writer.flush()?;
        Ok(decoded.stats)
    }

    pub fn encode_file(
        &self,
        input_file: StdFile,
        output_file: StdFile,
    ) -> Result<HuffmanStats, CozipHuffmanError> {
        let mut reader = std::io::BufReader::new(input_file);
        let mut writer = std::io::BufWriter::new(output_file);
        self.encode_stream(&mut reader, &mut writer)
    }

    pub fn decode_file(
        &self,
        input_file: StdFile,
        output_file: StdFile,
    ) -> Result<HuffmanStats, CozipHuffmanError> {
        let mut reader = std::io::BufReader::new(input_file);
        let mut writer = std::io::BufWriter::new(output_file);
        self.decode_stream(&mut reader, &mut writer)
    }

    pub fn encode_file_from_name<PIn: AsRef<Path>, POut: AsRef<Path>>(
        &self,
        input_path: PIn,
        output_path: POut,
    ) -> Result<HuffmanStats, CozipHuffmanError> {
        let input = StdFile::open(input_path)?;
        let output = StdFile::create(output_path)?;
        self.encode_file(input, output)
    }

    pub fn decode_file_from_name<PIn: AsRef<Path>, POut: AsRef<Path>>(
        &self,
        input_path: PIn,
        output_path: POut,
    ) -> Result<HuffmanStats, CozipHuffmanError> {
        let input = StdFile::open(input_path)?;
        let output = StdFile::create(output_path)?;
        self.decode_file(input, output)
    }

    pub async fn encode_file_async(
        &self,
        mut input_file: tokio::fs::File,
        mut output_file: tokio::fs::File,
    ) -> Result<HuffmanStats, CozipHuffmanError> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut input = Vec::new();
        input_file.read_to_end(&mut input).await?;
        let encoded = self.encode(&input)?;
        output_file.write_all(&encoded.bytes).await?;
        output_file.flush().await?;
        Ok(encoded.stats)
    }

    pub async fn decode_file_async(
        &self,
        mut input_file: tokio::fs::File,
        mut output_file: tokio::fs::File,
    ) -> Result<HuffmanStats, CozipHuffmanError> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut artifact = Vec::new();
        input_file.read_to_end(&mut artifact).await?;
        let decoded = self.decode(&artifact)?;
        output_file.write_all(&decoded.bytes).await?;
        output_file.flush().await?;
        Ok(decoded.stats)
    }

    pub async fn encode_file_from_name_async<PIn: AsRef<Path>, POut: AsRef<Path>>(
        &self,
        input_path: PIn,
        output_path: POut,
    ) -> Result<HuffmanStats, CozipHuffmanError> {
        let input = tokio::fs::File::open(input_path).await?;
        let output = tokio::fs::File::create(output_path).await?;
        self.encode_file_async(input, output).await
    }

    pub async fn decode_file_from_name_async<PIn: AsRef<Path>, POut: AsRef<Path>>(
        &self,
        input_path: PIn,
        output_path: POut,
    ) -> Result<HuffmanStats, CozipHuffmanError> {
        let input = tokio::fs::File::open(input_path).await?;
        let output = tokio::fs::File::create(output_path).await?;
        self.decode_file_async(input, output).await
    }

    /// Stops the pool and joins its workers. Later calls fail with
    /// [`CozipHuffmanError::PoolShutdown`].
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

#[derive(Debug, Error)]
pub enum CozipHuffmanError {
    #[error("invalid options: {0}")]
    InvalidOptions(&'static str),
    #[error("invalid artifact: {0}")]
    InvalidArtifact(&'static str),
    #[error("checksum mismatch in partition {partition}")]
    ChecksumMismatch { partition: usize },
    #[error("symbol {0:#04x} has no code in the code table")]
    UnknownSymbol(u8),
    #[error("frequency table is empty")]
    EmptyFrequencyTable,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("data too large")]
    DataTooLarge,
    #[error("task panicked: {0}")]
    TaskPanicked(String),
    #[error("task abandoned before it started")]
    TaskAbandoned,
    #[error("{failed} of {total} partitions failed; partition {partition}: {source}")]
    Partitions {
        failed: usize,
        total: usize,
        partition: usize,
        source: Box<CozipHuffmanError>,
    },
    #[error("thread pool is shut down")]
    PoolShutdown,
    #[error("failed to spawn worker thread: {0}")]
    PoolSpawn(std::io::Error),
    #[error("internal error: {0}")]
    Internal(&'static str),
}

pub fn encode_parallel(
    input: &[u8],
    options: &HuffmanOptions,
) -> Result<EncodedArtifact, CozipHuffmanError> {
    validate_options(options)?;
    let pool = ThreadPool::new(options.worker_count)?;
    pipeline::encode_with_pool(&pool, input, options)
}

pub fn decode_parallel(
    artifact: &[u8],
    options: &HuffmanOptions,
) -> Result<DecodedArtifact, CozipHuffmanError> {
    validate_options(options)?;
    let pool = ThreadPool::new(options.worker_count)?;
    pipeline::decode_with_pool(&pool, artifact, options)
}

fn validate_options(options: &HuffmanOptions) -> Result<(), CozipHuffmanError> {
    if options.worker_count == 0 {
        return Err(CozipHuffmanError::InvalidOptions(
            "worker_count must be greater than 0",
        ));
    }

    if options.partition_count == Some(0) {
        return Err(CozipHuffmanError::InvalidOptions(
            "partition_count must be greater than 0",
        ));
    }

    if u32::try_from(options.effective_partition_count()).is_err() {
        return Err(CozipHuffmanError::InvalidOptions(
            "partition_count must fit in u32",
        ));
    }

    Ok(())
}

/// No user code runs while a pool lock is held, so a poisoned lock still
/// guards consistent state.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
