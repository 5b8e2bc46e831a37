use std::path::PathBuf;
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use tokio::{fs::File, io};

use crate::domain::{ArtifactKey, ChunkName, ChunkRecord, FileHash};

pub mod driver;
pub mod paths;

/// Chunk payload as it arrives from the client.
pub type ByteStream<'a> = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'a>>;

/// An artifact being assembled, pre-sized to its final length.
#[derive(Debug, Clone)]
pub struct StagingFile {
    pub path: PathBuf,
    pub len: u64,
}

#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// Stores a chunk under `<chunk_hash>-<index>`, creating the chunk
    /// directory on first use and replacing an existing chunk of the same
    /// name. Returns the number of bytes stored.
    async fn write_chunk<'a>(
        &self,
        file_hash: &FileHash,
        chunk: &ChunkName,
        stream: ByteStream<'a>,
    ) -> io::Result<u64>;
    /// Lists stored chunks sorted by numeric index. Fails with `NotFound` when
    /// no chunk directory exists.
    async fn list_chunks(&self, file_hash: &FileHash) -> io::Result<Vec<ChunkRecord>>;
    async fn read_chunk(&self, file_hash: &FileHash, chunk: &ChunkRecord) -> io::Result<File>;
    async fn delete_chunk(&self, file_hash: &FileHash, chunk: &ChunkRecord) -> io::Result<()>;
    async fn delete_chunk_dir(&self, file_hash: &FileHash) -> io::Result<()>;
    async fn artifact_exists(&self, artifact: &ArtifactKey) -> io::Result<bool>;
    async fn create_staging(&self, artifact: &ArtifactKey, len: u64) -> io::Result<StagingFile>;
    async fn open_staging(&self, staging: &StagingFile) -> io::Result<File>;
    /// Flushes the staging file and renames it onto the artifact path. Fails
    /// with `InvalidData`, leaving the staging file in place, when its length
    /// no longer matches the length it was created with.
    async fn commit_staging(&self, staging: StagingFile, artifact: &ArtifactKey) -> io::Result<()>;
    async fn discard_staging(&self, staging: StagingFile) -> io::Result<()>;
    /// Removes staging files left behind by interrupted merges.
    async fn sweep_staging(&self) -> io::Result<usize>;
}

/// Wraps an in-memory payload, mostly for chunks that had to be buffered.
pub fn byte_stream(data: Bytes) -> ByteStream<'static> {
    Box::pin(futures::stream::once(async move { Ok(data) }))
}
