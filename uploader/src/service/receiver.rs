use std::io;
use std::sync::Arc;

use tracing::info;

use super::Result;
use crate::domain::{ChunkName, FileHash};
use crate::error::AppError;
use crate::storage::{ByteStream, Storage};

/// Identity fields of a chunk submission as they arrive in the request.
#[derive(Debug, Default, Clone)]
pub struct ChunkFields {
    pub file_hash: Option<String>,
    pub chunk_hash: Option<String>,
    pub index: Option<String>,
}

impl ChunkFields {
    /// Whether the chunk can be stored as soon as its payload shows up.
    pub fn is_complete(&self) -> bool {
        self.file_hash.is_some() && self.chunk_hash.is_some() && self.index.is_some()
    }

    /// Without an `index` field the chunk hash must carry the index itself,
    /// as in `<file_hash>-<index>`.
    pub fn resolve(&self) -> Result<(FileHash, ChunkName)> {
        let file_hash = self
            .file_hash
            .as_deref()
            .ok_or(AppError::MissingField("fileHash"))?;
        let chunk_hash = self
            .chunk_hash
            .as_deref()
            .ok_or(AppError::MissingField("chunkHash"))?;
        let file_hash = FileHash::parse(file_hash.trim())?;

        let chunk = match self.index.as_deref().map(str::trim) {
            Some(index) => {
                let index = index.parse::<u64>().map_err(|_| {
                    AppError::InvalidInput(format!("invalid chunk index `{index}`"))
                })?;
                ChunkName::new(chunk_hash.trim(), index)?
            }
            None => {
                let parsed = ChunkName::parse(chunk_hash.trim()).ok_or_else(|| {
                    AppError::InvalidInput(format!(
                        "chunk hash `{chunk_hash}` must end with `-<index>` when no index is sent"
                    ))
                })?;
                ChunkName::new(&parsed.hash, parsed.index)?
            }
        };
        Ok((file_hash, chunk))
    }
}

/// Chunks currently held for an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadStatus {
    pub chunks: Vec<u64>,
    pub bytes: u64,
}

pub struct ChunkReceiver {
    storage: Arc<dyn Storage>,
}

impl ChunkReceiver {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn receive(
        &self,
        file_hash: &FileHash,
        chunk: &ChunkName,
        data: ByteStream<'_>,
    ) -> Result<u64> {
        let bytes = self.storage.write_chunk(file_hash, chunk, data).await?;
        info!(%file_hash, %chunk, index = chunk.index, bytes, "stored chunk");
        Ok(bytes)
    }

    pub async fn status(&self, file_hash: &FileHash) -> Result<UploadStatus> {
        match self.storage.list_chunks(file_hash).await {
            Ok(records) => Ok(UploadStatus {
                chunks: records.iter().map(|r| r.name.index).collect(),
                bytes: records.iter().map(|r| r.len).sum(),
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(UploadStatus::default()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::byte_stream;
    use crate::storage::driver::filesystem::FilesystemStorage;
    use bytes::Bytes;

    fn fields(file_hash: Option<&str>, chunk_hash: Option<&str>, index: Option<&str>) -> ChunkFields {
        ChunkFields {
            file_hash: file_hash.map(str::to_owned),
            chunk_hash: chunk_hash.map(str::to_owned),
            index: index.map(str::to_owned),
        }
    }

    #[test]
    fn test_resolve_with_explicit_index() {
        let (file_hash, chunk) = fields(Some("H"), Some("c0ffee"), Some("3"))
            .resolve()
            .unwrap();
        assert_eq!(file_hash.as_str(), "H");
        assert_eq!(chunk.to_string(), "c0ffee-3");
    }

    #[test]
    fn test_resolve_takes_index_from_chunk_hash() {
        let (_, chunk) = fields(Some("H"), Some("H-12"), None).resolve().unwrap();
        assert_eq!(chunk.hash, "H");
        assert_eq!(chunk.index, 12);
    }

    #[test]
    fn test_resolve_reports_missing_fields() {
        assert!(matches!(
            fields(None, Some("c"), Some("0")).resolve(),
            Err(AppError::MissingField("fileHash"))
        ));
        assert!(matches!(
            fields(Some("H"), None, Some("0")).resolve(),
            Err(AppError::MissingField("chunkHash"))
        ));
    }

    #[test]
    fn test_resolve_rejects_bad_values() {
        for f in [
            fields(Some("H"), Some("c"), Some("-1")),
            fields(Some("H"), Some("c"), Some("one")),
            fields(Some("H"), Some("c"), None),
            fields(Some("../H"), Some("c"), Some("0")),
            fields(Some("H"), Some("../c"), Some("0")),
        ] {
            assert!(
                matches!(f.resolve(), Err(AppError::InvalidInput(_))),
                "{f:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_receive_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let receiver = ChunkReceiver::new(Arc::new(FilesystemStorage::new(dir.path())));
        let h = FileHash::parse("H").unwrap();

        assert_eq!(receiver.status(&h).await.unwrap(), UploadStatus::default());

        for (index, data) in [(2u64, &b"CC"[..]), (0, &b"AAAAA"[..]), (1, &b"BBBBB"[..])] {
            let chunk = ChunkName::new("H", index).unwrap();
            let stored = receiver
                .receive(&h, &chunk, byte_stream(Bytes::copy_from_slice(data)))
                .await
                .unwrap();
            assert_eq!(stored, data.len() as u64);
        }

        let status = receiver.status(&h).await.unwrap();
        assert_eq!(status.chunks, vec![0, 1, 2]);
        assert_eq!(status.bytes, 12);
    }
}
