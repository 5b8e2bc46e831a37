use std::path::Path;

use crate::domain::{ArtifactKey, ChunkName, ChunkRecord, FileHash};
use crate::storage::paths::PathManager;
use crate::storage::{ByteStream, StagingFile, Storage};

use tokio::{
    fs::{
        File, OpenOptions, create_dir_all, read_dir, remove_dir_all, remove_file, rename,
        try_exists,
    },
    io::{self, AsyncWriteExt, BufWriter},
};
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

pub struct FilesystemStorage {
    path_manager: PathManager,
}

impl FilesystemStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        FilesystemStorage {
            path_manager: PathManager::new(root),
        }
    }
}

#[async_trait::async_trait]
impl Storage for FilesystemStorage {
    async fn write_chunk<'a>(
        &self,
        file_hash: &FileHash,
        chunk: &ChunkName,
        stream: ByteStream<'a>,
    ) -> io::Result<u64> {
        // Two first chunks of the same upload may race here; create_dir_all
        // succeeds for both.
        create_dir_all(self.path_manager.chunk_dir(file_hash)).await?;

        let upload_path = self.path_manager.chunk_upload_path(file_hash, chunk);
        let chunk_path = self.path_manager.chunk_path(file_hash, &chunk.to_string());

        let written = async {
            let mut body_reader = StreamReader::new(stream);
            let file = File::create(&upload_path).await?;
            let mut file_writer = BufWriter::new(file);
            let written = tokio::io::copy(&mut body_reader, &mut file_writer).await?;
            file_writer.flush().await?;
            Ok::<_, io::Error>(written)
        }
        .await;

        match written {
            Ok(written) => {
                rename(&upload_path, &chunk_path).await?;
                Ok(written)
            }
            Err(err) => {
                if let Err(cleanup) = remove_file(&upload_path).await {
                    debug!(path = %upload_path.display(), "could not remove partial chunk: {cleanup}");
                }
                Err(err)
            }
        }
    }

    async fn list_chunks(&self, file_hash: &FileHash) -> io::Result<Vec<ChunkRecord>> {
        let mut records = vec![];
        let mut entries = read_dir(self.path_manager.chunk_dir(file_hash)).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }
            let Some(name) = ChunkName::parse(&file_name) else {
                warn!(%file_hash, file_name = file_name.as_str(), "ignoring unrecognised file in chunk directory");
                continue;
            };
            let len = entry.metadata().await?.len();
            records.push(ChunkRecord {
                name,
                file_name,
                len,
            });
        }
        // Numeric order on the index; file names break ties so the result
        // does not depend on directory iteration order.
        records.sort_by(|a, b| {
            a.name
                .index
                .cmp(&b.name.index)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        Ok(records)
    }

    async fn read_chunk(&self, file_hash: &FileHash, chunk: &ChunkRecord) -> io::Result<File> {
        File::open(self.path_manager.chunk_path(file_hash, &chunk.file_name)).await
    }

    async fn delete_chunk(&self, file_hash: &FileHash, chunk: &ChunkRecord) -> io::Result<()> {
        match remove_file(self.path_manager.chunk_path(file_hash, &chunk.file_name)).await {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    async fn delete_chunk_dir(&self, file_hash: &FileHash) -> io::Result<()> {
        match remove_dir_all(self.path_manager.chunk_dir(file_hash)).await {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    async fn artifact_exists(&self, artifact: &ArtifactKey) -> io::Result<bool> {
        try_exists(self.path_manager.artifact_path(artifact)).await
    }

    async fn create_staging(&self, artifact: &ArtifactKey, len: u64) -> io::Result<StagingFile> {
        create_dir_all(self.path_manager.staging_dir()).await?;
        let path = self.path_manager.staging_path(artifact);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.set_len(len).await?;
        Ok(StagingFile { path, len })
    }

    async fn open_staging(&self, staging: &StagingFile) -> io::Result<File> {
        OpenOptions::new().write(true).open(&staging.path).await
    }

    async fn commit_staging(&self, staging: StagingFile, artifact: &ArtifactKey) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(&staging.path).await?;
        file.sync_all().await?;
        let len = file.metadata().await?.len();
        drop(file);
        if len != staging.len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "staging file {} is {len} bytes, expected {}",
                    staging.path.display(),
                    staging.len
                ),
            ));
        }
        rename(&staging.path, self.path_manager.artifact_path(artifact)).await
    }

    async fn discard_staging(&self, staging: StagingFile) -> io::Result<()> {
        match remove_file(&staging.path).await {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    async fn sweep_staging(&self) -> io::Result<usize> {
        let mut entries = match read_dir(self.path_manager.staging_dir()).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
