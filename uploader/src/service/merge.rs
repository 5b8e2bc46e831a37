//! Reassembles stored chunks into the final artifact.
//!
//! Chunks are ordered by their numeric index and the chunk at sorted position
//! `i` owns the byte window starting at `i * chunk_size`. Every window is
//! copied by its own transfer, all transfers run concurrently against a
//! staging file, and the staging file is renamed onto the artifact path only
//! once every transfer has finished. A failed merge therefore leaves the
//! chunks untouched and can be retried.

use std::collections::{BTreeSet, HashMap};
use std::io::SeekFrom;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use tokio::io::{self, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::Result;
use crate::domain::{ArtifactKey, ChunkRecord, FileHash};
use crate::error::AppError;
use crate::storage::{StagingFile, Storage};

/// Number of missing indices spelled out in an error.
const MAX_REPORTED_MISSING: usize = 32;

#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub file_hash: FileHash,
    pub file_name: String,
    pub chunk_size: u64,
    /// When announced, the stored indices must be exactly `0..chunk_count`.
    pub chunk_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    AlreadyExists,
    Merged { chunks: usize, bytes: u64 },
}

/// Byte range of the artifact owned by one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChunkWindow {
    record: ChunkRecord,
    offset: u64,
    len: u64,
}

pub struct MergeEngine {
    storage: Arc<dyn Storage>,
    locks: MergeLocks,
    concurrency: usize,
}

impl MergeEngine {
    pub fn new(storage: Arc<dyn Storage>, concurrency: usize) -> Self {
        Self {
            storage,
            locks: MergeLocks::default(),
            concurrency: concurrency.max(1),
        }
    }

    pub async fn merge(&self, request: &MergeRequest) -> Result<MergeOutcome> {
        if request.chunk_size == 0 {
            return Err(AppError::InvalidInput(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        let file_hash = &request.file_hash;
        let artifact = ArtifactKey::new(file_hash.clone(), &request.file_name);

        // A second merge of the same upload waits here and then finds the
        // artifact written by the first one.
        let _guard = self.locks.lock(file_hash.as_str()).await;

        if self.storage.artifact_exists(&artifact).await? {
            info!(%file_hash, artifact = %artifact.file_name(), "artifact already exists, skipping merge");
            return Ok(MergeOutcome::AlreadyExists);
        }

        let records = match self.storage.list_chunks(file_hash).await {
            Ok(records) if !records.is_empty() => records,
            Ok(_) => return Err(AppError::NoChunks(file_hash.to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(AppError::NoChunks(file_hash.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let windows = plan_windows(file_hash, records, request.chunk_size, request.chunk_count)?;
        let total = windows.last().map_or(0, |w| w.offset + w.len);
        let chunks = windows.len();

        let staging_file = self.storage.create_staging(&artifact, total).await?;
        let mut staging = StagingGuard {
            storage: self.storage.clone(),
            staging: Some(staging_file.clone()),
        };
        let committed = match self.copy_windows(file_hash, &staging_file, &windows).await {
            Ok(()) => staging.commit(&artifact).await.map_err(AppError::from),
            Err(err) => Err(err),
        };
        if let Err(err) = committed {
            if let Err(discard) = staging.discard().await {
                warn!(%file_hash, "failed to discard staging file: {discard}");
            }
            return Err(err);
        }

        self.cleanup(file_hash, &windows).await;
        info!(%file_hash, artifact = %artifact.file_name(), chunks, bytes = total, "merged upload");
        Ok(MergeOutcome::Merged {
            chunks,
            bytes: total,
        })
    }

    /// Runs one transfer per window, at most `concurrency` at a time, and
    /// waits for all of them before reporting the first failure.
    async fn copy_windows(
        &self,
        file_hash: &FileHash,
        staging: &StagingFile,
        windows: &[ChunkWindow],
    ) -> Result<()> {
        let transfers: Vec<_> = windows
            .iter()
            .map(|window| self.copy_window(file_hash, staging, window))
            .collect();
        let results: Vec<Result<u64>> = futures::stream::iter(transfers)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.into_iter().try_for_each(|r| r.map(|_| ()))
    }

    async fn copy_window(
        &self,
        file_hash: &FileHash,
        staging: &StagingFile,
        window: &ChunkWindow,
    ) -> Result<u64> {
        let source = self.storage.read_chunk(file_hash, &window.record).await?;
        let mut target = self.storage.open_staging(staging).await?;
        target.seek(SeekFrom::Start(window.offset)).await?;

        let mut source = source.take(window.len);
        let copied = tokio::io::copy(&mut source, &mut target).await?;
        target.flush().await?;

        if copied != window.len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "chunk {} shrank during merge: copied {copied} of {} bytes",
                    window.record.file_name, window.len
                ),
            )
            .into());
        }
        debug!(%file_hash, chunk = window.record.file_name.as_str(), offset = window.offset, bytes = copied, "copied chunk");
        Ok(copied)
    }

    /// The artifact is in place at this point, so the leftovers are obsolete
    /// and failures are only logged.
    async fn cleanup(&self, file_hash: &FileHash, windows: &[ChunkWindow]) {
        let deletions = windows
            .iter()
            .map(|window| self.storage.delete_chunk(file_hash, &window.record));
        for result in futures::future::join_all(deletions).await {
            if let Err(err) = result {
                warn!(%file_hash, "failed to delete merged chunk: {err}");
            }
        }
        if let Err(err) = self.storage.delete_chunk_dir(file_hash).await {
            warn!(%file_hash, "failed to remove chunk directory: {err}");
        }
    }
}

/// Assigns every chunk its window and checks that the windows tile the
/// artifact: all chunks but the last fill a whole window, the last one at most
/// a whole window.
fn plan_windows(
    file_hash: &FileHash,
    records: Vec<ChunkRecord>,
    chunk_size: u64,
    chunk_count: Option<u64>,
) -> Result<Vec<ChunkWindow>> {
    if let Some(expected) = chunk_count {
        check_complete(file_hash, &records, expected)?;
    }

    let last = records.len().saturating_sub(1);
    let mut windows = Vec::with_capacity(records.len());
    for (position, record) in records.into_iter().enumerate() {
        let fits = if position == last {
            record.len <= chunk_size
        } else {
            record.len == chunk_size
        };
        if !fits {
            return Err(AppError::ChunkSizeMismatch {
                file_hash: file_hash.to_string(),
                index: record.name.index,
                actual: record.len,
                expected: chunk_size,
            });
        }
        let offset = (position as u64).checked_mul(chunk_size).ok_or_else(|| {
            AppError::InvalidInput(format!("chunk size {chunk_size} overflows the file offset"))
        })?;
        windows.push(ChunkWindow {
            offset,
            len: record.len,
            record,
        });
    }
    Ok(windows)
}

fn check_complete(file_hash: &FileHash, records: &[ChunkRecord], expected: u64) -> Result<()> {
    let indices: BTreeSet<u64> = records.iter().map(|r| r.name.index).collect();
    let found = indices.len() as u64;
    if indices.len() != records.len() || indices.last().is_some_and(|&max| max >= expected) {
        return Err(AppError::ChunkCountMismatch {
            file_hash: file_hash.to_string(),
            found: records.len() as u64,
            expected,
        });
    }
    if found < expected {
        let missing = (0..expected)
            .filter(|i| !indices.contains(i))
            .take(MAX_REPORTED_MISSING)
            .collect();
        return Err(AppError::IncompleteChunks {
            file_hash: file_hash.to_string(),
            missing,
            total_missing: expected - found,
        });
    }
    Ok(())
}

/// Owns a staging file until it is committed. A merge dropped mid-way (the
/// client went away) removes its staging file in the background.
struct StagingGuard {
    storage: Arc<dyn Storage>,
    staging: Option<StagingFile>,
}

impl StagingGuard {
    /// The staging file stays owned by the guard while the rename is in
    /// flight, so a merge dropped during the commit still cleans up.
    async fn commit(&mut self, artifact: &ArtifactKey) -> io::Result<()> {
        if let Some(staging) = self.staging.clone() {
            self.storage.commit_staging(staging, artifact).await?;
            self.staging = None;
        }
        Ok(())
    }

    async fn discard(mut self) -> io::Result<()> {
        match self.staging.take() {
            Some(staging) => self.storage.discard_staging(staging).await,
            None => Ok(()),
        }
    }
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        let Some(staging) = self.staging.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(path = %staging.path.display(), "no runtime to discard staging file");
            return;
        };
        let storage = self.storage.clone();
        runtime.spawn(async move {
            let path = staging.path.clone();
            if let Err(err) = storage.discard_staging(staging).await {
                warn!(path = %path.display(), "failed to discard abandoned staging file: {err}");
            }
        });
    }
}

/// Per-upload merge locks. Every caller registers before waiting and
/// deregisters when its guard drops, whether it got the lock or was cancelled
/// while waiting; the entry goes away with the last one.
#[derive(Default)]
struct MergeLocks {
    table: Mutex<HashMap<String, LockSlot>>,
}

struct LockSlot {
    mutex: Arc<AsyncMutex<()>>,
    users: usize,
}

struct MergeGuard<'a> {
    locks: &'a MergeLocks,
    key: String,
    held: Option<OwnedMutexGuard<()>>,
}

impl MergeLocks {
    async fn lock(&self, key: &str) -> MergeGuard<'_> {
        let mutex = {
            let mut table = self.table();
            let slot = table.entry(key.to_owned()).or_insert_with(|| LockSlot {
                mutex: Arc::default(),
                users: 0,
            });
            slot.users += 1;
            Arc::clone(&slot.mutex)
        };
        // Registered from here on: dropping this future while it waits still
        // runs the guard's Drop.
        let mut guard = MergeGuard {
            locks: self,
            key: key.to_owned(),
            held: None,
        };
        guard.held = Some(mutex.lock_owned().await);
        guard
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, LockSlot>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for MergeGuard<'_> {
    fn drop(&mut self) {
        self.held.take();
        let mut table = self.locks.table();
        if let Some(slot) = table.get_mut(&self.key) {
            slot.users -= 1;
            if slot.users == 0 {
                table.remove(&self.key);
            }
        }
    }
}
