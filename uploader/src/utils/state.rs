use std::io;
use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::service::{ChunkReceiver, DedupChecker, MergeEngine};
use crate::storage::{Storage, driver::filesystem::FilesystemStorage};

#[derive(Clone)]
pub struct AppState {
    pub receiver: Arc<ChunkReceiver>,
    pub dedup: Arc<DedupChecker>,
    pub merger: Arc<MergeEngine>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Builds the services over a filesystem store rooted at
    /// `config.root_dir` and clears staging files left by a previous run.
    pub async fn new(config: Config) -> io::Result<Self> {
        tokio::fs::create_dir_all(&config.root_dir).await?;
        let storage: Arc<dyn Storage> = Arc::new(FilesystemStorage::new(&config.root_dir));

        let swept = storage.sweep_staging().await?;
        if swept > 0 {
            info!(swept, "removed staging files from an interrupted merge");
        }

        Ok(AppState {
            receiver: Arc::new(ChunkReceiver::new(storage.clone())),
            dedup: Arc::new(DedupChecker::new(storage.clone())),
            merger: Arc::new(MergeEngine::new(storage, config.merge_concurrency)),
            config: Arc::new(config),
        })
    }
}
