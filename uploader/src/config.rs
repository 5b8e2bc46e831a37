use std::path::PathBuf;

use axum::http::HeaderValue;

pub const DEFAULT_MAX_CHUNK_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_MERGE_CONCURRENCY: usize = 8;

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub root_dir: PathBuf,
    pub max_chunk_bytes: usize,
    pub merge_concurrency: usize,
    /// Empty when cross-origin requests are not allowed.
    pub cors_origins: Vec<HeaderValue>,
}

impl Config {
    /// Default limits with everything stored under `root_dir`.
    pub fn for_root(root_dir: impl Into<PathBuf>) -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            root_dir: root_dir.into(),
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            merge_concurrency: DEFAULT_MERGE_CONCURRENCY,
            cors_origins: Vec::new(),
        }
    }
}
