pub mod dedup;
pub mod merge;
pub mod receiver;

pub use dedup::DedupChecker;
pub use merge::{MergeEngine, MergeOutcome, MergeRequest};
pub use receiver::{ChunkReceiver, UploadStatus};

use crate::error::AppError;

type Result<T> = std::result::Result<T, AppError>;
