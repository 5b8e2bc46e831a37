use std::sync::Arc;

use tracing::debug;

use super::Result;
use crate::domain::{ArtifactKey, FileHash};
use crate::storage::Storage;

/// Answers instant-upload probes by looking for a finished artifact. It never
/// looks at chunk directories, so the probe costs one `stat` however large the
/// earlier upload was.
pub struct DedupChecker {
    storage: Arc<dyn Storage>,
}

impl DedupChecker {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Returns `true` when the client still has to upload the file.
    pub async fn check(&self, file_hash: &FileHash, file_name: &str) -> Result<bool> {
        let artifact = ArtifactKey::new(file_hash.clone(), file_name);
        let exists = self.storage.artifact_exists(&artifact).await?;
        debug!(%file_hash, artifact = %artifact.file_name(), exists, "verified upload");
        Ok(!exists)
    }
}
