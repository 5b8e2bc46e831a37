// PathManager maps file hashes, chunk names and artifacts onto the upload
// root. The layout is roughly as follows:
//
//	<root>
//	├── <file_hash>
//	│   ├── <chunk_hash>-<index>
//	│   └── .<chunk_hash>-<index>.<uuid>.part
//	├── <file_hash><extension>
//	└── .merging
//	    └── <file_hash>-<uuid><extension>
//
// Chunk directories hold the pieces of an upload that has not been merged
// yet; hidden `.part` files are chunks still being received. Artifacts live
// next to the chunk directories. `.merging` holds artifacts being assembled,
// which are renamed onto their final name once complete.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::domain::{ArtifactKey, ChunkName, FileHash};

pub const STAGING_DIR: &str = ".merging";

#[derive(Clone, Debug)]
pub struct PathManager {
    root_path: PathBuf,
}

impl PathManager {
    pub fn new(root: impl AsRef<Path>) -> Self {
        PathManager {
            root_path: root.as_ref().to_path_buf(),
        }
    }

    /// Returns the directory holding the chunks of one upload,
    /// (e.g. `<root>/<file_hash>`).
    pub fn chunk_dir(&self, file_hash: &FileHash) -> PathBuf {
        self.root_path.join(file_hash.as_str())
    }

    /// Returns the path of a stored chunk by its listed file name,
    /// (e.g. `<root>/<file_hash>/<chunk_hash>-<index>`).
    pub fn chunk_path(&self, file_hash: &FileHash, file_name: &str) -> PathBuf {
        self.chunk_dir(file_hash).join(file_name)
    }

    /// Returns a fresh hidden path for a chunk that is still being received,
    /// (e.g. `<root>/<file_hash>/.<chunk_hash>-<index>.<uuid>.part`).
    pub fn chunk_upload_path(&self, file_hash: &FileHash, chunk: &ChunkName) -> PathBuf {
        self.chunk_dir(file_hash)
            .join(format!(".{chunk}.{}.part", Uuid::new_v4().simple()))
    }

    /// Returns the path of a merged file,
    /// (e.g. `<root>/<file_hash><extension>`).
    pub fn artifact_path(&self, artifact: &ArtifactKey) -> PathBuf {
        self.root_path.join(artifact.file_name())
    }

    /// Returns the directory of in-progress merges,
    /// (e.g. `<root>/.merging`).
    pub fn staging_dir(&self) -> PathBuf {
        self.root_path.join(STAGING_DIR)
    }

    /// Returns a fresh staging path for an artifact,
    /// (e.g. `<root>/.merging/<file_hash>-<uuid><extension>`).
    pub fn staging_path(&self, artifact: &ArtifactKey) -> PathBuf {
        self.staging_dir().join(format!(
            "{}-{}{}",
            artifact.file_hash,
            Uuid::new_v4().simple(),
            artifact.extension
        ))
    }
}
