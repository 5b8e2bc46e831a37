pub mod chunk;

pub use chunk::{ArtifactKey, ChunkName, ChunkRecord, FileHash};
