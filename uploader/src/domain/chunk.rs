//! Identifiers for uploads, stored chunks and merged artifacts.
//!
//! A chunk is stored as `<chunk_hash>-<index>`; the index after the last `-`
//! fixes the chunk's position in the original file. An artifact is named after
//! the whole-file hash plus the extension of the client's file name.

use std::fmt;

use crate::error::AppError;
use crate::utils::validation::{is_valid_chunk_hash, is_valid_extension, is_valid_file_hash};

/// Extension used when the client's file name does not carry a usable one.
pub const FALLBACK_EXTENSION: &str = ".bin";

/// Content hash of a complete file, validated to be a single path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileHash(String);

impl FileHash {
    pub fn parse(hash: &str) -> Result<Self, AppError> {
        if !is_valid_file_hash(hash) {
            return Err(AppError::InvalidInput(format!("invalid file hash `{hash}`")));
        }
        Ok(Self(hash.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkName {
    pub hash: String,
    pub index: u64,
}

impl ChunkName {
    pub fn new(hash: &str, index: u64) -> Result<Self, AppError> {
        if !is_valid_chunk_hash(hash) {
            return Err(AppError::InvalidInput(format!("invalid chunk hash `{hash}`")));
        }
        Ok(Self {
            hash: hash.to_owned(),
            index,
        })
    }

    /// Splits `<hash>-<index>` at the last dash. Returns `None` for names
    /// that do not end in a plain decimal index.
    pub fn parse(name: &str) -> Option<Self> {
        let (hash, index) = name.rsplit_once('-')?;
        if hash.is_empty() || index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            hash: hash.to_owned(),
            index: index.parse().ok()?,
        })
    }
}

impl fmt::Display for ChunkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.hash, self.index)
    }
}

/// A chunk found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub name: ChunkName,
    /// File name as listed, which may differ from `name.to_string()` when the
    /// index was written with leading zeros.
    pub file_name: String,
    pub len: u64,
}

/// Location of a merged file: `<file_hash><extension>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKey {
    pub file_hash: FileHash,
    pub extension: String,
}

impl ArtifactKey {
    pub fn new(file_hash: FileHash, file_name: &str) -> Self {
        Self {
            file_hash,
            extension: extension_of(file_name).to_owned(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}{}", self.file_hash, self.extension)
    }
}

/// Extension of the last path component, dot included (`a.tar.gz` -> `.gz`).
/// Anything that is not a short run of `[A-Za-z0-9_-]` after the dot gives
/// the fallback, so the artifact name stays a valid file name.
pub fn extension_of(file_name: &str) -> &str {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    match base.rfind('.') {
        Some(pos) if is_valid_extension(&base[pos..]) => &base[pos..],
        _ => FALLBACK_EXTENSION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_name_parses_index_after_last_dash() {
        let name = ChunkName::parse("9e10-7d-12").unwrap();
        assert_eq!(name.hash, "9e10-7d");
        assert_eq!(name.index, 12);
        assert_eq!(name.to_string(), "9e10-7d-12");
    }

    #[test]
    fn test_chunk_name_rejects_malformed_names() {
        for name in ["abc", "abc-", "-3", "abc-+3", "abc-x1", "abc-1.5"] {
            assert!(ChunkName::parse(name).is_none(), "{name:?} should not parse");
        }
    }

    #[test]
    fn test_chunk_name_keeps_numeric_value_of_padded_index() {
        let name = ChunkName::parse("h-007").unwrap();
        assert_eq!(name.index, 7);
    }

    #[test]
    fn test_chunk_name_new_validates_hash() {
        assert!(ChunkName::new("abc", 0).is_ok());
        assert!(matches!(
            ChunkName::new("../abc", 0),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_file_hash_parse() {
        assert_eq!(FileHash::parse("H").unwrap().as_str(), "H");
        assert!(FileHash::parse("../etc").is_err());
        assert!(FileHash::parse("").is_err());
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("f.txt"), ".txt");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of(".bashrc"), ".bashrc");
        assert_eq!(extension_of("dir.d/readme"), FALLBACK_EXTENSION);
        assert_eq!(extension_of("C:\\photos\\cat.JPG"), ".JPG");
        assert_eq!(extension_of("README"), FALLBACK_EXTENSION);
        assert_eq!(extension_of("trailing."), FALLBACK_EXTENSION);
    }

    #[test]
    fn test_extension_of_unusable_suffix_falls_back() {
        let long = format!("f.{}", "x".repeat(300));
        assert_eq!(extension_of(&long), FALLBACK_EXTENSION);
        assert_eq!(extension_of("f.t\0xt"), FALLBACK_EXTENSION);
        assert_eq!(extension_of("f.t xt"), FALLBACK_EXTENSION);
        assert_eq!(extension_of("f.\u{e9}t\u{e9}"), FALLBACK_EXTENSION);

        let key = ArtifactKey::new(FileHash::parse("H").unwrap(), &long);
        assert_eq!(key.file_name(), "H.bin");
    }

    #[test]
    fn test_artifact_file_name() {
        let key = ArtifactKey::new(FileHash::parse("H").unwrap(), "f.txt");
        assert_eq!(key.file_name(), "H.txt");
    }
}
