use once_cell::sync::Lazy;
use regex::Regex;

// File hashes become directory names, so they are restricted to one path
// segment without dots. Artifact names always contain a dot, which keeps the
// two namespaces apart.
static FILE_HASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("file hash pattern"));

static CHUNK_HASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-][A-Za-z0-9._-]{0,127}$").expect("chunk hash pattern"));

// Extensions end up in artifact names, so they stay short and plain.
static EXTENSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\.[A-Za-z0-9_-]{1,32}$").expect("extension pattern"));

pub fn is_valid_file_hash(hash: &str) -> bool {
    FILE_HASH_RE.is_match(hash)
}

pub fn is_valid_chunk_hash(hash: &str) -> bool {
    CHUNK_HASH_RE.is_match(hash)
}

pub fn is_valid_extension(extension: &str) -> bool {
    EXTENSION_RE.is_match(extension)
}
